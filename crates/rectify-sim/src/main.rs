//! rectify-sim - sensor reading generator and engine benchmark
//!
//! Usage:
//!   rectify-sim generate --points 500 --fault spike:temperature:100:3
//!   rectify-sim bench --points 2000 --seed 7 --fault drift:humidity:300:50
//!   rectify-sim list

use clap::{Parser, Subcommand, ValueEnum};
use rectify_core::{EngineConfig, SensorEngine};
use rectify_sim::{BenchReport, Fault, FaultKind, SensorSimulator, SimulatorConfig, bench};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rectify-sim")]
#[command(about = "Sensor reading simulation with controlled fault injection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SimArgs {
    /// Number of readings
    #[arg(short, long, default_value = "500")]
    points: usize,

    /// RNG seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Fault to inject as kind:metric:start:duration (repeatable)
    #[arg(short, long = "fault")]
    faults: Vec<Fault>,

    /// Device id stamped on every reading
    #[arg(long, default_value = "sim-01")]
    device: String,
}

impl SimArgs {
    fn simulator(&self) -> SensorSimulator {
        let config = SimulatorConfig {
            device: self.device.clone(),
            ..Default::default()
        };
        SensorSimulator::with_config(self.seed, config).with_faults(self.faults.iter().cloned())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print readings, one per line
    Generate {
        #[command(flatten)]
        sim: SimArgs,

        /// Output format
        #[arg(long, default_value = "jsonl")]
        format: OutputFormat,
    },

    /// Replay generated readings through the engine and score it
    Bench {
        #[command(flatten)]
        sim: SimArgs,

        /// Engine window size
        #[arg(short, long, default_value = "20")]
        window: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available fault kinds
    List,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Jsonl,
    Pretty,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { sim, format } => run_generate(&sim, format),
        Commands::Bench { sim, window, json } => run_bench(&sim, window, json),
        Commands::List => {
            run_list();
            Ok(())
        }
    }
}

fn run_generate(args: &SimArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut simulator = args.simulator();
    info!(
        points = args.points,
        seed = args.seed,
        faults = simulator.faults().len(),
        run = %simulator.run_id(),
        "Generating readings"
    );

    for sample in simulator.samples(args.points) {
        match format {
            OutputFormat::Jsonl => println!("{}", serde_json::to_string(&sample.reading)?),
            OutputFormat::Pretty => {
                let faulted: Vec<String> = sample
                    .labels
                    .iter()
                    .filter(|(_, label)| **label != rectify_sim::Label::Clean)
                    .map(|(metric, label)| format!("{metric}={label:?}"))
                    .collect();
                let marker = if faulted.is_empty() {
                    String::new()
                } else {
                    format!(" [FAULT {}]", faulted.join(", "))
                };
                println!(
                    "#{:<6} temperature={} humidity={} light={}{}",
                    sample.index,
                    sample.reading.get("temperature").map_or("-".into(), |v| v.to_string()),
                    sample.reading.get("humidity").map_or("-".into(), |v| v.to_string()),
                    sample.reading.get("light").map_or("-".into(), |v| v.to_string()),
                    marker
                );
            }
        }
    }
    Ok(())
}

fn run_bench(args: &SimArgs, window: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = SensorEngine::new(EngineConfig::default().with_window_size(window))?;
    let samples = args.simulator().samples(args.points);

    info!(points = args.points, window, "Replaying through engine");
    let report = bench::replay(&mut engine, &samples);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &BenchReport) {
    let overall = report.overall();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                   Benchmark Results                          ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║ Samples: {:51} ║", report.samples);
    println!(
        "║ Rejected: {:50} ║",
        format!("{} ({} expected)", report.rejected, report.expected_rejections)
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (metric, score) in &report.metrics {
        let c = score.confusion;
        println!(
            "║ {:12} TP {:5} FP {:5} FN {:5} TN {:6}            ║",
            metric, c.true_positives, c.false_positives, c.false_negatives, c.true_negatives
        );
        println!(
            "║ {:12} P {:6.3} R {:6.3} F1 {:6.3} MAE {:>10}        ║",
            "",
            c.precision(),
            c.recall(),
            c.f1(),
            score
                .mean_abs_error()
                .map_or("-".to_string(), |e| format!("{e:.3}"))
        );
    }
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║ Overall: P {:.3}  R {:.3}  F1 {:.3}{:27} ║",
        overall.precision(),
        overall.recall(),
        overall.f1(),
        ""
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
}

fn run_list() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Available Fault Kinds                       ║");
    println!("╠══════════════════════════════════════════════════════════════╣");

    for kind in FaultKind::ALL {
        println!("║ {:14} - {:43} ║", kind.name(), kind.description());
    }

    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("\nUsage: rectify-sim generate --fault <KIND>:<METRIC>:<START>:<DURATION>");
}
