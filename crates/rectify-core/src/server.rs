//! Gatekeeper: HTTP ingestion in front of the engine
//!
//! - SIMD-JSON request parsing
//! - Readings routed by device id to shard worker threads; each shard owns a
//!   registry of engines, so every stream has exactly one writer
//! - Replies travel back over a oneshot channel per request
//! - Prometheus metrics

use std::path::Path;
use std::sync::Arc;
use std::thread;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use once_cell::sync::Lazy;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, TextEncoder,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, load_toml};
use crate::engine::SensorEngine;
use crate::error::{ConfigError, InvalidReadingError};
use crate::reading::Reading;
use crate::registry::{DEFAULT_STREAM, RegistryConfig, StreamRegistry, stream_key};
use crate::signal::PointOutcome;

pub const CONFIG_ENV: &str = "RECTIFY_CONFIG";

// ============================================================================
// METRICS
// ============================================================================

pub static POINTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("rectify_points_total", "Total readings ingested").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static REJECTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("rectify_rejected_total", "Readings rejected as invalid").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let c = CounterVec::new(
        Opts::new("rectify_anomalies_total", "Rectified metric values"),
        &["metric"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static DROPPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new(
        "rectify_dropped_total",
        "Readings dropped due to backpressure",
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static PROCESSING_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "rectify_processing_duration_seconds",
        "Histogram of per-reading processing latency",
    ))
    .unwrap();
    prometheus::register(Box::new(h.clone())).unwrap();
    h
});

pub static ACTIVE_STREAMS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("rectify_active_streams", "Number of live sensor streams").unwrap();
    prometheus::register(Box::new(g.clone())).unwrap();
    g
});

pub static EVICTIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new(
        "rectify_evictions_total",
        "Sensor streams evicted due to registry pressure",
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

fn init_metrics() {
    let _ = &*POINTS_TOTAL;
    let _ = &*REJECTED_TOTAL;
    let _ = &*ANOMALIES_TOTAL;
    let _ = &*DROPPED_TOTAL;
    let _ = &*PROCESSING_LATENCY;
    let _ = &*ACTIVE_STREAMS;
    let _ = &*EVICTIONS_TOTAL;
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    pub bind: String,
    /// Worker threads; 0 = available parallelism
    pub shards: usize,
    /// Pending readings per shard before requests are refused
    pub queue_capacity: usize,
    /// Reading field naming the sensor stream
    pub stream_field: String,
    pub registry: RegistryConfig,
    pub engine: EngineConfig,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            shards: 0,
            queue_capacity: 10_000,
            stream_field: "device".to_string(),
            registry: RegistryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl GatekeeperConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.engine.validate()?;
        info!(path = %path.display(), "loaded gatekeeper configuration");
        Ok(config)
    }

    /// An explicit path must load. Otherwise try `RECTIFY_CONFIG`, falling
    /// back to defaults when it is unset or unreadable.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "{CONFIG_ENV} set but file could not be loaded, using defaults"
                ),
            }
        }

        debug!("no config file given, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn shard_count(&self) -> usize {
        if self.shards > 0 {
            return self.shards;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

// ============================================================================
// DATA TYPES
// ============================================================================

type ShardReply = Result<PointOutcome, InvalidReadingError>;

/// Internal: one reading bound for a shard
struct ShardRequest {
    key: u64,
    reading: Reading,
    reply: oneshot::Sender<ShardReply>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub original: Reading,
    pub corrected: Map<String, Value>,
    pub anomalies: std::collections::BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ErrorBody {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            metric: None,
            raw: None,
        }
    }
}

impl From<InvalidReadingError> for ErrorBody {
    fn from(err: InvalidReadingError) -> Self {
        Self {
            error: err.to_string(),
            metric: Some(err.metric),
            raw: Some(err.raw),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Processed(ProcessResponse),
    Failed(ErrorBody),
}

enum ProcessError {
    Empty,
    Invalid(InvalidReadingError),
    Unavailable,
}

const NO_DATA: &str = "no data provided";
const BUSY: &str = "engine busy, retry later";

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        match self {
            Self::Empty => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::message(NO_DATA))).into_response()
            }
            Self::Invalid(err) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody::from(err))).into_response()
            }
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::message(BUSY)),
            )
                .into_response(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    shard_txs: Arc<Vec<Sender<ShardRequest>>>,
    engine_config: Arc<EngineConfig>,
    stream_field: Arc<str>,
}

// ============================================================================
// SIMD-JSON EXTRACTOR
// ============================================================================

struct SimdJson<T>(T);

impl<T, S> FromRequest<S> for SimdJson<T>
where
    T: for<'de> Deserialize<'de> + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| e.into_response())?;
        let mut bytes_vec = bytes.to_vec();

        let val = simd_json::from_slice::<T>(&mut bytes_vec).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::message("invalid JSON reading")),
            )
                .into_response()
        })?;

        Ok(SimdJson(val))
    }
}

// ============================================================================
// SHARD WORKER
// ============================================================================

struct ShardWorker {
    id: usize,
    rx: Receiver<ShardRequest>,
    registry: StreamRegistry<SensorEngine>,
    prototype: SensorEngine,
}

impl ShardWorker {
    fn spawn(
        id: usize,
        rx: Receiver<ShardRequest>,
        registry_config: RegistryConfig,
        prototype: SensorEngine,
    ) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name(format!("rectify-shard-{id}"))
            .spawn(move || {
                let mut worker = ShardWorker {
                    id,
                    rx,
                    registry: StreamRegistry::with_config(registry_config),
                    prototype,
                };
                worker.run();
                info!(shard = id, "Shard worker stopped.");
            })
            .expect("Failed to spawn shard thread")
    }

    fn run(&mut self) {
        info!(shard = self.id, "Shard worker active.");

        while let Ok(request) = self.rx.recv() {
            let timer = PROCESSING_LATENCY.start_timer();

            let before = self.registry.len();
            let (engine, evicted) = self
                .registry
                .get_or_create(request.key, || self.prototype.fresh());
            let result = engine.process_point(&request.reading);

            if evicted {
                EVICTIONS_TOTAL.inc();
            } else if self.registry.len() > before {
                ACTIVE_STREAMS.inc();
            }

            match &result {
                Ok(outcome) => {
                    for report in outcome.reports.iter().filter(|r| r.decision.is_anomaly) {
                        ANOMALIES_TOTAL.with_label_values(&[&report.metric]).inc();
                    }
                    if outcome.any_anomaly() {
                        warn!(
                            shard = self.id,
                            stream = request.key,
                            original = %serde_json::Value::Object(request.reading.as_map().clone()),
                            corrected = %serde_json::Value::Object(outcome.corrected.clone()),
                            "ANOMALY RECTIFIED: {}",
                            outcome
                                .reports
                                .iter()
                                .filter(|r| r.decision.is_anomaly)
                                .map(|r| r.reason())
                                .collect::<Vec<_>>()
                                .join("; ")
                        );
                    }
                }
                Err(err) => {
                    REJECTED_TOTAL.inc();
                    debug!(shard = self.id, stream = request.key, error = %err, "Rejected reading");
                }
            }

            timer.observe_duration();

            // The caller may have gone away; nothing to do then
            let _ = request.reply.send(result);
        }
    }
}

// ============================================================================
// GATEKEEPER
// ============================================================================

/// Running shard pool. Dropping every `AppState` clone and calling
/// `shutdown` drains the queues and joins the workers.
pub struct Gatekeeper {
    state: AppState,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Gatekeeper {
    pub fn start(config: &GatekeeperConfig) -> Result<Self, ConfigError> {
        init_metrics();

        let prototype = SensorEngine::new(config.engine.clone())?;
        let shard_count = config.shard_count();
        let capacity = config.queue_capacity.max(1);
        info!(
            shards = shard_count,
            queue_capacity = capacity,
            window_size = prototype.window_size(),
            "Configuring shard workers."
        );

        let mut txs = Vec::with_capacity(shard_count);
        let mut workers = Vec::with_capacity(shard_count);
        for id in 0..shard_count {
            let (tx, rx) = bounded::<ShardRequest>(capacity);
            txs.push(tx);
            workers.push(ShardWorker::spawn(
                id,
                rx,
                config.registry.clone(),
                prototype.fresh(),
            ));
        }

        Ok(Self {
            state: AppState {
                shard_txs: Arc::new(txs),
                engine_config: Arc::new(config.engine.clone()),
                stream_field: Arc::from(config.stream_field.as_str()),
            },
            workers,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        router(self.state())
    }

    pub fn shutdown(self) {
        drop(self.state);
        for handle in self.workers {
            if handle.join().is_err() {
                warn!("Shard worker panicked during shutdown.");
            }
        }
        info!("All shards drained and stopped.");
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/process", post(process_handler))
        .route("/process/batch", post(process_batch_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn stream_id(reading: &Reading, field: &str) -> String {
    match reading.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => DEFAULT_STREAM.to_string(),
    }
}

async fn dispatch(state: &AppState, reading: Reading) -> Result<ProcessResponse, ProcessError> {
    if reading.is_empty() {
        return Err(ProcessError::Empty);
    }
    POINTS_TOTAL.inc();

    let key = stream_key(&stream_id(&reading, &state.stream_field));
    let shard_id = (key as usize) % state.shard_txs.len();
    let (reply_tx, reply_rx) = oneshot::channel();

    let request = ShardRequest {
        key,
        reading: reading.clone(),
        reply: reply_tx,
    };

    match state.shard_txs[shard_id].try_send(request) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
            DROPPED_TOTAL.inc();
            return Err(ProcessError::Unavailable);
        }
    }

    match reply_rx.await {
        Ok(Ok(outcome)) => Ok(ProcessResponse {
            original: reading,
            corrected: outcome.corrected,
            anomalies: outcome.anomalies,
        }),
        Ok(Err(err)) => Err(ProcessError::Invalid(err)),
        Err(_) => Err(ProcessError::Unavailable),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Serialize)]
struct IndexResponse {
    status: &'static str,
    message: &'static str,
    endpoints: [&'static str; 6],
}

async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        status: "online",
        message: "Rectify gatekeeper is running",
        endpoints: [
            "/process (POST)",
            "/process/batch (POST)",
            "/health (GET)",
            "/stats (GET)",
            "/metrics (GET)",
            "/ (GET)",
        ],
    })
}

async fn process_handler(
    State(state): State<AppState>,
    SimdJson(reading): SimdJson<Reading>,
) -> Result<Json<ProcessResponse>, ProcessError> {
    dispatch(&state, reading).await.map(Json)
}

async fn process_batch_handler(
    State(state): State<AppState>,
    SimdJson(readings): SimdJson<Vec<Reading>>,
) -> Json<Vec<BatchItem>> {
    let mut items = Vec::with_capacity(readings.len());
    for reading in readings {
        let item = match dispatch(&state, reading).await {
            Ok(response) => BatchItem::Processed(response),
            Err(ProcessError::Empty) => BatchItem::Failed(ErrorBody::message(NO_DATA)),
            Err(ProcessError::Invalid(err)) => BatchItem::Failed(err.into()),
            Err(ProcessError::Unavailable) => BatchItem::Failed(ErrorBody::message(BUSY)),
        };
        items.push(item);
    }
    Json(items)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: "RectifyEngine",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct StatsResponse {
    version: &'static str,
    window_size: usize,
    metrics: Vec<String>,
    shards: usize,
    active_streams: i64,
    status: &'static str,
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        version: env!("CARGO_PKG_VERSION"),
        window_size: state.engine_config.window_size,
        metrics: state
            .engine_config
            .metrics
            .iter()
            .map(|m| m.name.clone())
            .collect(),
        shards: state.shard_txs.len(),
        active_streams: ACTIVE_STREAMS.get(),
        status: "operational",
    })
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    match String::from_utf8(buffer) {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_id_fallbacks() {
        let named = Reading::new().with("device", "esp32-01");
        assert_eq!(stream_id(&named, "device"), "esp32-01");

        let numbered = Reading::new().with("device", 7);
        assert_eq!(stream_id(&numbered, "device"), "7");

        assert_eq!(stream_id(&Reading::new(), "device"), DEFAULT_STREAM);
    }

    #[test]
    fn test_gatekeeper_config_from_toml() {
        let config: GatekeeperConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:9000"
            shards = 2

            [engine]
            window_size = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.shard_count(), 2);
        assert_eq!(config.engine.window_size, 30);
        assert_eq!(config.engine.metrics.len(), 3);
        assert_eq!(config.stream_field, "device");
    }

    #[test]
    fn test_error_body_from_invalid_reading() {
        let body = ErrorBody::from(InvalidReadingError::new("humidity", "n/a"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["metric"], json!("humidity"));
        assert_eq!(json["raw"], json!("n/a"));
    }
}
