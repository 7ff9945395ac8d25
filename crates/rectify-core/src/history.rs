//! Rolling History Store
//!
//! One bounded FIFO per metric. Appends are O(1): the deque is preallocated
//! to the window size and the oldest value is popped once the window is full.

use std::collections::{HashMap, VecDeque};

/// Bounded, chronologically ordered window of accepted values (oldest first).
#[derive(Debug, Clone)]
pub struct Window {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a window from existing values, keeping only the newest `capacity`.
    pub fn from_values(capacity: usize, values: &[f64]) -> Self {
        let mut window = Self::new(capacity);
        for &v in values {
            window.push(v);
        }
        window
    }

    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently accepted value
    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Values in insertion order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Per-metric windows, keyed by metric name.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    windows: HashMap<String, Window>,
}

impl HistoryStore {
    /// Create an empty window for every metric name.
    pub fn new<'a>(window_size: usize, metrics: impl IntoIterator<Item = &'a str>) -> Self {
        let windows = metrics
            .into_iter()
            .map(|name| (name.to_string(), Window::new(window_size)))
            .collect();
        Self { windows }
    }

    /// Append an accepted value, evicting the oldest when the window is full.
    /// Metrics the store was not created with are ignored.
    pub fn append(&mut self, metric: &str, value: f64) {
        if let Some(window) = self.windows.get_mut(metric) {
            window.push(value);
        }
    }

    /// Read-only view of a metric's window as it stands now.
    pub fn snapshot(&self, metric: &str) -> Option<&Window> {
        self.windows.get(metric)
    }

    pub fn clear(&mut self) {
        for window in self.windows.values_mut() {
            window.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = Window::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
            assert!(w.len() <= 3);
        }
        assert_eq!(w.to_vec(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.last(), Some(5.0));
    }

    #[test]
    fn test_from_values_keeps_newest() {
        let w = Window::from_values(2, &[1.0, 2.0, 3.0]);
        assert_eq!(w.to_vec(), vec![2.0, 3.0]);
        assert_eq!(w.capacity(), 2);
    }

    #[test]
    fn test_store_append_and_snapshot() {
        let mut store = HistoryStore::new(2, ["temperature", "humidity"]);
        store.append("temperature", 21.0);
        store.append("temperature", 22.0);
        store.append("temperature", 23.0);
        store.append("humidity", 50.0);

        assert_eq!(store.snapshot("temperature").unwrap().to_vec(), vec![22.0, 23.0]);
        assert_eq!(store.snapshot("humidity").unwrap().to_vec(), vec![50.0]);
        assert!(store.snapshot("pressure").is_none());
    }

    #[test]
    fn test_unknown_metric_is_ignored() {
        let mut store = HistoryStore::new(5, ["light"]);
        store.append("pressure", 1013.0);
        assert!(store.snapshot("pressure").is_none());
        assert!(store.snapshot("light").unwrap().is_empty());
    }

    #[test]
    fn test_clear_empties_every_window() {
        let mut store = HistoryStore::new(4, ["light"]);
        store.append("light", 300.0);
        store.clear();
        assert!(store.snapshot("light").unwrap().is_empty());
    }
}
