use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use serde::Serialize;

use crate::domain::models::operation::OperationKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    provider: String,
    folder: String,
    operation: OperationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl OperationStats {
    fn record(&mut self, latency: Duration, success: bool) {
        let latency_ms = latency.as_millis() as u64;
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.total_latency_ms = self.total_latency_ms.saturating_add(latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
    }

    fn merge(&mut self, other: &OperationStats) {
        self.count += other.count;
        self.errors += other.errors;
        self.total_latency_ms = self.total_latency_ms.saturating_add(other.total_latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(other.max_latency_ms);
    }

    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.errors as f64 / self.count as f64
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricEntry {
    pub provider: String,
    pub folder: String,
    pub operation: OperationKind,
    #[serde(flatten)]
    pub stats: OperationStats,
    pub error_rate: f64,
    pub average_latency_ms: f64,
}

/// Operation counts, error counts and latencies per provider, folder and
/// operation kind.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    stats: Mutex<HashMap<MetricKey, OperationStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        provider: &str,
        folder: &str,
        operation: OperationKind,
        latency: Duration,
        success: bool,
    ) {
        let key = MetricKey {
            provider: provider.to_string(),
            folder: folder.to_string(),
            operation,
        };
        self.stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(key)
            .or_default()
            .record(latency, success);
    }

    pub fn snapshot(&self) -> Vec<MetricEntry> {
        let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries: Vec<MetricEntry> = stats
            .iter()
            .map(|(key, stats)| MetricEntry {
                provider: key.provider.clone(),
                folder: key.folder.clone(),
                operation: key.operation,
                stats: stats.clone(),
                error_rate: stats.error_rate(),
                average_latency_ms: stats.average_latency_ms(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.provider, &a.folder, a.operation.as_str())
                .cmp(&(&b.provider, &b.folder, b.operation.as_str()))
        });
        entries
    }

    pub fn provider_totals(&self, provider: &str) -> OperationStats {
        let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        let mut totals = OperationStats::default();
        for (key, entry) in stats.iter() {
            if key.provider == provider {
                totals.merge(entry);
            }
        }
        totals
    }
}
