use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers immutable build metadata for `/metrics` scraping.
///
/// Encoded as a labeled gauge with value `1` so the metric is valid for
/// Prometheus text exposition format and still carries stable build labels.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "shopline",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

/// Label set for immutable build identity.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CommandLabels {
    command: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectionLabels {
    command: &'static str,
    kind: &'static str,
}

#[derive(Clone)]
pub struct QueueMetrics {
    /// Commands applied, by command name.
    pub commands_applied_total: Family<CommandLabels, Counter>,
    /// Commands rejected, by command name and rejection kind.
    pub commands_rejected_total: Family<RejectionLabels, Counter>,
    /// Latest store version observed after a successful write.
    pub snapshot_version: Gauge,
}

impl QueueMetrics {
    fn init() -> Self {
        Self {
            commands_applied_total: Family::default(),
            commands_rejected_total: Family::default(),
            snapshot_version: Gauge::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "commands_applied",
            "Total queue commands applied",
            metrics.commands_applied_total.clone(),
        );
        sub_registry.register(
            "commands_rejected",
            "Total queue commands rejected, by rejection kind",
            metrics.commands_rejected_total.clone(),
        );
        sub_registry.register(
            "snapshot_version",
            "Latest store version after a successful write",
            metrics.snapshot_version.clone(),
        );
        metrics
    }

    pub fn count_applied(&self, command: &'static str) {
        self.commands_applied_total
            .get_or_create(&CommandLabels { command })
            .inc();
    }

    pub fn count_rejected(&self, command: &'static str, kind: &'static str) {
        self.commands_rejected_total
            .get_or_create(&RejectionLabels { command, kind })
            .inc();
    }
}

pub static QUEUE_METRICS: OnceCell<QueueMetrics> = OnceCell::const_new();
