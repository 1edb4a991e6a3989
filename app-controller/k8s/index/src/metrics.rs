use app_controller_k8s_api::ChildKind;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counters for reconciliation outcomes and the child mutations performed.
#[derive(Clone, Debug)]
pub struct ReconcilerMetrics {
    results: Family<OutcomeLabels, Counter>,
    creates: Family<KindLabels, Counter>,
    updates: Family<KindLabels, Counter>,
    deletes: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum Outcome {
    Success,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

// === impl ReconcilerMetrics ===

impl ReconcilerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let results = Family::default();
        prom.register(
            "reconcile_results",
            "Count of reconciliation passes by outcome",
            results.clone(),
        );

        let creates = Family::default();
        prom.register(
            "child_creates",
            "Count of child resources created",
            creates.clone(),
        );

        let updates = Family::default();
        prom.register(
            "child_updates",
            "Count of child resources updated",
            updates.clone(),
        );

        let deletes = Family::default();
        prom.register(
            "child_deletes",
            "Count of child resources deleted",
            deletes.clone(),
        );

        Self {
            results,
            creates,
            updates,
            deletes,
        }
    }

    pub(crate) fn observe(&self, result: &anyhow::Result<()>) {
        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Error
        };
        self.results
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    pub(crate) fn created(&self, kind: ChildKind) {
        self.creates.get_or_create(&KindLabels::from(kind)).inc();
    }

    pub(crate) fn updated(&self, kind: ChildKind) {
        self.updates.get_or_create(&KindLabels::from(kind)).inc();
    }

    pub(crate) fn deleted(&self, kind: ChildKind) {
        self.deletes.get_or_create(&KindLabels::from(kind)).inc();
    }
}

impl From<ChildKind> for KindLabels {
    fn from(kind: ChildKind) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}
