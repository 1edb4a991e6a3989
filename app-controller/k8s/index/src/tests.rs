mod adapter;

use crate::{
    cluster::ClusterApi, metrics::ReconcilerMetrics, reconciler::Reconciler, SharedIndex,
};
use anyhow::{bail, Result};
use app_controller_core::{queue::WorkQueue, ReconcileKey};
use app_controller_k8s_api::{
    App, AppSpec, ChildKind, ChildObject, Deployment, Ingress, IngressSpec, ObjectMeta, Service,
    ServiceSpec, WorkloadSpec,
};
use k8s_openapi::{
    api::apps::v1::DeploymentSpec, apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

pub(crate) fn make_queue() -> Arc<WorkQueue<ReconcileKey>> {
    Arc::new(WorkQueue::new(
        Duration::from_millis(1),
        Duration::from_millis(4),
    ))
}

pub(crate) fn make_app(
    ns: &str,
    name: &str,
    replicas: i32,
    service_enabled: bool,
    ingress_enabled: bool,
) -> App {
    App {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        spec: AppSpec {
            workload: WorkloadSpec {
                name: "w1".to_string(),
                image: "nginx:1.0".to_string(),
                replicas,
            },
            service: ServiceSpec {
                enabled: service_enabled,
                name: "s1".to_string(),
            },
            ingress: IngressSpec {
                enabled: ingress_enabled,
                name: "i1".to_string(),
            },
        },
    }
}

fn owner_meta(ns: &str, name: &str, owner: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        owner_references: owner.map(|owner| {
            vec![OwnerReference {
                api_version: "appcontroller.example.com/v1".to_string(),
                kind: "App".to_string(),
                name: owner.to_string(),
                uid: format!("uid-{owner}"),
                controller: Some(true),
                ..Default::default()
            }]
        }),
        ..Default::default()
    }
}

pub(crate) fn make_deployment(
    ns: &str,
    name: &str,
    replicas: i32,
    owner: Option<&str>,
) -> Deployment {
    Deployment {
        metadata: owner_meta(ns, name, owner),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn make_service(ns: &str, name: &str, owner: Option<&str>) -> Service {
    Service {
        metadata: owner_meta(ns, name, owner),
        ..Default::default()
    }
}

pub(crate) fn make_ingress(ns: &str, name: &str, owner: Option<&str>) -> Ingress {
    Ingress {
        metadata: owner_meta(ns, name, owner),
        ..Default::default()
    }
}

pub(crate) fn make_reconciler(index: SharedIndex, cluster: Arc<MockCluster>) -> Reconciler {
    Reconciler::new(
        index,
        cluster,
        ReconcilerMetrics::register(&mut Default::default()),
        "nginx".to_string(),
    )
}

/// Records every mutation; can be primed to fail specific deletions once.
#[derive(Default)]
pub(crate) struct MockCluster {
    calls: Mutex<Vec<Call>>,
    created: Mutex<Vec<ChildObject>>,
    fail_deletes: Mutex<Vec<(ChildKind, String)>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Create(ChildKind, String),
    Update(ChildKind, String),
    Delete(ChildKind, String),
}

// === impl MockCluster ===

impl MockCluster {
    pub(crate) fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub(crate) fn take_created(&self) -> Vec<ChildObject> {
        std::mem::take(&mut *self.created.lock())
    }

    pub(crate) fn fail_next_delete(&self, kind: ChildKind, name: &str) {
        self.fail_deletes.lock().push((kind, name.to_string()));
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockCluster {
    async fn create(&self, obj: ChildObject) -> Result<()> {
        let name = obj.name().unwrap_or_default().to_string();
        self.calls.lock().push(Call::Create(obj.kind(), name));
        self.created.lock().push(obj);
        Ok(())
    }

    async fn update(&self, obj: ChildObject) -> Result<()> {
        let name = obj.name().unwrap_or_default().to_string();
        self.calls.lock().push(Call::Update(obj.kind(), name));
        Ok(())
    }

    async fn delete(&self, kind: ChildKind, _namespace: &str, name: &str) -> Result<()> {
        self.calls.lock().push(Call::Delete(kind, name.to_string()));

        let mut failures = self.fail_deletes.lock();
        if let Some(at) = failures
            .iter()
            .position(|(k, n)| *k == kind && n == name)
        {
            failures.remove(at);
            bail!("induced {kind} deletion failure");
        }
        Ok(())
    }
}
