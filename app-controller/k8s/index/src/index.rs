use ahash::AHashMap as HashMap;
use app_controller_core::{queue::WorkQueue, ReconcileKey};
use app_controller_k8s_api::{
    App, AppSpec, ChildKind, Deployment, Ingress, ObjectMeta, Owner, ResourceExt, Service,
};
use kube::Resource;
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time};

pub type SharedIndex = Arc<RwLock<Index>>;

/// A locally-synchronized mirror of the cluster state the controller acts
/// on, fed by the resource watches.
///
/// The index doubles as the event adapter: spec events and child deletions
/// are translated into reconcile keys on the shared work queue. Translation
/// never blocks and never mutates the cluster.
pub struct Index {
    queue: Arc<WorkQueue<ReconcileKey>>,
    apps: HashMap<ReconcileKey, AppState>,
    workloads: HashMap<ReconcileKey, WorkloadState>,
    services: HashMap<ReconcileKey, ExposureState>,
    ingresses: HashMap<ReconcileKey, ExposureState>,
    sync: SyncGate,
}

/// Desired state distilled from an `App`.
#[derive(Clone, Debug)]
pub struct AppState {
    pub owner: Owner,
    pub spec: AppSpec,
}

/// Observed state distilled from a Deployment.
#[derive(Clone, Debug)]
pub struct WorkloadState {
    pub replicas: i32,
    pub owner: Option<String>,
}

/// Observed state distilled from a Service or Ingress.
#[derive(Clone, Debug)]
pub struct ExposureState {
    pub owner: Option<String>,
}

/// Tracks which watches have delivered their initial snapshot; reconciliation
/// must not start against a partially-populated cache.
struct SyncGate {
    tx: watch::Sender<bool>,
    apps: bool,
    workloads: bool,
    services: bool,
    ingresses: bool,
}

#[derive(Clone, Copy)]
enum Watched {
    Apps,
    Workloads,
    Services,
    Ingresses,
}

// === impl Index ===

impl Index {
    pub fn shared(queue: Arc<WorkQueue<ReconcileKey>>) -> SharedIndex {
        let (tx, _) = watch::channel(false);
        Arc::new(RwLock::new(Self {
            queue,
            apps: HashMap::new(),
            workloads: HashMap::new(),
            services: HashMap::new(),
            ingresses: HashMap::new(),
            sync: SyncGate {
                tx,
                apps: false,
                workloads: false,
                services: false,
                ingresses: false,
            },
        }))
    }

    /// Signals `true` once every watch has delivered its initial snapshot.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.sync.tx.subscribe()
    }

    pub fn app(&self, key: &ReconcileKey) -> Option<AppState> {
        self.apps.get(key).cloned()
    }

    pub fn workload(&self, key: &ReconcileKey) -> Option<WorkloadState> {
        self.workloads.get(key).cloned()
    }

    pub fn service(&self, key: &ReconcileKey) -> Option<ExposureState> {
        self.services.get(key).cloned()
    }

    pub fn ingress(&self, key: &ReconcileKey) -> Option<ExposureState> {
        self.ingresses.get(key).cloned()
    }

    /// All child resources in the key's namespace whose ownership marker
    /// points at the key's name.
    pub fn owned_children(&self, key: &ReconcileKey) -> Vec<(ChildKind, String)> {
        let owned = |id: &ReconcileKey, owner: &Option<String>| {
            id.namespace == key.namespace && owner.as_deref() == Some(key.name.as_str())
        };

        let mut children = Vec::new();
        for (id, workload) in &self.workloads {
            if owned(id, &workload.owner) {
                children.push((ChildKind::Workload, id.name.clone()));
            }
        }
        for (id, service) in &self.services {
            if owned(id, &service.owner) {
                children.push((ChildKind::Service, id.name.clone()));
            }
        }
        for (id, ingress) in &self.ingresses {
            if owned(id, &ingress.owner) {
                children.push((ChildKind::Ingress, id.name.clone()));
            }
        }
        children
    }

    /// Re-enqueues every known spec on a fixed interval.
    ///
    /// This is the only path that corrects in-place drift on child
    /// resources, since child add/update events are deliberately not
    /// translated into keys.
    pub async fn run_resync(index: SharedIndex, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let (queue, keys) = {
                let index = index.read();
                let keys = index.apps.keys().cloned().collect::<Vec<_>>();
                (index.queue.clone(), keys)
            };
            tracing::debug!(specs = keys.len(), "Resyncing");
            for key in keys {
                queue.add(key);
            }
        }
    }

    fn apply_app(&mut self, app: App) {
        let namespace = app.namespace().expect("App must be namespaced");
        let name = app.name_unchecked();
        let key = ReconcileKey::new(namespace, name);
        tracing::debug!(%key, "Indexing app");

        let state = AppState {
            owner: Owner {
                name: key.name.clone(),
                uid: app.uid().unwrap_or_default(),
            },
            spec: app.spec,
        };
        self.apps.insert(key.clone(), state);
        self.queue.add(key);
    }

    fn delete_app(&mut self, namespace: String, name: String) {
        let key = ReconcileKey::new(namespace, name);
        tracing::debug!(%key, "App deleted");
        self.apps.remove(&key);
        // The reconciler observes the absence and runs the cascade delete.
        self.queue.add(key);
    }

    fn apply_workload(&mut self, deployment: Deployment) {
        let namespace = deployment
            .namespace()
            .expect("Deployment must be namespaced");
        let name = deployment.name_unchecked();
        let replicas = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let owner = app_owner(&deployment.metadata);
        // Cache refresh only: child updates do not enqueue work.
        self.workloads.insert(
            ReconcileKey::new(namespace, name),
            WorkloadState { replicas, owner },
        );
    }

    fn delete_workload(&mut self, namespace: String, name: String) {
        let removed = self
            .workloads
            .remove(&ReconcileKey::new(namespace.clone(), name));
        if let Some(WorkloadState {
            owner: Some(owner), ..
        }) = removed
        {
            self.queue.add(ReconcileKey::new(namespace, owner));
        }
    }

    fn apply_service(&mut self, service: Service) {
        let namespace = service.namespace().expect("Service must be namespaced");
        let name = service.name_unchecked();
        let owner = app_owner(&service.metadata);
        self.services
            .insert(ReconcileKey::new(namespace, name), ExposureState { owner });
    }

    fn delete_service(&mut self, namespace: String, name: String) {
        let removed = self
            .services
            .remove(&ReconcileKey::new(namespace.clone(), name));
        if let Some(ExposureState { owner: Some(owner) }) = removed {
            self.queue.add(ReconcileKey::new(namespace, owner));
        }
    }

    fn apply_ingress(&mut self, ingress: Ingress) {
        let namespace = ingress.namespace().expect("Ingress must be namespaced");
        let name = ingress.name_unchecked();
        let owner = app_owner(&ingress.metadata);
        self.ingresses
            .insert(ReconcileKey::new(namespace, name), ExposureState { owner });
    }

    fn delete_ingress(&mut self, namespace: String, name: String) {
        let removed = self
            .ingresses
            .remove(&ReconcileKey::new(namespace.clone(), name));
        if let Some(ExposureState { owner: Some(owner) }) = removed {
            self.queue.add(ReconcileKey::new(namespace, owner));
        }
    }

    fn mark_synced(&mut self, watched: Watched) {
        match watched {
            Watched::Apps => self.sync.apps = true,
            Watched::Workloads => self.sync.workloads = true,
            Watched::Services => self.sync.services = true,
            Watched::Ingresses => self.sync.ingresses = true,
        }
        if self.sync.apps && self.sync.workloads && self.sync.services && self.sync.ingresses {
            self.sync.tx.send_replace(true);
        }
    }
}

/// The controller owner reference pointing at an `App`, if any.
fn app_owner(meta: &ObjectMeta) -> Option<String> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == App::kind(&()).as_ref())
        .map(|r| r.name.clone())
}

// === impl IndexNamespacedResource ===

impl IndexNamespacedResource<App> for Index {
    fn apply(&mut self, app: App) {
        self.apply_app(app);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_app(namespace, name);
    }

    fn reset(&mut self, apps: Vec<App>, removed: NamespacedRemoved) {
        for app in apps {
            self.apply_app(app);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete_app(namespace.clone(), name);
            }
        }
        self.mark_synced(Watched::Apps);
    }
}

impl IndexNamespacedResource<Deployment> for Index {
    fn apply(&mut self, deployment: Deployment) {
        self.apply_workload(deployment);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_workload(namespace, name);
    }

    fn reset(&mut self, deployments: Vec<Deployment>, removed: NamespacedRemoved) {
        for deployment in deployments {
            self.apply_workload(deployment);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete_workload(namespace.clone(), name);
            }
        }
        self.mark_synced(Watched::Workloads);
    }
}

impl IndexNamespacedResource<Service> for Index {
    fn apply(&mut self, service: Service) {
        self.apply_service(service);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_service(namespace, name);
    }

    fn reset(&mut self, services: Vec<Service>, removed: NamespacedRemoved) {
        for service in services {
            self.apply_service(service);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete_service(namespace.clone(), name);
            }
        }
        self.mark_synced(Watched::Services);
    }
}

impl IndexNamespacedResource<Ingress> for Index {
    fn apply(&mut self, ingress: Ingress) {
        self.apply_ingress(ingress);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_ingress(namespace, name);
    }

    fn reset(&mut self, ingresses: Vec<Ingress>, removed: NamespacedRemoved) {
        for ingress in ingresses {
            self.apply_ingress(ingress);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete_ingress(namespace.clone(), name);
            }
        }
        self.mark_synced(Watched::Ingresses);
    }
}
