use crate::{
    cluster::ClusterApi,
    index::{AppState, SharedIndex},
    metrics::ReconcilerMetrics,
};
use anyhow::{bail, Result};
use app_controller_core::{Reconcile, ReconcileKey};
use app_controller_k8s_api::{children, ChildKind, ChildObject};
use std::sync::Arc;

/// Converges the cluster toward an `App`'s declared state.
///
/// Every pass re-derives its intent from the cached desired and observed
/// state; nothing is carried over from the triggering event, so passes are
/// idempotent and safe under replays, coalescing, and arbitrary interleaving
/// of events.
pub struct Reconciler {
    index: SharedIndex,
    api: Arc<dyn ClusterApi>,
    metrics: ReconcilerMetrics,
    ingress_class: String,
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(
        index: SharedIndex,
        api: Arc<dyn ClusterApi>,
        metrics: ReconcilerMetrics,
        ingress_class: String,
    ) -> Self {
        Self {
            index,
            api,
            metrics,
            ingress_class,
        }
    }

    async fn converge(&self, key: &ReconcileKey, app: AppState) -> Result<()> {
        self.converge_workload(key, &app).await?;
        self.converge_exposure(key, &app).await
    }

    async fn converge_workload(&self, key: &ReconcileKey, app: &AppState) -> Result<()> {
        let desired = &app.spec.workload;
        let observed = self
            .index
            .read()
            .workload(&ReconcileKey::new(key.namespace.clone(), desired.name.clone()));

        match observed {
            None => {
                tracing::info!(%key, workload = %desired.name, "Creating workload");
                self.create(ChildObject::Workload(children::workload(
                    &key.namespace,
                    &app.owner,
                    desired,
                )))
                .await
            }
            Some(observed) if observed.replicas != desired.replicas => {
                tracing::info!(
                    %key,
                    workload = %desired.name,
                    replicas = desired.replicas,
                    observed = observed.replicas,
                    "Scaling workload",
                );
                self.update(ChildObject::Workload(children::workload(
                    &key.namespace,
                    &app.owner,
                    desired,
                )))
                .await
            }
            Some(_) => Ok(()),
        }
    }

    async fn converge_exposure(&self, key: &ReconcileKey, app: &AppState) -> Result<()> {
        let service = &app.spec.service;
        let ingress = &app.spec.ingress;
        // The ingress is only wanted while its backing service is; the check
        // is on declared intent, independent of whether the service
        // operations below succeed.
        let want_ingress = service.enabled && ingress.enabled;

        let have_ingress = self
            .index
            .read()
            .ingress(&ReconcileKey::new(key.namespace.clone(), ingress.name.clone()))
            .is_some();

        // An unwanted ingress is retired before its backing service so the
        // route never outlives its backend.
        if have_ingress && !want_ingress {
            tracing::info!(%key, ingress = %ingress.name, "Deleting ingress");
            self.delete(ChildKind::Ingress, &key.namespace, &ingress.name)
                .await?;
        }

        let have_service = self
            .index
            .read()
            .service(&ReconcileKey::new(key.namespace.clone(), service.name.clone()))
            .is_some();

        if !have_service && service.enabled {
            tracing::info!(%key, service = %service.name, "Creating service");
            self.create(ChildObject::Service(children::service(
                &key.namespace,
                &app.owner,
                service,
            )))
            .await?;
        } else if have_service && !service.enabled {
            tracing::info!(%key, service = %service.name, "Deleting service");
            self.delete(ChildKind::Service, &key.namespace, &service.name)
                .await?;
        }

        if !have_ingress && want_ingress {
            tracing::info!(%key, ingress = %ingress.name, "Creating ingress");
            self.create(ChildObject::Ingress(children::ingress(
                &key.namespace,
                &app.owner,
                ingress,
                &service.name,
                &self.ingress_class,
            )))
            .await?;
        }

        Ok(())
    }

    /// The spec is gone: delete everything still carrying its marker.
    ///
    /// Deletions are independent and best-effort; a failure on one child
    /// never prevents attempts on its siblings, but any failure fails the
    /// pass so the key is retried and the remaining children get another
    /// attempt.
    async fn delete_owned(&self, key: &ReconcileKey) -> Result<()> {
        let children = self.index.read().owned_children(key);
        if children.is_empty() {
            return Ok(());
        }

        tracing::info!(%key, count = children.len(), "Spec deleted; removing owned resources");
        let mut failed = 0;
        for (kind, name) in children {
            if let Err(error) = self.delete(kind, &key.namespace, &name).await {
                tracing::warn!(%key, %kind, %name, %error, "Failed to delete owned resource");
                failed += 1;
            }
        }
        if failed != 0 {
            bail!("{failed} owned resource deletion(s) failed for {key}");
        }
        Ok(())
    }

    async fn create(&self, obj: ChildObject) -> Result<()> {
        let kind = obj.kind();
        self.api.create(obj).await?;
        self.metrics.created(kind);
        Ok(())
    }

    async fn update(&self, obj: ChildObject) -> Result<()> {
        let kind = obj.kind();
        self.api.update(obj).await?;
        self.metrics.updated(kind);
        Ok(())
    }

    async fn delete(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<()> {
        self.api.delete(kind, namespace, name).await?;
        self.metrics.deleted(kind);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconcile<ReconcileKey> for Reconciler {
    async fn reconcile(&self, key: ReconcileKey) -> Result<()> {
        let app = self.index.read().app(&key);
        let result = match app {
            Some(app) => self.converge(&key, app).await,
            None => self.delete_owned(&key).await,
        };
        self.metrics.observe(&result);
        result
    }
}
