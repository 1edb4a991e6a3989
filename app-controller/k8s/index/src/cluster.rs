use anyhow::{Context, Result};
use app_controller_k8s_api::{ChildKind, ChildObject, Deployment, Ingress, Service};
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client,
};

/// Write-path boundary to the cluster API.
///
/// Each call is independently idempotent from the caller's perspective:
/// retrying a create that already succeeded, or deleting an object that is
/// already gone, is success. Calls are atomic per object but not
/// transactional across objects; the reconciler compensates by re-deriving
/// its intent on every pass.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    async fn create(&self, obj: ChildObject) -> Result<()>;
    async fn update(&self, obj: ChildObject) -> Result<()>;
    async fn delete(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<()>;
}

/// `ClusterApi` backed by the real API server.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

// === impl ClusterClient ===

impl ClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn workloads(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn ingresses(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterApi for ClusterClient {
    async fn create(&self, obj: ChildObject) -> Result<()> {
        let namespace = obj
            .namespace()
            .context("child resource has no namespace")?
            .to_string();
        let params = PostParams::default();
        let res = match obj {
            ChildObject::Workload(workload) => self
                .workloads(&namespace)
                .create(&params, &workload)
                .await
                .map(drop),
            ChildObject::Service(service) => self
                .services(&namespace)
                .create(&params, &service)
                .await
                .map(drop),
            ChildObject::Ingress(ingress) => self
                .ingresses(&namespace)
                .create(&params, &ingress)
                .await
                .map(drop),
        };
        match res {
            Err(error) if !already_exists(&error) => Err(error.into()),
            _ => Ok(()),
        }
    }

    async fn update(&self, obj: ChildObject) -> Result<()> {
        let namespace = obj
            .namespace()
            .context("child resource has no namespace")?
            .to_string();
        let name = obj
            .name()
            .context("child resource has no name")?
            .to_string();
        // Unconditional replace: the object is freshly derived from the
        // spec, so there is no resource version to race on.
        let params = PostParams::default();
        match obj {
            ChildObject::Workload(workload) => self
                .workloads(&namespace)
                .replace(&name, &params, &workload)
                .await
                .map(drop)?,
            ChildObject::Service(service) => self
                .services(&namespace)
                .replace(&name, &params, &service)
                .await
                .map(drop)?,
            ChildObject::Ingress(ingress) => self
                .ingresses(&namespace)
                .replace(&name, &params, &ingress)
                .await
                .map(drop)?,
        }
        Ok(())
    }

    async fn delete(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<()> {
        let params = DeleteParams::default();
        let res = match kind {
            ChildKind::Workload => self.workloads(namespace).delete(name, &params).await.map(drop),
            ChildKind::Service => self.services(namespace).delete(name, &params).await.map(drop),
            ChildKind::Ingress => self.ingresses(namespace).delete(name, &params).await.map(drop),
        };
        match res {
            Err(error) if !not_found(&error) => Err(error.into()),
            _ => Ok(()),
        }
    }
}

fn already_exists(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.reason == "AlreadyExists")
}

fn not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}
