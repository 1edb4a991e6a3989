use crate::{
    core::{queue, WorkQueue, WorkerPool},
    index::{ClusterClient, Index, Reconciler, ReconcilerMetrics},
    k8s,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "app-controller",
    about = "Reconciles App specs into deployments, services, and ingresses"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "app_controller=info,warn",
        env = "APP_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Number of concurrent reconciliation workers.
    #[clap(long, default_value = "5")]
    workers: usize,

    /// Interval between full re-reconciliations of all known specs.
    #[clap(long, default_value = "30")]
    resync_interval_secs: u64,

    /// Ingress class assigned to created ingress routes.
    #[clap(long, default_value = "nginx")]
    ingress_class: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            workers,
            resync_interval_secs,
            ingress_class,
        } = self;

        let mut prom = <Registry>::default();
        let reconciler_metrics =
            ReconcilerMetrics::register(prom.sub_registry_with_prefix("reconciler"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let work_queue = Arc::new(WorkQueue::new(
            queue::DEFAULT_BASE_DELAY,
            queue::DEFAULT_MAX_DELAY,
        ));
        let index = Index::shared(work_queue.clone());

        // Spec watch: adds, updates, and deletes all enqueue reconcile keys.
        let apps = runtime.watch_all::<k8s::App>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), apps).instrument(info_span!("apps")));

        // Child watches keep the cache fresh; only deletions enqueue work.
        // Restricting them to labeled objects keeps unrelated resources out
        // of the index.
        let owned = watcher::Config::default().labels(k8s::OWNER_LABEL);
        let deployments = runtime.watch_all::<k8s::Deployment>(owned.clone());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), deployments)
                .instrument(info_span!("deployments")),
        );

        let services = runtime.watch_all::<k8s::Service>(owned.clone());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        let ingresses = runtime.watch_all::<k8s::Ingress>(owned);
        tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses).instrument(info_span!("ingresses")),
        );

        // Reconciliation must not start against a partially-populated cache:
        // wait for every watch to deliver its initial snapshot.
        let mut ready = index.read().readiness();
        while !*ready.borrow_and_update() {
            ready.changed().await?;
        }
        info!(%workers, "Caches synced; starting reconciliation");

        tokio::spawn(
            Index::run_resync(index.clone(), Duration::from_secs(resync_interval_secs))
                .instrument(info_span!("resync")),
        );

        let reconciler = Reconciler::new(
            index,
            Arc::new(ClusterClient::new(runtime.client())),
            reconciler_metrics,
            ingress_class,
        );
        let pool = WorkerPool::new(work_queue.clone(), Arc::new(reconciler), workers);

        // On shutdown, close the queue and let in-flight passes finish
        // before releasing the drain handle.
        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                let mut running = std::pin::pin!(pool.run());
                tokio::select! {
                    _ = &mut running => {}
                    release = shutdown.signaled() => {
                        work_queue.shut_down();
                        release.release_after(running).await;
                    }
                }
            }
            .instrument(info_span!("workers")),
        );

        // Block the main task on the shutdown signal; background tasks drain
        // before the process exits.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
