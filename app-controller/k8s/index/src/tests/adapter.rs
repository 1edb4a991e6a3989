use crate::{
    tests::{make_app, make_deployment, make_queue},
    Index,
};
use app_controller_core::ReconcileKey;
use app_controller_k8s_api::{App, Deployment, Ingress, Service};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};

#[tokio::test]
async fn app_events_enqueue_the_spec_key() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());
    let key = ReconcileKey::new("default", "app1");

    index.write().apply(make_app("default", "app1", 2, true, true));
    assert_eq!(queue.get().await, Some(key.clone()));
    queue.done(&key);

    IndexNamespacedResource::<App>::delete(
        &mut *index.write(),
        "default".to_string(),
        "app1".to_string(),
    );
    assert_eq!(queue.get().await, Some(key.clone()));
    assert!(index.read().app(&key).is_none());
}

#[test]
fn rapid_app_events_coalesce() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());

    for _ in 0..3 {
        index.write().apply(make_app("default", "app1", 2, true, true));
    }
    assert_eq!(queue.len(), 1);
}

#[test]
fn child_updates_do_not_enqueue() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());

    index
        .write()
        .apply(make_deployment("default", "w1", 2, Some("app1")));
    assert_eq!(queue.len(), 0);

    let workload = index
        .read()
        .workload(&ReconcileKey::new("default", "w1"))
        .expect("indexed");
    assert_eq!(workload.replicas, 2);
    assert_eq!(workload.owner.as_deref(), Some("app1"));
}

#[tokio::test]
async fn child_deletion_enqueues_the_owner() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());

    index
        .write()
        .apply(make_deployment("default", "w1", 2, Some("app1")));
    IndexNamespacedResource::<Deployment>::delete(
        &mut *index.write(),
        "default".to_string(),
        "w1".to_string(),
    );

    assert_eq!(queue.get().await, Some(ReconcileKey::new("default", "app1")));
    assert!(index.read().workload(&ReconcileKey::new("default", "w1")).is_none());
}

#[test]
fn unowned_child_deletion_is_dropped() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());

    index.write().apply(make_deployment("default", "w1", 2, None));
    IndexNamespacedResource::<Deployment>::delete(
        &mut *index.write(),
        "default".to_string(),
        "w1".to_string(),
    );

    // Not every deleted deployment belongs to this controller.
    assert_eq!(queue.len(), 0);
}

#[test]
fn unknown_child_deletion_is_dropped() {
    let queue = make_queue();
    let index = Index::shared(queue.clone());

    IndexNamespacedResource::<Deployment>::delete(
        &mut *index.write(),
        "default".to_string(),
        "w1".to_string(),
    );
    assert_eq!(queue.len(), 0);
}

#[test]
fn readiness_requires_every_watch() {
    let queue = make_queue();
    let index = Index::shared(queue);
    let ready = index.read().readiness();
    assert!(!*ready.borrow());

    index
        .write()
        .reset(Vec::<App>::new(), NamespacedRemoved::default());
    index
        .write()
        .reset(Vec::<Deployment>::new(), NamespacedRemoved::default());
    index
        .write()
        .reset(Vec::<Service>::new(), NamespacedRemoved::default());
    assert!(!*ready.borrow());

    index
        .write()
        .reset(Vec::<Ingress>::new(), NamespacedRemoved::default());
    assert!(*ready.borrow());
}
