//! Desired-state constructors for the resources owned on behalf of an `App`.

use crate::app::{App, IngressSpec, ServiceSpec, WorkloadSpec};
use k8s_openapi::{
    api::{apps::v1 as apps, core::v1 as core, networking::v1 as networking},
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, OwnerReference},
        util::intstr::IntOrString,
    },
};
use kube::{api::ObjectMeta, Resource};
use std::{collections::BTreeMap, fmt};

/// Label stamped onto every child resource, pointing back at the owning App.
///
/// Used for watch filtering and cascade-delete lookup; lifetime control stays
/// with the controller, not the cluster's garbage collector.
pub const OWNER_LABEL: &str = "appcontroller.example.com/owned-by";

/// Port exposed by a service exposure and targeted by its ingress route.
pub const EXPOSED_PORT: i32 = 80;

/// Identity of the App a child resource is constructed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub uid: String,
}

/// The kinds of child resources the controller manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Workload,
    Service,
    Ingress,
}

/// A fully-constructed child resource bound for the cluster API.
#[derive(Clone, Debug)]
pub enum ChildObject {
    Workload(apps::Deployment),
    Service(core::Service),
    Ingress(networking::Ingress),
}

// === impl Owner ===

impl Owner {
    fn object_meta(&self, namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                OWNER_LABEL.to_string(),
                self.name.clone(),
            )])),
            owner_references: Some(vec![OwnerReference {
                api_version: App::api_version(&()).to_string(),
                kind: App::kind(&()).to_string(),
                name: self.name.clone(),
                uid: self.uid.clone(),
                controller: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.name.clone())])
    }
}

// === impl ChildKind ===

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload => "deployment".fmt(f),
            Self::Service => "service".fmt(f),
            Self::Ingress => "ingress".fmt(f),
        }
    }
}

// === impl ChildObject ===

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            Self::Workload(_) => ChildKind::Workload,
            Self::Service(_) => ChildKind::Service,
            Self::Ingress(_) => ChildKind::Ingress,
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Workload(w) => &w.metadata,
            Self::Service(s) => &s.metadata,
            Self::Ingress(i) => &i.metadata,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }
}

/// Builds the Deployment declared by a workload spec.
pub fn workload(namespace: &str, owner: &Owner, spec: &WorkloadSpec) -> apps::Deployment {
    let selector = owner.selector();
    apps::Deployment {
        metadata: owner.object_meta(namespace, &spec.name),
        spec: Some(apps::DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: core::PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(core::PodSpec {
                    containers: vec![core::Container {
                        name: spec.name.clone(),
                        image: Some(spec.image.clone()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the Service declared by a service exposure spec.
pub fn service(namespace: &str, owner: &Owner, spec: &ServiceSpec) -> core::Service {
    core::Service {
        metadata: owner.object_meta(namespace, &spec.name),
        spec: Some(core::ServiceSpec {
            selector: Some(owner.selector()),
            ports: Some(vec![core::ServicePort {
                protocol: Some("TCP".to_string()),
                port: EXPOSED_PORT,
                target_port: Some(IntOrString::Int(EXPOSED_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the Ingress declared by an ingress exposure spec, routing all
/// traffic to the named service exposure.
pub fn ingress(
    namespace: &str,
    owner: &Owner,
    spec: &IngressSpec,
    backend_service: &str,
    class: &str,
) -> networking::Ingress {
    networking::Ingress {
        metadata: owner.object_meta(namespace, &spec.name),
        spec: Some(networking::IngressSpec {
            ingress_class_name: Some(class.to_string()),
            rules: Some(vec![networking::IngressRule {
                http: Some(networking::HTTPIngressRuleValue {
                    paths: vec![networking::HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: networking::IngressBackend {
                            service: Some(networking::IngressServiceBackend {
                                name: backend_service.to_string(),
                                port: Some(networking::ServiceBackendPort {
                                    number: Some(EXPOSED_PORT),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
