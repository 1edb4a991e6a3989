#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod app;
pub mod children;

pub use self::{
    app::{App, AppSpec, IngressSpec, ServiceSpec, WorkloadSpec},
    children::{ChildKind, ChildObject, Owner, EXPOSED_PORT, OWNER_LABEL},
};
pub use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service, networking::v1::Ingress};
pub use kube::api::{ObjectMeta, ResourceExt};
