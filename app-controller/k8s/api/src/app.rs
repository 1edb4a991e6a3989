use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declares a composite application: a deployable workload plus optional
/// network exposure.
///
/// The controller owns the child resources derived from this spec; it never
/// mutates the spec itself.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appcontroller.example.com",
    version = "v1",
    kind = "App",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    pub workload: WorkloadSpec,
    #[serde(default)]
    pub service: ServiceSpec,
    #[serde(default)]
    pub ingress: IngressSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub name: String,
    /// Image reference, e.g. `nginx:latest`.
    pub image: String,
    pub replicas: i32,
}

/// Exposes the workload inside the cluster. Disabled unless declared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
}

/// Routes external traffic to the service exposure. Only honored while the
/// service exposure is enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
}
