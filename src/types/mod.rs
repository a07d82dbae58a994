pub mod metadata;
pub mod service;

pub use metadata::*;
pub use service::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Builder for an object owned by a custom resource.
pub trait ChildResource: Send + Sync {
    type K8sType: kube::Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>;

    fn name(&self) -> &str;
    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType;
}
