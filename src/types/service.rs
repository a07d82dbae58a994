use super::{Annotations, ChildResource, Labels, Selector};
use k8s_openapi::api::core::v1 as k8s;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

#[derive(Clone, Debug)]
pub struct Service {
    pub name: String,
    pub labels: Labels,
    pub annotations: Annotations,
    pub selector: Selector,
    pub ports: Vec<ServicePort>,
    pub type_: Option<String>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            annotations: Annotations::new(),
            selector: Selector::default(),
            ports: Vec::new(),
            type_: None,
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn port(mut self, port: ServicePort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn cluster_ip(mut self) -> Self {
        self.type_ = Some("ClusterIP".to_string());
        self
    }
}

impl ChildResource for Service {
    type K8sType = k8s::Service;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        k8s::Service {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: Some(self.labels.into_inner()),
                annotations: Some(self.annotations.into_inner()),
                owner_references: owner_ref.map(|r| vec![r]),
                ..Default::default()
            },
            spec: Some(k8s::ServiceSpec {
                selector: Some(self.selector.into_inner()),
                ports: if self.ports.is_empty() {
                    None
                } else {
                    Some(self.ports.into_iter().map(|p| p.into_k8s()).collect())
                },
                type_: self.type_,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServicePort {
    pub port: i32,
    pub target_port: Option<i32>,
    pub name: Option<String>,
    pub protocol: Option<String>,
}

impl ServicePort {
    pub fn new(port: i32) -> Self {
        Self {
            port,
            target_port: None,
            name: None,
            protocol: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn target_port(mut self, port: i32) -> Self {
        self.target_port = Some(port);
        self
    }

    pub fn tcp(mut self) -> Self {
        self.protocol = Some("TCP".to_string());
        self
    }

    pub fn into_k8s(self) -> k8s::ServicePort {
        k8s::ServicePort {
            port: self.port,
            target_port: self.target_port.map(IntOrString::Int),
            name: self.name,
            protocol: self.protocol,
            ..Default::default()
        }
    }
}
