pub mod client;
pub mod condition;
pub mod config;
pub mod crd;
pub mod equality;
pub mod error;
pub mod flow;
pub mod labels;
pub mod operator;
pub mod service;
pub mod types;

pub use client::{ClusterClient, KubeClusterClient, Lookup, WriteMode};
pub use condition::{Condition, ConditionStatus};
pub use config::OperatorConfig;
pub use crd::{App, AppMetadata, AppSpec, AppStatus};
pub use error::{Error, Result};
pub use flow::{Flow, Reconciled};
pub use operator::Operator;
pub use service::{build_service, ReconcileRequest, ServiceReconciler};

pub mod prelude {
    pub use crate::client::{ClusterClient, Lookup, WriteMode};
    pub use crate::condition::{Condition, ConditionStatus};
    pub use crate::config::OperatorConfig;
    pub use crate::crd::{App, AppSpec, AppStatus};
    pub use crate::error::{Error, Result};
    pub use crate::flow::Flow;
    pub use crate::service::{ReconcileRequest, ServiceReconciler};

    pub use kube::runtime::controller::Action;
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
