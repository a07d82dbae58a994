//! Service reconciliation for App resources.
//!
//! Every App gets one ClusterIP Service with the same name and namespace,
//! exposing the application's HTTP port. The reconciler creates it when it is
//! missing and otherwise corrects drift. To compare fairly against what the
//! server stores, the desired Service is first sent as a dry-run update so
//! that server-populated fields (cluster IP, session affinity, ...) are filled
//! in, and only a semantic difference after that triggers a real update.

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, Instrument, Span};

use crate::client::{ClusterClient, Lookup, WriteMode};
use crate::condition::{set_status_condition, Condition, REASON_RECONCILING};
use crate::config::OperatorConfig;
use crate::crd::App;
use crate::equality::semantic_eq;
use crate::error::{Error, Result};
use crate::flow::{Flow, Reconciled};
use crate::labels::labels_for;
use crate::types::{self, Annotations, ChildResource, Selector, ServicePort};

pub const HTTP_PORT_NAME: &str = "http";
pub const HTTP_PORT: i32 = 8080;

/// Desired Service for `app`.
///
/// Fails if labels cannot be derived or the owner reference cannot be set
/// (the App must carry a name and uid).
pub fn build_service(app: &App, default_image: &str) -> Result<Service> {
    let name = app
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingField("metadata.name"))?;
    let namespace = app
        .metadata
        .namespace
        .as_deref()
        .ok_or(Error::MissingField("metadata.namespace"))?;

    let labels = labels_for(default_image, name, app)?;
    let annotations = Annotations::from(
        app.spec
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.clone()),
    );
    let owner = app
        .controller_owner_ref(&())
        .ok_or_else(|| Error::OwnerReference(name.to_string()))?;

    let service = types::Service::new(name)
        .selector(Selector::from(&labels))
        .labels(labels)
        .annotations(annotations)
        .cluster_ip()
        .port(
            ServicePort::new(HTTP_PORT)
                .name(HTTP_PORT_NAME)
                .tcp()
                .target_port(HTTP_PORT),
        );

    Ok(service.into_k8s(namespace, Some(owner)))
}

/// Identity of the App to reconcile plus the dispatcher's cancellation.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub name: String,
    pub namespace: String,
    pub cancel: CancellationToken,
}

impl ReconcileRequest {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn for_app(app: &App, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            name: app.metadata.name.clone().ok_or(Error::MissingField("metadata.name"))?,
            namespace: app.namespace().ok_or(Error::MissingField("metadata.namespace"))?,
            cancel,
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub struct ServiceReconciler {
    client: Arc<dyn ClusterClient>,
    config: Arc<OperatorConfig>,
    span: Span,
}

impl ServiceReconciler {
    /// `span` is the logging context every reconcile runs under.
    pub fn new(client: Arc<dyn ClusterClient>, config: Arc<OperatorConfig>, span: Span) -> Self {
        Self {
            client,
            config,
            span,
        }
    }

    pub async fn reconcile_service(&self, request: &ReconcileRequest) -> Reconciled {
        let span = debug_span!(
            parent: &self.span,
            "reconcile_service",
            app = %request.name,
            namespace = %request.namespace
        );
        self.converge(request).instrument(span).await
    }

    async fn converge(&self, request: &ReconcileRequest) -> Reconciled {
        let Some(mut app) = self.latest_app(request).await? else {
            return Ok(Flow::Halt);
        };

        let observed = self
            .observe(
                &request.cancel,
                self.client.get_service(&request.name, &request.namespace),
            )
            .await;

        match observed {
            Lookup::Failed(e) => {
                error!(error = %e, "failed to get Service");
                Err(e)
            }
            Lookup::NotFound => self.create(&mut app, request).await,
            Lookup::Found(existing) => self.update(&app, existing, request).await,
        }
    }

    async fn latest_app(&self, request: &ReconcileRequest) -> Result<Option<App>> {
        let lookup = self
            .observe(
                &request.cancel,
                self.client.get_app(&request.name, &request.namespace),
            )
            .await;

        match lookup {
            Lookup::Found(app) => Ok(Some(app)),
            Lookup::NotFound => {
                info!("App not found, ignoring since it must have been deleted");
                Ok(None)
            }
            Lookup::Failed(e) => {
                error!(error = %e, "failed to get App");
                Err(e)
            }
        }
    }

    async fn create(&self, app: &mut App, request: &ReconcileRequest) -> Reconciled {
        let desired = match build_service(app, &self.config.default_image) {
            Ok(service) => service,
            Err(build_err) => {
                error!(error = %build_err, "failed to define new Service resource");
                self.record_build_failure(app, &build_err, request).await?;
                return Err(build_err);
            }
        };

        info!(service = %desired.name_any(), "creating a new Service");
        if let Err(e) = self
            .call(&request.cancel, self.client.create_service(&desired))
            .await
        {
            error!(error = %e, service = %desired.name_any(), "failed to create new Service");
            return Err(e);
        }

        Ok(Flow::Continue)
    }

    async fn update(&self, app: &App, existing: Service, request: &ReconcileRequest) -> Reconciled {
        let desired = build_service(app, &self.config.default_image).inspect_err(|e| {
            error!(error = %e, "failed to define new Service resource");
        })?;

        let normalized = self
            .call(
                &request.cancel,
                self.client.update_service(&desired, WriteMode::DryRun),
            )
            .await
            .inspect_err(|e| error!(error = %e, "failed to update Service with dry run"))?;

        if semantic_eq(&existing, &normalized) {
            debug!("Service matches desired state");
            return Ok(Flow::Continue);
        }

        info!(service = %normalized.name_any(), "Service drifted from desired state, updating");
        self.call(
            &request.cancel,
            self.client.update_service(&normalized, WriteMode::Persist),
        )
        .await
        .inspect_err(|e| error!(error = %e, "failed to update Service"))?;

        Ok(Flow::Continue)
    }

    async fn record_build_failure(
        &self,
        app: &mut App,
        build_err: &Error,
        request: &ReconcileRequest,
    ) -> Result<()> {
        let condition = Condition::available(false)
            .reason(REASON_RECONCILING)
            .message(format!(
                "Failed to create Service for the custom resource ({}): ({})",
                request.name, build_err
            ))
            .observed_generation(app.metadata.generation);

        let status = app.status.get_or_insert_with(Default::default);
        set_status_condition(&mut status.conditions, condition);

        let app = &*app;
        self.call(&request.cancel, self.client.update_app_status(app))
            .await
            .inspect_err(|e| error!(error = %e, "failed to update App status"))
    }

    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.bounded(cancel, call).await?
    }

    async fn observe<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Lookup<T>>,
    ) -> Lookup<T> {
        self.bounded(cancel, call)
            .await
            .unwrap_or_else(Lookup::Failed)
    }

    /// Race `call` against cancellation and the per-call timeout.
    async fn bounded<F: Future>(&self, cancel: &CancellationToken, call: F) -> Result<F::Output> {
        let timeout = self.config.api_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => outcome.map_err(|_| Error::Timeout(timeout)),
        }
    }
}
