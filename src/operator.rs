use crate::client::KubeClusterClient;
use crate::config::OperatorConfig;
use crate::crd::App;
use crate::error::{Error, Result};
use crate::flow::Flow;
use crate::service::{ReconcileRequest, ServiceReconciler};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

pub struct Operator {
    config: Arc<OperatorConfig>,
}

impl Operator {
    pub fn new(config: OperatorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn run(self) -> Result<()> {
        let client = Client::try_default().await.map_err(Error::Kube)?;

        info!("Starting operator for {}/{}", App::group(&()), App::kind(&()));

        let apps: Api<App> = Api::all(client.clone());
        let services: Api<Service> = Api::all(client.clone());

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, cancelling in-flight reconciles");
            }
            signal_token.cancel();
        });

        let kube_client = KubeClusterClient::new(client, self.config.field_manager.clone());
        let reconciler = ServiceReconciler::new(
            Arc::new(kube_client),
            Arc::clone(&self.config),
            info_span!("service_controller"),
        );

        let controller_ctx = Arc::new(ControllerContext {
            reconciler,
            config: Arc::clone(&self.config),
            shutdown,
        });

        Controller::new(apps, WatcherConfig::default())
            .owns(services, WatcherConfig::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, controller_ctx)
            .for_each(|result| async move {
                match result {
                    Ok((app, action)) => {
                        info!("Reconciled {} - {:?}", app.name, action);
                    }
                    Err(e) => {
                        warn!("Reconciliation error: {:?}", e);
                    }
                }
            })
            .await;

        Ok(())
    }
}

struct ControllerContext {
    reconciler: ServiceReconciler,
    config: Arc<OperatorConfig>,
    shutdown: CancellationToken,
}

async fn reconcile(app: Arc<App>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let request = ReconcileRequest::for_app(&app, ctx.shutdown.child_token())?;

    info!(
        "Reconciling {}/{} in namespace {}",
        App::kind(&()),
        request.name,
        request.namespace
    );

    let result = ctx.reconciler.reconcile_service(&request).await;
    if Flow::should_halt_or_requeue(&result) {
        return result.map(|flow| flow.into_action(ctx.config.resync_interval));
    }

    Ok(Flow::Continue.into_action(ctx.config.resync_interval))
}

fn error_policy(app: Arc<App>, error: &Error, ctx: Arc<ControllerContext>) -> Action {
    error!("Error reconciling {}: {:?}", app.name_any(), error);
    Action::requeue(ctx.config.error_requeue)
}
