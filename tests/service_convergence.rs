use std::collections::BTreeMap;
use std::sync::Arc;

use app_operator::labels::{INSTANCE_LABEL, VERSION_LABEL};
use app_operator::prelude::*;
use app_operator::AppMetadata;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use parking_lot::Mutex;
use tracing::Span;

/// In-memory API server holding one App and at most one Service.
#[derive(Default)]
struct FakeCluster {
    app: Mutex<Option<App>>,
    service: Mutex<Option<Service>>,
    creates: Mutex<usize>,
    dry_runs: Mutex<usize>,
    updates: Mutex<usize>,
    status_writes: Mutex<usize>,
}

impl FakeCluster {
    fn with_app(app: App) -> Arc<Self> {
        let cluster = Self::default();
        *cluster.app.lock() = Some(app);
        Arc::new(cluster)
    }

    /// Fill in what the API server defaults or allocates.
    fn admit(&self, mut svc: Service) -> Service {
        let stored = self.service.lock().clone();
        let cluster_ip = stored
            .as_ref()
            .and_then(|s| s.spec.as_ref())
            .and_then(|s| s.cluster_ip.clone())
            .unwrap_or_else(|| "10.96.0.42".to_string());

        svc.metadata.uid = Some("svc-uid-1".to_string());
        svc.metadata.resource_version = Some("100".to_string());
        if svc.metadata.annotations.as_ref().is_some_and(BTreeMap::is_empty) {
            svc.metadata.annotations = None;
        }
        if let Some(spec) = svc.spec.as_mut() {
            spec.cluster_ip = Some(cluster_ip.clone());
            spec.cluster_ips = Some(vec![cluster_ip]);
            spec.session_affinity = Some("None".to_string());
            spec.ip_families = Some(vec!["IPv4".to_string()]);
            spec.ip_family_policy = Some("SingleStack".to_string());
            spec.internal_traffic_policy = Some("Cluster".to_string());
        }
        svc
    }

    fn count(counter: &Mutex<usize>) -> usize {
        *counter.lock()
    }

    fn writes(&self) -> usize {
        Self::count(&self.creates) + Self::count(&self.updates) + Self::count(&self.status_writes)
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_app(&self, _name: &str, _namespace: &str) -> Lookup<App> {
        match self.app.lock().clone() {
            Some(app) => Lookup::Found(app),
            None => Lookup::NotFound,
        }
    }

    async fn get_service(&self, _name: &str, _namespace: &str) -> Lookup<Service> {
        match self.service.lock().clone() {
            Some(svc) => Lookup::Found(svc),
            None => Lookup::NotFound,
        }
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let admitted = self.admit(service.clone());
        *self.service.lock() = Some(admitted.clone());
        *self.creates.lock() += 1;
        Ok(admitted)
    }

    async fn update_service(&self, service: &Service, mode: WriteMode) -> Result<Service> {
        let admitted = self.admit(service.clone());
        match mode {
            WriteMode::DryRun => *self.dry_runs.lock() += 1,
            WriteMode::Persist => {
                *self.service.lock() = Some(admitted.clone());
                *self.updates.lock() += 1;
            }
        }
        Ok(admitted)
    }

    async fn update_app_status(&self, app: &App) -> Result<()> {
        *self.app.lock() = Some(app.clone());
        *self.status_writes.lock() += 1;
        Ok(())
    }
}

fn app(uid: Option<&str>) -> App {
    App {
        metadata: ObjectMeta {
            name: Some("storefront".to_string()),
            namespace: Some("shop".to_string()),
            uid: uid.map(str::to_string),
            generation: Some(1),
            ..Default::default()
        },
        spec: AppSpec {
            image: Some("ghcr.io/acme/storefront:2.0.1".to_string()),
            metadata: None,
        },
        status: None,
    }
}

fn reconciler(cluster: &Arc<FakeCluster>) -> ServiceReconciler {
    ServiceReconciler::new(
        cluster.clone(),
        Arc::new(OperatorConfig::default()),
        Span::none(),
    )
}

fn request() -> ReconcileRequest {
    ReconcileRequest::new("storefront", "shop")
}

#[tokio::test]
async fn creates_then_stays_quiet() {
    let cluster = FakeCluster::with_app(app(Some("app-uid")));
    let reconciler = reconciler(&cluster);

    let flow = reconciler.reconcile_service(&request()).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(FakeCluster::count(&cluster.creates), 1);

    let svc = cluster.service.lock().clone().unwrap();
    assert_eq!(svc.metadata.name.as_deref(), Some("storefront"));
    assert_eq!(svc.metadata.namespace.as_deref(), Some("shop"));
    let owner = &svc.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!((owner.kind.as_str(), owner.uid.as_str()), ("App", "app-uid"));

    let spec = svc.spec.unwrap();
    assert_eq!(spec.selector, svc.metadata.labels);
    let port = &spec.ports.unwrap()[0];
    assert_eq!(
        (port.name.as_deref(), port.port, port.protocol.as_deref()),
        (Some("http"), 8080, Some("TCP"))
    );
    assert_eq!(port.target_port, Some(IntOrString::Int(8080)));

    // second and third passes find nothing to do
    let writes = cluster.writes();
    for _ in 0..2 {
        let flow = reconciler.reconcile_service(&request()).await.unwrap();
        assert_eq!(flow, Flow::Continue);
    }
    assert_eq!(cluster.writes(), writes);
    assert_eq!(FakeCluster::count(&cluster.dry_runs), 2);
}

#[tokio::test]
async fn out_of_band_label_edit_is_reverted_once() {
    let cluster = FakeCluster::with_app(app(Some("app-uid")));
    let reconciler = reconciler(&cluster);
    reconciler.reconcile_service(&request()).await.unwrap();

    if let Some(svc) = cluster.service.lock().as_mut() {
        let labels = svc.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(INSTANCE_LABEL.to_string(), "hijacked".to_string());
    }

    reconciler.reconcile_service(&request()).await.unwrap();
    assert_eq!(FakeCluster::count(&cluster.updates), 1);

    let svc = cluster.service.lock().clone().unwrap();
    let labels = svc.metadata.labels.unwrap();
    assert_eq!(labels.get(INSTANCE_LABEL).map(String::as_str), Some("storefront"));
    // allocated fields survive the update
    assert_eq!(
        svc.spec.and_then(|s| s.cluster_ip).as_deref(),
        Some("10.96.0.42")
    );

    reconciler.reconcile_service(&request()).await.unwrap();
    assert_eq!(FakeCluster::count(&cluster.updates), 1);
}

#[tokio::test]
async fn spec_change_rolls_forward() {
    let cluster = FakeCluster::with_app(app(Some("app-uid")));
    let reconciler = reconciler(&cluster);
    reconciler.reconcile_service(&request()).await.unwrap();

    if let Some(app) = cluster.app.lock().as_mut() {
        app.spec.image = Some("ghcr.io/acme/storefront:2.1.0".to_string());
        let mut annotations = BTreeMap::new();
        annotations.insert("owner".to_string(), "checkout-team".to_string());
        app.spec.metadata = Some(AppMetadata {
            labels: None,
            annotations: Some(annotations),
        });
    }

    reconciler.reconcile_service(&request()).await.unwrap();
    assert_eq!(FakeCluster::count(&cluster.updates), 1);

    let svc = cluster.service.lock().clone().unwrap();
    assert_eq!(
        svc.metadata.labels.unwrap().get(VERSION_LABEL).map(String::as_str),
        Some("2.1.0")
    );
    assert_eq!(
        svc.metadata.annotations.unwrap().get("owner").map(String::as_str),
        Some("checkout-team")
    );
}

#[tokio::test]
async fn unbuildable_app_gets_failure_condition() {
    let cluster = FakeCluster::with_app(app(None));
    let reconciler = reconciler(&cluster);

    let err = reconciler.reconcile_service(&request()).await.unwrap_err();
    assert!(matches!(err, Error::OwnerReference(_)));
    assert_eq!(FakeCluster::count(&cluster.creates), 0);

    let app = cluster.app.lock().clone().unwrap();
    let conditions = app.status.unwrap().conditions;
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].type_, "Available");
    assert_eq!(conditions[0].status, ConditionStatus::False);
    assert_eq!(conditions[0].reason, "Reconciling");

    // retrying keeps a single condition entry
    reconciler.reconcile_service(&request()).await.unwrap_err();
    let app = cluster.app.lock().clone().unwrap();
    assert_eq!(app.status.unwrap().conditions.len(), 1);
}

#[tokio::test]
async fn deleted_app_halts_without_writes() {
    let cluster = Arc::new(FakeCluster::default());
    let flow = reconciler(&cluster).reconcile_service(&request()).await.unwrap();

    assert_eq!(flow, Flow::Halt);
    assert_eq!(cluster.writes(), 0);
}
