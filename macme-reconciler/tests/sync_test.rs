use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use macme_acme::{AcmeError, AcmeIssuer, IssuedCertificate};
use macme_marathon::MarathonClient;
use macme_mlb::MlbClient;
use macme_reconciler::Reconciler;
use macme_store::{CertificateStore, InMemoryStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A fake issuer that always succeeds, counting how many times it was
/// called and optionally sleeping to create a window for coalescing.
struct FakeIssuer {
    calls: AtomicUsize,
    delay: Duration,
}

impl FakeIssuer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl AcmeIssuer for FakeIssuer {
    async fn obtain_certificate(&self, domains: &[String]) -> Result<IssuedCertificate, AcmeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(IssuedCertificate {
            cert_pem: format!("cert-for-{}", domains.join(",")),
            key_pem: "key".to_string(),
            domains: domains.to_vec(),
            not_after: 9_999_999_999,
        })
    }
}

async fn apps_body(apps: serde_json::Value) -> String {
    serde_json::json!({ "apps": apps }).to_string()
}

fn app(labels: serde_json::Value, port_labels: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "id": "/web",
        "labels": labels,
        "portDefinitions": port_labels
            .into_iter()
            .map(|l| serde_json::json!({"port": 10000, "labels": l}))
            .collect::<Vec<_>>(),
    })
}

async fn mount_apps(server: &MockServer, apps: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/v2/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_string(apps_body(apps.into()).await))
        .mount(server)
        .await;
}

async fn mount_mlb_signal(mlb_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/_mlb_signal/usr1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mlb_server)
        .await;
}

fn build_reconciler(
    marathon_uri: &str,
    mlb_uri: &str,
    store: Arc<dyn CertificateStore>,
    acme: Arc<dyn AcmeIssuer>,
) -> Reconciler {
    let marathon = MarathonClient::new(marathon_uri).unwrap();
    let mlb = MlbClient::new(&[mlb_uri.to_string()]).unwrap();
    Reconciler::new(marathon, mlb, store, acme, "external")
}

#[tokio::test]
async fn happy_path_issues_stores_and_broadcasts_a_reload() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![app(
            serde_json::json!({"HAPROXY_GROUP": "external"}),
            vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
        )],
    )
    .await;
    mount_mlb_signal(&mlb_server).await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store.clone(),
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert_eq!(report.issuances.len(), 1);
    assert_eq!(report.issuances[0].domains, vec!["example.com".to_string()]);
    assert_eq!(report.issuances[0].reload_responses.len(), 1);
    assert!(report.issuances[0].reload_responses[0].is_ok());
    assert!(report.issuance_errors.is_empty());
    assert_eq!(
        store.get("example.com").await.unwrap(),
        Some("keycert-for-example.com".to_string())
    );
    assert_eq!(acme.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_apps_issues_nothing() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(&marathon_server, vec![]).await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert!(report.issuances.is_empty());
    assert!(report.issuance_errors.is_empty());
    assert_eq!(acme.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn group_mismatch_issues_nothing() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![app(
            serde_json::json!({"HAPROXY_GROUP": "internal"}),
            vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
        )],
    )
    .await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert!(report.issuances.is_empty());
    assert_eq!(acme.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn port_level_group_override_excludes_the_port() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![app(
            serde_json::json!({"HAPROXY_GROUP": "external"}),
            vec![serde_json::json!({
                "HAPROXY_0_GROUP": "internal",
                "MARATHON_ACME_0_DOMAIN": "example.com"
            })],
        )],
    )
    .await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert!(report.issuances.is_empty());
    assert_eq!(acme.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn domain_already_in_the_store_is_not_reissued() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![app(
            serde_json::json!({"HAPROXY_GROUP": "external"}),
            vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
        )],
    )
    .await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    store
        .store("example.com", "already-there".to_string())
        .await
        .unwrap();
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert!(report.issuances.is_empty());
    assert_eq!(acme.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn same_canonical_domain_from_two_apps_is_issued_once() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![
            app(
                serde_json::json!({"HAPROXY_GROUP": "external"}),
                vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
            ),
            app(
                serde_json::json!({"HAPROXY_GROUP": "external"}),
                vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
            ),
        ],
    )
    .await;
    mount_mlb_signal(&mlb_server).await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::new());
    let reconciler = build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    );

    let report = reconciler.trigger().await.unwrap();

    assert_eq!(report.issuances.len(), 1);
    assert_eq!(acme.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_triggers_while_busy_coalesce_into_one_follow_up() {
    let marathon_server = MockServer::start().await;
    let mlb_server = MockServer::start().await;
    mount_apps(
        &marathon_server,
        vec![app(
            serde_json::json!({"HAPROXY_GROUP": "external"}),
            vec![serde_json::json!({"MARATHON_ACME_0_DOMAIN": "example.com"})],
        )],
    )
    .await;
    mount_mlb_signal(&mlb_server).await;

    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryStore::new());
    let acme = Arc::new(FakeIssuer::with_delay(Duration::from_millis(100)));
    let reconciler = Arc::new(build_reconciler(
        &marathon_server.uri(),
        &mlb_server.uri(),
        store,
        acme.clone(),
    ));

    let first = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Both of these arrive while `first` is still running: they should
    // collapse into a single pending follow-up, not one sync each.
    let second = reconciler.trigger().await.unwrap();
    let third = reconciler.trigger().await.unwrap();
    assert!(second.issuances.is_empty());
    assert!(third.issuances.is_empty());

    first.await.unwrap().unwrap();

    // The domain was already issued by the first pass and is now in the
    // store, so the coalesced follow-up (if it ran) found nothing new to
    // do; the issuer should not have been called a third time.
    assert!(acme.calls.load(Ordering::SeqCst) <= 2);
}
