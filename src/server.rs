//! API server: watcher startup, accept loop and HTTP routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{AuthConfigWatch, AuthConfigWatcher, AuthDescriptor, ForwardedUser, authenticate};
use crate::config::Config;
use crate::mtls::{
    CertificateWatcher, FileCertificateSource, MtlsAcceptor, PeerIdentity, TlsConfigAssembler,
};
use crate::tls_profile::{CdiConfig, TlsPolicy, TlsPolicyWatch, TlsProfileWatcher};
use crate::watch::{FileSource, ResourceSource};
use crate::{Error, Result};

/// Resource kind of the authentication descriptor.
pub const AUTH_DESCRIPTOR_KIND: &str = "extension-apiserver-authentication";
/// Resource kind of the TLS profile selector.
pub const TLS_PROFILE_KIND: &str = "cdiconfig";

/// Shared state of the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    /// Live authentication configuration.
    pub auth: Arc<dyn AuthConfigWatch>,
}

/// Response of `/apis/whoami`.
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    /// Identity from the client certificate.
    pub peer: PeerIdentity,
    /// Identity forwarded by a trusted front proxy, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ForwardedUser>,
}

/// Build the HTTP routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/apis/whoami", get(whoami))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn whoami(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerIdentity>,
    headers: HeaderMap,
) -> Json<WhoAmI> {
    let auth = state.auth.auth_config();
    let user = authenticate(&headers, &auth, peer.common_name.as_deref());
    Json(WhoAmI { peer, user })
}

/// First pause after a failed `accept()`.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Longest pause between failed `accept()` calls.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Accept connections until `shutdown_rx` fires.
///
/// Every connection gets its own task: handshake through `acceptor`, then
/// HTTP/1.1 or HTTP/2 over `router` with the peer identity attached as a
/// request extension. Failed handshakes only drop their connection. Accept
/// errors (such as running out of file descriptors) back off exponentially.
pub async fn serve(
    listener: TcpListener,
    acceptor: MtlsAcceptor,
    router: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut failures = 0u32;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => {
                        failures = 0;
                        conn
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let delay = accept_backoff(failures);
                        warn!(
                            error = %e,
                            failures,
                            retry_in = ?delay,
                            "Failed to accept connection"
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            _ = shutdown_rx.recv() => {
                                info!("Listener shutting down");
                                break;
                            }
                        }
                        continue;
                    }
                };
                tokio::spawn(handle_connection(stream, remote, acceptor.clone(), router.clone()));
            }
            _ = shutdown_rx.recv() => {
                info!("Listener shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    remote: SocketAddr,
    acceptor: MtlsAcceptor,
    router: Router,
) {
    let (tls, peer) = match acceptor.accept(stream).await {
        Ok(accepted) => accepted,
        Err(e) if e.is_connection_local() => {
            debug!(remote = %remote, error = %e, "TLS handshake failed");
            return;
        }
        Err(e) => {
            warn!(remote = %remote, error = %e, "Connection refused");
            return;
        }
    };

    debug!(remote = %remote, peer = peer.display_name(), "Connection established");
    let service = TowerToHyperService::new(router.layer(Extension(peer)));
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(tls), service)
        .await
    {
        debug!(remote = %remote, error = %e, "Connection closed with error");
    }
}

/// The running server's watchers and acceptor.
pub struct ApiServer {
    config: Config,
    auth: Arc<AuthConfigWatcher>,
    acceptor: MtlsAcceptor,
    _tls: Arc<TlsProfileWatcher>,
    _cert_watcher: CertificateWatcher,
}

impl ApiServer {
    /// Load the certificate and start both watchers.
    ///
    /// # Errors
    ///
    /// Fails if the certificate cannot be loaded, the authentication
    /// descriptor is missing or invalid, or a watch cannot be established.
    pub async fn start(config: Config, shutdown_tx: &broadcast::Sender<()>) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let certs = Arc::new(FileCertificateSource::load(
            &config.tls.cert_file,
            &config.tls.key_file,
            Arc::clone(&provider),
        )?);
        let cert_watcher = certs.watch(shutdown_tx.subscribe())?;

        let auth_source: Arc<dyn ResourceSource<AuthDescriptor>> = Arc::new(FileSource::new(
            AUTH_DESCRIPTOR_KIND,
            &config.sources.auth_descriptor,
        ));
        let auth = Arc::new(AuthConfigWatcher::start(auth_source, shutdown_tx.subscribe()).await?);

        let tls_source: Arc<dyn ResourceSource<CdiConfig>> =
            Arc::new(FileSource::new(TLS_PROFILE_KIND, &config.sources.tls_profile));
        let tls = Arc::new(TlsProfileWatcher::start(tls_source, shutdown_tx.subscribe()).await?);

        let assembler = TlsConfigAssembler::with_provider(
            Arc::clone(&auth) as Arc<dyn AuthConfigWatch>,
            Arc::clone(&tls) as Arc<dyn TlsPolicyWatch>,
            certs,
            provider,
        );
        let acceptor = MtlsAcceptor::new(Arc::new(assembler))
            .with_handshake_timeout(config.server.handshake_timeout());

        Ok(Self {
            config,
            auth,
            acceptor,
            _tls: tls,
            _cert_watcher: cert_watcher,
        })
    }

    /// Bind and serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid or cannot be bound.
    pub async fn run(self, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, "Listening for mTLS connections");

        let router = create_router(AppState {
            auth: Arc::clone(&self.auth) as Arc<dyn AuthConfigWatch>,
        });

        tokio::spawn(shutdown_signal(shutdown_tx.clone()));
        serve(listener, self.acceptor.clone(), router, shutdown_tx.subscribe()).await;
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}

/// What the server would serve right now, from one read of each resource.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    /// Trust anchors in the client-CA pool.
    pub trust_anchors: usize,
    /// Common names allowed to forward identity; empty allows any.
    pub allowed_names: Vec<String>,
    /// Forwarded user headers.
    pub user_headers: Vec<String>,
    /// Forwarded group headers.
    pub group_headers: Vec<String>,
    /// Forwarded extra header prefixes.
    pub extra_prefix_headers: Vec<String>,
    /// Resolved TLS profile.
    pub tls_profile: String,
    /// Minimum TLS version.
    pub min_tls_version: String,
    /// Cipher suites, in preference order.
    pub cipher_suites: Vec<String>,
}

/// Read both resources once and resolve them.
///
/// # Errors
///
/// Fails under the same conditions as starting the watchers.
pub async fn check(config: &Config) -> Result<CheckReport> {
    let auth_source: FileSource<AuthDescriptor> =
        FileSource::new(AUTH_DESCRIPTOR_KIND, &config.sources.auth_descriptor);
    let descriptor = match auth_source.fetch().await? {
        Some(descriptor) => descriptor,
        None => {
            warn!(kind = AUTH_DESCRIPTOR_KIND, "Authentication descriptor not found");
            AuthDescriptor::default()
        }
    };
    let auth = crate::auth::AuthConfig::from_descriptor(&descriptor)?;

    let tls_source: FileSource<CdiConfig> =
        FileSource::new(TLS_PROFILE_KIND, &config.sources.tls_profile);
    let policy = TlsPolicy::from_resource(tls_source.fetch().await?.as_ref());

    Ok(CheckReport {
        trust_anchors: auth.trust_anchor_count(),
        allowed_names: auth.allowed_common_names.iter().cloned().collect(),
        user_headers: auth.user_headers.clone(),
        group_headers: auth.group_headers.clone(),
        extra_prefix_headers: auth.extra_prefix_headers.clone(),
        tls_profile: policy.profile.to_string(),
        min_tls_version: policy.min_version.to_string(),
        cipher_suites: policy
            .cipher_suites
            .iter()
            .map(|s| format!("{s:?}"))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::AuthConfig;
    use crate::auth::descriptor::{
        REQUESTHEADER_ALLOWED_NAMES_KEY, REQUESTHEADER_USERNAME_HEADERS_KEY,
    };
    use crate::snapshot::LiveSnapshot;

    fn router() -> Router {
        let descriptor = AuthDescriptor::from_pairs([
            (REQUESTHEADER_ALLOWED_NAMES_KEY, r#"["front-proxy-client"]"#),
            (REQUESTHEADER_USERNAME_HEADERS_KEY, r#"["X-Remote-User"]"#),
        ]);
        let auth = Arc::new(LiveSnapshot::new(AuthConfig::from_descriptor(&descriptor).unwrap()));
        create_router(AppState { auth })
    }

    fn peer(cn: &str) -> PeerIdentity {
        PeerIdentity {
            common_name: Some(cn.to_owned()),
            ..PeerIdentity::default()
        }
    }

    async fn whoami_for(cn: &str) -> serde_json::Value {
        let response = router()
            .layer(Extension(peer(cn)))
            .oneshot(
                Request::get("/apis/whoami")
                    .header("X-Remote-User", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let response = router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn whoami_trusts_headers_from_allowed_proxy() {
        let body = whoami_for("front-proxy-client").await;
        assert_eq!(body["peer"]["common_name"], "front-proxy-client");
        assert_eq!(body["user"]["name"], "alice");
    }

    #[tokio::test]
    async fn whoami_ignores_headers_from_other_peers() {
        let body = whoami_for("someone-else").await;
        assert_eq!(body["peer"]["common_name"], "someone-else");
        assert!(body.get("user").is_none());
    }

    #[tokio::test]
    async fn check_reports_resolved_state() {
        // GIVEN: a descriptor without CAs and a Modern selector
        let dir = tempfile::tempdir().unwrap();
        let auth_path = dir.path().join("auth.yaml");
        let tls_path = dir.path().join("cdiconfig.yaml");
        std::fs::write(
            &auth_path,
            "data:\n  requestheader-allowed-names: '[\"front-proxy-client\"]'\n",
        )
        .unwrap();
        std::fs::write(&tls_path, "spec:\n  tlsSecurityProfile:\n    type: Modern\n").unwrap();

        let mut config = Config::default();
        config.sources.auth_descriptor = auth_path;
        config.sources.tls_profile = tls_path;

        // WHEN: checking
        let report = check(&config).await.unwrap();

        // THEN: both resources are resolved
        assert_eq!(report.trust_anchors, 0);
        assert_eq!(report.allowed_names, vec!["front-proxy-client"]);
        assert_eq!(report.tls_profile, "Modern");
        assert_eq!(report.min_tls_version, "VersionTLS13");
        assert_eq!(report.cipher_suites.len(), 3);
    }

    #[test]
    fn accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), ACCEPT_BACKOFF_MIN);
        assert_eq!(accept_backoff(2), ACCEPT_BACKOFF_MIN * 2);
        assert_eq!(accept_backoff(3), ACCEPT_BACKOFF_MIN * 4);
        assert_eq!(accept_backoff(20), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn check_reports_empty_config_without_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sources.auth_descriptor = dir.path().join("missing.yaml");
        config.sources.tls_profile = dir.path().join("missing-too.yaml");

        let report = check(&config).await.unwrap();

        assert_eq!(report.trust_anchors, 0);
        assert!(report.allowed_names.is_empty());
        assert_eq!(report.tls_profile, TlsPolicy::intermediate().profile.to_string());
    }
}
