use axum::extract::State;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Body of `/health` and `/ready`.
#[derive(Serialize)]
struct Probe {
    service: &'static str,
    ready: bool,
}

/// Liveness and readiness of one mixfs process, shared with its HTTP
/// endpoint.
#[derive(Clone)]
pub struct Readiness {
    service: &'static str,
    ready: Arc<AtomicBool>,
}

impl Readiness {
    /// Creates a not-yet-ready probe for `service` (`mixfsd`, `mixfs-relay`).
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips readiness, e.g. once the datagram socket is bound.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Whether the process currently accepts datagrams.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn probe(&self) -> Probe {
        Probe {
            service: self.service,
            ready: self.is_ready(),
        }
    }
}

#[derive(Clone)]
struct Endpoint {
    readiness: Readiness,
    prometheus: PrometheusHandle,
}

/// Installs the Prometheus recorder and serves `/metrics`, `/health` and
/// `/ready` on `addr` until the process exits.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or binding fails.
pub async fn serve(addr: SocketAddr, readiness: Readiness) -> anyhow::Result<()> {
    let endpoint = Endpoint {
        readiness,
        prometheus: PrometheusBuilder::new().install_recorder()?,
    };
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(endpoint);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics endpoint on http://{}/metrics", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs [`serve`] in the background. A failing endpoint is logged and never
/// stops the datagram service.
pub fn spawn(addr: SocketAddr, readiness: Readiness) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(addr, readiness).await {
            tracing::warn!("metrics endpoint stopped: {}", e);
        }
    })
}

async fn render_metrics(State(endpoint): State<Endpoint>) -> String {
    endpoint.prometheus.render()
}

async fn health(State(endpoint): State<Endpoint>) -> Json<Probe> {
    Json(endpoint.readiness.probe())
}

async fn ready(State(endpoint): State<Endpoint>) -> (StatusCode, Json<Probe>) {
    let probe = endpoint.readiness.probe();
    let code = if probe.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(probe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_is_shared_between_clones() {
        let readiness = Readiness::new("mixfsd");
        let endpoint_copy = readiness.clone();
        assert!(!endpoint_copy.is_ready());
        readiness.set_ready(true);
        assert!(endpoint_copy.probe().ready);
        assert_eq!(endpoint_copy.probe().service, "mixfsd");
    }
}
