//! Control-plane HTTP API consumption (`spec.md` §4.1, §6).
//!
//! `ControlPlaneClient` wraps a `hyper_util` legacy client behind the
//! signing middleware and a 60 second per-request timeout, and exposes one
//! method per endpoint the controller consumes or writes to.

use crate::error::{Error, Result};
use crate::signing::SigningLayer;
use async_trait::async_trait;
use bytes::Bytes;
use hermes_core::config::{AuthConfig, ControlPlaneConfig};
use hermes_core::model::{
    ChangeResponse, ConfigEnvelope, ControllerStatusReport, InstancesReport, Revision,
};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::{connect::HttpConnector, Client as LegacyClient};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// HTTP client for the control plane's `/api/v1/...` surface.
#[derive(Clone)]
pub struct ControlPlaneClient {
    base_url: String,
    inner: tower::util::BoxCloneSyncService<Request<Full<Bytes>>, http::Response<hyper::body::Incoming>, tower::BoxError>,
}

impl ControlPlaneClient {
    /// Build a client from the control-plane and auth configuration.
    pub fn new(cfg: &ControlPlaneConfig, auth: AuthConfig) -> ControlPlaneClient {
        let connector: HttpsConnector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("native root certificates available")
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let raw = LegacyClient::builder(TokioExecutor::new()).build(connector);

        let stack = ServiceBuilder::new()
            .layer(tower::timeout::TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(SigningLayer::new(auth, cfg.region.clone()))
            .service(raw);
        let signed = tower::util::BoxCloneSyncService::new(ServiceExt::map_err(stack, tower::BoxError::from));

        ControlPlaneClient {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            inner: signed,
        }
    }

    fn uri(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    async fn send(&self, method: Method, path_and_query: &str, body: Bytes) -> Result<(StatusCode, Bytes)> {
        let req = Request::builder()
            .method(method)
            .uri(self.uri(path_and_query))
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(body))?;

        let mut svc = self.inner.clone();
        let resp = svc
            .ready()
            .await
            .map_err(|e| Error::Send(Box::new(SendErr(e.to_string()))))?
            .call(req)
            .await
            .map_err(|e| Error::Send(Box::new(SendErr(e.to_string()))))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::ReadBody(Box::new(SendErr(e.to_string()))))?
            .to_bytes();

        if !status.is_success() {
            return Err(Error::Status {
                status,
                body: String::from_utf8_lossy(&body).chars().take(512).collect(),
            });
        }
        Ok((status, body))
    }

}

/// The control-plane API surface the controller consumes (`spec.md` §6).
/// Defined as a trait, not just inherent methods on [`ControlPlaneClient`],
/// so `hermes-runtime`'s poller and reconciler can be driven against a
/// scripted fake in tests (property 8.4) rather than a live HTTP server —
/// the same seam `hermes-kv::KvStore` provides on the KV side.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// `GET /api/v1/config`: the full desired snapshot.
    async fn get_config(&self) -> Result<ConfigEnvelope>;

    /// `GET /api/v1/config/revision`: the control plane's current revision.
    async fn get_revision(&self) -> Result<Revision>;

    /// `GET /api/v1/config/watch?revision=<n>`: the short-poll change stream.
    async fn poll_changes(&self, since: Revision) -> Result<ChangeResponse>;

    /// `PUT /api/v1/status/controller`: controller liveness/heartbeat report.
    async fn report_controller_status(&self, report: &ControllerStatusReport) -> Result<()>;

    /// `PUT /api/v1/status/instances`: the aggregated gateway membership report.
    async fn report_instances(&self, report: &InstancesReport) -> Result<()>;
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    #[instrument(skip(self))]
    async fn get_config(&self) -> Result<ConfigEnvelope> {
        let (_, body) = self.send(Method::GET, "/api/v1/config", Bytes::new()).await?;
        serde_json::from_slice(&body).map_err(Error::from)
    }

    #[instrument(skip(self))]
    async fn get_revision(&self) -> Result<Revision> {
        #[derive(serde::Deserialize)]
        struct RevisionResponse {
            revision: Revision,
        }
        let (_, body) = self.send(Method::GET, "/api/v1/config/revision", Bytes::new()).await?;
        let parsed: RevisionResponse = serde_json::from_slice(&body)?;
        Ok(parsed.revision)
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn poll_changes(&self, since: Revision) -> Result<ChangeResponse> {
        let path = format!("/api/v1/config/watch?revision={}", since.0);
        let (_, body) = self.send(Method::GET, &path, Bytes::new()).await?;
        serde_json::from_slice(&body).map_err(Error::from)
    }

    #[instrument(skip(self, report), fields(is_leader = report.is_leader))]
    async fn report_controller_status(&self, report: &ControllerStatusReport) -> Result<()> {
        let body = serde_json::to_vec(report)?;
        match self.send(Method::PUT, "/api/v1/status/controller", Bytes::from(body)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(error = %err, "failed to report controller status");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, report), fields(count = report.instances.len()))]
    async fn report_instances(&self, report: &InstancesReport) -> Result<()> {
        let body = serde_json::to_vec(report)?;
        self.send(Method::PUT, "/api/v1/status/instances", Bytes::from(body)).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct SendErr(String);

impl std::fmt::Display for SendErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SendErr {}
