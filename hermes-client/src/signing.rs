//! Request signing middleware (`spec.md` §4.1, §8 E2E-6).
//!
//! A [`tower::Layer`]/[`tower::Service`] pair, in the shape of the teacher's
//! `kube_client::client::middleware::extra_headers` layer: it never mutates
//! the caller's request in place, it clones the parts it needs and installs
//! a fresh, replayable body on the outgoing clone.
//!
//! Every request gets `X-Hermes-Region`. When an access-key/secret-key pair
//! is configured, the request additionally gets a computed HMAC-SHA256
//! signature across `METHOD\nPATH\nUNIX_TIMESTAMP\nHEX(SHA256(body))`.

use bytes::Bytes;
use hermes_core::config::AuthConfig;
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::{Layer, Service};

/// Region header name.
pub const REGION_HEADER: HeaderName = HeaderName::from_static("x-hermes-region");
/// Signature timestamp header name.
pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-hermes-timestamp");
/// Body digest header name.
pub const BODY_SHA256_HEADER: HeaderName = HeaderName::from_static("x-hermes-body-sha256");

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256 digest of `body`.
pub fn sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Compute the HMAC-SHA256 signature described in `spec.md` §4.1 / §8 E2E-6.
///
/// `body_sha256_hex` is the hex-encoded SHA-256 digest of the request body
/// (empty string hashes to the well-known empty-input digest).
pub fn compute_signature(secret: &str, method: &str, path: &str, timestamp: u64, body_sha256_hex: &str) -> String {
    let message = format!("{method}\n{path}\n{timestamp}\n{body_sha256_hex}");
    // HMAC accepts a key of any length; this never fails.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length is valid");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Layer that adds the region header, and HMAC-signs the request when
/// credentials are configured.
#[derive(Clone)]
pub struct SigningLayer {
    auth: Arc<AuthConfig>,
    region: Arc<str>,
}

impl SigningLayer {
    /// Build a layer from the configured auth settings and region name.
    pub fn new(auth: AuthConfig, region: impl Into<Arc<str>>) -> Self {
        Self {
            auth: Arc::new(auth),
            region: region.into(),
        }
    }
}

impl<S> Layer<S> for SigningLayer {
    type Service = Signing<S>;

    fn layer(&self, inner: S) -> Signing<S> {
        Signing {
            inner,
            auth: self.auth.clone(),
            region: self.region.clone(),
        }
    }
}

/// See [`SigningLayer`].
#[derive(Clone)]
pub struct Signing<S> {
    inner: S,
    auth: Arc<AuthConfig>,
    region: Arc<str>,
}

impl<S, B> Service<Request<Full<Bytes>>> for Signing<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let auth = self.auth.clone();
        let region = self.region.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let (mut parts, body) = req.into_parts();

            // `Full<Bytes>` collection is infallible; this never actually errors.
            let body_bytes = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_else(|_| Bytes::new());

            if region.as_ref() != "default" || auth.is_enabled() {
                if let Ok(value) = HeaderValue::from_str(&region) {
                    parts.headers.insert(REGION_HEADER, value);
                }
            }

            if let (Some(access_key), Some(secret_key)) = (&auth.access_key, &auth.secret_key) {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let body_digest = sha256_hex(&body_bytes);
                let signature = compute_signature(secret_key, &method, &path, timestamp, &body_digest);

                if let Ok(value) = HeaderValue::from_str(&timestamp.to_string()) {
                    parts.headers.insert(TIMESTAMP_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&body_digest) {
                    parts.headers.insert(BODY_SHA256_HEADER, value);
                }
                let header = format!("HMAC-SHA256 Credential={access_key}, Signature={signature}");
                if let Ok(value) = HeaderValue::from_str(&header) {
                    parts.headers.insert(AUTHORIZATION, value);
                }
            }

            let req = Request::from_parts(parts, Full::new(body_bytes));
            inner.call(req).await
        })
    }
}
