//! Inbound request verification
//!
//! Composes the host check, freshness gate, signature parsing, key
//! resolution and RSA verification into one accept/reject decision.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use thiserror::Error;

use super::key_resolver::KeyResolver;
use super::signature::{
    SignatureError, build_comparison_string, check_freshness, parse_http_date,
    parse_signature_header, verify_signature,
};
use crate::metrics::INBOUND_VERIFICATIONS_TOTAL;

/// The parts of an inbound request that verification reads.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub method: &'a str,
    /// Path without the query component
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

/// Progress of a single verification attempt.
///
/// A rejection records the last stage that was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    Start,
    HostChecked,
    DateChecked,
    SignatureParsed,
    ActorResolved,
    Verified,
}

impl VerificationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStage::Start => "start",
            VerificationStage::HostChecked => "host_checked",
            VerificationStage::DateChecked => "date_checked",
            VerificationStage::SignatureParsed => "signature_parsed",
            VerificationStage::ActorResolved => "actor_resolved",
            VerificationStage::Verified => "verified",
        }
    }
}

/// The `keyId` of a request whose signature verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity(String);

impl AuthenticatedIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AuthenticatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rejected verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct Rejection {
    /// Last stage reached before the failure
    pub stage: VerificationStage,
    #[source]
    pub error: SignatureError,
}

/// Verifies HTTP-signed deliveries addressed to this federation host.
///
/// Holds no per-request state; one instance is shared by all handlers.
pub struct SignatureVerifier {
    federation_host: String,
    resolver: Arc<dyn KeyResolver>,
}

impl SignatureVerifier {
    pub fn new(federation_host: impl Into<String>, resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            federation_host: federation_host.into(),
            resolver,
        }
    }

    pub fn federation_host(&self) -> &str {
        &self.federation_host
    }

    /// Verify a request against the current wall clock.
    pub async fn verify(
        &self,
        request: &InboundRequest<'_>,
    ) -> Result<AuthenticatedIdentity, Rejection> {
        self.verify_at(request, Utc::now()).await
    }

    /// Verify a request as if it arrived at `now`.
    pub async fn verify_at(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, Rejection> {
        let mut stage = VerificationStage::Start;

        match self.run(request, now, &mut stage).await {
            Ok(identity) => {
                INBOUND_VERIFICATIONS_TOTAL
                    .with_label_values(&[VerificationStage::Verified.as_str(), "none"])
                    .inc();
                tracing::debug!(key_id = %identity, "Inbound signature verified");
                Ok(identity)
            }
            Err(error) => {
                INBOUND_VERIFICATIONS_TOTAL
                    .with_label_values(&[stage.as_str(), error.kind()])
                    .inc();
                tracing::warn!(
                    stage = stage.as_str(),
                    reason = %error,
                    method = request.method,
                    path = request.path,
                    "Rejected inbound signature"
                );
                Err(Rejection { stage, error })
            }
        }
    }

    async fn run(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
        stage: &mut VerificationStage,
    ) -> Result<AuthenticatedIdentity, SignatureError> {
        // Start -> HostChecked
        let host = header_str(request.headers, http::header::HOST)
            .ok_or(SignatureError::HostMismatch)?;
        if host != self.federation_host {
            return Err(SignatureError::HostMismatch);
        }
        *stage = VerificationStage::HostChecked;

        // HostChecked -> DateChecked
        let raw_date = header_str(request.headers, http::header::DATE)
            .ok_or_else(|| SignatureError::MalformedDate("missing Date header".to_string()))?;
        let declared = parse_http_date(raw_date)?;
        tracing::debug!(
            time_of_check = %now.to_rfc3339(),
            provided_date = %declared.to_rfc3339(),
            "Checking request freshness"
        );
        check_freshness(declared, now)?;
        *stage = VerificationStage::DateChecked;

        // DateChecked -> SignatureParsed
        let raw_signature = header_str(request.headers, "signature").ok_or_else(|| {
            SignatureError::MalformedSignature("missing Signature header".to_string())
        })?;
        let signature = parse_signature_header(raw_signature)?;
        if !signature.covers_required_headers() {
            return Err(SignatureError::InsufficientSignedHeaders);
        }
        *stage = VerificationStage::SignatureParsed;

        // Built before resolution so a request missing a signed header never
        // triggers a fetch.
        let comparison_string = build_comparison_string(
            &signature.signed_header_names,
            request.method,
            request.path,
            request.headers,
        )?;
        tracing::debug!(
            signed_headers = ?signature.signed_header_names,
            comparison_string = %comparison_string,
            "Rebuilt comparison string"
        );

        // SignatureParsed -> ActorResolved
        let actor_key = self
            .resolver
            .resolve(&signature.key_id)
            .await
            .map_err(|error| match error {
                SignatureError::Resolution(_) => error,
                other => SignatureError::Resolution(other.to_string()),
            })?;
        *stage = VerificationStage::ActorResolved;

        // ActorResolved -> Verified
        verify_signature(
            &signature.signature,
            &comparison_string,
            &actor_key.public_key_pem,
        )?;
        *stage = VerificationStage::Verified;

        Ok(AuthenticatedIdentity(signature.key_id))
    }
}

fn header_str<K: http::header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
