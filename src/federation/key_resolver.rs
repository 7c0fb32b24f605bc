//! Actor public key resolution
//!
//! Fetches the actor document named by a signature `keyId` and extracts
//! `publicKey.publicKeyPem`. Every call is a single fresh fetch.

use std::net::IpAddr;
use std::time::Duration;

use axum::async_trait;
use serde_json::Value;

use super::signature::SignatureError;
use crate::config::FederationConfig;
use crate::error::AppError;
use crate::metrics::{ACTOR_KEY_FETCHES_TOTAL, ACTOR_KEY_FETCH_DURATION_SECONDS};

const ACTIVITY_JSON: &str = "application/activity+json";

/// Public key material for a remote actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorKey {
    /// The `keyId` the key was resolved from
    pub key_id: String,
    /// PEM-encoded RSA public key
    pub public_key_pem: String,
}

/// Resolves a signature `keyId` to the signer's public key.
///
/// Implementations must not hold locks across the network wait; concurrent
/// verifications resolve independently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, key_id: &str) -> Result<ActorKey, SignatureError>;
}

/// Key resolver that fetches actor documents over HTTP(S).
pub struct HttpKeyResolver {
    http_client: reqwest::Client,
    allow_private_networks: bool,
}

impl HttpKeyResolver {
    /// `http_client` should not follow redirects; see [`HttpKeyResolver::from_config`].
    pub fn new(http_client: reqwest::Client, allow_private_networks: bool) -> Self {
        Self {
            http_client,
            allow_private_networks,
        }
    }

    /// Build a resolver with its own client, bounded by the configured timeout.
    pub fn from_config(config: &FederationConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            // Only the first destination passes the private network check.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self::new(http_client, config.allow_private_networks))
    }

    async fn fetch_actor(&self, key_id: &str) -> Result<Value, SignatureError> {
        let url = url::Url::parse(key_id)
            .map_err(|e| SignatureError::Resolution(format!("invalid actor URL: {}", e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SignatureError::Resolution(format!(
                    "unsupported actor URL scheme: {}",
                    scheme
                )));
            }
        }

        if !self.allow_private_networks {
            ensure_public_destination(&url).await?;
        }

        let response = self
            .http_client
            .get(url)
            .header(http::header::ACCEPT, ACTIVITY_JSON)
            .send()
            .await
            .map_err(|e| SignatureError::Resolution(format!("failed to fetch actor: {}", e)))?;

        if !response.status().is_success() {
            return Err(SignatureError::Resolution(format!(
                "failed to fetch actor: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SignatureError::Resolution(format!("failed to parse actor: {}", e)))
    }
}

#[async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ActorKey, SignatureError> {
        let _timer = ACTOR_KEY_FETCH_DURATION_SECONDS.start_timer();

        let result = self.fetch_actor(key_id).await.and_then(|actor| {
            extract_public_key_pem(&actor, key_id).map(|pem| ActorKey {
                key_id: key_id.to_string(),
                public_key_pem: pem.to_string(),
            })
        });

        let status = if result.is_ok() { "success" } else { "failure" };
        ACTOR_KEY_FETCHES_TOTAL.with_label_values(&[status]).inc();
        tracing::debug!(key_id, status, "Resolved actor key");

        result
    }
}

/// Extract `publicKey.publicKeyPem` from an actor document.
///
/// `publicKey` may also be an array of key objects; the one whose `id`
/// equals `key_id` wins, otherwise the first.
pub fn extract_public_key_pem<'a>(actor: &'a Value, key_id: &str) -> Result<&'a str, SignatureError> {
    let public_key = match actor.get("publicKey") {
        Some(Value::Array(keys)) => keys
            .iter()
            .find(|key| key.get("id").and_then(Value::as_str) == Some(key_id))
            .or_else(|| keys.first()),
        other => other,
    }
    .ok_or_else(|| SignatureError::Resolution("missing publicKey in actor".to_string()))?;

    public_key
        .get("publicKeyPem")
        .and_then(Value::as_str)
        .ok_or_else(|| SignatureError::Resolution("missing publicKeyPem in actor".to_string()))
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            // Mapped and compatible forms reach the embedded IPv4 host.
            if v6
                .to_ipv4()
                .is_some_and(|v4| is_disallowed_ip(IpAddr::V4(v4)))
            {
                return true;
            }
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

/// Refuse actor URLs that point, literally or via DNS, at local networks.
async fn ensure_public_destination(url: &url::Url) -> Result<(), SignatureError> {
    let refused = || SignatureError::Resolution(format!("refusing to fetch actor from {}", url));

    let host = match url.host() {
        Some(url::Host::Ipv4(ip)) => {
            return if is_disallowed_ip(IpAddr::V4(ip)) {
                Err(refused())
            } else {
                Ok(())
            };
        }
        Some(url::Host::Ipv6(ip)) => {
            return if is_disallowed_ip(IpAddr::V6(ip)) {
                Err(refused())
            } else {
                Ok(())
            };
        }
        Some(url::Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        None => {
            return Err(SignatureError::Resolution(
                "missing host in actor URL".to_string(),
            ));
        }
    };

    if host == "localhost" || host.ends_with(".localhost") {
        return Err(refused());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| SignatureError::Resolution(format!("failed to resolve actor host: {}", e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(refused());
        }
    }

    if !resolved_any {
        return Err(SignatureError::Resolution(
            "no DNS records for actor host".to_string(),
        ));
    }

    Ok(())
}
