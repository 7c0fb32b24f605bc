//! WebFinger protocol implementation
//!
//! Maps `acct:user@host` resources onto locally stored actor objects.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Extract the username from an `acct:<username>@<federation_host>` resource.
///
/// # Errors
/// - `Validation` if the resource is not an `acct:` URI
/// - `NotFound` if it names another host or an empty username
pub fn parse_acct_resource<'a>(resource: &'a str, federation_host: &str) -> Result<&'a str, AppError> {
    let acct = resource.strip_prefix("acct:").ok_or_else(|| {
        AppError::Validation("Resource must start with 'acct:'".to_string())
    })?;

    let (username, domain) = acct
        .rsplit_once('@')
        .ok_or_else(|| AppError::Validation("Invalid acct format".to_string()))?;

    if domain != federation_host || username.is_empty() {
        return Err(AppError::NotFound);
    }

    Ok(username)
}

/// Generate the WebFinger response for a local actor object.
///
/// # Arguments
/// * `subject` - The queried resource (`acct:user@host`)
/// * `actor_url` - URL of the stored actor object
pub fn generate_webfinger_response(subject: &str, actor_url: &str) -> WebFingerResponse {
    WebFingerResponse {
        subject: subject.to_string(),
        aliases: Some(vec![actor_url.to_string()]),
        links: vec![
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(actor_url.to_string()),
            },
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some("application/activity+json".to_string()),
                href: Some(actor_url.to_string()),
            },
        ],
    }
}
