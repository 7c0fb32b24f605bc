//! HTTP Signatures for ActivityPub
//!
//! Inbound verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! The pieces here are pure: parsing the `Signature` header, rebuilding the
//! string the sender signed, bounding the replay window and checking the
//! RSA signature. [`super::SignatureVerifier`] composes them per request.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use http::{HeaderMap, HeaderName};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::Sha256;
use thiserror::Error;

/// Pseudo-header synthesized from the request method and path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Header names every accepted signature must cover.
pub const REQUIRED_SIGNED_HEADERS: [&str; 3] = ["date", "host", REQUEST_TARGET];

/// Maximum distance between the declared `Date` and the time of the check.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 30;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Reasons an inbound signed request is rejected.
///
/// Every variant is final for the request it was raised on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("provided host doesn't match configured federation host")]
    HostMismatch,

    #[error("malformed Date header: {0}")]
    MalformedDate(String),

    #[error("provided date is not current enough ({skew_ms}ms from now)")]
    StaleRequest { skew_ms: i64 },

    #[error("malformed Signature header: {0}")]
    MalformedSignature(String),

    #[error("signed headers must include at least date, host and (request-target)")]
    InsufficientSignedHeaders,

    #[error("signed header missing from request: {0}")]
    MissingSignedHeader(String),

    #[error("could not get actor: {0}")]
    Resolution(String),

    #[error("unusable actor public key: {0}")]
    KeyFormat(String),

    #[error("invalid signature")]
    InvalidSignature,
}

impl SignatureError {
    /// Short machine-readable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SignatureError::HostMismatch => "host_mismatch",
            SignatureError::MalformedDate(_) => "malformed_date",
            SignatureError::StaleRequest { .. } => "stale_request",
            SignatureError::MalformedSignature(_) => "malformed_signature",
            SignatureError::InsufficientSignedHeaders => "insufficient_signed_headers",
            SignatureError::MissingSignedHeader(_) => "missing_signed_header",
            SignatureError::Resolution(_) => "resolution",
            SignatureError::KeyFormat(_) => "key_format",
            SignatureError::InvalidSignature => "invalid_signature",
        }
    }
}

/// Parsed `Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// URL of the signing actor's key
    pub key_id: String,
    /// Signed header names, in the order the sender asserted them
    pub signed_header_names: Vec<String>,
    /// Raw signature bytes (already base64-decoded)
    pub signature: Vec<u8>,
}

impl SignatureHeader {
    /// Whether `date`, `host` and `(request-target)` are all covered.
    pub fn covers_required_headers(&self) -> bool {
        REQUIRED_SIGNED_HEADERS.iter().all(|required| {
            self.signed_header_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(required))
        })
    }
}

/// Parse `Signature` header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// `algorithm` and unknown parameters are ignored. `keyId` is not checked to
/// be a URL here; a bad one surfaces when the key is resolved.
pub fn parse_signature_header(raw: &str) -> Result<SignatureHeader, SignatureError> {
    let mut key_id = None;
    let mut headers = None;
    let mut signature = None;

    for pair in raw.split(',') {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            SignatureError::MalformedSignature(format!(
                "expected key=\"value\" pair, got {:?}",
                pair.trim()
            ))
        })?;
        let value = value.trim().trim_matches('"');

        match key.trim() {
            "keyId" => set_once(&mut key_id, "keyId", value.to_string())?,
            "headers" => set_once(
                &mut headers,
                "headers",
                value
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            )?,
            "signature" => set_once(&mut signature, "signature", value)?,
            _ => {}
        }
    }

    let missing = |name: &str| SignatureError::MalformedSignature(format!("missing {}", name));
    let key_id = key_id.ok_or_else(|| missing("keyId"))?;
    let signed_header_names = headers.ok_or_else(|| missing("headers"))?;
    let signature = BASE64
        .decode(signature.ok_or_else(|| missing("signature"))?)
        .map_err(|e| {
            SignatureError::MalformedSignature(format!("signature is not valid base64: {}", e))
        })?;

    Ok(SignatureHeader {
        key_id,
        signed_header_names,
        signature,
    })
}

/// Each parameter may appear at most once.
fn set_once<T>(slot: &mut Option<T>, name: &str, value: T) -> Result<(), SignatureError> {
    if slot.is_some() {
        return Err(SignatureError::MalformedSignature(format!("duplicate {}", name)));
    }
    *slot = Some(value);
    Ok(())
}

/// Rebuild the string the sender signed.
///
/// One `"<name>: <value>"` line per signed header, in the sender's order,
/// joined by `\n` with no trailing newline. `(request-target)` becomes
/// `"<lowercased method> <path>"`; the query string is not part of `path`.
///
/// Header lookups ignore ASCII case, but each line keeps the name token
/// exactly as the sender listed it.
pub fn build_comparison_string(
    signed_header_names: &[String],
    method: &str,
    path: &str,
    headers: &HeaderMap,
) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(signed_header_names.len());

    for name in signed_header_names {
        let value = if name.eq_ignore_ascii_case(REQUEST_TARGET) {
            format!("{} {}", method.to_lowercase(), path)
        } else {
            signed_header_value(headers, name)?.to_string()
        };
        lines.push(format!("{}: {}", name, value));
    }

    Ok(lines.join("\n"))
}

fn signed_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, SignatureError> {
    let missing = || SignatureError::MissingSignedHeader(name.to_string());

    // from_bytes lowercases, which is what HeaderMap stores.
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| missing())?;
    headers
        .get(&header_name)
        .ok_or_else(missing)?
        .to_str()
        .map_err(|_| missing())
}

/// Parse an HTTP-date of the exact form `Sun, 06 Nov 1994 08:49:37 GMT`.
///
/// Anything else (other RFC 2822 spellings, numeric offsets, single-digit
/// days) is rejected rather than parsed leniently.
pub fn parse_http_date(raw: &str) -> Result<DateTime<Utc>, SignatureError> {
    if !has_http_date_shape(raw) {
        return Err(SignatureError::MalformedDate(format!(
            "{:?} is not an HTTP-date",
            raw
        )));
    }

    NaiveDateTime::parse_from_str(raw, HTTP_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SignatureError::MalformedDate(format!("{:?}: {}", raw, e)))
}

fn has_http_date_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() != 29 || !raw.is_ascii() {
        return false;
    }

    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    WEEKDAYS.contains(&&raw[0..3])
        && &raw[3..5] == ", "
        && digits(5..7)
        && bytes[7] == b' '
        && MONTHS.contains(&&raw[8..11])
        && bytes[11] == b' '
        && digits(12..16)
        && bytes[16] == b' '
        && digits(17..19)
        && bytes[19] == b':'
        && digits(20..22)
        && bytes[22] == b':'
        && digits(23..25)
        && &raw[25..] == " GMT"
}

/// Reject requests whose declared date is more than
/// [`MAX_CLOCK_SKEW_SECONDS`] away from `now`, in either direction.
pub fn check_freshness(declared: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), SignatureError> {
    let skew = now.signed_duration_since(declared);
    let max_skew = Duration::seconds(MAX_CLOCK_SKEW_SECONDS);

    if skew > max_skew || skew < -max_skew {
        return Err(SignatureError::StaleRequest {
            skew_ms: skew.num_milliseconds(),
        });
    }

    Ok(())
}

/// Verify an RSASSA-PKCS1-v1_5 / SHA-256 signature over `comparison_string`.
///
/// Accepts SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
pub fn verify_signature(
    signature: &[u8],
    comparison_string: &str,
    public_key_pem: &str,
) -> Result<(), SignatureError> {
    let public_key = load_public_key(public_key_pem)?;
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);

    let signature = Pkcs1v15Signature::try_from(signature)
        .map_err(|_| SignatureError::InvalidSignature)?;

    verifier
        .verify(comparison_string.as_bytes(), &signature)
        .map_err(|_| SignatureError::InvalidSignature)
}

fn load_public_key(public_key_pem: &str) -> Result<RsaPublicKey, SignatureError> {
    let pem = public_key_pem.trim();
    RsaPublicKey::from_public_key_pem(pem).or_else(|spki_error| {
        RsaPublicKey::from_pkcs1_pem(pem)
            .map_err(|_| SignatureError::KeyFormat(spki_error.to_string()))
    })
}

#[cfg(test)]
pub(crate) mod test_keys {
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use sha2::Sha256;
    use std::sync::OnceLock;

    pub struct TestKeypair {
        pub private_key: RsaPrivateKey,
        pub public_key_pem: String,
        pub public_key_pkcs1_pem: String,
    }

    fn generate() -> TestKeypair {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation should work");
        let public_key = RsaPublicKey::from(&private_key);

        TestKeypair {
            public_key_pem: public_key
                .to_public_key_pem(LineEnding::LF)
                .expect("public key pem"),
            public_key_pkcs1_pem: public_key
                .to_pkcs1_pem(LineEnding::LF)
                .expect("pkcs1 public key pem"),
            private_key,
        }
    }

    pub fn keypair() -> &'static TestKeypair {
        static KEYPAIR: OnceLock<TestKeypair> = OnceLock::new();
        KEYPAIR.get_or_init(generate)
    }

    pub fn other_keypair() -> &'static TestKeypair {
        static KEYPAIR: OnceLock<TestKeypair> = OnceLock::new();
        KEYPAIR.get_or_init(generate)
    }

    pub fn sign(keypair: &TestKeypair, message: &str) -> Vec<u8> {
        let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(keypair.private_key.clone());
        let mut rng = rand::thread_rng();
        signing_key
            .sign_with_rng(&mut rng, message.as_bytes())
            .to_vec()
    }
}
