//! ActivityPub federation module
//!
//! Handles:
//! - HTTP Signature verification of inbound deliveries
//! - Actor public key resolution
//! - WebFinger

mod key_resolver;
mod signature;
mod verifier;
mod webfinger;

pub use key_resolver::{ActorKey, HttpKeyResolver, KeyResolver, extract_public_key_pem};
pub use signature::{
    MAX_CLOCK_SKEW_SECONDS, REQUEST_TARGET, REQUIRED_SIGNED_HEADERS, SignatureError,
    SignatureHeader, build_comparison_string, check_freshness, parse_http_date,
    parse_signature_header, verify_signature,
};
pub use verifier::{
    AuthenticatedIdentity, InboundRequest, Rejection, SignatureVerifier, VerificationStage,
};
pub use webfinger::{
    WebFingerLink, WebFingerResponse, generate_webfinger_response, parse_acct_resource,
};
