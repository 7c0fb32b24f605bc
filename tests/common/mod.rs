//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use kotipat::federation::{ActorKey, KeyResolver, SignatureError};
use kotipat::{AppState, config};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Host every test server answers for
pub const FEDERATION_HOST: &str = "test.example.com";

/// Key of an identity local to the test server; its deposits are public
pub const LOCAL_KEY_ID: &str = "https://test.example.com/db/alice#main-key";

/// Key of an identity on another server
pub const REMOTE_KEY_ID: &str = "https://remote.example/users/bob#main-key";

/// Format a timestamp as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn generate_key() -> RsaPrivateKey {
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, 1024).unwrap()
}

fn shared_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

/// A signing actor
pub struct TestActor {
    pub key_id: String,
    private_key: RsaPrivateKey,
}

impl TestActor {
    /// Actor signing with the key the test resolver publishes
    pub fn new(key_id: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            private_key: shared_key().clone(),
        }
    }

    /// Actor claiming `key_id` but holding a different private key
    pub fn impostor(key_id: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            private_key: generate_key(),
        }
    }

    pub fn public_key_pem(&self) -> String {
        RsaPublicKey::from(&self.private_key)
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    /// Build a `Signature` header value over `(name, value)` pairs, in order
    pub fn signature_header(&self, signed: &[(&str, &str)]) -> String {
        let comparison_string = signed
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n");
        let names = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(" ");

        let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(self.private_key.clone());
        let mut rng = rand::thread_rng();
        let signature = signing_key
            .sign_with_rng(&mut rng, comparison_string.as_bytes())
            .to_vec();

        format!(
            r#"keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
            self.key_id,
            names,
            BASE64.encode(signature)
        )
    }
}

/// In-memory key resolver that counts lookups
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticKeyResolver {
    pub fn with_key(mut self, key_id: &str, public_key_pem: String) -> Self {
        self.keys.insert(key_id.to_string(), public_key_pem);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ActorKey, SignatureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .get(key_id)
            .map(|pem| ActorKey {
                key_id: key_id.to_string(),
                public_key_pem: pem.clone(),
            })
            .ok_or_else(|| SignatureError::Resolution(format!("unknown key {}", key_id)))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub resolver: Arc<StaticKeyResolver>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a test server that knows the local and remote test actors
    pub async fn new() -> Self {
        let pem = TestActor::new(LOCAL_KEY_ID).public_key_pem();
        let resolver = StaticKeyResolver::default()
            .with_key(LOCAL_KEY_ID, pem.clone())
            .with_key(REMOTE_KEY_ID, pem);
        Self::with_resolver(resolver).await
    }

    pub async fn with_resolver(resolver: StaticKeyResolver) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: FEDERATION_HOST.to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            federation: config::FederationConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let resolver = Arc::new(resolver);
        let state = AppState::with_key_resolver(config, resolver.clone())
            .await
            .unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = kotipat::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            resolver,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Deliver `body` to the inbox, signed by `actor` with a current date
    pub async fn deliver(&self, actor: &TestActor, body: &str) -> reqwest::Response {
        self.deliver_with(actor, body, FEDERATION_HOST, &http_date(Utc::now()))
            .await
    }

    /// Deliver with an explicit `Host` and `Date`, both covered by the signature
    pub async fn deliver_with(
        &self,
        actor: &TestActor,
        body: &str,
        host: &str,
        date: &str,
    ) -> reqwest::Response {
        let signature = actor.signature_header(&[
            ("(request-target)", "post /inbox"),
            ("host", host),
            ("date", date),
        ]);

        self.client
            .post(self.url("/inbox"))
            .header("Host", host)
            .header("Date", date)
            .header("Signature", signature)
            .header("Content-Type", "application/activity+json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }
}
