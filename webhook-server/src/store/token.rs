//! Bearer tokens for the Firestore REST API.
//!
//! Google access tokens live about an hour. Minted tokens are cached and
//! replaced shortly before they expire, or immediately after Firestore
//! rejects one. The emulator takes a fixed token, or none at all.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::StoreError;
use crate::config::FirestoreAuth;

/// OAuth scope covering Firestore document access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are replaced this long before their stated expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service account JSON key this client needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            StoreError::Credentials(format!("invalid key file {}: {e}", path.display()))
        })
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

enum Source {
    Fixed(Option<String>),
    Minted(Minter),
}

enum Minter {
    ServiceAccount {
        client_email: String,
        token_uri: String,
        signing_key: EncodingKey,
    },
    Metadata {
        url: String,
    },
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Hands out a valid bearer token per request.
pub struct TokenProvider {
    client: Client,
    source: Source,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    /// Build a provider. Service account keys are loaded and parsed here so a
    /// broken key fails at startup rather than on the first request.
    pub fn new(client: Client, auth: &FirestoreAuth) -> Result<Self, StoreError> {
        let source = match auth {
            FirestoreAuth::Emulator { token } => Source::Fixed(token.clone()),
            FirestoreAuth::ServiceAccount { key_path } => {
                let key = ServiceAccountKey::from_file(key_path)?;
                let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
                Source::Minted(Minter::ServiceAccount {
                    client_email: key.client_email,
                    token_uri: key.token_uri,
                    signing_key,
                })
            }
            FirestoreAuth::Metadata { host } => Source::Minted(Minter::Metadata {
                url: format!(
                    "http://{host}/computeMetadata/v1/instance/service-accounts/default/token"
                ),
            }),
        };

        Ok(Self {
            client,
            source,
            cached: RwLock::new(None),
        })
    }

    /// A token for the next request, minting a new one when needed.
    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        let minter = match &self.source {
            Source::Fixed(token) => return Ok(token.clone()),
            Source::Minted(minter) => minter,
        };

        {
            let cached = self.cached.read().await;
            if let Some(token) = fresh(&cached) {
                return Ok(Some(token));
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = fresh(&cached) {
            return Ok(Some(token));
        }

        let minted = minter.fetch(&self.client).await?;
        let lifetime = Duration::from_secs(minted.expires_in);

        info!(
            source = minter.kind(),
            expires_in_secs = minted.expires_in,
            "firestore_token_refreshed"
        );

        *cached = Some(CachedToken {
            value: minted.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });

        Ok(Some(minted.access_token))
    }

    /// Drop the cached token so the next call mints a new one.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        if cached.take().is_some() {
            warn!("firestore_token_invalidated");
        }
    }
}

impl Minter {
    fn kind(&self) -> &'static str {
        match self {
            Minter::ServiceAccount { .. } => "service_account",
            Minter::Metadata { .. } => "metadata",
        }
    }

    async fn fetch(&self, client: &Client) -> Result<TokenResponse, StoreError> {
        let response = match self {
            Minter::ServiceAccount {
                client_email,
                token_uri,
                signing_key,
            } => {
                let now = Utc::now().timestamp();
                let claims = AssertionClaims {
                    iss: client_email,
                    scope: DATASTORE_SCOPE,
                    aud: token_uri,
                    iat: now,
                    exp: now + ASSERTION_LIFETIME_SECS,
                };
                let assertion = encode(&Header::new(Algorithm::RS256), &claims, signing_key)?;

                client
                    .post(token_uri)
                    .form(&[
                        ("grant_type", JWT_BEARER_GRANT),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await?
            }
            Minter::Metadata { url } => {
                client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
            }
        };

        read_token(response).await
    }
}

fn fresh(cached: &Option<CachedToken>) -> Option<String> {
    cached
        .as_ref()
        .filter(|c| Instant::now() < c.refresh_at)
        .map(|c| c.value.clone())
}

async fn read_token(response: Response) -> Result<TokenResponse, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status_code = status.as_u16(), "firestore_token_request_failed");
        return Err(StoreError::TokenStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/service_account_key.pem");
    const METADATA_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        json!({ "access_token": token, "expires_in": expires_in, "token_type": "Bearer" })
    }

    fn metadata_provider(server: &MockServer) -> TokenProvider {
        TokenProvider::new(
            Client::new(),
            &FirestoreAuth::Metadata {
                host: server.address().to_string(),
            },
        )
        .unwrap()
    }

    fn write_key_file(name: &str, token_uri: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("storebot-{}-{name}.json", std::process::id()));
        let key = json!({
            "type": "service_account",
            "client_email": "storebot@demo-project.iam.gserviceaccount.com",
            "private_key": TEST_KEY_PEM,
            "token_uri": token_uri
        });
        std::fs::write(&path, key.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_emulator_token_is_fixed() {
        let provider = TokenProvider::new(
            Client::new(),
            &FirestoreAuth::Emulator {
                token: Some("owner".to_string()),
            },
        )
        .unwrap();
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("owner"));

        let anonymous =
            TokenProvider::new(Client::new(), &FirestoreAuth::Emulator { token: None }).unwrap();
        assert_eq!(anonymous.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .and(header("metadata-flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ya29.first", 3599)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = metadata_provider(&server);
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.first"));
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.first"));
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ya29.short", 30)))
            .expect(2)
            .mount(&server)
            .await;

        let provider = metadata_provider(&server);
        provider.token().await.unwrap();
        provider.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ya29.tok", 3599)))
            .expect(2)
            .mount(&server)
            .await;

        let provider = metadata_provider(&server);
        provider.token().await.unwrap();
        provider.invalidate().await;
        provider.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_endpoint_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no service account"))
            .mount(&server)
            .await;

        let err = metadata_provider(&server).token().await.unwrap_err();
        assert!(matches!(err, StoreError::TokenStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_service_account_jwt_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
            ))
            .and(body_string_contains("assertion="))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ya29.sa", 3599)))
            .expect(1)
            .mount(&server)
            .await;

        let key_path = write_key_file("grant", &format!("{}/token", server.uri()));
        let provider = TokenProvider::new(
            Client::new(),
            &FirestoreAuth::ServiceAccount {
                key_path: key_path.display().to_string(),
            },
        )
        .unwrap();

        assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.sa"));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let assertion = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("assertion="))
            .unwrap();
        let jwt_header = jsonwebtoken::decode_header(assertion).unwrap();
        assert_eq!(jwt_header.alg, Algorithm::RS256);

        std::fs::remove_file(key_path).ok();
    }

    #[test]
    fn test_missing_key_file() {
        let result = TokenProvider::new(
            Client::new(),
            &FirestoreAuth::ServiceAccount {
                key_path: "/nonexistent/storebot/key.json".to_string(),
            },
        );
        assert!(matches!(result, Err(StoreError::Credentials(_))));
    }

    #[test]
    fn test_key_file_defaults_token_uri() {
        let path = std::env::temp_dir().join(format!("storebot-{}-nouri.json", std::process::id()));
        std::fs::write(
            &path,
            json!({ "client_email": "a@b.iam.gserviceaccount.com", "private_key": TEST_KEY_PEM })
                .to_string(),
        )
        .unwrap();

        let key = ServiceAccountKey::from_file(&path).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);

        std::fs::remove_file(path).ok();
    }
}
