/// Firebase-compatible object store over its REST endpoints
///
/// - Anonymous identity: identity toolkit `accounts:signUp`
/// - Token refresh: secure token `POST /token` with the refresh token
/// - Upload: storage `POST /b/{bucket}/o?name={path}` with the raw bytes
/// - Download URL: `/b/{bucket}/o/{encoded path}?alt=media&token={token}`

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use super::{Identity, ObjectStore, StoredObject};
use crate::config::StorageConfig;
use crate::error::PublishError;

const IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
const TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1";
const STORAGE_ENDPOINT: &str = "https://firebasestorage.googleapis.com/v0";

/// Lifetime assumed when the service omits or garbles `expiresIn`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
}

/// The secure token endpoint answers in snake_case
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

/// Token lifetime in seconds, sent as a string
fn token_lifetime(expires_in: Option<&str>) -> Duration {
    expires_in
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME)
}

/// Object metadata returned by upload and metadata requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

impl ObjectMetadata {
    /// Tokens come comma-separated; any of them grants access
    fn first_token(&self) -> Option<String> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
            .map(str::to_string)
    }
}

pub struct FirebaseStore {
    http: Client,
    api_key: String,
    bucket: String,
    identity_endpoint: String,
    token_endpoint: String,
    storage_endpoint: String,
}

impl FirebaseStore {
    pub fn new(config: &StorageConfig) -> Self {
        tracing::info!(
            "☁️  Storage: project {} bucket {}",
            config.project_id,
            config.bucket
        );
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
            identity_endpoint: IDENTITY_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            storage_endpoint: STORAGE_ENDPOINT.to_string(),
        }
    }

    /// `/b/{bucket}/o` collection URL
    fn objects_url(&self) -> Result<Url, String> {
        Url::parse(&format!("{}/b/{}/o", self.storage_endpoint, self.bucket)).map_err(|e| e.to_string())
    }

    /// URL of a single object; the whole path is one encoded segment
    fn object_url(&self, path: &str) -> Result<Url, String> {
        let mut url = self.objects_url()?;
        url.path_segments_mut()
            .map_err(|_| "storage endpoint cannot be a base URL".to_string())?
            .push(path);
        Ok(url)
    }

    /// Public, token-authorised URL of an object
    pub fn build_download_url(&self, path: &str, token: &str) -> Result<String, PublishError> {
        let mut url = self.object_url(path).map_err(PublishError::DownloadUrl)?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.into())
    }
}

/// Turn a non-2xx response into its status and body text
async fn expect_success(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("{}: {}", status, body.trim()))
}

#[async_trait]
impl ObjectStore for FirebaseStore {
    async fn sign_in_anonymously(&self) -> Result<Identity, PublishError> {
        let issued_at = Instant::now();
        let response = self
            .http
            .post(format!("{}/accounts:signUp", self.identity_endpoint))
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await?;
        let body: SignUpResponse = expect_success(response)
            .await
            .map_err(PublishError::Identity)?
            .json()
            .await?;

        Ok(Identity {
            user_id: body.local_id,
            token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: issued_at + token_lifetime(body.expires_in.as_deref()),
        })
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, PublishError> {
        let issued_at = Instant::now();
        let response = self
            .http
            .post(format!("{}/token", self.token_endpoint))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", identity.refresh_token.as_str()),
            ])
            .send()
            .await?;
        let body: RefreshResponse = expect_success(response)
            .await
            .map_err(PublishError::Identity)?
            .json()
            .await?;

        Ok(Identity {
            user_id: body.user_id,
            token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: issued_at + token_lifetime(body.expires_in.as_deref()),
        })
    }

    async fn upload(
        &self,
        identity: &Identity,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, PublishError> {
        let mut url = self.objects_url().map_err(PublishError::Upload)?;
        url.query_pairs_mut().append_pair("name", path);

        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, format!("Firebase {}", identity.token))
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        // An expired token is recoverable; the publisher renews it and retries
        if response.status() == StatusCode::UNAUTHORIZED {
            let reason = expect_success(response).await.err().unwrap_or_default();
            return Err(PublishError::Unauthorized(reason));
        }
        let metadata: ObjectMetadata = expect_success(response)
            .await
            .map_err(PublishError::Upload)?
            .json()
            .await?;

        Ok(StoredObject {
            download_token: metadata.first_token(),
            path: metadata.name,
        })
    }

    async fn download_url(
        &self,
        identity: &Identity,
        object: &StoredObject,
    ) -> Result<String, PublishError> {
        if let Some(token) = &object.download_token {
            return self.build_download_url(&object.path, token);
        }

        // Upload response carried no token; ask for the object's metadata
        let url = self.object_url(&object.path).map_err(PublishError::DownloadUrl)?;
        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, format!("Firebase {}", identity.token))
            .send()
            .await?;
        let metadata: ObjectMetadata = expect_success(response)
            .await
            .map_err(PublishError::DownloadUrl)?
            .json()
            .await?;

        let token = metadata
            .first_token()
            .ok_or_else(|| PublishError::DownloadUrl(format!("no download token for {}", object.path)))?;
        self.build_download_url(&object.path, &token)
    }
}
