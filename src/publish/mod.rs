/// Publishing strips to the remote object store
///
/// The store client is constructed once and injected into a `Publisher`,
/// which keeps the anonymous identity for the kiosk's lifetime, renews its
/// short-lived token before it expires, and uploads each strip under a
/// date-partitioned key.

pub mod firebase;

pub use firebase::FirebaseStore;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::compositor::CompositeStrip;
use crate::error::PublishError;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Tokens this close to expiry are renewed before use
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Anonymous storage credential
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable anonymous user id; survives token refreshes
    pub user_id: String,
    /// Short-lived bearer token sent with uploads
    pub token: String,
    /// Long-lived token used to mint a new `token`
    pub refresh_token: String,
    pub expires_at: Instant,
}

impl Identity {
    /// True once the token is inside the refresh margin
    pub fn is_stale(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN >= self.expires_at
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// An object as the store reports it after upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Full object key, `<namespace>/<YYYYMMDD>/<filename>`
    pub path: String,
    pub download_token: Option<String>,
}

/// Result of a successful publish: where the strip lives and how to fetch it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Session filename, used by the UI to drop results for older strips
    pub filename: String,
    pub object_path: String,
    /// Public URL encoded into the QR code
    pub download_url: String,
}

/// Write-only view of the remote object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<Identity, PublishError>;

    /// Mint a fresh token for the same anonymous user
    async fn refresh(&self, identity: &Identity) -> Result<Identity, PublishError>;

    async fn upload(
        &self,
        identity: &Identity,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, PublishError>;

    async fn download_url(
        &self,
        identity: &Identity,
        object: &StoredObject,
    ) -> Result<String, PublishError>;
}

/// `<namespace>-<YYYYMMDD>-<HHmmss>.png` for a capture timestamp
pub fn session_filename(namespace: &str, captured_at: NaiveDateTime) -> String {
    format!("{}-{}.png", namespace, captured_at.format("%Y%m%d-%H%M%S"))
}

/// `<namespace>/<YYYYMMDD>/<filename>`
pub fn object_path(namespace: &str, date: NaiveDate, filename: &str) -> String {
    format!("{}/{}/{}", namespace, date.format("%Y%m%d"), filename)
}

pub struct Publisher {
    store: Option<Arc<dyn ObjectStore>>,
    /// Held across sign-in so concurrent publishes share one identity
    identity: Mutex<Option<Identity>>,
    namespace: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>) -> Self {
        Self {
            store: Some(store),
            identity: Mutex::new(None),
            namespace: namespace.into(),
        }
    }

    /// A publisher with no store; every publish fails with `NotConfigured`
    pub fn disabled(namespace: impl Into<String>) -> Self {
        Self {
            store: None,
            identity: Mutex::new(None),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn store(&self) -> Result<&Arc<dyn ObjectStore>, PublishError> {
        self.store.as_ref().ok_or(PublishError::NotConfigured)
    }

    /// A usable identity: the cached one, refreshed if close to expiry,
    /// or a new anonymous sign-in the first time
    pub async fn ensure_identity(&self) -> Result<Identity, PublishError> {
        let store = self.store()?;
        let mut cached = self.identity.lock().await;

        let identity = match cached.take() {
            Some(identity) if !identity.is_stale(Instant::now()) => identity,
            Some(stale) => renew(store.as_ref(), &stale).await?,
            None => {
                let identity = store.sign_in_anonymously().await?;
                tracing::info!("🔑 Signed in anonymously as {}", identity.user_id);
                identity
            }
        };

        *cached = Some(identity.clone());
        Ok(identity)
    }

    /// Replace an identity the store rejected, unless another caller already did
    async fn replace_identity(&self, rejected: &Identity) -> Result<Identity, PublishError> {
        let store = self.store()?;
        let mut cached = self.identity.lock().await;

        // Someone else renewed it while we were uploading
        if let Some(current) = cached.as_ref() {
            if current.token != rejected.token && !current.is_stale(Instant::now()) {
                return Ok(current.clone());
            }
        }

        let identity = renew(store.as_ref(), rejected).await?;
        *cached = Some(identity.clone());
        Ok(identity)
    }

    /// Upload a strip and resolve its public download URL
    ///
    /// Network and storage failures are not retried; a rejected token is
    /// renewed once and the upload repeated with the new one.
    pub async fn publish(
        &self,
        strip: &CompositeStrip,
        filename: &str,
        date: NaiveDate,
    ) -> Result<UploadRecord, PublishError> {
        let store = self.store()?;
        let mut identity = self.ensure_identity().await?;
        let path = object_path(&self.namespace, date, filename);

        tracing::info!("☁️  Uploading {} ({} KB)", path, strip.png.len() / 1024);
        let object = match store
            .upload(&identity, &path, strip.png.to_vec(), PNG_CONTENT_TYPE)
            .await
        {
            Err(PublishError::Unauthorized(reason)) => {
                tracing::warn!("⚠️  Storage rejected the token ({}), renewing", reason);
                identity = self.replace_identity(&identity).await?;
                store
                    .upload(&identity, &path, strip.png.to_vec(), PNG_CONTENT_TYPE)
                    .await?
            }
            other => other?,
        };
        let download_url = store.download_url(&identity, &object).await?;
        tracing::info!("✅ Published {}", path);

        Ok(UploadRecord {
            filename: filename.to_string(),
            object_path: path,
            download_url,
        })
    }
}

/// Refresh a token, falling back to a fresh anonymous sign-in
async fn renew(store: &dyn ObjectStore, stale: &Identity) -> Result<Identity, PublishError> {
    match store.refresh(stale).await {
        Ok(identity) => {
            tracing::info!("🔑 Refreshed token for {}", identity.user_id);
            Ok(identity)
        }
        Err(e) => {
            tracing::warn!("⚠️  Token refresh failed ({}), signing in again", e);
            let identity = store.sign_in_anonymously().await?;
            tracing::info!("🔑 Signed in anonymously as {}", identity.user_id);
            Ok(identity)
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("namespace", &self.namespace)
            .field("configured", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
