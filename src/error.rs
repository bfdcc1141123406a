/// Error types for every stage of a photobooth session
///
/// Each stage owns its error enum so the session controller can decide
/// how a failure is surfaced:
/// - `CaptureError` / `CompositeError` abort the session with a blocking alert
/// - `PublishError` only reaches the QR area
/// - `SaveError` is logged and shown next to the printed strip

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be read from the environment or layout file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read layout file {path}: {source}")]
    LayoutRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse layout file {path}: {source}")]
    LayoutParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("layout defines {slots} slots, expected {expected}")]
    SlotCount { slots: usize, expected: usize },

    #[error("slot {index} has an empty rectangle")]
    EmptySlot { index: usize },
}

/// Camera and frame capture failures
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("camera frame not ready (zero width or height)")]
    FrameNotReady,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Strip compositing failures; any of these means no strip is produced
#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("failed to load template {path}: {reason}")]
    Template { path: PathBuf, reason: String },

    #[error("shot {index} could not be decoded: {reason}")]
    ShotDecode { index: usize, reason: String },

    #[error("expected {expected} shots, got {actual}")]
    ShotCount { expected: usize, actual: usize },

    #[error("slot {index} lies outside the template")]
    SlotOutOfBounds { index: usize },

    #[error("failed to encode strip: {0}")]
    Encode(String),

    #[error("compositing task failed: {0}")]
    Task(String),
}

impl CompositeError {
    /// Template problems are asset errors: the kiosk itself is misconfigured
    pub fn is_asset_error(&self) -> bool {
        matches!(self, CompositeError::Template { .. } | CompositeError::SlotOutOfBounds { .. })
    }
}

/// Upload and URL resolution failures, shown inline in the QR area
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cloud storage is not configured")]
    NotConfigured,

    #[error("anonymous sign-in failed: {0}")]
    Identity(String),

    #[error("upload failed: {0}")]
    Upload(String),

    /// The store refused the identity token (expired or revoked)
    #[error("storage rejected the identity token: {0}")]
    Unauthorized(String),

    #[error("could not resolve download URL: {0}")]
    DownloadUrl(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Local copy of the strip could not be written
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
