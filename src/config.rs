/// Kiosk configuration
///
/// Everything is read once at startup from environment variables
/// (optionally seeded from a `.env` file). There is no runtime settings UI.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::compositor::StripLayout;
use crate::error::ConfigError;

/// Default object-store namespace and filename prefix
pub const DEFAULT_NAMESPACE: &str = "diakonoel";

/// Timings of one capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Countdown before each shot, in whole seconds
    pub countdown_secs: u32,
    /// How long the flash overlay stays up
    pub flash: Duration,
    /// Pause between two shots
    pub shot_pause: Duration,
    /// Length of the simulated print
    pub print_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            flash: Duration::from_millis(180),
            shot_pause: Duration::from_millis(1000),
            print_delay: Duration::from_millis(2600),
        }
    }
}

/// Which webcam to open and the resolution to ask it for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    /// Device index as the OS enumerates it
    pub index: u32,
    /// Requested resolution; the device may pick the closest it supports
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
        }
    }
}

/// Credentials of the remote object store
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Web API key, used for the identity and token endpoints
    pub api_key: String,
    pub project_id: String,
    /// Storage bucket, e.g. `<project>.appspot.com`
    pub bucket: String,
}

// Keep the API key out of logs
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("project_id", &self.project_id)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct BoothConfig {
    /// Filename prefix and top-level folder in the object store
    pub namespace: String,
    /// Strip background; its pixel size is the size of every strip
    pub template_path: PathBuf,
    /// Where the four shots go on the template
    pub layout: StripLayout,
    pub timing: Timing,
    /// Countdown retries for a single shot when the camera has no frame yet
    pub capture_attempts: u32,
    pub camera: CameraSettings,
    /// Quality of the intermediate JPEG shots, 1 to 100
    pub jpeg_quality: u8,
    /// Where finished strips are saved when printing completes
    pub download_dir: PathBuf,
    /// `None` disables publishing; the QR area then reports an error
    pub storage: Option<StorageConfig>,
}

impl BoothConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::info!("📄 Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let layout = match get("PHOTOBOOTH_LAYOUT") {
            Some(path) => StripLayout::from_json_file(PathBuf::from(path))?,
            None => StripLayout::default(),
        };

        let defaults = Timing::default();
        let timing = Timing {
            countdown_secs: parse_or(&get, "PHOTOBOOTH_COUNTDOWN_SECS", defaults.countdown_secs)?,
            flash: millis_or(&get, "PHOTOBOOTH_FLASH_MS", defaults.flash)?,
            shot_pause: millis_or(&get, "PHOTOBOOTH_SHOT_PAUSE_MS", defaults.shot_pause)?,
            print_delay: millis_or(&get, "PHOTOBOOTH_PRINT_MS", defaults.print_delay)?,
        };

        let camera_defaults = CameraSettings::default();
        let camera = CameraSettings {
            index: parse_or(&get, "PHOTOBOOTH_CAMERA_INDEX", camera_defaults.index)?,
            width: parse_or(&get, "PHOTOBOOTH_CAMERA_WIDTH", camera_defaults.width)?,
            height: parse_or(&get, "PHOTOBOOTH_CAMERA_HEIGHT", camera_defaults.height)?,
        };

        let capture_attempts: u32 = parse_or(&get, "PHOTOBOOTH_CAPTURE_ATTEMPTS", 3)?;
        if capture_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "PHOTOBOOTH_CAPTURE_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let jpeg_quality: u8 = parse_or(&get, "PHOTOBOOTH_JPEG_QUALITY", 95)?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "PHOTOBOOTH_JPEG_QUALITY",
                value: jpeg_quality.to_string(),
            });
        }

        let storage = match (
            get("PHOTOBOOTH_API_KEY"),
            get("PHOTOBOOTH_PROJECT_ID"),
            get("PHOTOBOOTH_STORAGE_BUCKET"),
        ) {
            (Some(api_key), Some(project_id), Some(bucket)) => Some(StorageConfig {
                api_key,
                project_id,
                bucket,
            }),
            _ => None,
        };

        Ok(Self {
            namespace: get("PHOTOBOOTH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            template_path: get("PHOTOBOOTH_TEMPLATE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets/template.png")),
            layout,
            timing,
            capture_attempts,
            camera,
            jpeg_quality,
            download_dir: get("PHOTOBOOTH_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_download_dir),
            storage,
        })
    }
}

/// The user's download folder, falling back to the data dir and then the cwd
fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::data_dir().map(|p| p.join("photobooth")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let millis = parse_or(get, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
