/// Live webcam feed
///
/// The camera is opened once on a dedicated thread and kept streaming for
/// the lifetime of the kiosk. The thread keeps only the most recent frame;
/// the UI preview and the capturer both read it. `release()` stops the
/// stream and joins the thread.

use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
    Camera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::VideoFeed;
use crate::config::CameraSettings;
use crate::error::CaptureError;

#[derive(Default)]
struct FeedShared {
    latest: Mutex<Option<RgbImage>>,
    stop: AtomicBool,
}

/// Handle to the streaming webcam; clones share the same stream
#[derive(Clone)]
pub struct LiveFeed {
    shared: Arc<FeedShared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// What the device actually delivers, which may differ from the request
    resolution: (u32, u32),
}

impl LiveFeed {
    /// Open the camera and start streaming
    ///
    /// Blocks until the device either streams or reports an error, so call
    /// it from a blocking task.
    pub fn open(settings: CameraSettings) -> Result<Self, CaptureError> {
        let shared = Arc::new(FeedShared::default());
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || stream_camera(settings, thread_shared, ready_tx))
            .map_err(|e| CaptureError::CameraUnavailable(format!("spawn camera thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(resolution)) => {
                tracing::info!(
                    "📷 Camera {} streaming at {}x{}",
                    settings.index,
                    resolution.0,
                    resolution.1
                );
                Ok(Self {
                    shared,
                    worker: Arc::new(Mutex::new(Some(worker))),
                    resolution,
                })
            }
            Ok(Err(reason)) => {
                let _ = worker.join();
                Err(CaptureError::CameraUnavailable(reason))
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::CameraUnavailable(
                    "camera thread exited before streaming".to_string(),
                ))
            }
        }
    }
}

impl VideoFeed for LiveFeed {
    fn current_frame(&self) -> Option<RgbImage> {
        self.shared.latest.lock().ok()?.clone()
    }

    fn release(&self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                tracing::warn!("⚠️  Camera thread panicked during shutdown");
            }
            tracing::info!("📷 Camera released");
        }
    }
}

impl std::fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeed")
            .field("resolution", &self.resolution)
            .field("stopped", &self.shared.stop.load(Ordering::Relaxed))
            .finish()
    }
}

/// Camera thread body: open, report readiness, keep the latest frame
fn stream_camera(
    settings: CameraSettings,
    shared: Arc<FeedShared>,
    ready: mpsc::Sender<Result<(u32, u32), String>>,
) {
    let format = CameraFormat::new(
        Resolution::new(settings.width, settings.height),
        FrameFormat::YUYV,
        30,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

    let mut camera = match Camera::new(CameraIndex::Index(settings.index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(format!("open camera {}: {e}", settings.index)));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(format!("start stream: {e}")));
        return;
    }

    let actual = camera.resolution();
    let _ = ready.send(Ok((actual.width(), actual.height())));

    while !shared.stop.load(Ordering::Relaxed) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("⚠️  Camera frame error: {e}");
                thread::sleep(Duration::from_millis(50));
                continue;
            }
        };

        let decoded = match buffer.decode_image::<RgbFormat>() {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("⚠️  Camera frame decode error: {e}");
                continue;
            }
        };

        let (width, height) = decoded.dimensions();
        let frame = RgbImage::from_raw(width, height, decoded.into_raw());
        if let Ok(mut latest) = shared.latest.lock() {
            *latest = frame;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("⚠️  Failed to stop camera stream: {e}");
    }
}
