/// Messages between the session controller and the kiosk UI

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::capture::VideoFeed;
use crate::compositor::CompositeStrip;
use crate::print::PrintState;
use crate::publish::UploadRecord;

/// What the controller is doing right now
///
/// Printing and uploading run in the background once the strip exists, so
/// they are reported through their own events rather than as a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ready for a new session
    Idle,
    Counting,
    Flashing,
    Compositing,
}

/// Why a start request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    CameraUnavailable,
    CaptureInProgress,
    PrintInProgress,
}

impl std::fmt::Display for StartRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::CameraUnavailable => "camera is not available",
            Self::CaptureInProgress => "a capture is already running",
            Self::PrintInProgress => "the previous strip is still printing",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Shutdown,
}

/// Given to the UI once the controller is running
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    feed: Option<Arc<dyn VideoFeed>>,
    print_delay: Duration,
}

impl SessionHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<SessionCommand>,
        feed: Option<Arc<dyn VideoFeed>>,
        print_delay: Duration,
    ) -> Self {
        Self {
            commands,
            feed,
            print_delay,
        }
    }

    /// Ask for a new session; the answer arrives as events
    pub fn start(&self) {
        if self.commands.send(SessionCommand::Start).is_err() {
            tracing::warn!("⚠️  Session controller is gone");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }

    /// Live feed for the preview, `None` when the camera failed to open
    pub fn feed(&self) -> Option<&Arc<dyn VideoFeed>> {
        self.feed.as_ref()
    }

    /// How long the simulated print takes, for the progress animation
    pub fn print_delay(&self) -> Duration {
        self.print_delay
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("camera", &self.feed.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Controller is up; the UI can start sending commands
    Ready(SessionHandle),
    /// Camera could not be opened; no session can ever start
    CameraUnavailable(String),
    SessionStarted { filename: String },
    Phase(Phase),
    /// Visible countdown value before the next shot
    Countdown(u32),
    Flash(bool),
    ShotCaptured { index: usize, total: usize },
    /// The camera had no frame; the countdown for this shot runs again
    ShotRetry { index: usize, attempt: u32 },
    Composited(CompositeStrip),
    Print(PrintState),
    Saved(PathBuf),
    SaveFailed(String),
    /// Upload of this strip has started
    Publishing { filename: String },
    Published(UploadRecord),
    PublishFailed { filename: String, reason: String },
    /// Blocking, user-facing error
    Alert(String),
    Rejected(StartRejection),
}

/// Send an event to the UI; a closed channel only means the UI is gone
pub(crate) fn emit(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = events.send(event) {
        tracing::debug!("UI dropped event: {:?}", e.0);
    }
}
