/// Session controller
///
/// Runs one photobooth session at a time:
/// countdown → flash + capture → pause, once per slot, then compositing,
/// then printing and publishing side by side.
///
/// The controller is an actor: it owns the camera feed, the print simulator
/// and the publisher, takes `SessionCommand`s and reports everything as
/// `SessionEvent`s. Publish results never touch the print path.

pub mod events;

pub use events::{Phase, SessionCommand, SessionEvent, SessionHandle, StartRejection};

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capture::{CapturedFrame, Sequencer, VideoFeed};
use crate::compositor::{self, CompositeStrip, StripLayout};
use crate::config::{BoothConfig, Timing};
use crate::download::save_strip;
use crate::error::{CaptureError, CompositeError};
use crate::print::{PrintSimulator, PrintState};
use crate::publish::{session_filename, Publisher};
use events::emit;

/// Transient state of one run
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// Shots taken so far, in slot order
    pub frames: Vec<CapturedFrame>,
    pub phase: Phase,
    /// Local time the session started; names the file and its date folder
    pub captured_at: NaiveDateTime,
    /// `<namespace>-<YYYYMMDD>-<HHmmss>.png`
    pub filename: String,
}

impl CaptureSession {
    fn new(namespace: &str, captured_at: NaiveDateTime) -> Self {
        Self {
            frames: Vec::new(),
            phase: Phase::Idle,
            captured_at,
            filename: session_filename(namespace, captured_at),
        }
    }

    /// Date folder of the object key, always the filename's date
    pub fn date(&self) -> NaiveDate {
        self.captured_at.date()
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub struct SessionController {
    feed: Option<Arc<dyn VideoFeed>>,
    sequencer: Sequencer,
    timing: Timing,
    capture_attempts: u32,
    template_path: PathBuf,
    layout: StripLayout,
    download_dir: PathBuf,
    publisher: Arc<Publisher>,
    printer: PrintSimulator,
    session: Option<CaptureSession>,
    publish_task: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Source of session timestamps
    clock: fn() -> NaiveDateTime,
}

impl SessionController {
    /// `feed` is `None` when the camera could not be opened
    pub fn new(
        config: &BoothConfig,
        feed: Option<Arc<dyn VideoFeed>>,
        publisher: Arc<Publisher>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            feed,
            sequencer: Sequencer::new(&config.timing, config.jpeg_quality),
            timing: config.timing,
            capture_attempts: config.capture_attempts,
            template_path: config.template_path.clone(),
            layout: config.layout.clone(),
            download_dir: config.download_dir.clone(),
            publisher,
            printer: PrintSimulator::new(config.timing.print_delay),
            session: None,
            publish_task: None,
            events,
            clock: local_now,
        }
    }

    #[cfg(test)]
    pub fn print_state(&self) -> PrintState {
        self.printer.state()
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Process commands until `Shutdown` or until every sender is gone
    ///
    /// A `Start` arriving while a session runs is rejected immediately.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        let events = self.events.clone();

        'commands: while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::Start => {
                    let session = self.start_session();
                    tokio::pin!(session);
                    loop {
                        tokio::select! {
                            outcome = &mut session => {
                                if let Err(rejection) = outcome {
                                    tracing::info!("🚫 Start rejected: {}", rejection);
                                    emit(&events, SessionEvent::Rejected(rejection));
                                }
                                break;
                            }
                            Some(command) = commands.recv() => match command {
                                // One session at a time; the running one keeps going
                                SessionCommand::Start => {
                                    emit(&events, SessionEvent::Rejected(StartRejection::CaptureInProgress));
                                }
                                SessionCommand::Shutdown => break 'commands,
                            },
                        }
                    }
                }
                SessionCommand::Shutdown => break,
            }
        }

        self.shutdown();
    }

    /// Entry guard: camera ready and nothing printing
    pub fn check_can_start(&self) -> Result<(), StartRejection> {
        if self.feed.is_none() {
            return Err(StartRejection::CameraUnavailable);
        }
        if self.printer.is_printing() {
            return Err(StartRejection::PrintInProgress);
        }
        Ok(())
    }

    /// Run one full session; returns once the strip is handed to the
    /// printer and the publisher (or the session was aborted)
    pub async fn start_session(&mut self) -> Result<(), StartRejection> {
        self.check_can_start()?;
        let feed = match &self.feed {
            Some(feed) => Arc::clone(feed),
            None => return Err(StartRejection::CameraUnavailable),
        };

        self.reset_session();

        match self.capture_all(feed.as_ref()).await {
            Ok(frames) => self.finish_session(frames).await,
            Err(e) => {
                tracing::error!("❌ Capture failed: {}", e);
                self.abort_session(format!("The camera did not deliver a picture ({e}). Please try again."));
            }
        }
        Ok(())
    }

    /// Fresh per-session state; the print animation goes back to idle
    fn reset_session(&mut self) {
        self.printer.reset();
        emit(&self.events, SessionEvent::Print(PrintState::Idle));

        let session = CaptureSession::new(self.publisher.namespace(), (self.clock)());
        tracing::info!("🎬 Session started: {}", session.filename);
        emit(
            &self.events,
            SessionEvent::SessionStarted {
                filename: session.filename.clone(),
            },
        );
        self.session = Some(session);
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(session) = self.session.as_mut() {
            session.phase = phase;
        }
        emit(&self.events, SessionEvent::Phase(phase));
    }

    async fn capture_all(&mut self, feed: &dyn VideoFeed) -> Result<Vec<CapturedFrame>, CaptureError> {
        let total = self.layout.slots().len();
        let mut frames = Vec::with_capacity(total);

        for index in 0..total {
            // A round only fails once the camera has used up its attempts
            let frame = self.capture_round(feed, index).await?;
            frames.push(frame.clone());
            if let Some(session) = self.session.as_mut() {
                session.frames.push(frame);
            }
            emit(&self.events, SessionEvent::ShotCaptured { index, total });

            // No pause after the last shot
            if index + 1 < total {
                tokio::time::sleep(self.timing.shot_pause).await;
            }
        }
        Ok(frames)
    }

    /// Countdown and flash for one shot, repeated while the camera has no frame
    async fn capture_round(&mut self, feed: &dyn VideoFeed, index: usize) -> Result<CapturedFrame, CaptureError> {
        let events = self.events.clone();
        let mut attempt = 1;
        loop {
            self.set_phase(Phase::Counting);
            self.sequencer
                .countdown(|n| emit(&events, SessionEvent::Countdown(n)))
                .await;

            self.set_phase(Phase::Flashing);
            let result = self
                .sequencer
                .flash_capture(feed, |on| emit(&events, SessionEvent::Flash(on)))
                .await;

            match result {
                Err(CaptureError::FrameNotReady) if attempt < self.capture_attempts => {
                    tracing::warn!("⚠️  Shot {} not ready, retrying (attempt {})", index + 1, attempt);
                    emit(&events, SessionEvent::ShotRetry { index, attempt });
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Composite the shots, then print and publish
    ///
    /// Any compositing failure aborts the session without a strip.
    pub async fn finish_session(&mut self, frames: Vec<CapturedFrame>) {
        self.set_phase(Phase::Compositing);

        let result = compositor::composite(self.template_path.clone(), frames, self.layout.clone()).await;
        match result {
            Ok(strip) => {
                emit(&self.events, SessionEvent::Composited(strip.clone()));
                // Print and publish carry on as background tasks, the
                // controller is free for the next session
                self.start_print(strip.clone());
                self.spawn_publish(strip);
                self.set_phase(Phase::Idle);
            }
            Err(e) => {
                tracing::error!("❌ Compositing failed: {}", e);
                self.abort_session(composite_alert(&e));
            }
        }
    }

    fn abort_session(&mut self, message: String) {
        emit(&self.events, SessionEvent::Alert(message));
        if let Some(session) = self.session.as_mut() {
            session.frames.clear();
        }
        self.set_phase(Phase::Idle);
    }

    /// Filename and date folder of the current session
    fn stamp(&self) -> (String, NaiveDate) {
        match &self.session {
            Some(session) => (session.filename.clone(), session.date()),
            None => {
                let now = (self.clock)();
                (session_filename(self.publisher.namespace(), now), now.date())
            }
        }
    }

    fn start_print(&mut self, strip: CompositeStrip) {
        let events = self.events.clone();
        let dir = self.download_dir.clone();
        let (filename, _) = self.stamp();

        emit(&events, SessionEvent::Print(PrintState::Printing));
        self.printer.start(async move {
            emit(&events, SessionEvent::Print(PrintState::Done));
            match save_strip(&dir, &filename, &strip).await {
                Ok(path) => emit(&events, SessionEvent::Saved(path)),
                Err(e) => {
                    tracing::warn!("⚠️  {}", e);
                    emit(&events, SessionEvent::SaveFailed(e.to_string()));
                }
            }
        });
    }

    fn spawn_publish(&mut self, strip: CompositeStrip) {
        let events = self.events.clone();
        let publisher = Arc::clone(&self.publisher);
        let (filename, date) = self.stamp();

        emit(
            &events,
            SessionEvent::Publishing {
                filename: filename.clone(),
            },
        );
        // A previous upload may still be running; it is left to finish
        self.publish_task = Some(tokio::spawn(async move {
            match publisher.publish(&strip, &filename, date).await {
                Ok(record) => emit(&events, SessionEvent::Published(record)),
                Err(e) => {
                    tracing::warn!("⚠️  Publish of {} failed: {}", filename, e);
                    emit(
                        &events,
                        SessionEvent::PublishFailed {
                            filename,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }));
    }

    /// Abort timers and in-flight uploads and release the camera
    pub fn shutdown(&mut self) {
        // A strip already being saved is allowed to finish
        self.printer.cancel();
        if let Some(task) = self.publish_task.take() {
            task.abort();
        }
        if let Some(feed) = self.feed.take() {
            feed.release();
        }
        self.session = None;
        tracing::info!("👋 Session controller stopped");
    }
}

fn composite_alert(error: &CompositeError) -> String {
    if error.is_asset_error() {
        format!("The photo strip template is unavailable: {error}")
    } else {
        format!("Your photos could not be put together ({error}). Please try again.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::tests::{split_frame, StillFeed};
    use crate::compositor::tests::solid_frame;
    use crate::compositor::PhotoSlot;
    use crate::publish::tests::MemoryStore;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        controller: SessionController,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        _dir: tempfile::TempDir,
        template_path: PathBuf,
        download_dir: PathBuf,
    }

    fn harness(feed: Option<Arc<dyn VideoFeed>>, store: Arc<MemoryStore>, attempts: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.png");
        write_template(&template_path);
        let download_dir = dir.path().join("downloads");

        let layout = StripLayout::new(vec![
            PhotoSlot::new(5, 5, 50, 40),
            PhotoSlot::new(5, 50, 50, 40),
            PhotoSlot::new(5, 95, 50, 40),
            PhotoSlot::new(5, 140, 50, 40),
        ])
        .unwrap();

        let mut config = BoothConfig::from_lookup(|_| None).unwrap();
        config.template_path = template_path.clone();
        config.layout = layout;
        config.download_dir = download_dir.clone();
        config.capture_attempts = attempts;
        config.timing = Timing {
            countdown_secs: 2,
            flash: Duration::from_millis(180),
            shot_pause: Duration::from_millis(500),
            print_delay: Duration::from_millis(2600),
        };

        let publisher = Arc::new(Publisher::new(store, "diakonoel"));
        let (tx, rx) = mpsc::unbounded_channel();
        Harness {
            controller: SessionController::new(&config, feed, publisher, tx),
            events: rx,
            _dir: dir,
            template_path,
            download_dir,
        }
    }

    fn write_template(path: &std::path::Path) {
        RgbaImage::from_pixel(60, 200, Rgba([255, 255, 255, 255]))
            .save(path)
            .unwrap();
    }

    fn camera() -> Option<Arc<dyn VideoFeed>> {
        Some(Arc::new(StillFeed::new(Some(split_frame(80, 60)))))
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Receive until both the print finished (saved or not) and the publish settled
    async fn until_settled(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        let (mut saved, mut published) = (false, false);
        while !(saved && published) {
            let event = events.recv().await.unwrap();
            match &event {
                SessionEvent::Saved(_) | SessionEvent::SaveFailed(_) => saved = true,
                SessionEvent::Published(_) | SessionEvent::PublishFailed { .. } => published = true,
                _ => {}
            }
            out.push(event);
        }
        out
    }

    fn print_states(events: &[SessionEvent]) -> Vec<PrintState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Print(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_prints_saves_and_publishes() {
        let store = Arc::new(MemoryStore::default());
        let mut h = harness(camera(), store.clone(), 3);

        h.controller.start_session().await.unwrap();
        let composited_at = Instant::now();
        let mut events = drain(&mut h.events);

        // Four rounds of 2, 1 countdowns with a flash each
        let countdowns: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Countdown(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, vec![2, 1, 2, 1, 2, 1, 2, 1]);
        let shots = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ShotCaptured { total: 4, .. }))
            .count();
        assert_eq!(shots, 4);
        let strip = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Composited(strip) => Some(strip.clone()),
                _ => None,
            })
            .expect("strip composited");
        assert_eq!((strip.width, strip.height), (60, 200));
        assert_eq!(h.controller.print_state(), PrintState::Printing);
        assert_eq!(h.controller.session().unwrap().phase, Phase::Idle);

        events.extend(until_settled(&mut h.events).await);
        assert_eq!(
            print_states(&events),
            vec![PrintState::Idle, PrintState::Printing, PrintState::Done]
        );

        let filename = h.controller.session().unwrap().filename.clone();
        assert!(filename.starts_with("diakonoel-") && filename.ends_with(".png"));
        assert_eq!(filename.len(), "diakonoel-YYYYMMDD-HHmmss.png".len());

        let saved: Vec<&PathBuf> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Saved(path) => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(saved, vec![&h.download_dir.join(&filename)]);
        assert!(saved[0].exists());

        let record = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Published(record) => Some(record.clone()),
                _ => None,
            })
            .expect("published");
        assert!(record.object_path.starts_with("diakonoel/"));
        assert!(record.object_path.ends_with(&format!("/{}", filename)));
        assert_eq!(store.uploads.lock().unwrap().len(), 1);

        // The print finishes on its own timer, about 2.6 s after compositing
        let elapsed = composited_at.elapsed();
        assert!(elapsed >= Duration::from_millis(2600), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3000), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_does_not_stop_printing() {
        let store = Arc::new(MemoryStore::failing());
        let mut h = harness(camera(), store, 3);

        h.controller.start_session().await.unwrap();
        let events = until_settled(&mut h.events).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::PublishFailed { reason, .. } if reason.contains("simulated"))));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Saved(_))));
        assert_eq!(h.controller.print_state(), PrintState::Done);
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Alert(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_unavailable_never_counts_down() {
        let mut h = harness(None, Arc::new(MemoryStore::default()), 3);

        let result = h.controller.start_session().await;

        assert_eq!(result, Err(StartRejection::CameraUnavailable));
        let events = drain(&mut h.events);
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Countdown(_))));
        assert!(h.controller.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cannot_start_while_printing() {
        let mut h = harness(camera(), Arc::new(MemoryStore::default()), 3);

        h.controller.start_session().await.unwrap();
        assert_eq!(
            h.controller.start_session().await,
            Err(StartRejection::PrintInProgress)
        );

        until_settled(&mut h.events).await;
        assert_eq!(h.controller.check_can_start(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_shot_aborts_and_allows_retry() {
        let mut h = harness(camera(), Arc::new(MemoryStore::default()), 3);
        h.controller.reset_session();

        let mut frames: Vec<_> = (0..4).map(|_| solid_frame(40, 30, [0, 128, 0])).collect();
        frames[1].jpeg.truncate(10);
        h.controller.finish_session(frames).await;

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Alert(_))));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Composited(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::Print(PrintState::Printing))));
        assert_eq!(h.controller.session().unwrap().phase, Phase::Idle);
        assert_eq!(h.controller.check_can_start(), Ok(()));

        // A new session still works afterwards
        h.controller.start_session().await.unwrap();
        let events = until_settled(&mut h.events).await;
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Saved(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_frames_retry_then_alert() {
        let feed: Option<Arc<dyn VideoFeed>> = Some(Arc::new(StillFeed::new(None)));
        let mut h = harness(feed, Arc::new(MemoryStore::default()), 2);

        h.controller.start_session().await.unwrap();
        let events = drain(&mut h.events);

        let retries = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ShotRetry { index: 0, attempt: 1 }))
            .count();
        assert_eq!(retries, 1);
        let countdown_rounds = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Countdown(2)))
            .count();
        assert_eq!(countdown_rounds, 2);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Alert(_))));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Composited(_))));
        assert_eq!(h.controller.check_can_start(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actor_rejects_start_during_capture() {
        let h = harness(camera(), Arc::new(MemoryStore::default()), 3);
        let mut events = h.events;
        let (commands, rx) = mpsc::unbounded_channel();
        let actor = tokio::spawn(h.controller.run(rx));

        commands.send(SessionCommand::Start).unwrap();
        commands.send(SessionCommand::Start).unwrap();

        let mut seen = Vec::new();
        let (mut rejected, mut settled) = (false, false);
        while !(rejected && settled) {
            let event = events.recv().await.unwrap();
            match &event {
                SessionEvent::Rejected(StartRejection::CaptureInProgress) => rejected = true,
                SessionEvent::Saved(_) => settled = true,
                _ => {}
            }
            seen.push(event);
        }
        let sessions = seen
            .iter()
            .filter(|e| matches!(e, SessionEvent::SessionStarted { .. }))
            .count();
        assert_eq!(sessions, 1);

        commands.send(SessionCommand::Shutdown).unwrap();
        actor.await.unwrap();
    }

    fn christmas_eve_midnight() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 24)
            .unwrap()
            .and_hms_opt(23, 59, 55)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_object_key_uses_the_session_date_across_midnight() {
        let store = Arc::new(MemoryStore::default());
        let mut h = harness(camera(), store.clone(), 3);
        h.controller.clock = christmas_eve_midnight;

        // Four rounds take well past 23:59:59 before the upload starts
        h.controller.start_session().await.unwrap();
        let events = until_settled(&mut h.events).await;

        let record = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Published(record) => Some(record.clone()),
                _ => None,
            })
            .expect("published");
        assert_eq!(record.filename, "diakonoel-20241224-235955.png");
        assert_eq!(
            record.object_path,
            "diakonoel/20241224/diakonoel-20241224-235955.png"
        );
        assert_eq!(
            h.controller.session().unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 12, 24).unwrap()
        );
        assert_eq!(store.uploads.lock().unwrap()[0].0, record.object_path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_start_is_reported_without_a_phase() {
        let mut h = harness(camera(), Arc::new(MemoryStore::default()), 3);
        h.controller.clock = christmas_eve_midnight;

        h.controller.start_session().await.unwrap();
        let events = drain(&mut h.events);

        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Publishing { filename } if filename == "diakonoel-20241224-235955.png"
        )));
        let last_phase = events.iter().rev().find_map(|e| match e {
            SessionEvent::Phase(phase) => Some(*phase),
            _ => None,
        });
        assert_eq!(last_phase, Some(Phase::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_template_alerts_then_allows_restart() {
        let mut h = harness(camera(), Arc::new(MemoryStore::default()), 3);
        std::fs::remove_file(&h.template_path).unwrap();

        h.controller.start_session().await.unwrap();
        let events = drain(&mut h.events);

        let alert = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Alert(message) => Some(message.clone()),
                _ => None,
            })
            .expect("alert raised");
        assert!(alert.contains("template"), "alert: {}", alert);
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Composited(_))));
        assert_eq!(h.controller.print_state(), PrintState::Idle);
        assert_eq!(h.controller.check_can_start(), Ok(()));

        // Once the asset is back the booth works again
        write_template(&h.template_path);
        h.controller.start_session().await.unwrap();
        let events = until_settled(&mut h.events).await;
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Saved(_))));
    }
}
