use iced::time::{self, Instant};
use iced::widget::image::Handle;
use iced::widget::{
    button, center, column, container, image as picture, opaque, progress_bar, qr_code, row,
    stack, text, Space,
};
use iced::{window, Alignment, Color, ContentFit, Element, Length, Subscription, Task, Theme};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod capture;
mod compositor;
mod config;
mod download;
mod error;
mod print;
mod publish;
mod session;
mod ui;

use print::PrintState;
use session::{Phase, SessionEvent, SessionHandle};

const PREVIEW_INTERVAL: Duration = Duration::from_millis(66);
const ANIMATION_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq)]
enum CameraStatus {
    Starting,
    Ready,
    Unavailable(String),
}

/// What the QR panel shows for the current strip
enum ShareStatus {
    Empty,
    Uploading,
    Ready { url: String, code: qr_code::Data },
    Failed(String),
}

/// Kiosk screen state; the session itself lives in the controller task
struct Booth {
    /// Command channel to the controller, set once the worker is up
    handle: Option<SessionHandle>,
    camera: CameraStatus,
    /// Latest mirrored preview frame
    preview: Option<Handle>,
    phase: Phase,
    /// Number shown over the preview, `None` between countdowns
    countdown: Option<u32>,
    flashing: bool,
    /// Shots taken and shots per strip
    shots: (usize, usize),
    /// Non-blocking hint under the start button
    notice: Option<String>,
    /// Filename of the current session; older publish results are dropped
    filename: Option<String>,
    strip: Option<Handle>,
    print: PrintState,
    print_started: Option<Instant>,
    /// Animation clock, advanced by the tick subscription
    now: Instant,
    /// Where the local copy went, or why it failed
    saved: Option<String>,
    share: ShareStatus,
    /// Blocking message; the start button stays hidden until dismissed
    alert: Option<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Session(SessionEvent),
    StartPressed,
    PreviewTick,
    Animate(Instant),
    DismissAlert,
    CloseRequested,
}

impl Booth {
    fn new() -> (Self, Task<Message>) {
        tracing::info!("📸 Photobooth starting");
        (
            Booth {
                handle: None,
                camera: CameraStatus::Starting,
                preview: None,
                phase: Phase::Idle,
                countdown: None,
                flashing: false,
                shots: (0, compositor::SHOT_COUNT),
                notice: None,
                filename: None,
                strip: None,
                print: PrintState::Idle,
                print_started: None,
                now: Instant::now(),
                saved: None,
                share: ShareStatus::Empty,
                alert: None,
            },
            Task::none(),
        )
    }

    /// The start button only exists when a new session would be accepted
    fn can_start(&self) -> bool {
        self.handle.is_some()
            && self.camera == CameraStatus::Ready
            && self.phase == Phase::Idle
            && self.print != PrintState::Printing
            && self.alert.is_none()
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Session(event) => self.apply(event),
            Message::StartPressed => {
                if let Some(handle) = &self.handle {
                    self.notice = None;
                    handle.start();
                }
            }
            Message::PreviewTick => {
                let frame = self
                    .handle
                    .as_ref()
                    .and_then(|handle| handle.feed())
                    .and_then(|feed| feed.current_frame());
                if let Some(frame) = frame {
                    self.preview = Some(ui::preview::frame_handle(&frame));
                }
            }
            Message::Animate(now) => self.now = now,
            Message::DismissAlert => self.alert = None,
            Message::CloseRequested => {
                // Stop the controller and free the camera before the window goes
                if let Some(handle) = &self.handle {
                    handle.shutdown();
                    if let Some(feed) = handle.feed() {
                        feed.release();
                    }
                }
                tracing::info!("👋 Photobooth closing");
                return iced::exit();
            }
        }
        Task::none()
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Ready(handle) => {
                // Without a feed the booth stays usable for nothing but the alert
                if handle.feed().is_some() {
                    self.camera = CameraStatus::Ready;
                }
                self.handle = Some(handle);
            }
            SessionEvent::CameraUnavailable(reason) => {
                self.alert = Some(format!("Camera unavailable: {reason}"));
                self.camera = CameraStatus::Unavailable(reason);
            }
            SessionEvent::SessionStarted { filename } => {
                self.filename = Some(filename);
                self.strip = None;
                self.saved = None;
                self.share = ShareStatus::Empty;
                self.shots = (0, compositor::SHOT_COUNT);
            }
            SessionEvent::Phase(phase) => {
                self.phase = phase;
                if matches!(phase, Phase::Idle | Phase::Compositing) {
                    self.countdown = None;
                }
            }
            SessionEvent::Countdown(value) => {
                self.notice = None;
                self.countdown = Some(value);
            }
            SessionEvent::Flash(on) => {
                self.flashing = on;
                if on {
                    self.countdown = None;
                }
            }
            SessionEvent::ShotCaptured { index, total } => self.shots = (index + 1, total),
            SessionEvent::ShotRetry { .. } => {
                self.notice = Some("The camera is warming up, one more time…".to_string());
            }
            SessionEvent::Composited(strip) => {
                self.strip = Some(ui::preview::strip_handle(&strip));
            }
            SessionEvent::Print(state) => {
                tracing::debug!("Print state: {}", state.label());
                self.print = state;
                if state == PrintState::Printing {
                    let now = Instant::now();
                    self.print_started = Some(now);
                    self.now = now;
                }
            }
            SessionEvent::Saved(path) => {
                self.saved = Some(format!("Saved to {}", path.display()));
            }
            SessionEvent::SaveFailed(reason) => {
                self.saved = Some(format!("Could not save the strip: {reason}"));
            }
            SessionEvent::Publishing { filename } => {
                if self.filename.as_deref() == Some(filename.as_str()) {
                    self.share = ShareStatus::Uploading;
                }
            }
            SessionEvent::Published(record) => {
                // Results for an older strip arrive late; ignore them
                if self.filename.as_deref() != Some(record.filename.as_str()) {
                    return;
                }
                self.share = match qr_code::Data::new(record.download_url.as_bytes()) {
                    Ok(code) => ShareStatus::Ready {
                        url: record.download_url,
                        code,
                    },
                    Err(e) => ShareStatus::Failed(format!("QR code error: {e}")),
                };
            }
            SessionEvent::PublishFailed { filename, reason } => {
                if self.filename.as_deref() == Some(filename.as_str()) {
                    self.share = ShareStatus::Failed(reason);
                }
            }
            SessionEvent::Alert(message) => {
                self.flashing = false;
                self.countdown = None;
                self.alert = Some(message);
            }
            SessionEvent::Rejected(rejection) => {
                self.notice = Some(format!("Please wait: {rejection}"));
            }
        }
    }

    fn view(&self) -> Element<Message> {
        let screen = row![self.camera_view(), self.side_panel()]
            .spacing(24)
            .padding(24)
            .height(Length::Fill);

        match &self.alert {
            Some(message) => stack![screen, self.alert_view(message)].into(),
            None => screen.into(),
        }
    }

    fn camera_view(&self) -> Element<Message> {
        let feed: Element<Message> = match (&self.camera, &self.preview) {
            (CameraStatus::Ready, Some(frame)) => picture(frame.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .content_fit(ContentFit::Cover)
                .into(),
            (CameraStatus::Unavailable(_), _) => center(text("No camera").size(32)).into(),
            _ => center(text("Starting camera…").size(32)).into(),
        };

        let mut layers = stack![feed];
        if let Some(value) = self.countdown {
            layers = layers.push(center(text(value.to_string()).size(200)));
        }
        if self.flashing {
            layers = layers.push(
                container(Space::new(Length::Fill, Length::Fill)).style(|_: &Theme| {
                    container::Style {
                        background: Some(Color::WHITE.into()),
                        ..container::Style::default()
                    }
                }),
            );
        }

        container(layers)
            .width(Length::FillPortion(3))
            .height(Length::Fill)
            .into()
    }

    fn side_panel(&self) -> Element<Message> {
        let status = match self.phase {
            Phase::Idle => "Ready when you are".to_string(),
            Phase::Counting | Phase::Flashing => {
                format!("Photo {} of {}", (self.shots.0 + 1).min(self.shots.1), self.shots.1)
            }
            Phase::Compositing => "Building your strip…".to_string(),
        };

        let mut panel = column![text("Photobooth").size(40), text(status).size(20)]
            .spacing(16)
            .align_x(Alignment::Center);

        if self.can_start() {
            panel = panel.push(
                button(text("Start").size(28))
                    .on_press(Message::StartPressed)
                    .padding(16),
            );
        }
        if let Some(notice) = &self.notice {
            panel = panel.push(text(notice).size(14));
        }

        panel = panel.push(self.print_view());
        panel = panel.push(self.share_view());

        container(panel)
            .width(Length::FillPortion(2))
            .height(Length::Fill)
            .center_x(Length::FillPortion(2))
            .into()
    }

    fn print_view(&self) -> Element<Message> {
        let mut section = column![].spacing(8).align_x(Alignment::Center);

        if self.print == PrintState::Printing {
            let total = self
                .handle
                .as_ref()
                .map(|handle| handle.print_delay())
                .unwrap_or_default();
            let elapsed = self
                .print_started
                .map(|started| self.now.saturating_duration_since(started))
                .unwrap_or_default();
            let progress = ui::preview::print_progress(elapsed, total);
            section = section
                .push(text("Printing…").size(18))
                .push(progress_bar(0.0..=1.0, progress));
        }

        if let Some(strip) = &self.strip {
            if self.print == PrintState::Done {
                section = section.push(
                    picture(strip.clone())
                        .height(Length::Fixed(360.0))
                        .content_fit(ContentFit::Contain),
                );
            }
        }
        if let Some(saved) = &self.saved {
            section = section.push(text(saved).size(14));
        }

        section.into()
    }

    fn share_view(&self) -> Element<Message> {
        match &self.share {
            ShareStatus::Empty => Space::with_height(0).into(),
            ShareStatus::Uploading => text("Uploading…").size(16).into(),
            ShareStatus::Ready { url, code } => column![
                qr_code(code).cell_size(4),
                text("Scan to download").size(16),
                text(url).size(10),
            ]
            .spacing(8)
            .align_x(Alignment::Center)
            .into(),
            ShareStatus::Failed(reason) => text(format!("Upload failed: {reason}"))
                .size(14)
                .color(Color::from_rgb(0.9, 0.3, 0.3))
                .into(),
        }
    }

    fn alert_view<'a>(&self, message: &'a str) -> Element<'a, Message> {
        let dialog = container(
            column![
                text(message).size(20),
                button("OK").on_press(Message::DismissAlert).padding(10),
            ]
            .spacing(16)
            .align_x(Alignment::Center),
        )
        .padding(24)
        .style(container::rounded_box);

        opaque(
            center(dialog).style(|_: &Theme| container::Style {
                background: Some(Color::from_rgba(0.0, 0.0, 0.0, 0.7).into()),
                ..container::Style::default()
            }),
        )
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            Subscription::run(ui::worker::connect).map(Message::Session),
            window::close_requests().map(|_| Message::CloseRequested),
        ];
        if self.camera == CameraStatus::Ready {
            subscriptions.push(time::every(PREVIEW_INTERVAL).map(|_| Message::PreviewTick));
        }
        if self.print == PrintState::Printing {
            subscriptions.push(time::every(ANIMATION_INTERVAL).map(Message::Animate));
        }
        Subscription::batch(subscriptions)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("photobooth=info")),
        )
        .init();

    iced::application("Photobooth", Booth::update, Booth::view)
        .subscription(Booth::subscription)
        .theme(Booth::theme)
        .exit_on_close_request(false)
        .centered()
        .run_with(Booth::new)
}
