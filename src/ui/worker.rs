/// Background worker bridging the session controller into iced
///
/// Loads the configuration, opens the camera, builds the publisher and
/// spawns the controller actor, then forwards its events to the UI.

use iced::futures::channel::mpsc as ui_channel;
use iced::futures::{SinkExt, Stream};
use iced::stream;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::capture::{LiveFeed, VideoFeed};
use crate::config::BoothConfig;
use crate::publish::{FirebaseStore, Publisher};
use crate::session::{SessionController, SessionEvent, SessionHandle};

pub fn connect() -> impl Stream<Item = SessionEvent> {
    stream::channel(100, |mut output: ui_channel::Sender<SessionEvent>| async move {
        let config = match BoothConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("❌ Configuration error: {}", e);
                let _ = output
                    .send(SessionEvent::Alert(format!("Configuration error: {e}")))
                    .await;
                return;
            }
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let settings = config.camera;
        let opened = tokio::task::spawn_blocking(move || LiveFeed::open(settings))
            .await
            .map_err(|e| e.to_string())
            .and_then(|result| result.map_err(|e| e.to_string()));

        let feed: Option<Arc<dyn VideoFeed>> = match opened {
            Ok(feed) => Some(Arc::new(feed)),
            Err(reason) => {
                tracing::error!("❌ {}", reason);
                let _ = output.send(SessionEvent::CameraUnavailable(reason)).await;
                None
            }
        };

        let publisher = match &config.storage {
            Some(storage) => Publisher::new(Arc::new(FirebaseStore::new(storage)), config.namespace.clone()),
            None => {
                tracing::warn!("⚠️  Cloud storage not configured; strips will only be saved locally");
                Publisher::disabled(config.namespace.clone())
            }
        };

        let handle = SessionHandle::new(commands_tx, feed.clone(), config.timing.print_delay);
        let controller = SessionController::new(&config, feed, Arc::new(publisher), events_tx);
        tokio::spawn(controller.run(commands_rx));

        if output.send(SessionEvent::Ready(handle)).await.is_err() {
            return;
        }

        while let Some(event) = events_rx.recv().await {
            if output.send(event).await.is_err() {
                break;
            }
        }
    })
}
