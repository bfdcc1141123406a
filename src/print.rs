/// Simulated printer
///
/// There is no real printer feedback: `Printing` lasts a fixed delay and
/// then becomes `Done`. The delay runs as a spawned task whose handle is
/// kept so a restart, a new session or shutdown can abort it.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintState {
    Idle,
    Printing,
    Done,
}

impl PrintState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Printing => "printing",
            Self::Done => "done",
        }
    }
}

#[derive(Debug)]
pub struct PrintSimulator {
    state: Arc<Mutex<PrintState>>,
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl PrintSimulator {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PrintState::Idle)),
            delay,
            pending: None,
        }
    }

    pub fn state(&self) -> PrintState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(PrintState::Idle)
    }

    pub fn is_printing(&self) -> bool {
        self.state() == PrintState::Printing
    }

    fn set_state(&self, next: PrintState) {
        set_state(&self.state, next);
    }

    /// Enter `Printing` now; after the delay enter `Done` and run `on_done`
    ///
    /// Starting again while a timer is pending aborts that timer first, so
    /// at most one `on_done` can ever fire per start.
    pub fn start<Fut>(&mut self, on_done: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.set_state(PrintState::Printing);
        tracing::info!("🖨️  Printing ({} ms)", self.delay.as_millis());

        let state = Arc::clone(&self.state);
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // From here on the task is no longer abortable, see `cancel`
            set_state(&state, PrintState::Done);
            tracing::info!("🖨️  Print done");
            on_done.await;
        }));
    }

    /// Abort the pending timer, if any, without changing the state
    ///
    /// Once the state reads `Done` the timer has fired and `on_done` is
    /// running; that task is detached instead so its work is not cut short.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            if self.state() == PrintState::Done {
                drop(handle);
            } else {
                handle.abort();
            }
        }
    }

    /// Back to `Idle` for a brand-new session
    pub fn reset(&mut self) {
        self.cancel();
        self.set_state(PrintState::Idle);
    }
}

impl Drop for PrintSimulator {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn set_state(state: &Mutex<PrintState>, next: PrintState) {
    if let Ok(mut current) = state.lock() {
        *current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let make = move || {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                shared.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_printing_done() {
        let (done, on_done) = counter();
        let mut printer = PrintSimulator::new(Duration::from_millis(2600));
        assert_eq!(printer.state(), PrintState::Idle);

        printer.start(on_done());
        assert_eq!(printer.state(), PrintState::Printing);

        tokio::time::sleep(Duration::from_millis(2599)).await;
        assert_eq!(printer.state(), PrintState::Printing);
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(printer.state(), PrintState::Done);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_a_single_timer() {
        let (done, on_done) = counter();
        let mut printer = PrintSimulator::new(Duration::from_millis(2600));

        printer.start(on_done());
        tokio::time::sleep(Duration::from_millis(2000)).await;
        printer.start(on_done());

        // The first timer would have fired here
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(printer.state(), PrintState::Printing);
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(printer.state(), PrintState::Done);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_aborts_and_returns_to_idle() {
        let (done, on_done) = counter();
        let mut printer = PrintSimulator::new(Duration::from_millis(2600));

        printer.start(on_done());
        printer.reset();
        assert_eq!(printer.state(), PrintState::Idle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(printer.state(), PrintState::Idle);
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_timer() {
        let (done, on_done) = counter();
        let mut printer = PrintSimulator::new(Duration::from_millis(100));
        printer.start(on_done());
        drop(printer);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_done_lets_completion_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&finished);
        let mut printer = PrintSimulator::new(Duration::from_millis(2600));

        // A slow completion, like writing the strip to disk
        printer.start(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            shared.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(2700)).await;
        assert_eq!(printer.state(), PrintState::Done);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // A new session starts while the completion is still running
        printer.reset();
        assert_eq!(printer.state(), PrintState::Idle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
