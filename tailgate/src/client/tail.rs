//! Log panel polling state machine

use super::view::{render, RenderedLog, ViewState};
use super::LogSource;
use crate::log_store::DEFAULT_TAIL_LIMIT;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Panel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// Not shown; nothing is fetched
    Hidden,
    /// Shown and refreshed on every tick
    VisiblePolling,
    /// Shown, timer stopped until resumed
    VisiblePaused,
}

impl PanelState {
    pub fn is_visible(&self) -> bool {
        !matches!(self, PanelState::Hidden)
    }
}

/// Polling parameters
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub poll_interval: Duration,
    pub limit: usize,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            limit: DEFAULT_TAIL_LIMIT,
        }
    }
}

/// Snapshot published after every state change
#[derive(Debug, Clone)]
pub struct Frame {
    pub panel: PanelState,
    pub log: RenderedLog,
    pub view: ViewState,
    /// Fetches that failed since the client was created
    pub failed_fetches: u64,
}

struct TailState {
    panel: PanelState,
    log: RenderedLog,
    view: ViewState,
    failed_fetches: u64,
    poll: Option<JoinHandle<()>>,
}

struct Shared {
    source: Arc<dyn LogSource>,
    options: TailOptions,
    state: Mutex<TailState>,
    frames: watch::Sender<Arc<Frame>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &TailState) {
        self.frames.send_replace(Arc::new(Frame {
            panel: state.panel,
            log: state.log.clone(),
            view: state.view,
            failed_fetches: state.failed_fetches,
        }));
    }

    /// Fetch the tail and render it. Failures are logged and leave the
    /// current frame in place.
    async fn fetch_and_render(&self, silent: bool) {
        let result = self.source.fetch_tail(self.options.limit).await;

        let mut state = self.lock();
        // Ticks only land while polling; other fetches while shown
        let wanted = if silent {
            state.panel == PanelState::VisiblePolling
        } else {
            state.panel.is_visible()
        };
        if !wanted {
            debug!(silent, panel = ?state.panel, "Discarding late log fetch");
            return;
        }

        match result {
            Ok(entries) => {
                let (log, view) = render(&entries, state.view, silent);
                debug!(
                    entries = log.len(),
                    silent,
                    scroll_top = view.scroll_top,
                    "Rendered log tail"
                );
                state.log = log;
                state.view = view;
                self.publish(&state);
            }
            Err(e) => {
                state.failed_fetches += 1;
                warn!(
                    error = %e,
                    silent,
                    failed_fetches = state.failed_fetches,
                    "Log fetch failed; keeping previous entries"
                );
                self.publish(&state);
            }
        }
    }

    /// Start the repeating tick unless one is already running
    fn start_timer(self: &Arc<Self>, state: &mut TailState) {
        if state.poll.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let period = self.options.poll_interval;
        let weak = Arc::downgrade(self);
        state.poll = Some(tokio::spawn(poll_loop(weak, period)));
        debug!(interval_ms = period.as_millis() as u64, "Log polling started");
    }

    fn stop_timer(state: &mut TailState) {
        if let Some(handle) = state.poll.take() {
            handle.abort();
            debug!("Log polling stopped");
        }
    }
}

async fn poll_loop(shared: Weak<Shared>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.lock().panel != PanelState::VisiblePolling {
            break;
        }
        // A slow fetch must not hold back the next tick
        tokio::spawn(async move {
            shared.fetch_and_render(true).await;
        });
    }
}

/// Drives the log panel: shows, hides, polls and renders.
///
/// At most one polling task exists per client. It is cancelled on
/// [`hide`](Self::hide), [`pause`](Self::pause) and drop.
pub struct LogTailClient {
    shared: Arc<Shared>,
}

impl LogTailClient {
    pub fn new(source: Arc<dyn LogSource>, options: TailOptions, view: ViewState) -> Self {
        let state = TailState {
            panel: PanelState::Hidden,
            log: RenderedLog::default(),
            view,
            failed_fetches: 0,
            poll: None,
        };
        let (frames, _) = watch::channel(Arc::new(Frame {
            panel: state.panel,
            log: state.log.clone(),
            view: state.view,
            failed_fetches: 0,
        }));

        Self {
            shared: Arc::new(Shared {
                source,
                options,
                state: Mutex::new(state),
                frames,
            }),
        }
    }

    /// Receive a new [`Frame`] after every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<Frame>> {
        self.shared.frames.subscribe()
    }

    /// The latest frame
    pub fn frame(&self) -> Arc<Frame> {
        Arc::clone(&self.shared.frames.borrow())
    }

    pub fn panel_state(&self) -> PanelState {
        self.shared.lock().panel
    }

    pub fn is_polling(&self) -> bool {
        self.shared
            .lock()
            .poll
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Open the panel: start polling, then fetch once right away. No-op when
    /// visible. The timer runs even while the first fetch is outstanding.
    pub async fn show(&self) {
        {
            let mut state = self.shared.lock();
            if state.panel.is_visible() {
                return;
            }
            state.panel = PanelState::VisiblePolling;
            self.shared.start_timer(&mut state);
            self.shared.publish(&state);
        }
        self.shared.fetch_and_render(false).await;
    }

    /// Close the panel and stop polling
    pub fn hide(&self) {
        let mut state = self.shared.lock();
        Shared::stop_timer(&mut state);
        if state.panel != PanelState::Hidden {
            state.panel = PanelState::Hidden;
            self.shared.publish(&state);
        }
    }

    pub async fn toggle(&self) {
        if self.panel_state().is_visible() {
            self.hide();
        } else {
            self.show().await;
        }
    }

    /// Stop polling but keep the panel shown
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if state.panel == PanelState::VisiblePolling {
            Shared::stop_timer(&mut state);
            state.panel = PanelState::VisiblePaused;
            self.shared.publish(&state);
        }
    }

    pub async fn resume(&self) {
        {
            let mut state = self.shared.lock();
            if state.panel != PanelState::VisiblePaused {
                return;
            }
            state.panel = PanelState::VisiblePolling;
            self.shared.start_timer(&mut state);
            self.shared.publish(&state);
        }
        self.shared.fetch_and_render(false).await;
    }

    /// One user-triggered refresh, e.g. after a recommendation completes.
    /// Skipped while the panel is hidden.
    pub async fn refresh(&self) {
        if self.panel_state().is_visible() {
            self.shared.fetch_and_render(false).await;
        }
    }

    /// Clear the server log, then re-fetch whatever it holds now
    pub async fn clear(&self) {
        if let Err(e) = self.shared.source.clear().await {
            warn!(error = %e, "Clearing logs failed");
        }
        self.shared.fetch_and_render(false).await;
    }

    /// Flip auto-follow; turning it on jumps to the bottom
    pub fn toggle_auto_scroll(&self) -> bool {
        let mut state = self.shared.lock();
        let enabled = !state.view.auto_scroll_enabled;
        state.view.auto_scroll_enabled = enabled;
        if enabled {
            state.view = state.view.scrolled_to_bottom();
        }
        self.shared.publish(&state);
        enabled
    }

    /// User scrolled the panel
    pub fn scroll_to(&self, scroll_top: u32) {
        let mut state = self.shared.lock();
        state.view = state.view.scrolled_to(scroll_top);
        self.shared.publish(&state);
    }

    /// Scroll by a signed amount of view units
    pub fn scroll_by(&self, delta: i64) {
        let current = self.shared.lock().view.scroll_top as i64;
        let target = current.saturating_add(delta).clamp(0, u32::MAX as i64) as u32;
        self.scroll_to(target);
    }

    /// Panel viewport changed size
    pub fn resize(&self, viewport_height: u32) {
        let mut state = self.shared.lock();
        state.view = state.view.resized(viewport_height);
        self.shared.publish(&state);
    }
}

impl Drop for LogTailClient {
    fn drop(&mut self) {
        Shared::stop_timer(&mut self.shared.lock());
    }
}
