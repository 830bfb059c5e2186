// Poll service - drives fetches from the timer, wake events and settings changes
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::application::error::FetchError;
use crate::application::nightscout_client::NightscoutClient;
use crate::application::renderer::Renderer;
use crate::domain::display::{prepare_data, DisplayResult};
use crate::infrastructure::config::AppConfig;

/// Renderer calls decided under the state lock and made after it is released.
enum Emit {
    Data(DisplayResult),
    Error { message: String, alert: bool },
}

#[derive(Debug, Default)]
struct DeliveryState {
    /// Generation of the newest result handed to the renderer.
    delivered: u64,
    consecutive_failures: u32,
    alerted: bool,
}

pub struct PollService {
    client: Arc<NightscoutClient>,
    settings: watch::Receiver<AppConfig>,
    renderer: Arc<dyn Renderer>,
    wake: Arc<Notify>,
    issued: AtomicU64,
    state: Mutex<DeliveryState>,
}

impl PollService {
    pub fn new(
        client: Arc<NightscoutClient>,
        settings: watch::Receiver<AppConfig>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            client,
            settings,
            renderer,
            wake: Arc::new(Notify::new()),
            issued: AtomicU64::new(0),
            state: Mutex::new(DeliveryState::default()),
        }
    }

    /// Handle for the host to request an immediate refresh (window shown,
    /// screen unlocked, ...).
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn config(&self) -> AppConfig {
        self.settings.borrow().clone()
    }

    /// Poll until the settings channel closes. Every trigger starts an
    /// independent fetch; slow ones are not waited for.
    pub async fn run(self: Arc<Self>) {
        let mut settings = self.settings.clone();
        let mut period = self.config().nightscout.interval();
        let mut ticker = interval_at(Instant::now(), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Polling every {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {
                    tracing::info!("Get data due to wake event");
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        tracing::info!("Settings channel closed, stopping poll loop");
                        break;
                    }
                    let config = settings.borrow_and_update().clone();
                    // New site or secret, the old token is useless
                    self.client.tokens().invalidate();
                    if config.nightscout.interval() != period {
                        period = config.nightscout.interval();
                        ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        tracing::info!("Poll interval changed to {:?}", period);
                    }
                    tracing::info!("Settings changed, refreshing");
                }
            }

            let service = self.clone();
            tokio::spawn(async move {
                service.poll_once().await;
            });
        }
    }

    /// Fetch once and hand the outcome to the renderer.
    pub async fn poll_once(&self) -> bool {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let config = self.config();
        let limit = config.nightscout.effective_limit(config.widget.calc_trend);

        let outcome = match self.client.get_data(&config.nightscout, limit).await {
            Ok(series) => prepare_data(
                &series,
                &config.widget.display_options(),
                &config.bg.thresholds(),
                chrono::Utc::now().timestamp_millis(),
            )
            .ok_or(FetchError::NoData),
            Err(e) => Err(e),
        };

        self.deliver(generation, outcome, config.nightscout.retry_count)
    }

    /// Returns false when the outcome is older than one already shown.
    fn deliver(&self, generation: u64, outcome: Result<DisplayResult, FetchError>, retry_count: u32) -> bool {
        let emit = {
            let mut state = self.lock_state();

            if generation < state.delivered {
                tracing::debug!(
                    "Dropping result of poll #{} (poll #{} already shown)",
                    generation,
                    state.delivered
                );
                return false;
            }
            state.delivered = generation;

            match outcome {
                Ok(result) => {
                    if state.consecutive_failures > 0 {
                        tracing::info!("Recovered after {} failed polls", state.consecutive_failures);
                    }
                    state.consecutive_failures = 0;
                    state.alerted = false;
                    Emit::Data(result)
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    let message = e.to_string();
                    tracing::error!("Error qty: {}, {}", state.consecutive_failures, message);

                    let alert = !state.alerted && state.consecutive_failures >= retry_count.max(1);
                    if alert {
                        state.alerted = true;
                    }
                    Emit::Error { message, alert }
                }
            }
        };

        // Renderers may block, so they run without the lock. A newer result
        // recorded meanwhile wins.
        if self.lock_state().delivered > generation {
            tracing::debug!("Poll #{} was overtaken before rendering", generation);
            return true;
        }

        match emit {
            Emit::Data(result) => self.renderer.on_data(&result),
            Emit::Error { message, alert } => {
                self.renderer.on_error(&message);
                if alert {
                    self.renderer.on_alert(&message);
                }
            }
        }
        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DeliveryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
