// Polling orchestrator: owns the engine lifecycle, drives the boundary and
// ticker triggers, and fans fetches out as non-blocking tasks

use crate::api::{self, ExchangeGateway};
use crate::error::EngineError;
use crate::models::{EngineState, Timeframe, Venue};
use crate::output::{EngineEvent, EventSender};
use crate::scheduler::{self, BoundaryTracker};
use crate::store::CandleStore;
use crate::strategy;
use crate::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

/// How often the trigger loop checks for a boundary crossing
const BOUNDARY_CHECK_PERIOD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// SMA period over closing prices
    pub ma_period: usize,
    /// Cadence of live-price polls
    pub update_interval: Duration,
    /// Candles fetched per refresh (the newest may still be forming)
    pub candle_fetch_limit: usize,
    /// Closed candles surfaced to the sink per refresh
    pub display_candles: usize,
    /// Deadline applied to each individual fetch
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "WALUSDT".to_string(),
            timeframe: Timeframe::M1,
            ma_period: 20,
            update_interval: Duration::from_secs(1),
            candle_fetch_limit: 10,
            display_candles: 5,
            fetch_timeout: Duration::from_secs(8),
        }
    }
}

/// State shared between the orchestrator, the trigger loop, and in-flight
/// fetch tasks
struct Shared {
    config: EngineConfig,
    gateway: Arc<dyn ExchangeGateway>,
    store: CandleStore,
    state: Arc<Mutex<EngineState>>,
    events: EventSender,
    refresh_in_flight: AtomicBool,
    ticker_in_flight: AtomicBool,
    shutdown: watch::Sender<bool>,
}

struct Runtime {
    shared: Arc<Shared>,
    trigger_loop: JoinHandle<()>,
}

/// The coordinator of the polling engine
///
/// Owns the Stopped/Starting/Running/Faulted state machine, launches
/// fetch tasks with at-most-one-in-flight-per-kind discipline, and pushes
/// all output through the event channel. Fetch failures stop the engine;
/// restarting is an explicit caller decision.
pub struct PollingOrchestrator {
    config: EngineConfig,
    state: Arc<Mutex<EngineState>>,
    events: EventSender,
    runtime: Option<Runtime>,
}

impl PollingOrchestrator {
    pub fn new(config: EngineConfig, events: EventSender) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(EngineState::Stopped)),
            events,
            runtime: None,
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().expect("engine state lock poisoned")
    }

    /// Candle window of the current run, if the engine has been started
    pub fn store(&self) -> Option<CandleStore> {
        self.runtime.as_ref().map(|rt| rt.shared.store.clone())
    }

    /// Resolve the venue selection and start polling against its gateway
    ///
    /// An unknown venue is rejected before any state transition.
    pub async fn start(&mut self, venue_selection: &str) -> Result<()> {
        let venue: Venue = venue_selection.parse()?;
        self.start_with_gateway(api::build_gateway(venue)).await
    }

    /// Start against an already-built gateway (the seam tests use)
    ///
    /// Performs one awaited candle refresh, then transitions to Running
    /// and spawns the trigger loop. On a failed initial fetch the engine
    /// faults, notifies the sink, and settles back at Stopped.
    pub async fn start_with_gateway(&mut self, gateway: Arc<dyn ExchangeGateway>) -> Result<()> {
        {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            if *state != EngineState::Stopped {
                tracing::warn!(state = ?*state, "start ignored: engine is not stopped");
                return Ok(());
            }
            *state = EngineState::Starting;
        }

        let venue = gateway.venue();
        tracing::info!(
            venue = %venue,
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            "starting polling engine"
        );
        self.emit(EngineEvent::Status(format!(
            "Loading {} candles for {} from {}...",
            self.config.timeframe, self.config.symbol, venue
        )));

        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            gateway,
            store: CandleStore::new(self.config.ma_period),
            state: self.state.clone(),
            events: self.events.clone(),
            refresh_in_flight: AtomicBool::new(false),
            ticker_in_flight: AtomicBool::new(false),
            shutdown,
        });

        match Shared::refresh_candles(&shared).await {
            Ok(()) => {
                *self.state.lock().expect("engine state lock poisoned") = EngineState::Running;
                self.emit(EngineEvent::Status(format!(
                    "Data loaded. Polling price every {}s.",
                    self.config.update_interval.as_secs_f64()
                )));

                let trigger_loop = spawn_trigger_loop(shared.clone());
                self.runtime = Some(Runtime {
                    shared,
                    trigger_loop,
                });
                Ok(())
            }
            Err(e) => {
                Shared::fault(&shared, &e);
                Err(e)
            }
        }
    }

    /// Ticker trigger: poll the live price unless one poll is already
    /// in flight (extra triggers are dropped, never queued)
    pub fn on_tick(&self) {
        if let Some(rt) = &self.runtime {
            Shared::spawn_price_poll(&rt.shared);
        }
    }

    /// Boundary trigger: refresh the candle window unless a refresh is
    /// already in flight
    pub fn on_boundary(&self) {
        if let Some(rt) = &self.runtime {
            Shared::spawn_refresh(&rt.shared);
        }
    }

    /// Cancel both triggers and return to Stopped; safe to call repeatedly
    pub fn stop(&mut self) {
        let was_running = {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            let was = *state != EngineState::Stopped;
            *state = EngineState::Stopped;
            was
        };

        if let Some(rt) = self.runtime.take() {
            let _ = rt.shared.shutdown.send(true);
            rt.trigger_loop.abort();
        }

        if was_running {
            tracing::info!("polling engine stopped");
            self.emit(EngineEvent::Status("Polling stopped.".to_string()));
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means nobody is watching; nothing to do about it
        let _ = self.events.send(event);
    }
}

impl Shared {
    /// Fetch a fresh candle window, validate it, swap it in, and surface
    /// the closed candles for display
    async fn refresh_candles(shared: &Arc<Shared>) -> Result<()> {
        let cfg = &shared.config;
        let candles = timeout(
            cfg.fetch_timeout,
            shared
                .gateway
                .fetch_recent_candles(&cfg.symbol, cfg.timeframe, cfg.candle_fetch_limit),
        )
        .await
        .map_err(|_| EngineError::timeout(format!("candle fetch exceeded {:?}", cfg.fetch_timeout)))??;

        if candles.is_empty() {
            return Err(EngineError::Validation(format!(
                "venue returned no candles for {}",
                cfg.symbol
            )));
        }

        // A result landing after stop must not reactivate anything
        {
            let state = shared.state.lock().expect("engine state lock poisoned");
            if !matches!(*state, EngineState::Running | EngineState::Starting) {
                tracing::debug!("discarding candle refresh: engine no longer active");
                return Ok(());
            }
        }

        shared.store.replace_window(candles)?;
        tracing::debug!(
            candles = shared.store.len(),
            indicator = ?shared.store.latest_indicator_value(),
            "candle window refreshed"
        );

        let display = shared.store.latest_closed_candles(cfg.display_candles);
        if !display.is_empty() {
            let _ = shared.events.send(EngineEvent::Candles(display));
        }

        let until_close = scheduler::time_until_next_boundary(Utc::now(), cfg.timeframe);
        let _ = shared.events.send(EngineEvent::Status(format!(
            "Next {} candle closes in {:.0}s.",
            cfg.timeframe,
            until_close.as_secs_f64()
        )));

        Ok(())
    }

    fn spawn_refresh(shared: &Arc<Shared>) {
        if shared.refresh_in_flight.swap(true, Ordering::SeqCst) {
            tracing::trace!("boundary trigger dropped: refresh already in flight");
            return;
        }
        if *shared.state.lock().expect("engine state lock poisoned") != EngineState::Running {
            shared.refresh_in_flight.store(false, Ordering::SeqCst);
            return;
        }

        let shared = shared.clone();
        tokio::spawn(async move {
            let result = Shared::refresh_candles(&shared).await;
            shared.refresh_in_flight.store(false, Ordering::SeqCst);

            if let Err(e) = result {
                Shared::fault(&shared, &e);
            }
        });
    }

    fn spawn_price_poll(shared: &Arc<Shared>) {
        if shared.ticker_in_flight.swap(true, Ordering::SeqCst) {
            tracing::trace!("tick trigger dropped: price poll already in flight");
            return;
        }
        if *shared.state.lock().expect("engine state lock poisoned") != EngineState::Running {
            shared.ticker_in_flight.store(false, Ordering::SeqCst);
            return;
        }

        let shared = shared.clone();
        tokio::spawn(async move {
            let cfg = &shared.config;
            let result = timeout(
                cfg.fetch_timeout,
                shared.gateway.fetch_live_price(&cfg.symbol),
            )
            .await
            .map_err(|_| {
                EngineError::timeout(format!("price fetch exceeded {:?}", cfg.fetch_timeout))
            })
            .and_then(|r| r);

            shared.ticker_in_flight.store(false, Ordering::SeqCst);

            // Stale results land silently once the engine has stopped
            if *shared.state.lock().expect("engine state lock poisoned") != EngineState::Running {
                tracing::debug!("discarding price poll: engine no longer running");
                return;
            }

            match result {
                Ok(live) => match strategy::evaluate_signal(live.price, &shared.store) {
                    Ok((indicator, signal)) => {
                        tracing::debug!(price = live.price, indicator, %signal, "price evaluated");
                        let _ = shared.events.send(EngineEvent::Result {
                            price: live.price,
                            indicator,
                            signal,
                        });
                    }
                    // Not enough history yet: report progress, keep polling
                    Err(e) => {
                        let _ = shared.events.send(EngineEvent::Status(format!(
                            "Collecting history: {}",
                            e
                        )));
                    }
                },
                Err(e) => Shared::fault(&shared, &e),
            }
        });
    }

    /// One-way trip to Stopped with a single error notification
    ///
    /// The state guard makes this idempotent under racing failures, so
    /// the sink sees exactly one error per fault.
    fn fault(shared: &Arc<Shared>, err: &EngineError) {
        {
            let mut state = shared.state.lock().expect("engine state lock poisoned");
            match *state {
                EngineState::Starting | EngineState::Running => *state = EngineState::Faulted,
                EngineState::Stopped | EngineState::Faulted => return,
            }
        }

        // Triggers first, so no handler fires after the notification
        let _ = shared.shutdown.send(true);

        tracing::error!(error = %err, "engine faulted, stopping");
        let _ = shared.events.send(EngineEvent::Error(format!(
            "Polling stopped: {}. Check the symbol and venue, then restart.",
            err
        )));

        *shared.state.lock().expect("engine state lock poisoned") = EngineState::Stopped;
    }
}

/// Drive both trigger streams until shutdown
///
/// The ticker fires every `update_interval`; the boundary trigger is
/// polled at fine granularity and deduplicated per bucket so one candle
/// refresh happens per close, however coarse the check cadence.
fn spawn_trigger_loop(shared: Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = BoundaryTracker::new(shared.config.timeframe, Utc::now());
        let mut shutdown = shared.shutdown.subscribe();

        let mut boundary_check = interval_at(
            Instant::now() + BOUNDARY_CHECK_PERIOD,
            BOUNDARY_CHECK_PERIOD,
        );
        boundary_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tick = interval_at(
            Instant::now() + shared.config.update_interval,
            shared.config.update_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = boundary_check.tick() => {
                    if tracker.poll(Utc::now()) {
                        Shared::spawn_refresh(&shared);
                    }
                }
                _ = tick.tick() => {
                    Shared::spawn_price_poll(&shared);
                }
            }
        }
    })
}
