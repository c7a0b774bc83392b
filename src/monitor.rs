//! The polling loop that ties the components together.
//!
//! One [`MonitorLoop`] owns the browsing session for its whole life. Items
//! are fetched strictly one after another, in the configured order, and a
//! stop request is only honoured between items, between cycles or while
//! waiting for the operator to log in.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::browser::BrowserDriver;
use crate::config::{AppConfig, MonitorConfig};
use crate::detector::{ChangeDetector, HistoryStore};
use crate::extractor::FieldExtractor;
use crate::models::{ChangeEvent, ChangeKind, ItemTarget};
use crate::navigator::Navigator;
use crate::notifier::Notifier;
use crate::session::{login_flow_for, SessionGuard, SessionStatus};
use crate::utils::error::{ExtractionError, NavigationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    SessionPending,
    Cycling,
    Stopped,
}

/// What happened during one pass over the targets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// Items that were loaded and extracted.
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
    pub events: Vec<ChangeEvent>,
    pub delivered: usize,
    /// The cycle was cut short because the whole session expired.
    pub session_expired: bool,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub events: usize,
    pub delivered: usize,
}

impl RunSummary {
    fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.events += report.events.len();
        self.delivered += report.delivered;
    }
}

enum ItemOutcome {
    Fetched,
    Skipped,
    SessionExpired,
}

pub struct MonitorLoop {
    driver: Box<dyn BrowserDriver>,
    navigator: Navigator,
    extractor: FieldExtractor,
    session: SessionGuard,
    detector: ChangeDetector,
    notifier: Notifier,
    targets: Arc<RwLock<Vec<ItemTarget>>>,
    interval: Duration,
    item_delay: Duration,
    max_runtime: Option<Duration>,
    shutdown: watch::Receiver<bool>,
    state: MonitorState,
    cycles: u64,
}

impl MonitorLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        navigator: Navigator,
        extractor: FieldExtractor,
        session: SessionGuard,
        detector: ChangeDetector,
        notifier: Notifier,
        targets: Vec<ItemTarget>,
        config: &MonitorConfig,
    ) -> Self {
        // Without a sender nobody can ask us to stop; see `wait_for_stop`.
        let (_, shutdown) = watch::channel(false);
        Self {
            driver,
            navigator,
            extractor,
            session,
            detector,
            notifier,
            targets: Arc::new(RwLock::new(targets)),
            interval: config.interval(),
            item_delay: config.item_delay(),
            max_runtime: config.max_runtime(),
            shutdown,
            state: MonitorState::Idle,
            cycles: 0,
        }
    }

    /// Wires every component from `config` around an already launched driver.
    pub async fn from_config(config: &AppConfig, driver: Box<dyn BrowserDriver>) -> Result<Self> {
        let targets = ItemTarget::resolve_all(&config.monitor.items, &config.site)?;
        let navigator = Navigator::new(config.site.clone(), &config.navigator);
        let session = SessionGuard::new(
            config.site.clone(),
            &config.session,
            login_flow_for(&config.session),
        );
        let detector = ChangeDetector::open(HistoryStore::new(&config.storage.history_path)).await?;
        let notifier = Notifier::from_config(&config.notifications)?;

        Ok(Self::new(
            driver,
            navigator,
            FieldExtractor::new(),
            session,
            detector,
            notifier,
            targets,
            &config.monitor,
        ))
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Shared handle to the target list. Changes are picked up at the start
    /// of the next cycle.
    pub fn targets(&self) -> Arc<RwLock<Vec<ItemTarget>>> {
        Arc::clone(&self.targets)
    }

    /// Runs until stopped, the run bound is reached or a fatal error occurs.
    /// The browsing session is released in every case.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let outcome = self.drive(started).await;
        if let Err(e) = &outcome {
            error!("Monitor stopped on a fatal error: {}", e);
        }

        self.state = MonitorState::Stopped;
        if let Err(e) = self.driver.close().await {
            warn!("Failed to release the browsing session: {}", e);
        }
        info!(elapsed_secs = started.elapsed().as_secs(), "Monitor stopped");
        outcome
    }

    async fn drive(&mut self, started: Instant) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if !self.start().await? {
            return Ok(summary);
        }

        loop {
            if self.stop_requested() {
                break;
            }
            if self.state == MonitorState::SessionPending && !self.reauthenticate().await? {
                break;
            }

            let report = self.run_cycle().await?;
            summary.absorb(&report);
            if report.interrupted || self.stop_requested() {
                break;
            }
            if report.session_expired {
                // Log in again and start over without waiting out the interval.
                continue;
            }
            if self.max_runtime.is_some_and(|max| started.elapsed() >= max) {
                info!(cycles = summary.cycles, "Maximum runtime reached");
                break;
            }
            if self.pause(self.interval).await {
                break;
            }
        }
        Ok(summary)
    }

    /// Restores the session, asking the operator to log in when the stored
    /// one does not work. Returns `false` if a stop was requested meanwhile.
    pub async fn start(&mut self) -> Result<bool> {
        let status = self.session.load(self.driver.as_ref()).await?;
        info!(status = ?status, profile = %self.session.profile(), "Session loaded");

        if status != SessionStatus::Valid {
            self.state = MonitorState::SessionPending;
            if !self.reauthenticate().await? {
                return Ok(false);
            }
        }
        self.state = MonitorState::Cycling;
        Ok(true)
    }

    async fn reauthenticate(&mut self) -> Result<bool> {
        self.state = MonitorState::SessionPending;
        let driver = self.driver.as_ref();
        tokio::select! {
            result = self.session.request_interactive_login(driver) => {
                result?;
            }
            _ = wait_for_stop(&mut self.shutdown) => {
                info!("Stop requested while waiting for login");
                return Ok(false);
            }
        }
        self.state = MonitorState::Cycling;
        Ok(true)
    }

    /// One pass over the current targets. Ends early when the session turns
    /// out to be expired; the loop is then left in `SessionPending`.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.state = MonitorState::Cycling;
        self.cycles += 1;
        let targets = self.targets.read().await.clone();
        let mut report = CycleReport {
            cycle: self.cycles,
            ..CycleReport::default()
        };
        info!(cycle = self.cycles, items = targets.len(), "Starting cycle");

        for (index, target) in targets.iter().enumerate() {
            if self.stop_requested() || (index > 0 && self.pause(self.item_delay).await) {
                report.interrupted = true;
                break;
            }

            match self.process(target, &mut report).await? {
                ItemOutcome::Fetched => report.fetched.push(target.id.clone()),
                ItemOutcome::Skipped => report.skipped.push(target.id.clone()),
                ItemOutcome::SessionExpired => {
                    warn!(item_id = %target.id, "Session expired, waiting for a new login");
                    self.state = MonitorState::SessionPending;
                    report.session_expired = true;
                    break;
                }
            }
        }

        info!(
            cycle = report.cycle,
            fetched = report.fetched.len(),
            skipped = report.skipped.len(),
            events = report.events.len(),
            "Cycle finished"
        );
        Ok(report)
    }

    async fn process(&mut self, target: &ItemTarget, report: &mut CycleReport) -> Result<ItemOutcome> {
        let driver = self.driver.as_ref();

        let page = match self.navigator.fetch(driver, &target.address).await {
            Ok(page) => page,
            Err(NavigationError::LoginRequired { address }) => {
                return match self.session.verify(driver).await {
                    Ok(SessionStatus::Valid) => {
                        info!(item_id = %target.id, address = %address, "Item needs a login of its own, skipping");
                        Ok(ItemOutcome::Skipped)
                    }
                    Ok(_) => Ok(ItemOutcome::SessionExpired),
                    Err(e) => {
                        warn!(item_id = %target.id, "Could not verify session: {}", e);
                        Ok(ItemOutcome::Skipped)
                    }
                };
            }
            Err(e) => {
                warn!(item_id = %target.id, kind = e.kind(), "Skipping item: {}", e);
                return Ok(ItemOutcome::Skipped);
            }
        };

        let snapshot = self.extractor.extract(&page).await;
        let failure = match (&snapshot.price, snapshot.is_empty()) {
            (Some(_), _) => None,
            (None, true) => Some(ExtractionError::Empty {
                address: page.address().to_string(),
            }),
            (None, false) => Some(ExtractionError::MissingPrice {
                item_id: target.id.clone(),
            }),
        };
        if let Some(failure) = &failure {
            metrics::counter!("sku_watcher_extraction_failures_total").increment(1);
            warn!(item_id = %target.id, "Extraction failed: {}", failure);
        }

        let mut events = self.detector.observe(&target.id, &snapshot).await?;
        for event in &mut events {
            if event.kind == ChangeKind::ExtractionFailed {
                event.reason = failure.as_ref().map(ToString::to_string);
            }
            report.delivered += self.notifier.deliver(event).await;
        }
        report.events.extend(events);

        // Any field at all means the page was served to a signed-in session.
        if !snapshot.is_empty() {
            if let Err(e) = self.session.persist(driver).await {
                warn!("Failed to persist cookies: {}", e);
            }
        }
        Ok(ItemOutcome::Fetched)
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps for `duration`. Returns `true` if a stop was requested.
    async fn pause(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.stop_requested();
        }
        debug!(secs = duration.as_secs_f64(), "Sleeping");
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.stop_requested(),
            _ = wait_for_stop(&mut self.shutdown) => true,
        }
    }
}

async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: nobody can ask any more.
        std::future::pending::<()>().await;
    }
}
