//! End-to-end discovery run: extraction → parse → dedup → merge → notify.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use grantscout_extraction::{
    ConfidenceScorer, Extractor, RandomScorer, describe_source, parse_response,
};
use grantscout_notify::Notifier;
use grantscout_shared::{Grant, GrantScoutError, Result, SearchConfig};

use crate::dedup::filter_new;
use crate::log::LogStream;
use crate::repository::GrantRepository;

/// How many grounding sources are echoed into the run log.
const LOGGED_SOURCES: usize = 3;

/// What happened to the digest at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Gate not satisfied: nothing new, notifications off, or no recipient.
    Skipped,
    Sent,
    /// Delivery failed; the run still completed.
    Failed(String),
}

/// Result of a completed discovery run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Grants merged into the repository by this run, in provider order.
    pub new_grants: Vec<Grant>,
    /// Parsed grants dropped as duplicates.
    pub filtered_count: usize,
    /// Array elements the parser could not turn into grants.
    pub rejected_count: usize,
    pub notification: NotificationOutcome,
    pub elapsed: Duration,
}

/// Sequences one discovery run at a time over a shared grant repository.
pub struct DiscoveryOrchestrator {
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    scorer: Arc<dyn ConfidenceScorer>,
    repository: RwLock<GrantRepository>,
    log: LogStream,
    running: AtomicBool,
}

impl DiscoveryOrchestrator {
    pub fn new(extractor: Arc<dyn Extractor>, notifier: Arc<dyn Notifier>, log: LogStream) -> Self {
        Self {
            extractor,
            notifier,
            scorer: Arc::new(RandomScorer),
            repository: RwLock::new(GrantRepository::new()),
            log,
            running: AtomicBool::new(false),
        }
    }

    /// Replace the confidence scorer used while parsing.
    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Start from an existing repository instead of an empty one.
    pub fn with_repository(mut self, repository: GrantRepository) -> Self {
        self.repository = RwLock::new(repository);
        self
    }

    /// The progress log this orchestrator writes to.
    pub fn log(&self) -> &LogStream {
        &self.log
    }

    /// Copy of the accumulated repository.
    pub fn repository(&self) -> GrantRepository {
        self.read_repository().clone()
    }

    /// Drop every accumulated grant. Refused while a run is active.
    pub fn clear_repository(&self) -> Result<()> {
        if self.is_running() {
            return Err(GrantScoutError::RunInProgress);
        }
        self.write_repository().clear();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one discovery sequence.
    ///
    /// Returns [`GrantScoutError::RunInProgress`] without touching any state
    /// if another run is active. Config, extraction and parse failures abort
    /// the run with nothing merged; notification failures do not.
    #[instrument(skip_all, fields(year = search.year, keywords = search.keywords.len()))]
    pub async fn run(&self, search: &SearchConfig) -> Result<RunReport> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("discovery run requested while another is active; ignoring");
            return Err(GrantScoutError::RunInProgress);
        };

        match self.execute(search).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.log.error(format!("Discovery sequence aborted: {e}"));
                Err(e)
            }
        }
    }

    async fn execute(&self, search: &SearchConfig) -> Result<RunReport> {
        let start = Instant::now();

        self.log.info(format!(
            "Initializing discovery sequence for {} (year {})",
            search.keywords.join(", "),
            search.year
        ));

        // --- Phase 1: Extraction ---
        self.log.info(format!(
            "Querying {} with live search grounding",
            self.extractor.model()
        ));
        let output = self.extractor.extract(search).await?;

        for source in output.grounding_sources.iter().take(LOGGED_SOURCES) {
            self.log
                .info(format!("Grounding source: {}", describe_source(source)));
        }
        self.log.success(format!(
            "Extraction complete: received {} characters from provider",
            output.raw_text.len()
        ));

        // --- Phase 2: Parse ---
        self.log.info("Parsing structured payload from provider response");
        let batch = parse_response(&output.raw_text, self.scorer.as_ref())?;
        if batch.rejected > 0 {
            self.log.warning(format!(
                "Skipped {} malformed record{}",
                batch.rejected,
                plural_s(batch.rejected)
            ));
        }
        self.log.success(format!(
            "Parsed {} grant record{}",
            batch.grants.len(),
            plural_s(batch.grants.len())
        ));

        // --- Phase 3: Dedup ---
        let existing = self.read_repository().titles_lowercased();
        let outcome = filter_new(batch.grants, &existing);
        if outcome.filtered_count > 0 {
            self.log.info(format!(
                "Deduplication filtered {} duplicate{}",
                outcome.filtered_count,
                plural_s(outcome.filtered_count)
            ));
        } else {
            self.log.info("Deduplication found no duplicates");
        }

        // --- Phase 4: Merge ---
        let new_grants = self.write_repository().merge_unique(outcome.unique);
        if new_grants.is_empty() {
            self.log.info("No new grants discovered in this run");
        } else {
            self.log.success(format!(
                "Merged {} new grant{} into repository",
                new_grants.len(),
                plural_s(new_grants.len())
            ));
        }

        // --- Phase 5: Notify ---
        let notification = self.dispatch(search, &new_grants).await;

        self.log.info("Discovery sequence finalized");

        let report = RunReport {
            filtered_count: outcome.filtered_count,
            rejected_count: batch.rejected,
            notification,
            elapsed: start.elapsed(),
            new_grants,
        };

        info!(
            new = report.new_grants.len(),
            filtered = report.filtered_count,
            elapsed_ms = report.elapsed.as_millis(),
            "discovery run complete"
        );

        Ok(report)
    }

    /// Send the digest if the gate allows it. Failures are logged, never returned.
    async fn dispatch(&self, search: &SearchConfig, new_grants: &[Grant]) -> NotificationOutcome {
        if !search.should_notify(new_grants.len()) {
            if !new_grants.is_empty() {
                self.log
                    .info("Notification skipped: disabled or no recipient configured");
            }
            return NotificationOutcome::Skipped;
        }

        let recipient = search.email_recipient.trim();
        self.log.info(format!(
            "Dispatching digest of {} grant{} to {recipient}",
            new_grants.len(),
            plural_s(new_grants.len())
        ));

        match self.notifier.notify(recipient, new_grants).await {
            Ok(()) => {
                self.log.success(format!("Notification sent to {recipient}"));
                NotificationOutcome::Sent
            }
            Err(e) => {
                self.log.error(format!("Notification failed: {e}"));
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }

    fn read_repository(&self) -> RwLockReadGuard<'_, GrantRepository> {
        self.repository
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_repository(&self) -> RwLockWriteGuard<'_, GrantRepository> {
        self.repository
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the single-flight flag for the lifetime of a run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn plural_s(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
