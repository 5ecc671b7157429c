use crate::clock::{Clock, ShutdownSignal};
use crate::eligibility;
use crate::gateway::{self, Retrier};
use crate::quota::{DailyGate, QuotaController, DAILY_RECHECK_INTERVAL};
use crate::state::{CycleStats, SchedulerPhase, SchedulerState};
use activity_log::ActivityLog;
use autoreply_core::{
    load_forums, ActionRecord, BotConfig, CandidateItem, CoreError, ErrorExt, FailureKind,
};
use futures::FutureExt;
use llm_interface::LlmProvider;
use reddit_client::ForumGateway;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait after a submission failure that is not a rate limit.
pub const SUBMISSION_FAILURE_WAIT: Duration = Duration::from_secs(60);

/// Wait after an unexpected error or panic escapes a cycle.
pub const FAULT_RECOVERY_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForumOutcome {
    Completed,
    Skipped,
    Abandoned,
    QuotaReached,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Acted,
    Skipped,
    Failed,
    RateLimited(String),
    QuotaReached,
}

/// The posting scheduler.
///
/// One logical thread of control: forums are visited in order, items one at
/// a time, and every wait suspends the whole loop. The stop signal is checked
/// before each forum and item and cuts any wait short.
pub struct BackgroundService<G, L, C> {
    gateway: G,
    llm: L,
    clock: C,
    log: ActivityLog,
    forums_path: Option<PathBuf>,
    config: BotConfig,
    quota: QuotaController,
    shutdown: ShutdownSignal,
}

impl<G, L, C> BackgroundService<G, L, C>
where
    G: ForumGateway,
    L: LlmProvider,
    C: Clock,
{
    pub fn new(
        gateway: G,
        llm: L,
        clock: C,
        log: ActivityLog,
        config: BotConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let quota = QuotaController::from_config(&config);
        Self {
            gateway,
            llm,
            clock,
            log,
            forums_path: None,
            config,
            quota,
            shutdown,
        }
    }

    /// Re-read the forum list from this file before every cycle.
    pub fn with_forums_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.forums_path = Some(path.into());
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs until the stop signal fires, then hands the state back.
    pub async fn run(&self, mut state: SchedulerState) -> SchedulerState {
        info!(
            forums = state.forums.len(),
            known_items = state.dedup.len(),
            "Scheduler started"
        );

        while !self.shutdown.is_stopped() {
            let outcome = AssertUnwindSafe(self.run_round(&mut state))
                .catch_unwind()
                .await;

            let flow = match outcome {
                Ok(Ok(flow)) => flow,
                Ok(Err(e)) => {
                    e.log_error();
                    self.recover(&mut state).await
                }
                Err(panic) => {
                    error!("Scheduler cycle panicked: {}", panic_message(&*panic));
                    self.recover(&mut state).await
                }
            };
            if flow == Flow::Stopped {
                break;
            }
        }

        state.enter(SchedulerPhase::Shutdown);
        info!(
            cycles = state.cycle,
            actions = state.totals.actions,
            "Scheduler stopped"
        );
        state
    }

    async fn recover(&self, state: &mut SchedulerState) -> Flow {
        state.enter(SchedulerPhase::FaultRecovery);
        warn!(
            "Recovering from unexpected error, resuming in {} minutes",
            FAULT_RECOVERY_WAIT.as_secs() / 60
        );
        self.pause(FAULT_RECOVERY_WAIT).await
    }

    /// Suspends for `duration` unless a stop arrives first.
    async fn pause(&self, duration: Duration) -> Flow {
        debug!("Sleeping for {}s", duration.as_secs());
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Flow::Stopped,
            _ = self.clock.sleep(duration) => {
                if self.shutdown.is_stopped() { Flow::Stopped } else { Flow::Continue }
            }
        }
    }

    fn retrier(&self) -> Retrier<'_, C> {
        Retrier::new(&self.clock, &self.shutdown, self.config.max_retries)
    }

    /// Daily check, then one full cycle and the inter-cycle sleep. Errors
    /// returned here are the unexpected ones; expected provider failures are
    /// handled inside.
    async fn run_round(&self, state: &mut SchedulerState) -> Result<Flow, CoreError> {
        state.enter(SchedulerPhase::DailyQuotaCheck);
        let today = self.clock.now().date();
        let today_count = self.log.count_on(today).await?;
        state.quota.recompute(today, today_count);

        match self.quota.daily_gate(today_count) {
            DailyGate::Exhausted => {
                warn!(
                    "Daily comment limit ({}) reached. Checking again in an hour",
                    self.quota.max_daily()
                );
                return Ok(self.pause(DAILY_RECHECK_INTERVAL).await);
            }
            DailyGate::Open { remaining } => {
                info!(
                    "{} comment(s) posted today, {} remaining",
                    today_count, remaining
                );
            }
        }

        self.reload_forums(state);
        let from_log = self.log.load_dedup_set().await?;
        state.dedup.merge(from_log);

        state.cycle += 1;
        let cycle = state.cycle;
        let mut stats = CycleStats::default();

        if state.forums.is_empty() {
            warn!("Forum list is empty, nothing to do this cycle");
        } else {
            info!(
                "Starting cycle {} over {} forum(s)",
                cycle,
                state.forums.len()
            );
        }

        let forums = state.forums.clone();
        for forum in &forums {
            state.enter(SchedulerPhase::CycleForumIteration);
            if self.shutdown.is_stopped() {
                return Ok(Flow::Stopped);
            }

            let outcome = self.process_forum(state, forum, &mut stats).await?;
            match outcome {
                ForumOutcome::Completed | ForumOutcome::Skipped | ForumOutcome::Abandoned => {}
                ForumOutcome::QuotaReached => {
                    info!("Daily limit reached mid-cycle, ending cycle {}", cycle);
                    stats.log_summary(cycle);
                    state.totals.absorb(&stats);
                    return Ok(Flow::Continue);
                }
                ForumOutcome::Stopped => {
                    state.totals.absorb(&stats);
                    return Ok(Flow::Stopped);
                }
            }
        }

        stats.log_summary(cycle);
        state.totals.absorb(&stats);

        state.enter(SchedulerPhase::InterCycleSleep);
        let delay = self.quota.inter_cycle_delay();
        info!(
            "Cycle {} complete. Sleeping {} minutes before the next one",
            cycle,
            delay.as_secs() / 60
        );
        Ok(self.pause(delay).await)
    }

    fn reload_forums(&self, state: &mut SchedulerState) {
        let Some(path) = &self.forums_path else {
            return;
        };
        match load_forums(path) {
            Ok(forums) => {
                if forums != state.forums {
                    info!("Forum list reloaded: {} forum(s)", forums.len());
                }
                state.forums = forums;
            }
            Err(e) => {
                warn!(
                    "Could not reload forum list ({}), keeping {} known forum(s)",
                    e,
                    state.forums.len()
                );
            }
        }
    }

    async fn process_forum(
        &self,
        state: &mut SchedulerState,
        forum: &str,
        stats: &mut CycleStats,
    ) -> Result<ForumOutcome, CoreError> {
        stats.forums_visited += 1;
        let retrier = self.retrier();

        let candidates =
            match gateway::fetch_candidates(&retrier, &self.gateway, forum, &self.config, &state.dedup)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(code = %e.error_code(), "Skipping r/{} this cycle: {}", forum, e);
                    stats.forums_skipped += 1;
                    stats.failures += 1;
                    return Ok(ForumOutcome::Skipped);
                }
            };
        info!("Found {} new candidate(s) in r/{}", candidates.len(), forum);

        let cap = self.config.max_comments_per_subreddit;
        let mut acted = 0;
        for item in &candidates {
            if self.shutdown.is_stopped() {
                return Ok(ForumOutcome::Stopped);
            }
            if acted >= cap {
                debug!("Reached {} comment(s) in r/{}, moving on", cap, forum);
                break;
            }

            state.enter(SchedulerPhase::ItemProcessing);
            match self.process_item(state, forum, item).await? {
                ItemOutcome::Acted => {
                    acted += 1;
                    stats.actions += 1;
                    state.enter(SchedulerPhase::PacingSleep);
                    let delay = self.quota.pacing_delay();
                    info!("Waiting {} minutes before the next comment", delay.as_secs() / 60);
                    if self.pause(delay).await == Flow::Stopped {
                        return Ok(ForumOutcome::Stopped);
                    }
                }
                ItemOutcome::Skipped => stats.items_skipped += 1,
                ItemOutcome::Failed => {
                    stats.failures += 1;
                    if self.pause(SUBMISSION_FAILURE_WAIT).await == Flow::Stopped {
                        return Ok(ForumOutcome::Stopped);
                    }
                }
                ItemOutcome::RateLimited(message) => {
                    stats.failures += 1;
                    stats.forums_abandoned += 1;
                    let backoff = self.quota.rate_limit_backoff(&message);
                    warn!(
                        "Rate limited in r/{}. Sleeping {} minutes, then moving to the next forum",
                        forum,
                        backoff.as_secs() / 60
                    );
                    if self.pause(backoff).await == Flow::Stopped {
                        return Ok(ForumOutcome::Stopped);
                    }
                    return Ok(ForumOutcome::Abandoned);
                }
                ItemOutcome::QuotaReached => return Ok(ForumOutcome::QuotaReached),
            }
        }

        Ok(ForumOutcome::Completed)
    }

    async fn process_item(
        &self,
        state: &mut SchedulerState,
        forum: &str,
        item: &CandidateItem,
    ) -> Result<ItemOutcome, CoreError> {
        if let Err(reason) = eligibility::check(item, &self.config) {
            debug!("Skipping {}: {}", item.id, reason);
            return Ok(ItemOutcome::Skipped);
        }
        if state.dedup.contains(&item.id) {
            debug!("Already commented on {}", item.id);
            return Ok(ItemOutcome::Skipped);
        }

        let today = self.clock.now().date();
        let today_count = match state.quota.count_for(today) {
            Some(count) => count,
            None => {
                let count = self.log.count_on(today).await?;
                state.quota.recompute(today, count);
                count
            }
        };
        if self.quota.daily_gate(today_count) == DailyGate::Exhausted {
            return Ok(ItemOutcome::QuotaReached);
        }

        let title = item.title.as_deref().unwrap_or_default();
        let retrier = self.retrier();

        let body = match gateway::generate_reply(&retrier, &self.llm, title).await {
            Ok(text) if text.trim().is_empty() => {
                warn!("Empty reply generated for {}, skipping", item.id);
                return Ok(ItemOutcome::Skipped);
            }
            Ok(text) => text,
            Err(e) => {
                warn!(code = %e.error_code(), "Could not generate a reply for {}: {}", item.id, e);
                return Ok(ItemOutcome::Skipped);
            }
        };

        let reply = match gateway::submit_reply(&retrier, &self.gateway, &item.id, &body).await {
            Ok(reply) => reply,
            Err(e) if e.failure_kind() == FailureKind::RateLimited => {
                let message = e.rate_limit_message().unwrap_or_else(|| e.to_string());
                return Ok(ItemOutcome::RateLimited(message));
            }
            Err(e) => {
                error!(code = %e.error_code(), "Failed to comment on {}: {}", item.id, e);
                return Ok(ItemOutcome::Failed);
            }
        };

        let posted_at = self.clock.now();
        let record = ActionRecord::new(posted_at, forum, title, reply.link.clone());
        if let Err(e) = self.log.append(&record).await {
            e.log_error();
        }
        state.dedup.insert(item.id.clone());
        state.quota.record_action(posted_at);

        info!(
            outcome = "success",
            forum,
            item = %item.id,
            link = %reply.link,
            "Commented on r/{}: {}",
            forum,
            record.title
        );
        Ok(ItemOutcome::Acted)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
