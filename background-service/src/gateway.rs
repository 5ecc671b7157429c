use crate::clock::{Clock, ShutdownSignal};
use autoreply_core::{BotConfig, CandidateItem, CoreError, DedupSet, FailureKind, LookbackWindow};
use llm_interface::LlmProvider;
use reddit_client::{ForumGateway, SubmittedReply};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between attempts after a transient failure.
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry for provider calls.
///
/// Only transient failures are retried. Anything else, and the last transient
/// failure once attempts run out, goes straight back to the caller.
pub struct Retrier<'a, C> {
    clock: &'a C,
    shutdown: &'a ShutdownSignal,
    max_attempts: u32,
    delay: Duration,
}

impl<'a, C: Clock> Retrier<'a, C> {
    pub fn new(clock: &'a C, shutdown: &'a ShutdownSignal, max_attempts: u32) -> Self {
        Self {
            clock,
            shutdown,
            max_attempts: max_attempts.max(1),
            delay: TRANSIENT_RETRY_DELAY,
        }
    }

    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.failure_kind();
            if kind != FailureKind::Transient {
                debug!("Not retrying {} ({} failure): {}", operation_name, kind, error);
                return Err(error);
            }
            if attempt >= self.max_attempts {
                warn!(
                    "{} failed after {} attempts: {}",
                    operation_name, attempt, error
                );
                return Err(error);
            }

            warn!(
                "Attempt {}/{} of {} failed: {}. Retrying in {}s",
                attempt,
                self.max_attempts,
                operation_name,
                error,
                self.delay.as_secs()
            );
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Err(error),
                _ = self.clock.sleep(self.delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Lists each lookback window in turn and merges the results: first window
/// first, each id once, nothing already in `dedup`.
///
/// The whole multi-window fetch is one retry unit.
pub async fn fetch_candidates<G, C>(
    retrier: &Retrier<'_, C>,
    gateway: &G,
    forum: &str,
    config: &BotConfig,
    dedup: &DedupSet,
) -> Result<Vec<CandidateItem>, CoreError>
where
    G: ForumGateway,
    C: Clock,
{
    let limit = config.posts_per_request;
    retrier
        .run(&format!("listing r/{}", forum), move || async move {
            let mut seen = HashSet::new();
            let mut merged = Vec::new();
            for window in LookbackWindow::ALL {
                for item in gateway.list_top_items(forum, window, limit).await? {
                    if dedup.contains(&item.id) || !seen.insert(item.id.clone()) {
                        continue;
                    }
                    merged.push(item);
                }
            }
            Ok(merged)
        })
        .await
}

pub async fn generate_reply<L, C>(
    retrier: &Retrier<'_, C>,
    llm: &L,
    prompt: &str,
) -> Result<String, CoreError>
where
    L: LlmProvider,
    C: Clock,
{
    retrier
        .run("generation", move || async move { llm.generate(prompt).await })
        .await
}

pub async fn submit_reply<G, C>(
    retrier: &Retrier<'_, C>,
    gateway: &G,
    item_id: &str,
    body: &str,
) -> Result<SubmittedReply, CoreError>
where
    G: ForumGateway,
    C: Clock,
{
    retrier
        .run(&format!("submission to {}", item_id), move || async move {
            gateway.submit_reply(item_id, body).await
        })
        .await
}
