use autoreply_core::BotConfig;
use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;

/// Wait between daily-quota re-checks once the limit is hit.
pub const DAILY_RECHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Added on top of the wait the provider asks for.
pub const RATE_LIMIT_BUFFER_MINUTES: u64 = 2;

/// Result of the daily gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyGate {
    Open { remaining: usize },
    Exhausted,
}

/// Today's action count and the time of the most recent action.
///
/// The count is keyed by calendar day: once the day changes it is stale and
/// must be recomputed from the log before use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaState {
    day: Option<NaiveDate>,
    count: usize,
    last_action: Option<NaiveDateTime>,
}

impl QuotaState {
    pub fn recompute(&mut self, day: NaiveDate, count: usize) {
        self.day = Some(day);
        self.count = count;
    }

    /// The count for `day`, or `None` if it was computed for another day.
    pub fn count_for(&self, day: NaiveDate) -> Option<usize> {
        (self.day == Some(day)).then_some(self.count)
    }

    pub fn record_action(&mut self, at: NaiveDateTime) {
        if self.day == Some(at.date()) {
            self.count += 1;
        } else {
            self.day = Some(at.date());
            self.count = 1;
        }
        self.last_action = Some(at);
    }

    pub fn last_action(&self) -> Option<NaiveDateTime> {
        self.last_action
    }
}

/// Daily gate, pacing, and rate-limit backoff.
#[derive(Debug, Clone)]
pub struct QuotaController {
    max_daily: usize,
    min_sleep_seconds: u64,
    max_sleep_seconds: u64,
    cycle_sleep: Duration,
    fallback_backoff: Duration,
}

impl QuotaController {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            max_daily: config.max_daily_comments as usize,
            min_sleep_seconds: config.min_sleep_seconds,
            max_sleep_seconds: config.max_sleep_seconds.max(config.min_sleep_seconds),
            cycle_sleep: config.cycle_sleep(),
            fallback_backoff: config.rate_limit_sleep(),
        }
    }

    pub fn max_daily(&self) -> usize {
        self.max_daily
    }

    pub fn daily_gate(&self, today_count: usize) -> DailyGate {
        if today_count >= self.max_daily {
            DailyGate::Exhausted
        } else {
            DailyGate::Open {
                remaining: self.max_daily - today_count,
            }
        }
    }

    /// Uniformly random delay between actions, bounds inclusive.
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_secs(fastrand::u64(
            self.min_sleep_seconds..=self.max_sleep_seconds,
        ))
    }

    pub fn pacing_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_sleep_seconds),
            Duration::from_secs(self.max_sleep_seconds),
        )
    }

    pub fn inter_cycle_delay(&self) -> Duration {
        self.cycle_sleep
    }

    /// Backoff after a provider rate limit: the hinted minutes plus a buffer,
    /// or the configured fallback when the message carries no hint.
    pub fn rate_limit_backoff(&self, message: &str) -> Duration {
        match parse_wait_minutes(message) {
            Some(minutes) => Duration::from_secs(
                minutes
                    .saturating_add(RATE_LIMIT_BUFFER_MINUTES)
                    .saturating_mul(60),
            ),
            None => self.fallback_backoff,
        }
    }
}

/// Finds the number of minutes in messages like "take a break for 5 minutes".
///
/// Only digits directly before the word "minute" count, so other numbers in
/// the message are ignored.
pub fn parse_wait_minutes(message: &str) -> Option<u64> {
    let lowered = message.to_lowercase();
    lowered.match_indices("minute").find_map(|(at, _)| {
        let before = lowered[..at].trim_end();
        let digits_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        before[digits_start..].parse().ok()
    })
}
