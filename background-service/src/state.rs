use crate::quota::QuotaState;
use autoreply_core::DedupSet;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Startup,
    DailyQuotaCheck,
    CycleForumIteration,
    ItemProcessing,
    PacingSleep,
    InterCycleSleep,
    FaultRecovery,
    Shutdown,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerPhase::Startup => "startup",
            SchedulerPhase::DailyQuotaCheck => "daily-quota-check",
            SchedulerPhase::CycleForumIteration => "cycle-forum-iteration",
            SchedulerPhase::ItemProcessing => "item-processing",
            SchedulerPhase::PacingSleep => "pacing-sleep",
            SchedulerPhase::InterCycleSleep => "inter-cycle-sleep",
            SchedulerPhase::FaultRecovery => "fault-recovery",
            SchedulerPhase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Everything the scheduling loop mutates, owned by the loop and handed
/// back to the caller when it stops.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    pub phase: SchedulerPhase,
    pub forums: Vec<String>,
    pub dedup: DedupSet,
    pub quota: QuotaState,
    /// Cycles started since the process began.
    pub cycle: u64,
    pub totals: CycleStats,
}

impl SchedulerState {
    pub fn new(forums: Vec<String>, dedup: DedupSet) -> Self {
        Self {
            phase: SchedulerPhase::Startup,
            forums,
            dedup,
            quota: QuotaState::default(),
            cycle: 0,
            totals: CycleStats::default(),
        }
    }

    pub fn enter(&mut self, phase: SchedulerPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Scheduler phase change");
            self.phase = phase;
        }
    }
}

/// Counters for one cycle; also accumulated over the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub forums_visited: u32,
    pub forums_skipped: u32,
    pub forums_abandoned: u32,
    pub actions: u32,
    pub items_skipped: u32,
    pub failures: u32,
}

impl CycleStats {
    pub fn absorb(&mut self, other: &CycleStats) {
        self.forums_visited += other.forums_visited;
        self.forums_skipped += other.forums_skipped;
        self.forums_abandoned += other.forums_abandoned;
        self.actions += other.actions;
        self.items_skipped += other.items_skipped;
        self.failures += other.failures;
    }

    pub fn log_summary(&self, cycle: u64) {
        info!(
            cycle,
            forums = self.forums_visited,
            skipped_forums = self.forums_skipped,
            abandoned_forums = self.forums_abandoned,
            actions = self.actions,
            skipped_items = self.items_skipped,
            failures = self.failures,
            "Cycle {} finished: {} comment(s) posted",
            cycle,
            self.actions
        );
    }
}
