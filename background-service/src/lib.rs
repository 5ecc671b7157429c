//! The posting scheduler: eligibility rules, quota and pacing, bounded
//! provider retries, and the loop that ties them together.

pub mod clock;
pub mod eligibility;
pub mod gateway;
pub mod quota;
pub mod service;
pub mod state;

pub use clock::{Clock, ShutdownSignal, ShutdownTrigger, SystemClock};
pub use eligibility::{check, is_eligible, Rejection};
pub use gateway::{Retrier, TRANSIENT_RETRY_DELAY};
pub use quota::{
    parse_wait_minutes, DailyGate, QuotaController, QuotaState, DAILY_RECHECK_INTERVAL,
};
pub use service::{BackgroundService, FAULT_RECOVERY_WAIT, SUBMISSION_FAILURE_WAIT};
pub use state::{CycleStats, SchedulerPhase, SchedulerState};
