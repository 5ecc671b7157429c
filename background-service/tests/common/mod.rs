#![allow(dead_code)]

use activity_log::ActivityLog;
use autoreply_core::{CandidateItem, CoreError, LlmError, LookbackWindow, RedditApiError};
use background_service::{Clock, ShutdownSignal, ShutdownTrigger};
use chrono::{NaiveDate, NaiveDateTime};
use llm_interface::LlmProvider;
use reddit_client::{ForumGateway, SubmittedReply};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fakes saw, in the order the scheduler did it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Slept(Duration),
    Listed(String, LookbackWindow),
    Generated(String),
    Submitted(String),
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Slept(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Submitted(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Clock whose sleeps return at once and move time forward. Fires the stop
/// signal once `stop_after` sleeps have happened.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
    journal: Journal,
    stop_after: usize,
    trigger: ShutdownTrigger,
}

impl ManualClock {
    pub fn new(
        start: NaiveDateTime,
        journal: Journal,
        stop_after: usize,
    ) -> (ManualClock, ShutdownSignal) {
        let (trigger, signal) = ShutdownSignal::channel();
        let clock = ManualClock {
            now: Mutex::new(start),
            journal,
            stop_after,
            trigger,
        };
        (clock, signal)
    }

    pub fn stop_now(&self) {
        self.trigger.trigger();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(duration).unwrap();
        }
        self.journal.push(Event::Slept(duration));
        if self.journal.sleeps().len() >= self.stop_after {
            self.trigger.trigger();
        }
    }
}

pub fn candidate(id: &str, title: &str, score: i64) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        title: Some(title.to_string()),
        score: Some(score),
        locked: Some(false),
        archived: Some(false),
    }
}

/// How the fake forum answers a submission.
pub enum SubmitBehavior {
    Accept,
    RateLimit(&'static str),
    Reject,
}

pub struct FakeGateway {
    journal: Journal,
    /// Same listing for every window.
    listings: HashMap<String, Vec<CandidateItem>>,
    failing_forums: HashSet<String>,
    throttled_forums: HashSet<String>,
    panicking_forums: HashSet<String>,
    submissions: Mutex<VecDeque<SubmitBehavior>>,
}

impl FakeGateway {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            listings: HashMap::new(),
            failing_forums: HashSet::new(),
            throttled_forums: HashSet::new(),
            panicking_forums: HashSet::new(),
            submissions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_listing(mut self, forum: &str, items: Vec<CandidateItem>) -> Self {
        self.listings.insert(forum.to_string(), items);
        self
    }

    pub fn with_failing_forum(mut self, forum: &str) -> Self {
        self.failing_forums.insert(forum.to_string());
        self
    }

    /// Listing answers HTTP 429 the way Reddit throttles reads.
    pub fn with_throttled_forum(mut self, forum: &str) -> Self {
        self.throttled_forums.insert(forum.to_string());
        self
    }

    pub fn with_panicking_forum(mut self, forum: &str) -> Self {
        self.panicking_forums.insert(forum.to_string());
        self
    }

    /// Queued answers for successive submissions; accept once exhausted.
    pub fn with_submissions(self, behaviors: Vec<SubmitBehavior>) -> Self {
        *self.submissions.lock().unwrap() = behaviors.into();
        self
    }
}

impl ForumGateway for FakeGateway {
    async fn list_top_items(
        &self,
        forum: &str,
        window: LookbackWindow,
        _limit: u32,
    ) -> Result<Vec<CandidateItem>, CoreError> {
        self.journal.push(Event::Listed(forum.to_string(), window));
        if self.failing_forums.contains(forum) {
            return Err(RedditApiError::ServerError { status_code: 503 }.into());
        }
        if self.throttled_forums.contains(forum) {
            return Err(RedditApiError::Throttled {
                resource: format!("/r/{}/top", forum),
            }
            .into());
        }
        if self.panicking_forums.contains(forum) {
            panic!("listing for r/{} blew up", forum);
        }
        Ok(self.listings.get(forum).cloned().unwrap_or_default())
    }

    async fn submit_reply(&self, item_id: &str, _body: &str) -> Result<SubmittedReply, CoreError> {
        self.journal.push(Event::Submitted(item_id.to_string()));
        let behavior = self
            .submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitBehavior::Accept);
        match behavior {
            SubmitBehavior::Accept => Ok(SubmittedReply {
                link: format!("https://reddit.com/r/test/comments/{}/title/c_{}/", item_id, item_id),
            }),
            SubmitBehavior::RateLimit(message) => Err(RedditApiError::RateLimited {
                message: message.to_string(),
            }
            .into()),
            SubmitBehavior::Reject => Err(RedditApiError::SubmissionRejected {
                code: "THREAD_LOCKED".to_string(),
                message: "that thread is locked".to_string(),
            }
            .into()),
        }
    }
}

pub enum LlmBehavior {
    Answer,
    Empty,
    Fail,
}

pub struct FakeLlm {
    journal: Journal,
    behavior: LlmBehavior,
}

impl FakeLlm {
    pub fn new(journal: Journal, behavior: LlmBehavior) -> Self {
        Self { journal, behavior }
    }
}

impl LlmProvider for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String, CoreError> {
        self.journal.push(Event::Generated(prompt.to_string()));
        match self.behavior {
            LlmBehavior::Answer => Ok(format!("Here is an answer to: {}", prompt)),
            LlmBehavior::Empty => Ok("   ".to_string()),
            LlmBehavior::Fail => Err(LlmError::InvalidResponseFormat {
                provider: "fake".to_string(),
            }
            .into()),
        }
    }
}

pub fn temp_log() -> ActivityLog {
    let path: PathBuf =
        std::env::temp_dir().join(format!("scheduler_history_{}.txt", uuid::Uuid::new_v4()));
    ActivityLog::new(path)
}
