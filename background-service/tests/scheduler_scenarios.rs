mod common;

use autoreply_core::{ActionRecord, BotConfig, DedupSet, LookbackWindow};
use background_service::{
    BackgroundService, SchedulerPhase, SchedulerState, DAILY_RECHECK_INTERVAL,
    FAULT_RECOVERY_WAIT, SUBMISSION_FAILURE_WAIT, TRANSIENT_RETRY_DELAY,
};
use common::*;
use std::time::Duration;

fn test_config() -> BotConfig {
    BotConfig {
        min_sleep_seconds: 100,
        max_sleep_seconds: 200,
        cycle_sleep_minutes: 180,
        ..Default::default()
    }
}

fn state(forums: &[&str]) -> SchedulerState {
    SchedulerState::new(
        forums.iter().map(|f| f.to_string()).collect(),
        DedupSet::new(),
    )
}

const CYCLE_SLEEP: Duration = Duration::from_secs(180 * 60);

#[tokio::test]
async fn test_single_eligible_item_is_answered_and_paced() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 2);
    let gateway = FakeGateway::new(journal.clone()).with_listing(
        "askscience",
        vec![candidate("abc123", "Why is the sky blue?", 120)],
    );
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    );
    let final_state = service.run(state(&["askscience"])).await;

    let records = log.read_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].forum, "askscience");
    assert_eq!(records[0].item_id(), Some("abc123"));
    assert_eq!(records[0].title, "Why is the sky blue?");

    assert_eq!(final_state.dedup.len(), 1);
    assert!(final_state.dedup.contains("abc123"));
    assert_eq!(final_state.cycle, 1);
    assert_eq!(final_state.totals.actions, 1);
    assert_eq!(final_state.phase, SchedulerPhase::Shutdown);

    let events = journal.events();
    let submitted_at = events
        .iter()
        .position(|e| *e == Event::Submitted("abc123".to_string()))
        .expect("item was submitted");
    match &events[submitted_at + 1] {
        Event::Slept(pacing) => {
            assert!(*pacing >= Duration::from_secs(100) && *pacing <= Duration::from_secs(200));
        }
        other => panic!("Expected pacing sleep after submission, got {:?}", other),
    }
    assert_eq!(journal.sleeps().last(), Some(&CYCLE_SLEEP));
    assert_eq!(journal.submitted(), vec!["abc123"]);

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_rate_limit_backs_off_and_abandons_forum() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 3);
    let gateway = FakeGateway::new(journal.clone())
        .with_listing(
            "askscience",
            vec![
                candidate("a1", "First question", 50),
                candidate("a2", "Second question", 50),
            ],
        )
        .with_listing("history", vec![candidate("h1", "When did Rome fall?", 50)])
        .with_submissions(vec![SubmitBehavior::RateLimit("please wait 5 minutes")]);
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let config = BotConfig {
        max_comments_per_subreddit: 2,
        ..test_config()
    };
    let service = BackgroundService::new(gateway, llm, clock, log.clone(), config, shutdown);
    let final_state = service.run(state(&["askscience", "history"])).await;

    let events = journal.events();
    let rate_limited = events
        .iter()
        .position(|e| *e == Event::Submitted("a1".to_string()))
        .unwrap();
    assert_eq!(
        events[rate_limited + 1],
        Event::Slept(Duration::from_secs(7 * 60))
    );
    assert_eq!(
        events[rate_limited + 2],
        Event::Listed("history".to_string(), LookbackWindow::Day)
    );

    // The remaining askscience item is never attempted.
    assert!(!events.contains(&Event::Generated("Second question".to_string())));
    assert_eq!(journal.submitted(), vec!["a1", "h1"]);
    assert!(!final_state.dedup.contains("a1"));
    assert_eq!(final_state.totals.forums_abandoned, 1);
    assert_eq!(log.read_records().await.unwrap().len(), 1);

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_listing_exhausting_retries_skips_forum() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 3);
    let gateway = FakeGateway::new(journal.clone())
        .with_failing_forum("broken")
        .with_listing("history", Vec::new());
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    );
    let final_state = service.run(state(&["broken", "history"])).await;

    let broken = Event::Listed("broken".to_string(), LookbackWindow::Day);
    let retry = Event::Slept(TRANSIENT_RETRY_DELAY);
    let events = journal.events();
    assert_eq!(
        &events[..6],
        &[
            broken.clone(),
            retry.clone(),
            broken.clone(),
            retry,
            broken,
            Event::Listed("history".to_string(), LookbackWindow::Day),
        ]
    );
    assert_eq!(journal.sleeps().last(), Some(&CYCLE_SLEEP));
    assert_eq!(final_state.totals.forums_skipped, 1);
    assert_eq!(final_state.cycle, 1);
}

#[tokio::test]
async fn test_throttled_listing_is_retried_before_skipping() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 3);
    let gateway = FakeGateway::new(journal.clone())
        .with_throttled_forum("busy")
        .with_listing("history", Vec::new());
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);

    let service = BackgroundService::new(gateway, llm, clock, temp_log(), test_config(), shutdown);
    let final_state = service.run(state(&["busy", "history"])).await;

    let busy = Event::Listed("busy".to_string(), LookbackWindow::Day);
    let retry = Event::Slept(TRANSIENT_RETRY_DELAY);
    let events = journal.events();
    assert_eq!(
        &events[..6],
        &[
            busy.clone(),
            retry.clone(),
            busy.clone(),
            retry,
            busy,
            Event::Listed("history".to_string(), LookbackWindow::Day),
        ]
    );
    // A read throttle never reaches the posting backoff.
    assert_eq!(final_state.totals.forums_abandoned, 0);
    assert_eq!(final_state.totals.forums_skipped, 1);
    assert_eq!(journal.sleeps().last(), Some(&CYCLE_SLEEP));
}

#[tokio::test]
async fn test_daily_limit_waits_hourly_until_next_day() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 20, 30), journal.clone(), 5);
    let gateway = FakeGateway::new(journal.clone()).with_listing("askscience", Vec::new());
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    log.append(&ActionRecord::new(
        at(9, 12, 0),
        "askscience",
        "Yesterday",
        "https://reddit.com/r/askscience/comments/old/x/",
    ))
    .await
    .unwrap();
    for i in 0..10 {
        log.append(&ActionRecord::new(
            at(10, 8, i),
            "askscience",
            "Earlier today",
            format!("https://reddit.com/r/askscience/comments/t{}/x/", i),
        ))
        .await
        .unwrap();
    }

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    );
    let final_state = service.run(state(&["askscience"])).await;

    let events = journal.events();
    // 20:30 -> 21:30 -> 22:30 -> 23:30 -> 00:30 on the next day
    assert_eq!(
        events[..4].to_vec(),
        vec![Event::Slept(DAILY_RECHECK_INTERVAL); 4]
    );
    assert_eq!(
        events[4],
        Event::Listed("askscience".to_string(), LookbackWindow::Day)
    );
    assert_eq!(journal.sleeps().last(), Some(&CYCLE_SLEEP));
    assert_eq!(final_state.cycle, 1);
    // Everything from the log was picked up for dedup once the cycle began
    assert_eq!(final_state.dedup.len(), 11);

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_quota_reached_mid_cycle_returns_to_daily_check() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 2);
    let gateway = FakeGateway::new(journal.clone())
        .with_listing("first", vec![candidate("f1", "First forum post", 50)])
        .with_listing("second", vec![candidate("s1", "Second forum post", 50)]);
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let config = BotConfig {
        max_daily_comments: 1,
        ..test_config()
    };
    let service = BackgroundService::new(gateway, llm, clock, log.clone(), config, shutdown);
    service.run(state(&["first", "second"])).await;

    assert_eq!(journal.submitted(), vec!["f1"]);
    let sleeps = journal.sleeps();
    assert_eq!(sleeps.len(), 2);
    assert_eq!(sleeps[1], DAILY_RECHECK_INTERVAL);
    assert!(!sleeps.contains(&CYCLE_SLEEP));

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_other_submission_failure_waits_and_continues() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 3);
    let gateway = FakeGateway::new(journal.clone())
        .with_listing(
            "askscience",
            vec![
                candidate("a1", "Locked after listing", 50),
                candidate("a2", "Still open", 50),
            ],
        )
        .with_submissions(vec![SubmitBehavior::Reject]);
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    );
    let final_state = service.run(state(&["askscience"])).await;

    let events = journal.events();
    let rejected = events
        .iter()
        .position(|e| *e == Event::Submitted("a1".to_string()))
        .unwrap();
    // Permanent failures are not retried by the adapter
    assert_eq!(events[rejected + 1], Event::Slept(SUBMISSION_FAILURE_WAIT));
    assert_eq!(events[rejected + 2], Event::Generated("Still open".to_string()));
    assert_eq!(journal.submitted(), vec!["a1", "a2"]);
    assert!(final_state.dedup.contains("a2"));
    assert!(!final_state.dedup.contains("a1"));

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_generation_failure_or_empty_text_skips_item() {
    for behavior in [LlmBehavior::Fail, LlmBehavior::Empty] {
        let journal = Journal::default();
        let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 1);
        let gateway = FakeGateway::new(journal.clone())
            .with_listing("askscience", vec![candidate("a1", "Question", 50)]);
        let llm = FakeLlm::new(journal.clone(), behavior);
        let log = temp_log();

        let service = BackgroundService::new(
            gateway,
            llm,
            clock,
            log.clone(),
            test_config(),
            shutdown,
        );
        let final_state = service.run(state(&["askscience"])).await;

        assert!(journal.submitted().is_empty());
        assert_eq!(journal.sleeps(), vec![CYCLE_SLEEP]);
        assert_eq!(final_state.totals.items_skipped, 1);
        assert!(log.read_records().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_ineligible_and_known_items_are_not_answered() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 1);
    let mut locked = candidate("locked1", "Locked question", 500);
    locked.locked = Some(true);
    let gateway = FakeGateway::new(journal.clone()).with_listing(
        "askscience",
        vec![
            candidate("low1", "Low score", 2),
            candidate("mega1", "Weekly Megathread", 900),
            locked,
            candidate("done1", "Already answered", 80),
        ],
    );
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();
    log.append(&ActionRecord::new(
        at(9, 12, 0),
        "askscience",
        "Already answered",
        "https://reddit.com/r/askscience/comments/done1/x/c1/",
    ))
    .await
    .unwrap();

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    );
    service.run(state(&["askscience"])).await;

    let generated = journal
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Generated(_)))
        .count();
    assert_eq!(generated, 0);
    assert!(journal.submitted().is_empty());

    std::fs::remove_file(log.path()).ok();
}

#[tokio::test]
async fn test_forum_list_is_reloaded_each_cycle() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 1);
    let gateway = FakeGateway::new(journal.clone());
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    let log = temp_log();

    let forums_file =
        std::env::temp_dir().join(format!("forums_{}.txt", uuid::Uuid::new_v4()));
    std::fs::write(&forums_file, "r/history\n\n").unwrap();

    let service = BackgroundService::new(
        gateway,
        llm,
        clock,
        log.clone(),
        test_config(),
        shutdown,
    )
    .with_forums_file(&forums_file);
    let final_state = service.run(state(&["askscience"])).await;

    assert_eq!(final_state.forums, vec!["history"]);
    let events = journal.events();
    assert!(events.contains(&Event::Listed("history".to_string(), LookbackWindow::Month)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::Listed(forum, _) if forum == "askscience")));

    std::fs::remove_file(&forums_file).ok();
}

#[tokio::test]
async fn test_unreadable_log_triggers_fault_recovery() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 1);
    let gateway = FakeGateway::new(journal.clone());
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);
    // A directory cannot be read as a log file
    let log = activity_log::ActivityLog::new(std::env::temp_dir());

    let service = BackgroundService::new(gateway, llm, clock, log, test_config(), shutdown);
    let final_state = service.run(state(&["askscience"])).await;

    assert_eq!(journal.events(), vec![Event::Slept(FAULT_RECOVERY_WAIT)]);
    assert_eq!(final_state.cycle, 0);
    assert_eq!(final_state.phase, SchedulerPhase::Shutdown);
}

#[tokio::test]
async fn test_panic_during_listing_recovers_and_starts_new_cycle() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 2);
    let gateway = FakeGateway::new(journal.clone()).with_panicking_forum("askscience");
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);

    let service = BackgroundService::new(gateway, llm, clock, temp_log(), test_config(), shutdown);
    let final_state = service.run(state(&["askscience"])).await;

    let listed = Event::Listed("askscience".to_string(), LookbackWindow::Day);
    assert_eq!(
        journal.events(),
        vec![
            listed.clone(),
            Event::Slept(FAULT_RECOVERY_WAIT),
            listed,
            Event::Slept(FAULT_RECOVERY_WAIT),
        ]
    );
    assert_eq!(final_state.phase, SchedulerPhase::Shutdown);
}

#[tokio::test]
async fn test_stop_before_start_does_nothing() {
    let journal = Journal::default();
    let (clock, shutdown) = ManualClock::new(at(10, 9, 0), journal.clone(), 1);
    clock.stop_now();
    let gateway = FakeGateway::new(journal.clone())
        .with_listing("askscience", vec![candidate("a1", "Question", 50)]);
    let llm = FakeLlm::new(journal.clone(), LlmBehavior::Answer);

    let service = BackgroundService::new(gateway, llm, clock, temp_log(), test_config(), shutdown);
    let final_state = service.run(state(&["askscience"])).await;

    assert_eq!(final_state.cycle, 0);
    assert!(journal.events().is_empty());
}
