mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

use cbt_attempt::workflow::{
    AnswerUpdate, AttemptSession, SaveState, SessionEvent, SubmissionState, SubmitOutcome,
    SubmitReason,
};
use common::{sample_attempt, session_with, settings, Call, FakeBackend, TokioClock, ATTEMPT_ID};

fn drain(events: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ========== 自动保存 ==========

#[tokio::test(start_paused = true)]
async fn burst_within_window_sends_one_flush_with_latest_values() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    session.set_answer(101, "A").await;
    sleep(Duration::from_millis(500)).await;
    session.set_answer(101, "B").await;
    session.set_answer(103, "because").await;

    sleep(Duration::from_millis(1500)).await;
    assert!(backend.saves().is_empty(), "防抖窗口内不应保存");

    sleep(Duration::from_secs(3)).await;
    let saves = backend.saves();
    assert_eq!(saves.len(), 1);

    let roster = &saves[0];
    assert_eq!(roster.len(), 3);
    assert_eq!(roster[0].selected_choices.as_deref(), Some("B"));
    assert_eq!(roster[1].selected_choices, None);
    assert_eq!(roster[2].response_text.as_deref(), Some("because"));
    assert!(roster.iter().all(|p| p.user_id == Some(9)));

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn edits_during_inflight_save_wait_for_it() {
    let (session, backend) = session_with(0, 600);
    backend.set_save_delay(Duration::from_secs(3));
    assert_ok!(session.load(ATTEMPT_ID).await);

    session.set_answer(101, "A").await;
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(backend.saves().len(), 1);

    session.set_answer(102, "B").await;
    let manual = session.flush_answers();
    let (flushed, _) = tokio::join!(manual, sleep(Duration::from_secs(10)));
    assert!(flushed.unwrap());

    assert_eq!(backend.max_saves_in_flight(), 1);
    let saves = backend.saves();
    assert!(saves.len() >= 2);
    assert_eq!(
        saves.last().unwrap()[1].selected_choices.as_deref(),
        Some("B")
    );

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_reported_and_not_retried() {
    let (session, backend) = session_with(0, 600);
    backend.fail_saves(true);
    assert_ok!(session.load(ATTEMPT_ID).await);
    let mut events = session.subscribe();

    session.set_answer(101, "A").await;
    sleep(Duration::from_secs(15)).await;

    assert_eq!(backend.saves().len(), 1);
    let view = session.snapshot().await;
    assert_eq!(view.save_state, SaveState::SaveFailed);
    assert_eq!(view.submission, SubmissionState::InProgress);
    assert!(drain(&mut events).contains(&SessionEvent::SaveStateChanged(SaveState::SaveFailed)));

    // 下一次改动会重新触发保存
    backend.fail_saves(false);
    session.set_answer(101, "B").await;
    sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.saves().len(), 2);
    assert_eq!(session.snapshot().await.save_state, SaveState::Idle);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn mcq_answer_is_sent_as_selected_choice() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    assert_eq!(session.set_answer(101, "B").await, AnswerUpdate::Stored);
    assert_eq!(session.set_answer(101, "Z").await, AnswerUpdate::Ignored);
    assert!(session.flush_answers().await.unwrap());

    let saves = backend.saves();
    let json = serde_json::to_value(&saves[0][0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"questionId": 101, "selectedChoices": "B", "userId": 9})
    );
    assert_eq!(session.answer_for(101).await.as_deref(), Some("B"));
    assert!(session.palette().await[0].answered);

    session.close().await;
}

// ========== 交卷 ==========

#[tokio::test(start_paused = true)]
async fn concurrent_submits_reach_backend_once() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    let (manual, time_up) = tokio::join!(
        session.submit(SubmitReason::Manual),
        session.submit(SubmitReason::TimeUp)
    );
    let outcomes = [manual.unwrap(), time_up.unwrap()];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Submitted(_)))
            .count(),
        1
    );
    assert!(outcomes.contains(&SubmitOutcome::Ignored));
    assert_eq!(backend.submit_count(), 1);

    assert_eq!(
        session.submit(SubmitReason::Manual).await.unwrap(),
        SubmitOutcome::Ignored
    );
    assert_eq!(backend.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn submit_flushes_before_calling_backend() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    session.set_answer(103, "draft").await;
    let outcome = session.submit(SubmitReason::Manual).await.unwrap();
    let SubmitOutcome::Submitted(summary) = outcome else {
        panic!("应当完成交卷");
    };
    assert_eq!(summary.total_score, Some(3));

    let calls = backend.calls();
    let save_at = calls.iter().position(|c| matches!(c, Call::Save(_))).unwrap();
    let submit_at = calls.iter().position(|c| matches!(c, Call::Submit(_))).unwrap();
    assert!(save_at < submit_at);
    assert_eq!(backend.saves()[0][2].response_text.as_deref(), Some("draft"));
}

#[tokio::test(start_paused = true)]
async fn submitted_attempt_is_frozen() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);
    session.submit(SubmitReason::Manual).await.unwrap();

    let calls_after_submit = backend.calls().len();
    let mut events = session.subscribe();

    assert_eq!(session.set_answer(101, "A").await, AnswerUpdate::Ignored);
    assert!(!session.flush_answers().await.unwrap());
    sleep(Duration::from_secs(30)).await;

    assert_eq!(backend.calls().len(), calls_after_submit);
    assert!(drain(&mut events).is_empty(), "交卷后不应再有倒计时或保存事件");
    assert_eq!(session.answer_for(101).await, None);
    assert_eq!(session.snapshot().await.submission, SubmissionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_keeps_attempt_open_for_retry() {
    let (session, backend) = session_with(0, 600);
    backend.fail_next_submits(1);
    assert_ok!(session.load(ATTEMPT_ID).await);
    let mut events = session.subscribe();

    assert_err!(session.submit(SubmitReason::Manual).await);
    let view = session.snapshot().await;
    assert_eq!(view.submission, SubmissionState::InProgress);
    assert!(view.last_error.is_some());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::SubmitFailed { reason: SubmitReason::Manual, .. })));

    assert_eq!(session.set_answer(101, "A").await, AnswerUpdate::Stored);
    assert!(matches!(
        session.submit(SubmitReason::Manual).await.unwrap(),
        SubmitOutcome::Submitted(_)
    ));
    assert_eq!(backend.submit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_final_flush_aborts_submit() {
    let (session, backend) = session_with(0, 600);
    backend.fail_saves(true);
    assert_ok!(session.load(ATTEMPT_ID).await);
    session.set_answer(101, "A").await;

    assert_err!(session.submit(SubmitReason::Manual).await);
    assert_eq!(backend.submit_count(), 0);
    assert_eq!(session.snapshot().await.submission, SubmissionState::InProgress);

    session.close().await;
}

// ========== 倒计时 ==========

#[tokio::test(start_paused = true)]
async fn expired_attempt_submits_on_first_tick_after_flush() {
    let (session, backend) = session_with(650, 600);
    let mut events = session.subscribe();
    assert_ok!(session.load(ATTEMPT_ID).await);
    session.set_answer(101, "A").await;

    sleep(Duration::from_millis(1500)).await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 3, "{:?}", calls);
    assert_eq!(calls[0], Call::Load(ATTEMPT_ID));
    match &calls[1] {
        Call::Save(roster) => assert_eq!(roster[0].selected_choices.as_deref(), Some("A")),
        other => panic!("应先保存，实际: {:?}", other),
    }
    assert_eq!(calls[2], Call::Submit(ATTEMPT_ID));

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::Loaded {
        attempt_id: ATTEMPT_ID,
        question_count: 3,
        remaining_secs: 0,
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Submitted { reason: SubmitReason::TimeUp, .. })));
    assert_eq!(session.snapshot().await.submission, SubmissionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn countdown_runs_down_and_submits_once() {
    let (session, backend) = session_with(595, 600);
    let mut events = session.subscribe();
    assert_ok!(session.load(ATTEMPT_ID).await);

    sleep(Duration::from_secs(10)).await;

    let ticks: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Tick { remaining_secs, low_time } => Some((remaining_secs, low_time)),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![(4, true), (3, true), (2, true), (1, true), (0, true)]);
    assert_eq!(backend.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_time_up_submit_is_not_rearmed() {
    let (session, backend) = session_with(650, 600);
    backend.fail_next_submits(1);
    assert_ok!(session.load(ATTEMPT_ID).await);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(backend.submit_count(), 1);
    assert_eq!(session.snapshot().await.submission, SubmissionState::InProgress);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.submit_count(), 1);

    assert!(matches!(
        session.submit(SubmitReason::Manual).await.unwrap(),
        SubmitOutcome::Submitted(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn countdown_resumes_after_failed_manual_submit() {
    let (session, backend) = session_with(595, 600);
    backend.fail_next_submits(1);
    assert_ok!(session.load(ATTEMPT_ID).await);

    assert_err!(session.submit(SubmitReason::Manual).await);
    sleep(Duration::from_secs(7)).await;

    assert_eq!(backend.submit_count(), 2);
    assert_eq!(session.snapshot().await.submission, SubmissionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn reload_does_not_reset_countdown() {
    let now = Utc::now();
    let clock = TokioClock::new(now);
    let backend = FakeBackend::new(sample_attempt(now - ChronoDuration::seconds(100), 600));

    let first = AttemptSession::with_clock(backend.clone(), settings(), None, clock.clone());
    first.load(ATTEMPT_ID).await.unwrap();
    assert_eq!(first.snapshot().await.remaining_secs, Some(500));

    sleep(Duration::from_secs(30)).await;
    let before = first.snapshot().await.remaining_secs.unwrap();
    first.close().await;

    let reloaded = AttemptSession::with_clock(backend.clone(), settings(), None, clock);
    reloaded.load(ATTEMPT_ID).await.unwrap();
    let after = reloaded.snapshot().await.remaining_secs.unwrap();

    assert!((before - after).abs() <= 1);
    assert_eq!(after, 470);
    reloaded.close().await;
}

// ========== 加载与导航 ==========

#[tokio::test(start_paused = true)]
async fn load_failure_is_surfaced() {
    let (session, backend) = session_with(0, 600);
    backend.fail_load(true);
    let mut events = session.subscribe();

    assert_err!(session.load(ATTEMPT_ID).await);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::LoadFailed { attempt_id: ATTEMPT_ID, .. })));

    assert_eq!(session.set_answer(101, "A").await, AnswerUpdate::Ignored);
    assert_err!(session.submit(SubmitReason::Manual).await);
    assert_eq!(session.snapshot().await.attempt_id, None);
    assert_eq!(backend.calls(), vec![Call::Load(ATTEMPT_ID)]);
}

#[tokio::test(start_paused = true)]
async fn navigation_stays_in_range() {
    let (session, _backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    assert!(!session.go_to(3).await);
    assert_eq!(session.snapshot().await.current_index, 0);
    assert!(!session.prev().await);

    assert!(session.next().await);
    assert!(session.next().await);
    assert!(!session.next().await);
    assert_eq!(session.current_question().await.map(|q| q.id), Some(103));

    assert!(session.prev().await);
    let palette = session.palette().await;
    assert!(palette[1].current);

    session.close().await;
}

// ========== 离开答题页 ==========

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_save_and_countdown() {
    let (session, backend) = session_with(0, 600);
    assert_ok!(session.load(ATTEMPT_ID).await);

    session.set_answer(101, "A").await;
    sleep(Duration::from_millis(500)).await;
    session.close().await;
    let mut events = session.subscribe();

    sleep(Duration::from_secs(30)).await;

    assert!(backend.saves().is_empty(), "关闭后挂起的防抖保存应被取消");
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Tick { .. })));

    assert_eq!(session.set_answer(102, "B").await, AnswerUpdate::Ignored);
    assert!(!session.flush_answers().await.unwrap());
    assert_eq!(
        session.submit(SubmitReason::Manual).await.unwrap(),
        SubmitOutcome::Ignored
    );
    assert_eq!(backend.calls(), vec![Call::Load(ATTEMPT_ID)]);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_after_close_does_not_restart_countdown() {
    let (session, backend) = session_with(595, 600);
    backend.set_save_delay(Duration::from_secs(3));
    backend.fail_saves(true);
    assert_ok!(session.load(ATTEMPT_ID).await);

    let submitting = tokio::spawn({
        let session = session.clone();
        async move { session.submit(SubmitReason::Manual).await }
    });

    sleep(Duration::from_millis(500)).await;
    session.close().await;
    let mut events = session.subscribe();
    let calls_at_close = backend.calls();
    assert_eq!(calls_at_close.len(), 2, "{:?}", calls_at_close);

    // 交卷前的保存在 3 秒时失败，之后恢复后端
    assert_err!(submitting.await.unwrap());
    backend.fail_saves(false);
    sleep(Duration::from_secs(30)).await;

    assert_eq!(backend.calls(), calls_at_close);
    assert_eq!(backend.submit_count(), 0);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Tick { .. } | SessionEvent::Submitted { .. })));
    assert_eq!(session.set_answer(101, "A").await, AnswerUpdate::Ignored);
}

// ========== 异常参数 ==========

#[tokio::test(start_paused = true)]
async fn out_of_range_duration_fails_load() {
    let now = Utc::now();
    let backend = FakeBackend::new(sample_attempt(now, i64::MAX));
    let session = AttemptSession::with_clock(backend.clone(), settings(), None, TokioClock::new(now));
    let mut events = session.subscribe();

    assert_err!(session.load(ATTEMPT_ID).await);

    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::LoadFailed { attempt_id: ATTEMPT_ID, .. })));
    assert_eq!(session.snapshot().await.attempt_id, None);
    assert_eq!(session.set_answer(101, "A").await, AnswerUpdate::Ignored);
}

#[tokio::test(start_paused = true)]
async fn zero_tick_interval_is_clamped() {
    let now = Utc::now();
    let backend = FakeBackend::new(sample_attempt(now - ChronoDuration::seconds(650), 600));
    let mut zero_tick = settings();
    zero_tick.tick_interval = Duration::ZERO;
    let session = AttemptSession::with_clock(backend.clone(), zero_tick, None, TokioClock::new(now));

    assert_ok!(session.load(ATTEMPT_ID).await);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(backend.submit_count(), 1);
    assert_eq!(session.snapshot().await.submission, SubmissionState::Submitted);
}
