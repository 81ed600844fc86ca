#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cbt_attempt::clients::AttemptBackend;
use cbt_attempt::error::{AppError, AppResult};
use cbt_attempt::models::{
    AnswerPayload, Attempt, AttemptId, AttemptResult, Choices, ExamId, ExamSummary, Question,
    QuestionKind, ReviewItem, SubmitSummary,
};
use cbt_attempt::services::Clock;
use cbt_attempt::workflow::{AttemptSession, SessionSettings};

/// 后端调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(ExamId),
    Load(AttemptId),
    Save(Vec<AnswerPayload>),
    Submit(AttemptId),
    Result(AttemptId),
    Review(AttemptId),
    Exam(ExamId),
}

/// 内存后端：记录所有调用，可按需注入延迟和失败
pub struct FakeBackend {
    attempt: Mutex<Attempt>,
    calls: Mutex<Vec<Call>>,
    save_delay: Mutex<Duration>,
    fail_load: AtomicBool,
    fail_saves: AtomicBool,
    failing_submits: AtomicUsize,
    saves_in_flight: AtomicUsize,
    max_saves_in_flight: AtomicUsize,
}

impl FakeBackend {
    pub fn new(attempt: Attempt) -> Arc<Self> {
        Arc::new(Self {
            attempt: Mutex::new(attempt),
            calls: Mutex::new(Vec::new()),
            save_delay: Mutex::new(Duration::ZERO),
            fail_load: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
            failing_submits: AtomicUsize::new(0),
            saves_in_flight: AtomicUsize::new(0),
            max_saves_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn set_save_delay(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = delay;
    }

    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// 接下来 n 次交卷失败
    pub fn fail_next_submits(&self, n: usize) {
        self.failing_submits.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<Vec<AnswerPayload>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Save(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Submit(_)))
            .count()
    }

    pub fn max_saves_in_flight(&self) -> usize {
        self.max_saves_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn backend_down(endpoint: &str) -> AppError {
    AppError::bad_response(endpoint, 500, "backend down")
}

#[async_trait]
impl AttemptBackend for FakeBackend {
    async fn start_attempt(&self, exam_id: ExamId) -> AppResult<AttemptId> {
        self.record(Call::Start(exam_id));
        Ok(self.attempt.lock().unwrap().attempt_id)
    }

    async fn load_attempt(&self, attempt_id: AttemptId) -> AppResult<Attempt> {
        self.record(Call::Load(attempt_id));
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(backend_down("/api/attempts"));
        }
        Ok(self.attempt.lock().unwrap().clone())
    }

    async fn save_answers(&self, _attempt_id: AttemptId, answers: &[AnswerPayload]) -> AppResult<()> {
        self.record(Call::Save(answers.to_vec()));

        let now = self.saves_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_saves_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.save_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.saves_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(backend_down("/api/attempts/answers"));
        }
        Ok(())
    }

    async fn submit_attempt(&self, attempt_id: AttemptId) -> AppResult<SubmitSummary> {
        self.record(Call::Submit(attempt_id));
        let failing = self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(backend_down("/api/attempts/submit"));
        }
        Ok(SubmitSummary {
            attempt_id: Some(attempt_id),
            total_score: Some(3),
            ..Default::default()
        })
    }

    async fn fetch_result(&self, attempt_id: AttemptId) -> AppResult<AttemptResult> {
        self.record(Call::Result(attempt_id));
        Ok(AttemptResult {
            total_score: 3,
            answers: Vec::new(),
        })
    }

    async fn fetch_review(&self, attempt_id: AttemptId) -> AppResult<Vec<ReviewItem>> {
        self.record(Call::Review(attempt_id));
        Ok(Vec::new())
    }

    async fn fetch_exam(&self, exam_id: ExamId) -> AppResult<ExamSummary> {
        self.record(Call::Exam(exam_id));
        let attempt = self.attempt.lock().unwrap();
        Ok(ExamSummary {
            id: exam_id,
            title: attempt.exam_title.clone(),
            question_count: attempt.questions.len(),
            duration_sec: attempt.duration_sec,
        })
    }
}

/// 跟随 tokio 虚拟时间走的时钟，配合 `start_paused` 使用
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            origin: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.base + ChronoDuration::milliseconds(elapsed.as_millis() as i64)
    }
}

pub const ATTEMPT_ID: AttemptId = 7;

/// 三道题：两道单选，一道主观题
pub fn sample_attempt(started_at: DateTime<Utc>, duration_sec: i64) -> Attempt {
    Attempt {
        attempt_id: ATTEMPT_ID,
        exam_id: 3,
        exam_title: "期中测验".into(),
        questions: vec![
            Question {
                id: 101,
                text: "1 + 1 = ?".into(),
                kind: QuestionKind::Mcq,
                choices: Choices::from_pairs([("A", "x"), ("B", "y")]),
                score: 1,
            },
            Question {
                id: 102,
                text: "2 + 2 = ?".into(),
                kind: QuestionKind::Mcq,
                choices: Choices::from_pairs([("A", "3"), ("B", "4"), ("C", "5")]),
                score: 1,
            },
            Question {
                id: 103,
                text: "简述你的理由".into(),
                kind: QuestionKind::Subjective,
                choices: Choices::new(),
                score: 1,
            },
        ],
        duration_sec,
        started_at,
        saved_answers: Vec::new(),
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        debounce: Duration::from_secs(2),
        tick_interval: Duration::from_secs(1),
        low_time_threshold_secs: 60,
    }
}

/// 建一个会话，答卷已开考 `elapsed_secs` 秒
pub fn session_with(elapsed_secs: i64, duration_sec: i64) -> (AttemptSession, Arc<FakeBackend>) {
    let now = Utc::now();
    let attempt = sample_attempt(now - ChronoDuration::seconds(elapsed_secs), duration_sec);
    let backend = FakeBackend::new(attempt);
    let session = AttemptSession::with_clock(backend.clone(), settings(), Some(9), TokioClock::new(now));
    (session, backend)
}
