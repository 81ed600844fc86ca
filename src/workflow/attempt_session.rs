//! 答卷会话控制器 - 流程层
//!
//! 核心职责：管理一份答卷从加载到交卷的整个生命周期
//!
//! 三件事互相竞争同一份状态：
//! 1. 防抖自动保存（后台 saver 任务，按 `SaveQueue` 的指令串行保存）
//! 2. 倒计时（后台 ticker 任务，时间到触发 TimeUp 交卷，只触发一次）
//! 3. 考生操作（写答案、跳题、手动交卷）
//!
//! 所有修改都经过 `SessionState` 上定义的转换，交卷是屏障：
//! 一旦开始，不再有新的保存，也不再有新的倒计时 tick。

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clients::AttemptBackend;
use crate::config::Config;
use crate::error::{AppError, AppResult, BusinessError};
use crate::models::{
    AnswerPayload, Attempt, AttemptId, ExamId, Question, QuestionId, SubmitSummary, UserId,
};
use crate::services::{format_clock, Clock, Countdown, SaveDecision, SystemClock};
use crate::workflow::attempt_ctx::AttemptCtx;
use crate::workflow::session_state::{
    AnswerUpdate, PaletteEntry, SaveState, SessionState, SubmissionState, SubmitReason,
};

/// 会话时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// 自动保存防抖窗口
    pub debounce: Duration,
    /// 倒计时刷新间隔
    pub tick_interval: Duration,
    /// 低时间告警阈值（秒）
    pub low_time_threshold_secs: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
            low_time_threshold_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.autosave_debounce(),
            tick_interval: config.tick_interval(),
            low_time_threshold_secs: config.low_time_threshold_secs,
        }
    }
}

/// 会话事件，界面层据此刷新或跳转
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 加载完成
    Loaded {
        attempt_id: AttemptId,
        question_count: usize,
        remaining_secs: i64,
    },
    /// 加载失败，界面应离开答题页
    LoadFailed {
        attempt_id: AttemptId,
        message: String,
    },
    /// 保存状态变化
    SaveStateChanged(SaveState),
    /// 倒计时刷新
    Tick { remaining_secs: i64, low_time: bool },
    /// 交卷成功，界面应跳转成绩页
    Submitted {
        reason: SubmitReason,
        summary: SubmitSummary,
    },
    /// 交卷失败，答卷保持进行中
    SubmitFailed {
        reason: SubmitReason,
        message: String,
    },
}

/// 交卷调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 本次调用完成了交卷
    Submitted(SubmitSummary),
    /// 交卷已在进行或已完成，本次调用没有做任何事
    Ignored,
}

/// 会话快照（只读视图）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub attempt_id: Option<AttemptId>,
    pub exam_title: Option<String>,
    pub current_index: usize,
    pub question_count: usize,
    pub answered_count: usize,
    pub save_state: SaveState,
    pub submission: SubmissionState,
    pub remaining_secs: Option<i64>,
    pub low_time: bool,
    pub last_error: Option<String>,
}

struct Inner {
    backend: Arc<dyn AttemptBackend>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    user_id: Option<UserId>,
    state: Mutex<SessionState>,
    /// 任何一次保存都要先拿到它，保证同一时刻只有一个保存在途
    flush_gate: Mutex<()>,
    saver_wake: Notify,
    events: broadcast::Sender<SessionEvent>,
    saver: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

type TickerTask = Pin<Box<dyn Future<Output = ()> + Send>>;

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// 答卷会话控制器
///
/// 克隆后共享同一份状态。离开答题页时调用 [`AttemptSession::close`]。
#[derive(Clone)]
pub struct AttemptSession {
    inner: Arc<Inner>,
}

impl AttemptSession {
    /// 创建新的会话控制器
    pub fn new(
        backend: Arc<dyn AttemptBackend>,
        settings: SessionSettings,
        user_id: Option<UserId>,
    ) -> Self {
        Self::with_clock(backend, settings, user_id, Arc::new(SystemClock))
    }

    /// 使用自定义时钟创建
    pub fn with_clock(
        backend: Arc<dyn AttemptBackend>,
        settings: SessionSettings,
        user_id: Option<UserId>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                backend,
                clock,
                settings,
                user_id,
                state: Mutex::new(SessionState::new(settings.debounce)),
                flush_gate: Mutex::new(()),
                saver_wake: Notify::new(),
                events,
                saver: Mutex::new(None),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// 开始考试，返回后端分配的答卷 ID
    pub async fn start_attempt(backend: &dyn AttemptBackend, exam_id: ExamId) -> AppResult<AttemptId> {
        info!("[考试 #{}] 🚀 开始考试...", exam_id);
        let attempt_id = backend.start_attempt(exam_id).await?;
        info!("[考试 #{}] ✓ 已创建答卷 #{}", exam_id, attempt_id);
        Ok(attempt_id)
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ========== 加载 ==========

    /// 加载答卷
    ///
    /// 成功后题号归零并启动自动保存和倒计时；失败时发出 `LoadFailed`，不自动重试。
    pub async fn load(&self, attempt_id: AttemptId) -> AppResult<()> {
        self.stop_workers().await;

        let ctx = AttemptCtx::new(attempt_id, None);
        info!("{} 📥 正在加载答卷...", ctx);

        match self.inner.backend.load_attempt(attempt_id).await {
            Ok(attempt) => {
                let ctx = AttemptCtx::new(attempt.attempt_id, Some(attempt.exam_id));
                let Some(countdown) = self.countdown_for(&attempt) else {
                    let e = BusinessError::AttemptLoadFailed {
                        attempt_id,
                        message: format!("考试时长超出范围: {} 秒", attempt.duration_sec),
                    };
                    return Err(self.fail_load(ctx, e.into()).await);
                };
                let remaining_secs = countdown.remaining_secs(self.inner.clock.now());
                let question_count = attempt.question_count();
                let title = attempt.exam_title.clone();

                self.inner.state.lock().await.install(attempt);

                info!(
                    "{} ✓ 加载完成: {} | {} 题 | 剩余 {}",
                    ctx,
                    title,
                    question_count,
                    format_clock(remaining_secs)
                );
                self.emit(SessionEvent::Loaded {
                    attempt_id: ctx.attempt_id,
                    question_count,
                    remaining_secs: remaining_secs.max(0),
                });

                self.spawn_saver(ctx).await;
                self.spawn_ticker(ctx, countdown).await;
                Ok(())
            }
            Err(e) => Err(self.fail_load(ctx, e).await),
        }
    }

    async fn fail_load(&self, ctx: AttemptCtx, e: AppError) -> AppError {
        error!("{} ❌ 答卷加载失败: {}", ctx, e);
        let message = e.to_string();
        self.inner.state.lock().await.fail_load(message.clone());
        self.emit(SessionEvent::LoadFailed {
            attempt_id: ctx.attempt_id,
            message,
        });
        e
    }

    // ========== 作答与跳题 ==========

    /// 写入一道题的答案，空字符串表示清除
    ///
    /// 交卷开始后调用是空操作。
    pub async fn set_answer(&self, question_id: QuestionId, value: impl Into<String>) -> AnswerUpdate {
        let update = {
            let mut state = self.inner.state.lock().await;
            let update = state.apply_answer(question_id, value.into());
            if update.changed() {
                state.queue.mark_dirty(Instant::now());
            }
            update
        };

        if update.changed() {
            self.inner.saver_wake.notify_one();
        }
        update
    }

    /// 跳到指定题号（从 0 开始），越界时不动
    pub async fn go_to(&self, index: usize) -> bool {
        self.inner.state.lock().await.go_to(index)
    }

    pub async fn next(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let target = state.current_index + 1;
        state.go_to(target)
    }

    pub async fn prev(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.current_index.checked_sub(1) {
            Some(target) => state.go_to(target),
            None => false,
        }
    }

    // ========== 保存 ==========

    /// 立即保存全部答案（跳过防抖，但仍与其他保存串行）
    ///
    /// 未加载或交卷已开始时返回 `Ok(false)`，不发请求。
    pub async fn flush_answers(&self) -> AppResult<bool> {
        let _gate = self.inner.flush_gate.lock().await;

        let (ctx, payload) = {
            let mut state = self.inner.state.lock().await;
            if !state.accepts_edits() || state.queue.is_closed() {
                return Ok(false);
            }
            let Some(ctx) = state.attempt().map(ctx_of) else {
                return Ok(false);
            };
            state.queue.take_pending();
            (ctx, state.roster(self.inner.user_id))
        };

        self.send_roster(ctx, payload).await?;
        Ok(true)
    }

    // ========== 交卷 ==========

    /// 交卷，唯一进入终态的路径
    ///
    /// 幂等：交卷已开始或已完成时直接返回 `SubmitOutcome::Ignored`。
    /// 流程：最后一次全量保存（等待完成）→ 调用交卷接口 → 成功进入终态。
    /// 失败时答卷回到进行中，错误同时通过事件和返回值报告。
    pub async fn submit(&self, reason: SubmitReason) -> AppResult<SubmitOutcome> {
        let ctx = {
            let mut state = self.inner.state.lock().await;
            let Some(ctx) = state.attempt().map(ctx_of) else {
                return Err(BusinessError::AttemptNotLoaded.into());
            };
            if !state.begin_submit() {
                debug!("{} 交卷已开始、已完成或会话已关闭，忽略 {:?}", ctx, reason);
                return Ok(SubmitOutcome::Ignored);
            }
            ctx
        };

        match reason {
            SubmitReason::TimeUp => info!("{} ⏰ 时间到，自动交卷...", ctx),
            SubmitReason::Manual => info!("{} 📋 交卷...", ctx),
        }

        if let Err(e) = self.flush_final(ctx).await {
            return Err(self.fail_submit(ctx, reason, e).await);
        }

        match self.inner.backend.submit_attempt(ctx.attempt_id).await {
            Ok(summary) => {
                self.inner
                    .state
                    .lock()
                    .await
                    .complete_submit(summary.clone());
                self.stop_workers().await;

                info!("{} ✓ 交卷成功，总分: {:?}", ctx, summary.total_score);
                self.emit(SessionEvent::Submitted {
                    reason,
                    summary: summary.clone(),
                });
                Ok(SubmitOutcome::Submitted(summary))
            }
            Err(e) => Err(self.fail_submit(ctx, reason, e).await),
        }
    }

    /// 离开答题页：取消挂起的防抖和倒计时
    ///
    /// 之后的编辑、保存、交卷都被忽略；进行中的交卷即使失败也不会重启倒计时。
    pub async fn close(&self) {
        self.inner.state.lock().await.close();
        self.stop_workers().await;
        debug!("会话已关闭");
    }

    // ========== 只读视图 ==========

    pub async fn snapshot(&self) -> SessionView {
        let state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        let remaining_secs = state
            .attempt()
            .and_then(|a| self.countdown_for(a))
            .map(|countdown| countdown.remaining_secs(now).max(0));

        SessionView {
            attempt_id: state.attempt().map(|a| a.attempt_id),
            exam_title: state.attempt().map(|a| a.exam_title.clone()),
            current_index: state.current_index,
            question_count: state.question_count(),
            answered_count: state.answers.len(),
            save_state: state.save_state,
            submission: state.submission,
            remaining_secs,
            low_time: remaining_secs
                .is_some_and(|r| r <= self.inner.settings.low_time_threshold_secs),
            last_error: state.last_error.clone(),
        }
    }

    /// 题目面板
    pub async fn palette(&self) -> Vec<PaletteEntry> {
        self.inner.state.lock().await.palette()
    }

    pub async fn current_question(&self) -> Option<Question> {
        let state = self.inner.state.lock().await;
        state
            .attempt()
            .and_then(|a| a.question_at(state.current_index))
            .cloned()
    }

    pub async fn answer_for(&self, question_id: QuestionId) -> Option<String> {
        self.inner.state.lock().await.answers.get(&question_id).cloned()
    }

    pub async fn attempt(&self) -> Option<Attempt> {
        self.inner.state.lock().await.attempt().cloned()
    }

    pub async fn summary(&self) -> Option<SubmitSummary> {
        self.inner.state.lock().await.summary.clone()
    }

    // ========== 内部：保存 ==========

    /// 交卷前最后一次保存，不经过防抖
    async fn flush_final(&self, ctx: AttemptCtx) -> AppResult<()> {
        let _gate = self.inner.flush_gate.lock().await;
        let payload = self.inner.state.lock().await.roster(self.inner.user_id);
        if payload.is_empty() {
            return Ok(());
        }
        self.send_roster(ctx, payload).await
    }

    /// 防抖到期后的保存，由 saver 任务调用
    async fn flush_debounced(&self, ctx: AttemptCtx) {
        let _gate = self.inner.flush_gate.lock().await;

        let payload = {
            let mut state = self.inner.state.lock().await;
            if state.submission != SubmissionState::InProgress {
                state.queue.finish();
                return;
            }
            state.roster(self.inner.user_id)
        };

        // 失败已记录在 save_state 中，等下一次改动自然重试
        let _ = self.send_roster(ctx, payload).await;
        self.inner.state.lock().await.queue.finish();
    }

    /// 调用者必须持有 flush_gate
    async fn send_roster(&self, ctx: AttemptCtx, payload: Vec<AnswerPayload>) -> AppResult<()> {
        self.set_save_state(SaveState::Saving, None).await;

        let result = self
            .inner
            .backend
            .save_answers(ctx.attempt_id, &payload)
            .await;

        match &result {
            Ok(()) => {
                debug!("{} ✓ 已保存 {} 道题的答案", ctx, payload.len());
                self.set_save_state(SaveState::Idle, None).await;
            }
            Err(e) => {
                warn!("{} ⚠️ 答案保存失败: {}", ctx, e);
                self.set_save_state(SaveState::SaveFailed, Some(e.to_string()))
                    .await;
            }
        }
        result
    }

    async fn set_save_state(&self, save_state: SaveState, error: Option<String>) {
        let changed = {
            let mut state = self.inner.state.lock().await;
            if error.is_some() {
                state.last_error = error;
            }
            let changed = state.save_state != save_state;
            state.save_state = save_state;
            changed
        };
        if changed {
            self.emit(SessionEvent::SaveStateChanged(save_state));
        }
    }

    async fn fail_submit(&self, ctx: AttemptCtx, reason: SubmitReason, e: AppError) -> AppError {
        error!("{} ❌ 交卷失败 ({:?}): {}", ctx, reason, e);
        let message = e.to_string();

        let countdown = {
            let mut state = self.inner.state.lock().await;
            state.abort_submit(message.clone());
            if state.closed {
                None
            } else {
                state.attempt().and_then(|a| self.countdown_for(a))
            }
        };
        self.inner.saver_wake.notify_one();

        // 手动交卷失败后倒计时继续；TimeUp 失败或已离开答题页时不重新启动
        if reason == SubmitReason::Manual {
            if let Some(countdown) = countdown {
                self.spawn_ticker(ctx, countdown).await;
            }
        }

        self.emit(SessionEvent::SubmitFailed { reason, message });
        e
    }

    // ========== 内部：后台任务 ==========

    async fn spawn_saver(&self, ctx: AttemptCtx) {
        let handle = tokio::spawn(self.clone().autosave_loop(ctx));
        if let Some(old) = self.inner.saver.lock().await.replace(handle) {
            old.abort();
        }
    }

    /// 同一时刻只保留一个倒计时任务
    async fn spawn_ticker(&self, ctx: AttemptCtx, countdown: Countdown) {
        let handle = tokio::spawn(self.clone().countdown_task(ctx, countdown));
        if let Some(old) = self.inner.ticker.lock().await.replace(handle) {
            old.abort();
        }
    }

    async fn stop_workers(&self) {
        if let Some(handle) = self.inner.saver.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn autosave_loop(self, ctx: AttemptCtx) {
        loop {
            let (decision, finished) = {
                let mut state = self.inner.state.lock().await;
                let finished = state.closed || state.submission == SubmissionState::Submitted;
                (state.queue.poll(Instant::now()), finished)
            };

            match decision {
                SaveDecision::Start => self.flush_debounced(ctx).await,
                SaveDecision::WaitUntil(deadline) => {
                    tokio::select! {
                        _ = time::sleep_until(deadline) => {}
                        _ = self.inner.saver_wake.notified() => {}
                    }
                }
                SaveDecision::Closed if finished => break,
                SaveDecision::Idle | SaveDecision::Busy | SaveDecision::Closed => {
                    self.inner.saver_wake.notified().await
                }
            }
        }
        debug!("{} 自动保存任务结束", ctx);
    }

    // 倒计时会触发交卷，交卷失败又可能重启倒计时，这里用具体的装箱类型断开两者的类型递归
    fn countdown_task(self, ctx: AttemptCtx, countdown: Countdown) -> TickerTask {
        Box::pin(async move { self.countdown_loop(ctx, countdown).await })
    }

    async fn countdown_loop(self, ctx: AttemptCtx, countdown: Countdown) {
        let period = self.inner.settings.tick_interval.max(MIN_TICK_INTERVAL);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut warned = false;

        loop {
            interval.tick().await;

            {
                let state = self.inner.state.lock().await;
                if state.closed || state.submission != SubmissionState::InProgress {
                    break;
                }
            }

            let now = self.inner.clock.now();
            let remaining_secs = countdown.remaining_secs(now);
            let low_time = countdown.is_low_time(remaining_secs);
            if low_time && remaining_secs > 0 && !warned {
                warn!("{} ⏳ 剩余时间 {}", ctx, format_clock(remaining_secs));
                warned = true;
            }
            self.emit(SessionEvent::Tick {
                remaining_secs: remaining_secs.max(0),
                low_time,
            });

            if countdown.is_expired(now) {
                // 交卷放到独立任务里，关闭会话时不会把进行中的交卷一起取消
                let session = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.submit(SubmitReason::TimeUp).await {
                        warn!("自动交卷未完成: {}", e);
                    }
                });
                break;
            }
        }
        debug!("{} 倒计时任务结束", ctx);
    }

    fn countdown_for(&self, attempt: &Attempt) -> Option<Countdown> {
        Countdown::new(
            attempt.started_at,
            attempt.duration_sec,
            self.inner.settings.low_time_threshold_secs,
        )
    }

    fn emit(&self, event: SessionEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.inner.events.send(event);
    }
}

fn ctx_of(attempt: &Attempt) -> AttemptCtx {
    AttemptCtx::new(attempt.attempt_id, Some(attempt.exam_id))
}
