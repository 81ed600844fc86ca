//! 答卷会话状态
//!
//! 所有会被多个来源（考生输入、倒计时、交卷流程）修改的状态都在这一个结构里，
//! 只通过下面定义的转换修改。

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::models::{AnswerPayload, Attempt, QuestionId, SubmitSummary, UserId};
use crate::services::SaveQueue;

/// 答卷加载状态
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptStatus {
    NotLoaded,
    Loaded(Box<Attempt>),
    LoadFailed(String),
}

/// 保存状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveState {
    Idle,
    Saving,
    SaveFailed,
}

/// 交卷状态
///
/// `Submitting` 表示交卷已开始，此时任何编辑、保存、倒计时都不再生效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionState {
    InProgress,
    Submitting,
    Submitted,
}

/// 交卷原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitReason {
    /// 考生手动交卷
    Manual,
    /// 倒计时结束自动交卷
    TimeUp,
}

/// 写入答案的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerUpdate {
    /// 已记录
    Stored,
    /// 空值，已清除
    Cleared,
    /// 未生效（未加载 / 已交卷 / 题目不存在 / 选项不存在 / 值未变化）
    Ignored,
}

impl AnswerUpdate {
    pub fn changed(self) -> bool {
        !matches!(self, AnswerUpdate::Ignored)
    }
}

/// 题目面板中的一格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteEntry {
    pub index: usize,
    pub question_id: QuestionId,
    pub answered: bool,
    pub current: bool,
}

/// 会话状态
#[derive(Debug, Clone)]
pub struct SessionState {
    pub attempt: AttemptStatus,
    pub answers: BTreeMap<QuestionId, String>,
    pub current_index: usize,
    pub save_state: SaveState,
    pub submission: SubmissionState,
    pub queue: SaveQueue,
    pub last_error: Option<String>,
    pub summary: Option<SubmitSummary>,
    /// 已离开答题页；重新加载前不再接受编辑或重启后台任务
    pub closed: bool,
}

impl SessionState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            attempt: AttemptStatus::NotLoaded,
            answers: BTreeMap::new(),
            current_index: 0,
            save_state: SaveState::Idle,
            submission: SubmissionState::InProgress,
            queue: SaveQueue::new(debounce),
            last_error: None,
            summary: None,
            closed: false,
        }
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        match &self.attempt {
            AttemptStatus::Loaded(attempt) => Some(attempt.as_ref()),
            _ => None,
        }
    }

    pub fn question_count(&self) -> usize {
        self.attempt().map_or(0, Attempt::question_count)
    }

    /// 装载答卷：题号归零，答案用后端已保存的内容预填
    pub fn install(&mut self, attempt: Attempt) {
        let mut answers = BTreeMap::new();
        for saved in &attempt.saved_answers {
            if let Some(question) = attempt.question(saved.question_id) {
                if let Some(value) = saved.value_for(question.kind) {
                    answers.insert(question.id, value.to_string());
                }
            }
        }

        let queue = SaveQueue::new(self.queue.debounce());
        *self = Self {
            attempt: AttemptStatus::Loaded(Box::new(attempt)),
            answers,
            current_index: 0,
            save_state: SaveState::Idle,
            submission: SubmissionState::InProgress,
            queue,
            last_error: None,
            summary: None,
            closed: false,
        };
    }

    pub fn fail_load(&mut self, message: String) {
        self.attempt = AttemptStatus::LoadFailed(message.clone());
        self.last_error = Some(message);
        self.queue.close();
    }

    /// 离开答题页
    pub fn close(&mut self) {
        self.closed = true;
        self.queue.close();
    }

    /// 只有已加载、未关闭且未开始交卷时才接受编辑
    pub fn accepts_edits(&self) -> bool {
        self.attempt().is_some() && !self.closed && self.submission == SubmissionState::InProgress
    }

    /// 写入答案
    pub fn apply_answer(&mut self, question_id: QuestionId, value: String) -> AnswerUpdate {
        if !self.accepts_edits() {
            return AnswerUpdate::Ignored;
        }
        let Some(question) = self.attempt().and_then(|a| a.question(question_id)) else {
            warn!("⚠️ 题目 {} 不在本次答卷中，忽略", question_id);
            return AnswerUpdate::Ignored;
        };
        let unknown_choice = question.is_mcq()
            && !question.choices.is_empty()
            && !question.choices.contains_key(&value);

        if value.is_empty() {
            return match self.answers.remove(&question_id) {
                Some(_) => AnswerUpdate::Cleared,
                None => AnswerUpdate::Ignored,
            };
        }

        if unknown_choice {
            warn!("⚠️ 题目 {} 没有选项 {}，忽略", question_id, value);
            return AnswerUpdate::Ignored;
        }

        if self.answers.get(&question_id) == Some(&value) {
            return AnswerUpdate::Ignored;
        }
        self.answers.insert(question_id, value);
        AnswerUpdate::Stored
    }

    /// 跳题，越界时不动
    pub fn go_to(&mut self, index: usize) -> bool {
        if index < self.question_count() {
            self.current_index = index;
            true
        } else {
            false
        }
    }

    /// 当前全部答案的全量载荷
    pub fn roster(&self, user_id: Option<UserId>) -> Vec<AnswerPayload> {
        self.attempt()
            .map(|a| AnswerPayload::roster(&a.questions, &self.answers, user_id))
            .unwrap_or_default()
    }

    /// 题目面板，完全由答案表推导
    pub fn palette(&self) -> Vec<PaletteEntry> {
        let Some(attempt) = self.attempt() else {
            return Vec::new();
        };
        attempt
            .questions
            .iter()
            .enumerate()
            .map(|(index, q)| PaletteEntry {
                index,
                question_id: q.id,
                answered: self.answers.get(&q.id).is_some_and(|v| !v.is_empty()),
                current: index == self.current_index,
            })
            .collect()
    }

    /// InProgress → Submitting；已在交卷、已交卷或已关闭时返回 false
    pub fn begin_submit(&mut self) -> bool {
        if !self.accepts_edits() {
            return false;
        }
        self.submission = SubmissionState::Submitting;
        self.queue.close();
        true
    }

    /// 交卷失败：回到 InProgress，未关闭时重新开放保存
    pub fn abort_submit(&mut self, message: String) {
        if self.submission == SubmissionState::Submitting {
            self.submission = SubmissionState::InProgress;
            if !self.closed {
                self.queue.reopen();
            }
        }
        self.last_error = Some(message);
    }

    pub fn complete_submit(&mut self, summary: SubmitSummary) {
        self.submission = SubmissionState::Submitted;
        self.summary = Some(summary);
        self.last_error = None;
        self.queue.close();
    }
}
