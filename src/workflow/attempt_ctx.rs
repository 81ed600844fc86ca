//! 答卷上下文
//!
//! 封装"我正在处理哪场考试的哪份答卷"这一信息，主要用于日志前缀

use std::fmt::Display;

use crate::models::{AttemptId, ExamId};

/// 答卷上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCtx {
    /// 答卷ID
    pub attempt_id: AttemptId,

    /// 考试ID（加载完成前未知）
    pub exam_id: Option<ExamId>,
}

impl AttemptCtx {
    /// 创建新的答卷上下文
    pub fn new(attempt_id: AttemptId, exam_id: Option<ExamId>) -> Self {
        Self {
            attempt_id,
            exam_id,
        }
    }
}

impl Display for AttemptCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exam_id {
            Some(exam_id) => write!(f, "[答卷 #{} 考试 #{}]", self.attempt_id, exam_id),
            None => write!(f, "[答卷 #{}]", self.attempt_id),
        }
    }
}
