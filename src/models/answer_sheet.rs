use serde::{Deserialize, Serialize};

use super::attempt::{ExamId, QuestionId};

/// 交卷方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    /// 作答完毕后立即手动交卷
    #[default]
    Manual,
    /// 等待倒计时结束自动交卷
    Wait,
}

/// 答题卡中的一条答案
///
/// `question_index` 从 1 开始，与题目面板的编号一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<QuestionId>,
    pub value: String,
}

/// 一份答题卡（TOML）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub exam_id: ExamId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub submit: SubmitMode,
    #[serde(default)]
    pub answers: Vec<SheetAnswer>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl AnswerSheet {
    /// 日志里展示的名字
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("exam-{}", self.exam_id))
    }
}
