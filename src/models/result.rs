use serde::{Deserialize, Serialize};

use super::attempt::{AttemptId, ExamId, QuestionId};

/// 交卷接口的返回
///
/// 后端不同版本返回的字段不完全一致，全部可缺省。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitSummary {
    pub attempt_id: Option<AttemptId>,
    pub exam_id: Option<ExamId>,
    pub total_score: Option<i64>,
    pub correct_count: Option<u32>,
    pub wrong_count: Option<u32>,
    pub question_count: Option<u32>,
}

/// 单题批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub question_id: QuestionId,
    #[serde(default)]
    pub question_text: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub selected_choices: Option<String>,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default)]
    pub score_awarded: Option<i32>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl ReviewItem {
    /// 考生作答（按题型取字段）
    pub fn my_answer(&self) -> Option<&str> {
        match self.kind.as_deref() {
            Some("MCQ") => self.selected_choices.as_deref(),
            _ => self
                .response_text
                .as_deref()
                .or(self.selected_choices.as_deref()),
        }
    }
}

/// 成绩页数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub answers: Vec<ReviewItem>,
}

impl AttemptResult {
    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_correct).count()
    }
}
