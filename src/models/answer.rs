use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::attempt::{Question, QuestionId, QuestionKind, UserId};

/// 保存答案接口的单条载荷
///
/// 未作答的字段直接省略，不发送 `null`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub question_id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_choices: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl AnswerPayload {
    /// 为单道题构建载荷，答案按题型放到对应字段
    pub fn for_question(question: &Question, answer: Option<&str>, user_id: Option<UserId>) -> Self {
        let answer = answer.map(str::to_string);
        let (selected_choices, response_text) = match question.kind {
            QuestionKind::Mcq => (answer, None),
            QuestionKind::Subjective => (None, answer),
        };
        Self {
            question_id: question.id,
            selected_choices,
            response_text,
            user_id,
        }
    }

    /// 全量名单：每道题都有一条，未作答的题只带 questionId
    pub fn roster(
        questions: &[Question],
        answers: &BTreeMap<QuestionId, String>,
        user_id: Option<UserId>,
    ) -> Vec<Self> {
        questions
            .iter()
            .map(|q| Self::for_question(q, answers.get(&q.id).map(String::as_str), user_id))
            .collect()
    }

    /// 取出与题型匹配的答案值
    pub fn value_for(&self, kind: QuestionKind) -> Option<&str> {
        match kind {
            QuestionKind::Mcq => self.selected_choices.as_deref(),
            QuestionKind::Subjective => self.response_text.as_deref(),
        }
        .filter(|v| !v.is_empty())
    }
}
