use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::AnswerPayload;
use super::choices::Choices;

pub type AttemptId = i64;
pub type ExamId = i64;
pub type QuestionId = i64;
pub type UserId = i64;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    /// 单选题
    #[serde(rename = "MCQ")]
    Mcq,
    /// 主观题
    #[serde(rename = "SUBJECTIVE")]
    Subjective,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Mcq => "MCQ",
            QuestionKind::Subjective => "SUBJECTIVE",
        }
    }
}

/// 答卷中的一道题（只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub choices: Choices,
    #[serde(default)]
    pub score: i32,
}

impl Question {
    pub fn is_mcq(&self) -> bool {
        self.kind == QuestionKind::Mcq
    }
}

/// 一次答卷
///
/// `started_at` 永远以后端返回为准，客户端不自行推算。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    #[serde(default)]
    pub exam_title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub duration_sec: i64,
    #[serde(deserialize_with = "deserialize_started_at")]
    pub started_at: DateTime<Utc>,
    /// 后端已保存的答案（接口支持时才会返回）
    #[serde(default, rename = "answers", skip_serializing_if = "Vec::is_empty")]
    pub saved_answers: Vec<AnswerPayload>,
}

impl Attempt {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}

/// 考试概要（开始考试前的详情页）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: ExamId,
    pub title: String,
    #[serde(default)]
    pub question_count: usize,
    #[serde(default)]
    pub duration_sec: i64,
}

// 后端的 Instant 带时区（`...Z`），旧接口的 LocalDateTime 不带，按 UTC 处理
fn deserialize_started_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct StartedAtVisitor;

    impl<'de> Visitor<'de> for StartedAtVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an ISO-8601 timestamp or epoch milliseconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
                return Ok(parsed.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|e| E::custom(format!("无法解析开始时间 '{}': {}", value, e)))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DateTime::from_timestamp_millis(value)
                .ok_or_else(|| E::custom(format!("开始时间超出范围: {}", value)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let millis = i64::try_from(value)
                .map_err(|_| E::custom(format!("开始时间超出范围: {}", value)))?;
            self.visit_i64(millis)
        }
    }

    deserializer.deserialize_any(StartedAtVisitor)
}
