//! 响应信封
//!
//! 同一后端的接口有的直接返回数据，有的包在 `{ "data": ... }` 里，这里统一解开。

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

/// 解析响应体，兼容包裹与不包裹两种形态
pub fn decode_body<T: DeserializeOwned>(endpoint: &str, body: &str) -> AppResult<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| AppError::json_parse_failed(endpoint, e))
}

/// 从错误响应体里提取可读信息
///
/// 优先取 `message` 字段，否则原样返回正文，正文为空时给出默认文案。
pub fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Request failed".to_string();
    }
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attempt, AttemptResult};

    #[test]
    fn bare_integer_and_wrapped_integer() {
        let bare: i64 = decode_body("/start", "17").unwrap();
        let wrapped: i64 = decode_body("/start", r#"{"success":true,"data":18}"#).unwrap();
        assert_eq!((bare, wrapped), (17, 18));
    }

    #[test]
    fn bare_attempt_detail_is_not_mistaken_for_envelope() {
        let attempt: Attempt = decode_body(
            "/api/attempts/1",
            r#"{"attemptId":1,"examId":2,"durationSec":60,"startedAt":"2026-10-16T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(attempt.exam_id, 2);
    }

    #[test]
    fn wrapped_result() {
        let result: AttemptResult = decode_body(
            "/api/attempts/1/result",
            r#"{"success":true,"data":{"totalScore":12,"answers":[]},"message":null}"#,
        )
        .unwrap();
        assert_eq!(result.total_score, 12);
    }

    #[test]
    fn malformed_body_names_endpoint() {
        let err = decode_body::<i64>("/api/attempts/start/3", "<html>").unwrap_err();
        assert!(err.to_string().contains("/api/attempts/start/3"));
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(error_message(r#"{"message":"시험 종료"}"#), "시험 종료");
        assert_eq!(error_message("plain failure"), "plain failure");
        assert_eq!(error_message("  "), "Request failed");
    }
}
