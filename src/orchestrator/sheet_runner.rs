//! 单份答题卡处理器 - 编排层
//!
//! ## 职责
//!
//! 按一份答题卡完成一次完整的考试：
//!
//! 1. **开始考试**：创建答卷并加载
//! 2. **作答**：按 `question_index` / `question_id` 定位题目，逐条写入
//! 3. **交卷**：手动交卷，或等待倒计时自动交卷
//! 4. **成绩**：拉取成绩和逐题回顾并输出

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::clients::AttemptBackend;
use crate::error::{AppResult, BusinessError};
use crate::models::{AnswerSheet, Attempt, AttemptId, AttemptResult, QuestionId, SheetAnswer, SubmitMode, SubmitSummary, UserId};
use crate::utils::logging::truncate_text;
use crate::workflow::{AnswerUpdate, AttemptSession, SessionEvent, SessionSettings, SubmitOutcome, SubmitReason};

/// 单份答题卡的处理结果
#[derive(Debug, Clone, Default)]
pub struct SheetReport {
    pub attempt_id: AttemptId,
    pub answered: usize,
    pub skipped: usize,
    pub summary: SubmitSummary,
    pub result: Option<AttemptResult>,
}

/// 处理单份答题卡
///
/// # 参数
/// - `backend`: 答卷后端
/// - `sheet`: 答题卡
/// - `settings`: 会话时间参数
/// - `user_id`: 当前登录用户
pub async fn run_sheet(
    backend: Arc<dyn AttemptBackend>,
    sheet: &AnswerSheet,
    settings: SessionSettings,
    user_id: Option<UserId>,
) -> AppResult<SheetReport> {
    let name = sheet.display_name();
    info!("\n{}", "─".repeat(60));
    info!("📝 答题卡: {} (考试 #{})", name, sheet.exam_id);

    match backend.fetch_exam(sheet.exam_id).await {
        Ok(exam) => info!(
            "📖 {} | {} 题 | 时长 {} 分钟",
            exam.title,
            exam.question_count,
            exam.duration_sec / 60
        ),
        Err(e) => warn!("⚠️ 获取考试信息失败，继续作答: {}", e),
    }

    let attempt_id = AttemptSession::start_attempt(backend.as_ref(), sheet.exam_id).await?;

    let session = AttemptSession::new(backend.clone(), settings, user_id);
    let events = session.subscribe();
    session.load(attempt_id).await?;

    let outcome = answer_and_submit(&session, sheet, events).await;
    session.close().await;
    let (answered, skipped, summary) = outcome?;

    let result = match backend.fetch_result(attempt_id).await {
        Ok(mut result) => {
            // 部分后端的成绩接口不带逐题明细，改用回顾接口
            if result.answers.is_empty() {
                match backend.fetch_review(attempt_id).await {
                    Ok(items) => result.answers = items,
                    Err(e) => warn!("⚠️ 获取逐题回顾失败: {}", e),
                }
            }
            info!(
                "🏁 [{}] 总分 {} | 答对 {}/{}",
                name,
                result.total_score,
                result.correct_count(),
                result.answers.len()
            );
            for item in result.answers.iter().filter(|item| !item.is_correct) {
                info!(
                    "   ✗ 题目 {}: {} | 作答 {:?} | 正确答案 {:?}",
                    item.question_id,
                    truncate_text(&item.question_text, 30),
                    item.my_answer(),
                    item.correct_answer
                );
            }
            Some(result)
        }
        Err(e) => {
            warn!("⚠️ 获取成绩失败: {}", e);
            None
        }
    };

    Ok(SheetReport {
        attempt_id,
        answered,
        skipped,
        summary,
        result,
    })
}

async fn answer_and_submit(
    session: &AttemptSession,
    sheet: &AnswerSheet,
    mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> AppResult<(usize, usize, SubmitSummary)> {
    let attempt = session
        .attempt()
        .await
        .ok_or(BusinessError::AttemptNotLoaded)?;

    let mut answered = 0;
    let mut skipped = 0;

    for (entry, answer) in sheet.answers.iter().enumerate() {
        let (index, question_id) = match locate(&attempt, entry + 1, answer) {
            Ok(located) => located,
            Err(e) => {
                warn!("⚠️ {}，跳过", e);
                skipped += 1;
                continue;
            }
        };

        session.go_to(index).await;
        match session.set_answer(question_id, answer.value.as_str()).await {
            AnswerUpdate::Ignored => skipped += 1,
            AnswerUpdate::Stored | AnswerUpdate::Cleared => answered += 1,
        }
    }
    info!("✓ 作答完成: 写入 {} 条，跳过 {} 条", answered, skipped);

    let summary = match sheet.submit {
        SubmitMode::Manual => match session.submit(SubmitReason::Manual).await? {
            SubmitOutcome::Submitted(summary) => summary,
            SubmitOutcome::Ignored => session.summary().await.unwrap_or_default(),
        },
        SubmitMode::Wait => {
            session.flush_answers().await?;
            info!("⏳ 等待倒计时结束自动交卷...");
            wait_for_submission(attempt.attempt_id, &mut events).await?
        }
    };

    Ok((answered, skipped, summary))
}

/// 把答题卡条目定位到 (题号, 题目ID)；`question_id` 优先
fn locate(attempt: &Attempt, entry: usize, answer: &SheetAnswer) -> AppResult<(usize, QuestionId)> {
    if let Some(question_id) = answer.question_id {
        let index = attempt
            .questions
            .iter()
            .position(|q| q.id == question_id)
            .ok_or(BusinessError::QuestionNotFound { question_id })?;
        return Ok((index, question_id));
    }

    let Some(question_index) = answer.question_index else {
        return Err(BusinessError::UnaddressedAnswer { entry }.into());
    };
    let question = question_index
        .checked_sub(1)
        .and_then(|i| attempt.question_at(i))
        .ok_or(BusinessError::IndexOutOfRange {
            index: question_index,
            max_index: attempt.question_count(),
        })?;
    Ok((question_index - 1, question.id))
}

async fn wait_for_submission(
    attempt_id: AttemptId,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> AppResult<SubmitSummary> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Submitted { summary, .. }) => return Ok(summary),
            Ok(SessionEvent::SubmitFailed { message, .. }) => {
                error!("❌ 自动交卷失败: {}", message);
                return Err(BusinessError::SubmitFailed {
                    attempt_id,
                    message,
                }
                .into());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => {
                return Err(BusinessError::SubmitFailed {
                    attempt_id,
                    message: "会话已结束".to_string(),
                }
                .into())
            }
        }
    }
}
