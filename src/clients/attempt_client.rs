/// 答卷 API 客户端
///
/// 封装所有与考试 / 答卷后端相关的调用逻辑
use async_trait::async_trait;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::HttpExecutor;
use crate::models::{
    AnswerPayload, Attempt, AttemptId, AttemptResult, ExamId, ExamSummary, ReviewItem,
    SubmitSummary,
};

/// 答卷后端能力
///
/// 会话控制器只依赖这个 trait，HTTP 实现和测试替身都实现它。
#[async_trait]
pub trait AttemptBackend: Send + Sync {
    /// 开始考试，返回新答卷 ID
    async fn start_attempt(&self, exam_id: ExamId) -> AppResult<AttemptId>;

    /// 加载答卷详情
    async fn load_attempt(&self, attempt_id: AttemptId) -> AppResult<Attempt>;

    /// 全量保存答案
    async fn save_answers(&self, attempt_id: AttemptId, answers: &[AnswerPayload]) -> AppResult<()>;

    /// 交卷
    async fn submit_attempt(&self, attempt_id: AttemptId) -> AppResult<SubmitSummary>;

    /// 成绩
    async fn fetch_result(&self, attempt_id: AttemptId) -> AppResult<AttemptResult>;

    /// 逐题回顾
    async fn fetch_review(&self, attempt_id: AttemptId) -> AppResult<Vec<ReviewItem>>;

    /// 考试概要
    async fn fetch_exam(&self, exam_id: ExamId) -> AppResult<ExamSummary>;
}

/// 答卷客户端
pub struct AttemptClient {
    executor: HttpExecutor,
}

impl AttemptClient {
    /// 创建新的答卷客户端
    pub fn new(executor: HttpExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &HttpExecutor {
        &self.executor
    }
}

#[async_trait]
impl AttemptBackend for AttemptClient {
    async fn start_attempt(&self, exam_id: ExamId) -> AppResult<AttemptId> {
        self.executor
            .post::<(), AttemptId>(&format!("/api/attempts/start/{}", exam_id), None)
            .await
    }

    async fn load_attempt(&self, attempt_id: AttemptId) -> AppResult<Attempt> {
        self.executor
            .get(&format!("/api/attempts/{}", attempt_id))
            .await
    }

    async fn save_answers(&self, attempt_id: AttemptId, answers: &[AnswerPayload]) -> AppResult<()> {
        debug!("保存答案 Payload: {} 条", answers.len());
        self.executor
            .post_unit(&format!("/api/attempts/{}/answers", attempt_id), Some(answers))
            .await
    }

    async fn submit_attempt(&self, attempt_id: AttemptId) -> AppResult<SubmitSummary> {
        self.executor
            .post_or_default::<(), SubmitSummary>(
                &format!("/api/attempts/{}/submit", attempt_id),
                None,
            )
            .await
    }

    async fn fetch_result(&self, attempt_id: AttemptId) -> AppResult<AttemptResult> {
        self.executor
            .get(&format!("/api/attempts/{}/result", attempt_id))
            .await
    }

    async fn fetch_review(&self, attempt_id: AttemptId) -> AppResult<Vec<ReviewItem>> {
        self.executor
            .get(&format!("/api/attempts/{}/review", attempt_id))
            .await
    }

    async fn fetch_exam(&self, exam_id: ExamId) -> AppResult<ExamSummary> {
        self.executor.get(&format!("/api/exams/{}", exam_id)).await
    }
}
