//! # CBT Attempt
//!
//! 在线考试答题端：加载答卷、自动保存、倒计时、交卷
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有 HTTP 客户端，只暴露能力
//! - `HttpExecutor` - 统一附加 Bearer token、解包响应信封、401 时刷新一次并重试
//!
//! ### ② 业务能力层（Clients / Services）
//! - `clients/` - `AuthClient` 登录接口，`AttemptClient` 答卷接口（`AttemptBackend`）
//! - `services/` - `AuthSession` 登录态，`SaveQueue` 自动保存合并，`Countdown` 倒计时
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 一份答卷从加载到交卷的完整流程
//! - `AttemptCtx` - 上下文封装（attempt_id + exam_id）
//! - `AttemptSession` - 会话控制器（作答 / 自动保存 / 倒计时 / 交卷）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用主体，管理资源和答题卡列表
//! - `orchestrator/sheet_runner` - 单份答题卡处理器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{AttemptBackend, AttemptClient, AuthClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::HttpExecutor;
pub use models::{Attempt, AnswerPayload, Question, SubmitSummary};
pub use orchestrator::App;
pub use services::{AuthSession, SessionStore};
pub use workflow::{AttemptSession, SessionEvent, SessionSettings, SubmitOutcome, SubmitReason};
