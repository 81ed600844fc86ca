//! 应用主体 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：写日志表头、恢复登录态、必要时自动登录
//! 2. **资源管理**：唯一持有 `HttpExecutor` / `AttemptClient` 的模块
//! 3. **逐份作答**：同一登录态同时只进行一场考试，答题卡依次处理
//! 4. **全局统计**：汇总所有答题卡的结果

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{AttemptBackend, AttemptClient, AuthClient};
use crate::config::Config;
use crate::error::AuthError;
use crate::infrastructure::HttpExecutor;
use crate::models::AnswerSheet;
use crate::orchestrator::sheet_runner;
use crate::services::{AuthSession, SessionStore};
use crate::utils::logging::{init_log_file, log_sheets_loaded, log_startup, print_final_stats};
use crate::workflow::SessionSettings;

/// 应用主结构
pub struct App {
    config: Config,
    session: AuthSession,
    backend: Arc<dyn AttemptBackend>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let auth_client = AuthClient::new(&config)?;
        let session =
            AuthSession::restore(auth_client, SessionStore::file(&config.session_file)).await?;

        if !session.is_authenticated().await {
            match (&config.username, &config.password) {
                (Some(username), Some(password)) => {
                    info!("🔑 使用配置的账号登录: {}", username);
                    session.login(username, password).await?;
                }
                _ => {
                    error!("❌ 未登录，且未配置 CBT_USERNAME / CBT_PASSWORD");
                    return Err(AuthError::NotLoggedIn.into());
                }
            }
        }

        let executor = HttpExecutor::new(&config, session.clone())?;
        let backend: Arc<dyn AttemptBackend> = Arc::new(AttemptClient::new(executor));

        Ok(Self {
            config,
            session,
            backend,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let sheets = self.load_sheets().await?;

        if sheets.is_empty() {
            warn!("⚠️ 没有找到待作答的答题卡，程序结束");
            return Ok(());
        }
        log_sheets_loaded(sheets.len());

        let settings = SessionSettings::from_config(&self.config);
        let user_id = self.session.user_id().await;

        let mut success = 0;
        let mut failed = 0;
        for sheet in &sheets {
            match sheet_runner::run_sheet(self.backend.clone(), sheet, settings, user_id).await {
                Ok(report) => {
                    info!(
                        "✓ [{}] 答卷 #{} 已交卷，写入 {} 条答案",
                        sheet.display_name(),
                        report.attempt_id,
                        report.answered
                    );
                    success += 1;
                }
                Err(e) => {
                    error!("❌ [{}] 处理失败: {}", sheet.display_name(), e);
                    failed += 1;
                    if !self.session.is_authenticated().await {
                        error!("❌ 登录态已失效，停止处理剩余答题卡");
                        break;
                    }
                }
            }
        }

        print_final_stats(success, failed, sheets.len(), &self.config.output_log_file);
        Ok(())
    }

    /// 加载答题卡（配置了 CBT_EXAM_ID 时只保留该考试）
    async fn load_sheets(&self) -> Result<Vec<AnswerSheet>> {
        info!("\n📁 正在扫描答题卡...");
        let mut sheets = crate::models::load_all_answer_sheets(&self.config.answer_folder).await?;
        if let Some(exam_id) = self.config.exam_id {
            sheets.retain(|sheet| sheet.exam_id == exam_id);
        }
        Ok(sheets)
    }
}
