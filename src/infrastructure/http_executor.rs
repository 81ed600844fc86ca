//! HTTP 执行器 - 基础设施层
//!
//! 持有唯一的 HTTP 连接池，只暴露"带凭证发请求"的能力

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult, ConfigError};
use crate::infrastructure::envelope::{decode_body, error_message};
use crate::services::auth_session::AuthSession;

/// HTTP 执行器
///
/// 职责：
/// - 持有 reqwest::Client 和后端地址
/// - 为每个请求附加 Bearer 凭证
/// - 401 时交给登录态刷新一次并重试，刷新失败则登录态自行登出
/// - 不认识 Attempt / Question
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    session: AuthSession,
}

impl HttpExecutor {
    /// 创建新的 HTTP 执行器
    pub fn new(config: &Config, session: AuthSession) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClientBuildFailed { source: Box::new(e) })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// 获取登录态的引用
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// GET 并解析 JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let body = self.execute(Method::GET, path, None).await?;
        decode_body(path, &body)
    }

    /// POST（可带 JSON 体）并解析 JSON
    pub async fn post<B, T>(&self, path: &str, body: Option<&B>) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = body.map(serde_json::to_value).transpose()?;
        let text = self.execute(Method::POST, path, payload.as_ref()).await?;
        if text.trim().is_empty() {
            return Err(ApiError::EmptyResponse {
                endpoint: path.to_string(),
            }
            .into());
        }
        decode_body(path, &text)
    }

    /// POST，正文为空时返回默认值
    pub async fn post_or_default<B, T>(&self, path: &str, body: Option<&B>) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let payload = body.map(serde_json::to_value).transpose()?;
        let text = self.execute(Method::POST, path, payload.as_ref()).await?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        decode_body(path, &text)
    }

    /// POST，只关心状态码
    pub async fn post_unit<B>(&self, path: &str, body: Option<&B>) -> AppResult<()>
    where
        B: Serialize + ?Sized,
    {
        let payload = body.map(serde_json::to_value).transpose()?;
        self.execute(Method::POST, path, payload.as_ref()).await?;
        Ok(())
    }

    /// 发送请求并返回成功响应的正文
    async fn execute(&self, method: Method, path: &str, body: Option<&JsonValue>) -> AppResult<String> {
        let token = self.session.token().await;
        let (status, text) = self.dispatch(method.clone(), path, body, token.as_deref()).await?;

        if status != StatusCode::UNAUTHORIZED {
            return check_status(path, status, text);
        }

        warn!("⚠️ {} 返回 401，尝试刷新凭证", path);
        self.session.refresh(token.as_deref()).await.map_err(|e| {
            warn!("⚠️ 刷新凭证失败: {}", e);
            AppError::Api(ApiError::Unauthorized {
                endpoint: path.to_string(),
            })
        })?;

        let token = self.session.token().await;
        let (status, text) = self.dispatch(method, path, body, token.as_deref()).await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized {
                endpoint: path.to_string(),
            }
            .into());
        }
        check_status(path, status, text)
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        token: Option<&str>,
    ) -> AppResult<(StatusCode, String)> {
        debug!("{} {}", method, path);

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(path, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(path, e))?;

        debug!("{} -> {}", path, status);
        Ok((status, text))
    }
}

fn check_status(path: &str, status: StatusCode, text: String) -> AppResult<String> {
    if status.is_success() {
        Ok(text)
    } else {
        Err(AppError::bad_response(path, status.as_u16(), error_message(&text)))
    }
}
