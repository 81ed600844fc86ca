/// 认证 API 客户端
///
/// 封装登录、刷新凭证、登出三个调用。它不经过 `HttpExecutor`，
/// 因为刷新凭证本身就是 401 处理的一部分。
use crate::config::Config;
use crate::error::{AppError, AppResult, AuthError};
use crate::infrastructure::envelope::{decode_body, error_message};
use crate::models::UserId;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// 登录 / 刷新接口返回的凭证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// 认证客户端
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    /// 创建新的认证客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| crate::error::ConfigError::HttpClientBuildFailed {
                source: Box::new(e),
            })?;
        Ok(Self::with_client(http, &config.api_base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 用户名密码登录
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let endpoint = "/api/auth/login";
        debug!("登录用户: {}", username);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::LoginRejected {
                message: error_message(&body),
            }
            .into());
        }
        if !status.is_success() {
            return Err(AppError::bad_response(endpoint, status.as_u16(), error_message(&body)));
        }

        decode_body(endpoint, &body)
    }

    /// 用 refresh token 换取新凭证
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<LoginResponse> {
        let endpoint = "/api/auth/refresh";

        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        if !status.is_success() {
            return Err(AppError::bad_response(endpoint, status.as_u16(), error_message(&body)));
        }

        decode_body(endpoint, &body)
    }

    /// 通知后端登出
    pub async fn logout(&self, token: &str) -> AppResult<()> {
        let endpoint = "/api/auth/logout";

        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::bad_response(endpoint, status.as_u16(), error_message(&body)));
        }
        Ok(())
    }
}
