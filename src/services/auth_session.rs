//! 登录态服务 - 业务能力层
//!
//! 显式传递的登录上下文，生命周期：
//! 启动时从持久化文件恢复 → 只通过 login / refresh / logout 修改 → 登出时清空。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clients::auth_client::{AuthClient, LoginResponse};
use crate::error::{AppError, AppResult, AuthError};
use crate::models::UserId;

/// 持久化的凭证
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Credentials {
    /// 有 token 且有用户 ID 才算登录
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user_id.is_some()
    }

    fn apply(&mut self, login: LoginResponse) {
        self.token = Some(login.access_token);
        if login.refresh_token.is_some() {
            self.refresh_token = login.refresh_token;
        }
        if login.user_id.is_some() {
            self.user_id = login.user_id;
        }
        if login.username.is_some() {
            self.username = login.username;
        }
        if login.role.is_some() {
            self.role = login.role;
        }
    }
}

/// 凭证存储（TOML 文件，或仅内存）
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn memory() -> Self {
        Self { path: None }
    }

    /// 读取凭证，文件不存在视为未登录
    pub async fn load(&self) -> AppResult<Credentials> {
        let Some(path) = &self.path else {
            return Ok(Credentials::default());
        };
        if !path.exists() {
            return Ok(Credentials::default());
        }
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::file_read_failed(&display, e))?;
        Ok(toml::from_str(&content)?)
    }

    pub async fn save(&self, credentials: &Credentials) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = toml::to_string(credentials)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
    }

    pub async fn clear(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if path.exists() {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        }
        Ok(())
    }
}

struct SessionInner {
    client: AuthClient,
    store: SessionStore,
    credentials: RwLock<Credentials>,
    refresh_gate: Mutex<()>,
}

/// 登录态
///
/// 克隆代价很低，所有克隆共享同一份凭证。
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    /// 启动时从持久化存储恢复
    pub async fn restore(client: AuthClient, store: SessionStore) -> AppResult<Self> {
        let credentials = match store.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("⚠️ 读取登录态失败，按未登录处理: {}", e);
                Credentials::default()
            }
        };

        if credentials.is_authenticated() {
            info!(
                "✓ 已恢复登录态: {} (用户 {:?})",
                credentials.username.as_deref().unwrap_or("-"),
                credentials.user_id
            );
        } else {
            debug!("没有可恢复的登录态");
        }

        Ok(Self::with_credentials(client, store, credentials))
    }

    pub fn with_credentials(client: AuthClient, store: SessionStore, credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                client,
                store,
                credentials: RwLock::new(credentials),
                refresh_gate: Mutex::new(()),
            }),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.credentials.read().await.token.clone()
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.inner.credentials.read().await.user_id
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.credentials.read().await.is_authenticated()
    }

    pub async fn credentials(&self) -> Credentials {
        self.inner.credentials.read().await.clone()
    }

    /// 登录并持久化
    pub async fn login(&self, username: &str, password: &str) -> AppResult<()> {
        let response = self.inner.client.login(username, password).await?;
        self.apply_login(response).await?;
        info!("✓ 登录成功: {}", username);
        Ok(())
    }

    /// 写入新凭证并持久化
    pub async fn apply_login(&self, response: LoginResponse) -> AppResult<()> {
        let snapshot = {
            let mut credentials = self.inner.credentials.write().await;
            credentials.apply(response);
            credentials.clone()
        };
        self.inner.store.save(&snapshot).await
    }

    /// 刷新凭证，失败则登出
    ///
    /// 并发的 401 只会触发一次刷新：拿到锁后若 token 已经变了，直接返回。
    pub async fn refresh(&self, stale_token: Option<&str>) -> AppResult<()> {
        let _gate = self.inner.refresh_gate.lock().await;

        let (current, refresh_token) = {
            let credentials = self.inner.credentials.read().await;
            (credentials.token.clone(), credentials.refresh_token.clone())
        };
        if current.is_some() && current.as_deref() != stale_token {
            debug!("凭证已被其他请求刷新");
            return Ok(());
        }

        let Some(refresh_token) = refresh_token else {
            warn!("⚠️ 没有 refresh token，执行登出");
            self.logout().await?;
            return Err(AuthError::NoRefreshToken.into());
        };

        match self.inner.client.refresh(&refresh_token).await {
            Ok(response) => {
                self.apply_login(response).await?;
                info!("✓ 凭证已刷新");
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ 刷新凭证失败，执行登出: {}", e);
                self.logout().await?;
                Err(AuthError::RefreshFailed { source: Box::new(e) }.into())
            }
        }
    }

    /// 登出：尽力通知后端，然后无论结果如何都清空本地凭证
    pub async fn logout(&self) -> AppResult<()> {
        let token = self.inner.credentials.read().await.token.clone();
        if let Some(token) = token {
            if let Err(e) = self.inner.client.logout(&token).await {
                warn!("⚠️ 登出接口调用失败: {}", e);
            }
        }

        *self.inner.credentials.write().await = Credentials::default();
        self.inner.store.clear().await?;
        info!("已登出");
        Ok(())
    }
}
