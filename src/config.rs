use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    // --- 后端 API 配置 ---
    /// 后端服务地址（不含 /api 前缀）
    pub api_base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    // --- 登录态 ---
    /// 登录态持久化文件
    pub session_file: String,
    /// 自动登录用户名（可选）
    pub username: Option<String>,
    /// 自动登录密码（可选）
    pub password: Option<String>,
    // --- 答题参数 ---
    /// 只处理该考试的答题卡（可选）
    pub exam_id: Option<i64>,
    /// 答题卡 TOML 存放目录
    pub answer_folder: String,
    /// 自动保存防抖窗口（毫秒）
    pub autosave_debounce_ms: u64,
    /// 倒计时刷新间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 剩余时间告警阈值（秒）
    pub low_time_threshold_secs: i64,
    // --- 日志 ---
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            session_file: "session.toml".to_string(),
            username: None,
            password: None,
            exam_id: None,
            answer_folder: "answer_sheets".to_string(),
            autosave_debounce_ms: 2000,
            tick_interval_ms: 1000,
            low_time_threshold_secs: 60,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("CBT_API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            session_file: std::env::var("CBT_SESSION_FILE").unwrap_or(default.session_file),
            username: std::env::var("CBT_USERNAME").ok().or(default.username),
            password: std::env::var("CBT_PASSWORD").ok().or(default.password),
            exam_id: parse_optional_env("CBT_EXAM_ID").or(default.exam_id),
            answer_folder: std::env::var("CBT_ANSWER_FOLDER").unwrap_or(default.answer_folder),
            autosave_debounce_ms: parse_env("AUTOSAVE_DEBOUNCE_MS", default.autosave_debounce_ms),
            tick_interval_ms: parse_env("TICK_INTERVAL_MS", default.tick_interval_ms),
            low_time_threshold_secs: parse_env(
                "LOW_TIME_THRESHOLD_SECS",
                default.low_time_threshold_secs,
            ),
            verbose_logging: parse_env("VERBOSE_LOGGING", default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 读取环境变量，解析失败时回退到默认值并告警
fn parse_env<T: FromStr>(var_name: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(value) => parse_value(var_name, &value).unwrap_or_else(|e| {
            warn!("⚠️ {}，使用默认值", e);
            default
        }),
        Err(_) => default,
    }
}

/// 可选的环境变量：未设置或解析失败时为 None
fn parse_optional_env<T: FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match parse_value(var_name, &value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("⚠️ {}，已忽略", e);
            None
        }
    }
}

fn parse_value<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}
