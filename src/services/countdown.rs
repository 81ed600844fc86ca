//! 倒计时 - 业务能力层
//!
//! 剩余时间只由 (开始时间, 时长, 当前时间) 决定，每次都重新计算，
//! 页面刷新后不会被重置。

use chrono::{DateTime, TimeDelta, Utc};

/// 时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 一次答卷的倒计时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    deadline: DateTime<Utc>,
    low_time_threshold_secs: i64,
}

impl Countdown {
    /// 时长超出可表示范围时返回 None
    pub fn new(
        started_at: DateTime<Utc>,
        duration_sec: i64,
        low_time_threshold_secs: i64,
    ) -> Option<Self> {
        let deadline = TimeDelta::try_seconds(duration_sec)
            .and_then(|duration| started_at.checked_add_signed(duration))?;
        Some(Self {
            deadline,
            low_time_threshold_secs,
        })
    }

    /// 截止时间
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// 剩余秒数，四舍五入（.5 向上），可以为负
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.deadline - now).num_milliseconds();
        (millis + 500).div_euclid(1000)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_secs(now) <= 0
    }

    /// 仅用于展示的低时间告警
    pub fn is_low_time(&self, remaining_secs: i64) -> bool {
        remaining_secs <= self.low_time_threshold_secs
    }
}

/// 格式化为 `MM:SS`，负数按 0 显示
pub fn format_clock(remaining_secs: i64) -> String {
    let remaining = remaining_secs.max(0);
    format!("{:02}:{:02}", remaining / 60, remaining % 60)
}
