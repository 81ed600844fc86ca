//! 自动保存合并队列 - 业务能力层
//!
//! 只有一个待发送槽位和一个"上次保存后有改动"标记：
//! - 窗口内的多次改动合并成一次保存
//! - 同一时刻最多一个保存在途，在途期间的新改动顺延到下一次
//! - 交卷开始后关闭，不再发起任何保存
//!
//! 本模块是纯状态机，不依赖任何调度框架；时间由调用方传入。

use std::time::Duration;
use tokio::time::Instant;

/// 队列给调用方的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// 没有待保存的改动
    Idle,
    /// 有保存在途，等它结束
    Busy,
    /// 有改动，但防抖窗口还没过
    WaitUntil(Instant),
    /// 现在开始保存
    Start,
    /// 队列已关闭
    Closed,
}

/// 合并队列
#[derive(Debug, Clone)]
pub struct SaveQueue {
    debounce: Duration,
    deadline: Option<Instant>,
    dirty: bool,
    in_flight: bool,
    closed: bool,
}

impl SaveQueue {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
            dirty: false,
            in_flight: false,
            closed: false,
        }
    }

    /// 记录一次改动，防抖截止时间顺延
    ///
    /// 队列关闭时返回 false。
    pub fn mark_dirty(&mut self, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        self.dirty = true;
        self.deadline = Some(now + self.debounce);
        true
    }

    /// 询问现在该做什么；返回 `Start` 时队列已进入在途状态
    pub fn poll(&mut self, now: Instant) -> SaveDecision {
        if self.closed {
            return SaveDecision::Closed;
        }
        if self.in_flight {
            return SaveDecision::Busy;
        }
        if !self.dirty {
            return SaveDecision::Idle;
        }
        match self.deadline {
            Some(deadline) if deadline > now => SaveDecision::WaitUntil(deadline),
            _ => {
                self.dirty = false;
                self.deadline = None;
                self.in_flight = true;
                SaveDecision::Start
            }
        }
    }

    /// 在途保存结束（无论成败）
    ///
    /// 失败不会自动重新标记，下一次自然改动才会再触发保存。
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    /// 手动立即保存时丢弃挂起的防抖
    pub fn take_pending(&mut self) -> bool {
        let was_dirty = self.dirty;
        self.dirty = false;
        self.deadline = None;
        was_dirty
    }

    /// 关闭队列（交卷开始 / 离开页面）
    pub fn close(&mut self) {
        self.closed = true;
        self.dirty = false;
        self.deadline = None;
    }

    /// 交卷失败后重新开放
    pub fn reopen(&mut self) {
        self.closed = false;
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
