//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用主体
//! - 管理应用生命周期（初始化、运行）
//! - 恢复 / 建立登录态，持有 HTTP 资源
//! - 逐份处理答题卡并输出全局统计
//!
//! ### `sheet_runner` - 单份答题卡处理器
//! - 开始考试、加载答卷
//! - 按答题卡作答
//! - 手动交卷或等待自动交卷，拉取成绩
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<AnswerSheet>)
//!     ↓
//! sheet_runner (处理单份答题卡)
//!     ↓
//! workflow::AttemptSession (一份答卷的生命周期)
//!     ↓
//! services (能力层：save_queue / countdown / auth_session)
//!     ↓
//! clients + infrastructure (HTTP)
//! ```

pub mod app;
pub mod sheet_runner;

pub use app::App;
pub use sheet_runner::{run_sheet, SheetReport};
