//! 通知层 - 调度、扇出和各渠道实现
//!
//! # 设计目标
//! 1. 统一接口：所有渠道实现 `Backend` trait
//! 2. 渠道隔离：单个渠道失败或超时不影响其他渠道
//! 3. 合并发送：同类别的连续事件只发送最后一条
//! 4. 退出不丢：进程退出前 `flush` 挂起的通知
//!
//! # 使用示例
//! ```ignore
//! use agent_notifier::{NotificationBuilder, NotifierConfig, NotificationPayload, EventCategory};
//!
//! let config = NotifierConfig::load(None)?;
//! let scheduler = NotificationBuilder::new().build(&config)?;
//!
//! scheduler.submit(NotificationPayload::new(EventCategory::TaskComplete, "Done", "")).await;
//! scheduler.flush().await;
//! ```

pub mod backend;
pub mod builder;
pub mod channels;
pub mod error_log;
pub mod formatter;
pub mod payload;
pub mod scheduler;
pub mod truncate;

pub use backend::{Backend, BackendDescriptor, DeliveryError, DeliverySettings};
pub use builder::NotificationBuilder;
pub use error_log::{ErrorLog, FailureLog, TracingLog};
pub use formatter::{msg, MessageFormatter};
pub use payload::{EventCategory, NotificationPayload, UnknownCategory};
pub use scheduler::{DeliveryReport, DispatchScheduler, DELIVERY_TIMEOUT, IMMEDIATE_DEDUP_WINDOW};
pub use truncate::{truncate, truncate_title, TruncateDirection, MAX_TITLE_LEN};
