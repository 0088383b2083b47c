//! Agent Notifier - 把 AI 编码会话的生命周期事件转发到通知服务

pub mod config;
pub mod host;
pub mod notification;

pub use config::{ConfigError, NotifierConfig};
pub use host::{ExitGuard, HostEvent, HostEventKind, HostIntegration, SessionTracker};
pub use notification::{
    Backend, BackendDescriptor, DeliveryError, DeliveryReport, DeliverySettings, DispatchScheduler,
    ErrorLog, EventCategory, FailureLog, MessageFormatter, NotificationBuilder, NotificationPayload,
    TracingLog, TruncateDirection,
};
