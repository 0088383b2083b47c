//! 分发调度器 - 决定何时发送，并把一次发送扇出到所有后端
//!
//! # 调度策略
//! 1. `delay == 0`：所有类别立即扇出
//! 2. 立即类别（error / permission-request）：立即扇出，500ms 内同类别重复提交直接丢弃
//! 3. 可延迟类别：每个类别最多一个定时器，新提交替换旧载荷并重置定时器
//!
//! 扇出时每个后端独立运行，单次调用 5 秒超时，失败只记录不外抛。
//! 进程退出前调用 [`DispatchScheduler::flush`] 立即发送所有挂起的通知。

use super::backend::{BackendDescriptor, DeliveryError};
use super::error_log::FailureLog;
use super::payload::{EventCategory, NotificationPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{Id, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 单个后端调用的截止时间
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// 立即类别的去重窗口（吸收 host 重复触发的 hook）
pub const IMMEDIATE_DEDUP_WINDOW: Duration = Duration::from_millis(500);

/// 单个后端的投递结果
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub backend: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// 挂起的延迟发送；`generation` 与定时器任务一一对应
struct PendingEntry {
    generation: u64,
    timer: JoinHandle<()>,
    payload: NotificationPayload,
}

#[derive(Default)]
struct SchedulerState {
    pending: HashMap<EventCategory, PendingEntry>,
    last_immediate: HashMap<EventCategory, Instant>,
    next_generation: u64,
}

struct Inner {
    backends: Vec<BackendDescriptor>,
    failure_log: Arc<dyn FailureLog>,
    delay: Duration,
    state: Mutex<SchedulerState>,
    /// 定时器已触发、仍在进行中的扇出
    in_flight: TaskTracker,
}

/// 分发调度器
///
/// 克隆开销很小，所有克隆共享同一份挂起状态。
#[derive(Clone)]
pub struct DispatchScheduler {
    inner: Arc<Inner>,
}

impl DispatchScheduler {
    /// 创建调度器，`delay` 为零时所有类别立即发送
    pub fn new(
        backends: Vec<BackendDescriptor>,
        delay: Duration,
        failure_log: Arc<dyn FailureLog>,
    ) -> Self {
        info!(
            backends = backends.len(),
            delay_secs = delay.as_secs(),
            "Dispatch scheduler created"
        );
        Self {
            inner: Arc::new(Inner {
                backends,
                failure_log,
                delay,
                state: Mutex::new(SchedulerState::default()),
                in_flight: TaskTracker::new(),
            }),
        }
    }

    /// 延迟发送的等待时间
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// 已注册后端的名称
    pub fn backend_names(&self) -> Vec<&str> {
        self.inner.backends.iter().map(|b| b.name.as_str()).collect()
    }

    /// 当前挂起的类别（排序后返回）
    pub fn pending_categories(&self) -> Vec<EventCategory> {
        let mut categories: Vec<_> = self.inner.lock_state().pending.keys().copied().collect();
        categories.sort();
        categories
    }

    /// 提交一次逻辑事件
    ///
    /// 立即路径等待扇出结束后返回；延迟路径装好定时器就返回。
    pub async fn submit(&self, payload: NotificationPayload) {
        let category = payload.category;

        if self.inner.delay.is_zero() {
            debug!(%category, "Delay disabled, dispatching immediately");
            self.inner.fan_out(&payload).await;
            return;
        }

        if category.is_immediate() {
            if !self.inner.accept_immediate(category, Instant::now()) {
                debug!(%category, "Duplicate immediate notification dropped");
                return;
            }
            debug!(%category, "Immediate category, dispatching now");
            self.inner.fan_out(&payload).await;
            return;
        }

        self.schedule(payload);
    }

    /// 替换该类别的挂起项并重新计时
    fn schedule(&self, payload: NotificationPayload) {
        let category = payload.category;
        let delay = self.inner.delay;
        let mut state = self.inner.lock_state();

        state.next_generation += 1;
        let generation = state.next_generation;

        if let Some(previous) = state.pending.remove(&category) {
            previous.timer.abort();
            debug!(%category, "Pending notification superseded");
        }

        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(category, generation).await;
        });

        state.pending.insert(
            category,
            PendingEntry {
                generation,
                timer,
                payload,
            },
        );
        debug!(%category, delay_secs = delay.as_secs(), "Notification scheduled");
    }

    /// 立即发送所有挂起的通知，等待全部扇出结束
    ///
    /// 先原子地取出并清空挂起表再开始发送，因此重复调用不会重复投递。
    /// 定时器已经触发、尚未完成的扇出也会一并等待。
    pub async fn flush(&self) {
        let drained: Vec<PendingEntry> = {
            let mut state = self.inner.lock_state();
            state.pending.drain().map(|(_, entry)| entry).collect()
        };

        if !drained.is_empty() {
            info!(count = drained.len(), "Flushing pending notifications");
        }

        let mut tasks = JoinSet::new();
        let mut categories: HashMap<Id, EventCategory> = HashMap::new();
        for entry in drained {
            entry.timer.abort();
            let inner = Arc::clone(&self.inner);
            let payload = entry.payload;
            let category = payload.category;
            let handle = tasks.spawn(async move {
                inner.fan_out(&payload).await;
            });
            categories.insert(handle.id(), category);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            if let Err(e) = joined {
                let category = categories
                    .get(&e.id())
                    .map(|c| c.as_str())
                    .unwrap_or("unknown");
                self.inner
                    .failure_log
                    .record(&format!("{} flush task failed: {}", category, e));
            }
        }

        self.inner.wait_in_flight().await;
    }

    /// 绕过调度直接扇出，返回每个后端的结果（用于连通性测试）
    pub async fn dispatch_now(&self, payload: &NotificationPayload) -> Vec<DeliveryReport> {
        self.inner.fan_out(payload).await
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 去重检查，接受时记录时间
    fn accept_immediate(&self, category: EventCategory, now: Instant) -> bool {
        let mut state = self.lock_state();
        if let Some(last) = state.last_immediate.get(&category) {
            if now.saturating_duration_since(*last) < IMMEDIATE_DEDUP_WINDOW {
                return false;
            }
        }
        state.last_immediate.insert(category, now);
        true
    }

    /// 定时器到期：只有仍是当前 generation 时才取出并发送
    async fn fire(&self, category: EventCategory, generation: u64) {
        let payload = {
            let mut state = self.lock_state();
            let current = state.pending.get(&category).map(|entry| entry.generation);
            if current == Some(generation) {
                // 出表与登记进行中在同一把锁内完成，flush 不会漏掉它
                state
                    .pending
                    .remove(&category)
                    .map(|entry| (entry.payload, self.in_flight.token()))
            } else {
                None
            }
        };

        if let Some((payload, _in_flight)) = payload {
            debug!(%category, "Delay elapsed, dispatching");
            self.fan_out(&payload).await;
        }
    }

    /// 等待所有进行中的定时器扇出结束
    async fn wait_in_flight(&self) {
        if self.in_flight.is_empty() {
            return;
        }
        debug!(count = self.in_flight.len(), "Waiting for in-flight deliveries");
        // 关闭后仍可登记新的 token，wait 在计数归零时返回
        self.in_flight.close();
        self.in_flight.wait().await;
    }

    /// 并发投递到所有后端，逐个收集结果，从不外抛
    async fn fan_out(&self, payload: &NotificationPayload) -> Vec<DeliveryReport> {
        if self.backends.is_empty() {
            debug!(category = %payload.category, "No backends enabled, skipping");
            return Vec::new();
        }

        let payload = Arc::new(payload.clone());
        let mut tasks = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::with_capacity(self.backends.len());

        for descriptor in self.backends.iter().cloned() {
            let payload = Arc::clone(&payload);
            let name = descriptor.name.clone();
            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let result = attempt(&descriptor, &payload, DELIVERY_TIMEOUT).await;
                (descriptor.name, result, started.elapsed())
            });
            names.insert(handle.id(), name);
        }

        let mut reports = Vec::with_capacity(self.backends.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (backend, Ok(()), elapsed))) => {
                    let duration_ms = elapsed.as_millis() as u64;
                    info!(
                        backend = %backend,
                        category = %payload.category,
                        duration_ms,
                        "Notification delivered"
                    );
                    reports.push(DeliveryReport {
                        backend,
                        success: true,
                        error: None,
                        duration_ms,
                    });
                }
                Ok((_, (backend, Err(e), elapsed))) => {
                    let duration_ms = elapsed.as_millis() as u64;
                    warn!(
                        backend = %backend,
                        category = %payload.category,
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    self.failure_log
                        .record(&format!("[{}] {} delivery failed: {}", backend, payload.category, e));
                    reports.push(DeliveryReport {
                        backend,
                        success: false,
                        error: Some(e.to_string()),
                        duration_ms,
                    });
                }
                Err(e) => {
                    // 后端 panic 或任务被中止
                    let backend = names
                        .remove(&e.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(
                        backend = %backend,
                        category = %payload.category,
                        error = %e,
                        "Notification delivery task failed"
                    );
                    self.failure_log
                        .record(&format!("[{}] {} delivery failed: {}", backend, payload.category, e));
                    reports.push(DeliveryReport {
                        backend,
                        success: false,
                        error: Some(e.to_string()),
                        duration_ms: 0,
                    });
                }
            }
        }

        reports
    }
}

/// 单个后端的一次尝试，超时后取消
async fn attempt(
    descriptor: &BackendDescriptor,
    payload: &NotificationPayload,
    deadline: Duration,
) -> Result<(), DeliveryError> {
    let cancel = CancellationToken::new();
    tokio::select! {
        result = descriptor.backend.deliver(&descriptor.settings, payload, cancel.clone()) => result,
        _ = tokio::time::sleep(deadline) => {
            cancel.cancel();
            Err(DeliveryError::Timeout(deadline))
        }
    }
}
