/*!
* 文件名: supervisor.rs
* 作者: JQQ
* 创建日期: 2025/12/19
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, futures, dashmap, tracing
* 描述: 后端生命周期管理器 / Backend lifecycle supervisor
*/

use super::state::{AuthChallenge, BackendStatus, LifecycleState, StateEvent};
use crate::errors::{ConnectError, LifecycleError};
use crate::pool::{ConnectionPool, RunningConnection};
use crate::registry::{BackendDescriptor, BackendRegistry};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type StartAttempt = Shared<BoxFuture<'static, Result<(), LifecycleError>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 单个后端的状态槽 / Per-backend state slot
struct BackendSlot {
    state: watch::Sender<LifecycleState>,
    /// 串行化同一后端的 start/stop / Serialises start and stop of one backend
    transition: tokio::sync::Mutex<()>,
    inflight: Mutex<Option<StartAttempt>>,
    cancel_requested: AtomicBool,
    last_error: Mutex<Option<LifecycleError>>,
    challenge: Mutex<Option<AuthChallenge>>,
}

impl BackendSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            state,
            transition: tokio::sync::Mutex::new(()),
            inflight: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            last_error: Mutex::new(None),
            challenge: Mutex::new(None),
        }
    }

    fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }
}

struct SupervisorInner {
    registry: Arc<BackendRegistry>,
    pool: Arc<ConnectionPool>,
    slots: DashMap<String, Arc<BackendSlot>>,
    /// 状态变化通知器 / State change notifier
    events: watch::Sender<Option<StateEvent>>,
}

/// 生命周期管理器 / Lifecycle supervisor
///
/// 不同后端互不阻塞；同一后端的状态转换串行执行，并发的 start 共享同一次尝试。
/// Backends never block each other; transitions of one backend are serialised and
/// concurrent starts share a single attempt.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(registry: Arc<BackendRegistry>, pool: Arc<ConnectionPool>) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            inner: Arc::new(SupervisorInner {
                registry,
                pool,
                slots: DashMap::new(),
                events,
            }),
        }
    }

    /// 启动后端 / Start a backend
    ///
    /// 已运行时直接返回；启动中时加入正在进行的尝试。
    /// Returns at once when running; joins the in-flight attempt when starting.
    pub async fn start(&self, id: &str, force_auth_retry: bool) -> Result<(), LifecycleError> {
        let descriptor = self
            .inner
            .registry
            .get(id)
            .await
            .ok_or_else(|| LifecycleError::UnknownBackend { id: id.to_string() })?;
        let slot = self.inner.slot(id);

        let attempt = {
            let mut inflight = lock(&slot.inflight);
            match inflight.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight start of {}", id);
                    existing.clone()
                }
                None => {
                    if slot.current() == LifecycleState::Running {
                        return Ok(());
                    }
                    {
                        let mut challenge = lock(&slot.challenge);
                        if force_auth_retry {
                            if challenge.take().is_some() {
                                info!("Retrying {} after authorization", id);
                            }
                        } else if let Some(pending) = challenge.as_ref() {
                            return Err(LifecycleError::NeedsAuthorization(pending.clone()));
                        }
                    }

                    slot.cancel_requested.store(false, Ordering::SeqCst);
                    let inner = self.inner.clone();
                    let task_slot = slot.clone();
                    let attempt: StartAttempt = async move {
                        inner.run_start(task_slot, descriptor, force_auth_retry).await
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(attempt.clone());
                    // 由独立任务驱动，调用者放弃等待也不会中断状态转换
                    tokio::spawn(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// 停止后端 / Stop a backend
    ///
    /// 启动中的后端会在启动尝试结束后立即被拆除。
    /// A starting backend is torn down as soon as its start attempt resolves.
    pub async fn stop(&self, id: &str) {
        let Some(slot) = self.inner.slots.get(id).map(|entry| entry.value().clone()) else {
            return;
        };

        let attempt = lock(&slot.inflight).clone();
        if let Some(attempt) = attempt {
            debug!("Stop of {} requested while starting", id);
            slot.cancel_requested.store(true, Ordering::SeqCst);
            let _ = attempt.await;
        }

        let _transition = slot.transition.lock().await;
        if slot.current() != LifecycleState::Running {
            return;
        }
        self.inner.teardown(id, &slot).await;
    }

    /// 重启 / Restart
    pub async fn restart(&self, id: &str) -> Result<(), LifecycleError> {
        self.stop(id).await;
        self.start(id, false).await
    }

    /// 启动所有已启用后端 / Start every enabled backend
    ///
    /// 各后端并行启动，返回每个后端各自的结果。
    /// Backends start in parallel; each keeps its own outcome.
    pub async fn start_all(&self) -> Vec<(String, Result<(), LifecycleError>)> {
        let ids = self.inner.registry.enabled_ids().await;
        join_all(ids.into_iter().map(|id| async move {
            let outcome = self.start(&id, false).await;
            (id, outcome)
        }))
        .await
    }

    /// 停止所有后端 / Stop every backend
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.inner.slots.iter().map(|entry| entry.key().clone()).collect();
        join_all(ids.iter().map(|id| self.stop(id))).await;
    }

    /// 按配置自动启动 / Auto-start according to configuration
    pub async fn initialize(&self, auto_start: bool) -> Vec<(String, Result<(), LifecycleError>)> {
        if !auto_start {
            return Vec::new();
        }
        let outcomes = self.start_all().await;
        for (id, outcome) in &outcomes {
            if let Err(e) = outcome {
                warn!("Auto-start of {} failed: {}", id, e);
            }
        }
        outcomes
    }

    /// 当前状态，未知ID为stopped / Current state; unknown ids are stopped
    pub fn status(&self, id: &str) -> LifecycleState {
        self.inner
            .slots
            .get(id)
            .map(|entry| entry.value().current())
            .unwrap_or_default()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.status(id) == LifecycleState::Running
    }

    /// 所有后端的状态快照 / Status snapshot of every registered backend
    pub async fn statuses(&self) -> Vec<BackendStatus> {
        self.inner
            .registry
            .list()
            .await
            .into_iter()
            .map(|descriptor| {
                let last_error = self.last_error(&descriptor.id);
                BackendStatus {
                    state: self.status(&descriptor.id),
                    needs_auth: self.pending_challenge(&descriptor.id).is_some(),
                    last_error: last_error.map(|e| e.to_string()),
                    id: descriptor.id,
                    name: descriptor.name,
                    enabled: descriptor.enabled,
                }
            })
            .collect()
    }

    /// 订阅所有状态变化 / Subscribe to every state transition
    pub fn subscribe(&self) -> watch::Receiver<Option<StateEvent>> {
        self.inner.events.subscribe()
    }

    /// 订阅单个后端的状态 / Watch the state of one backend
    pub fn watch_backend(&self, id: &str) -> watch::Receiver<LifecycleState> {
        self.inner.slot(id).state.subscribe()
    }

    pub fn last_error(&self, id: &str) -> Option<LifecycleError> {
        let slot = self.inner.slots.get(id)?.value().clone();
        let error = lock(&slot.last_error).clone();
        error
    }

    pub fn pending_challenge(&self, id: &str) -> Option<AuthChallenge> {
        let slot = self.inner.slots.get(id)?.value().clone();
        let challenge = lock(&slot.challenge).clone();
        challenge
    }

    /// 放弃授权 / Abandon a pending authorization
    pub fn abandon_auth(&self, id: &str) -> Option<AuthChallenge> {
        let slot = self.inner.slots.get(id)?.value().clone();
        let abandoned = lock(&slot.challenge).take();
        if abandoned.is_some() {
            info!("Authorization of {} abandoned", id);
        }
        abandoned
    }

    /// 停止并丢弃后端的状态槽 / Stop a backend and drop its slot
    ///
    /// 调用前须先从注册表移除，之后到达的启动会得到 UnknownBackend。
    /// Remove the backend from the registry first so later starts fail with UnknownBackend.
    pub async fn forget(&self, id: &str) {
        self.stop(id).await;
        self.inner.slots.remove(id);
    }
}

impl SupervisorInner {
    fn slot(&self, id: &str) -> Arc<BackendSlot> {
        self.slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(BackendSlot::new()))
            .value()
            .clone()
    }

    fn transition_to(&self, id: &str, slot: &BackendSlot, state: LifecycleState) {
        let previous = slot.state.send_replace(state);
        if previous != state {
            debug!("Backend {}: {} -> {}", id, previous, state);
            self.events.send_replace(Some(StateEvent {
                backend_id: id.to_string(),
                state,
            }));
        }
    }

    async fn run_start(
        self: Arc<Self>,
        slot: Arc<BackendSlot>,
        descriptor: BackendDescriptor,
        forced: bool,
    ) -> Result<(), LifecycleError> {
        let outcome = {
            let _transition = slot.transition.lock().await;
            if slot.current() == LifecycleState::Running {
                Ok(())
            } else if !self.registry.contains(&descriptor.id).await {
                // 排队期间已被卸载 / uninstalled while queued
                Err(LifecycleError::UnknownBackend {
                    id: descriptor.id.clone(),
                })
            } else {
                self.connect_locked(&slot, &descriptor, forced).await
            }
        };
        *lock(&slot.inflight) = None;
        outcome
    }

    async fn connect_locked(
        self: &Arc<Self>,
        slot: &Arc<BackendSlot>,
        descriptor: &BackendDescriptor,
        forced: bool,
    ) -> Result<(), LifecycleError> {
        let id = descriptor.id.as_str();
        self.transition_to(id, slot, LifecycleState::Starting);
        *lock(&slot.last_error) = None;

        match self.pool.connect(descriptor).await {
            Ok(catalogue) => {
                if slot.cancel_requested.swap(false, Ordering::SeqCst) {
                    info!("Stop requested while {} was starting, tearing it down", id);
                    self.teardown(id, slot).await;
                    return Err(LifecycleError::StartCancelled { id: id.to_string() });
                }
                self.transition_to(id, slot, LifecycleState::Running);
                info!("Backend {} running with {} tools", id, catalogue.tools.len());
                if let Some(running) = self.pool.get(id).await {
                    self.watch_exit(slot.clone(), running);
                }
                Ok(())
            }
            Err(err) => {
                let error = self.classify(slot, descriptor, err, forced);
                warn!("Start of {} failed: {}", id, error);
                *lock(&slot.last_error) = Some(error.clone());
                slot.cancel_requested.store(false, Ordering::SeqCst);
                self.transition_to(id, slot, LifecycleState::Stopped);
                Err(error)
            }
        }
    }

    fn classify(
        &self,
        slot: &BackendSlot,
        descriptor: &BackendDescriptor,
        err: ConnectError,
        forced: bool,
    ) -> LifecycleError {
        let id = descriptor.id.clone();
        if err.needs_auth() {
            let challenge = AuthChallenge::new(
                id.clone(),
                descriptor.endpoint_url().map(str::to_string),
                err.to_string(),
            );
            *lock(&slot.challenge) = Some(challenge.clone());
            return if forced {
                LifecycleError::ConnectFailed {
                    id,
                    needs_auth: true,
                    message: err.to_string(),
                }
            } else {
                LifecycleError::NeedsAuthorization(challenge)
            };
        }
        match err {
            ConnectError::TimeoutError(_) => LifecycleError::StartTimeout {
                id,
                timeout_ms: self.pool.options().connect_timeout.as_millis() as u64,
            },
            other => LifecycleError::ConnectFailed {
                id,
                needs_auth: false,
                message: other.to_string(),
            },
        }
    }

    /// 连接自行关闭时回到stopped / Move to stopped when the connection closes on its own
    fn watch_exit(self: &Arc<Self>, slot: Arc<BackendSlot>, running: Arc<RunningConnection>) {
        let inner = Arc::downgrade(self);
        let mut closed = running.closed();
        tokio::spawn(async move {
            // 发送端被丢弃：连接已被主动关闭
            if closed.wait_for(|closed| *closed).await.is_err() {
                return;
            }
            if let Some(inner) = inner.upgrade() {
                inner.handle_exit(&slot, &running).await;
            }
        });
    }

    async fn handle_exit(&self, slot: &BackendSlot, running: &Arc<RunningConnection>) {
        let id = running.backend_id.as_str();
        let _transition = slot.transition.lock().await;
        let current = self.pool.get(id).await;
        let same_connection = current.is_some_and(|current| Arc::ptr_eq(&current, running));
        if !same_connection || slot.current() != LifecycleState::Running {
            debug!("Ignoring close of a replaced connection to {}", id);
            return;
        }

        warn!("Backend {} exited while running", id);
        *lock(&slot.last_error) = Some(LifecycleError::BackendExited { id: id.to_string() });
        self.teardown(id, slot).await;
    }

    /// 拆除连接，无论结果如何都回到stopped / Tear down; always ends stopped
    async fn teardown(&self, id: &str, slot: &BackendSlot) {
        self.transition_to(id, slot, LifecycleState::Stopping);
        match self.pool.disconnect(id).await {
            Ok(_) => debug!("Backend {} disconnected", id),
            Err(e) => warn!("Teardown of {} reported: {}", id, e),
        }
        self.transition_to(id, slot, LifecycleState::Stopped);
        info!("Backend {} stopped", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use crate::pool::PoolOptions;

    fn supervisor() -> Supervisor {
        let registry = Arc::new(BackendRegistry::new(Arc::new(MemoryConfigStore::new())));
        let pool = Arc::new(ConnectionPool::new(PoolOptions::default()));
        Supervisor::new(registry, pool)
    }

    #[tokio::test]
    async fn test_unknown_backend_is_stopped() {
        let supervisor = supervisor();
        assert_eq!(supervisor.status("nope"), LifecycleState::Stopped);
        assert!(supervisor.last_error("nope").is_none());
        assert!(supervisor.pending_challenge("nope").is_none());
    }

    #[tokio::test]
    async fn test_start_unknown_backend_fails() {
        let supervisor = supervisor();
        let err = supervisor.start("nope", false).await.unwrap_err();
        assert_eq!(err, LifecycleError::UnknownBackend { id: "nope".into() });
        // stop of an unknown id is a no-op
        supervisor.stop("nope").await;
    }

    #[tokio::test]
    async fn test_start_with_missing_command_ends_stopped() {
        let registry = Arc::new(BackendRegistry::new(Arc::new(MemoryConfigStore::new())));
        registry
            .upsert(BackendDescriptor::process("ghost", "nonexistent_command_12345", ""))
            .await
            .unwrap();
        let supervisor = Supervisor::new(registry, Arc::new(ConnectionPool::new(PoolOptions::default())));
        let mut events = supervisor.subscribe();

        let err = supervisor.start("ghost", false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ConnectFailed { needs_auth: false, .. }));
        assert_eq!(supervisor.status("ghost"), LifecycleState::Stopped);
        assert_eq!(supervisor.last_error("ghost"), Some(err));

        events.changed().await.unwrap();
        assert_eq!(
            *events.borrow(),
            Some(StateEvent {
                backend_id: "ghost".into(),
                state: LifecycleState::Stopped
            })
        );
    }
}
