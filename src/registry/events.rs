//! 注册中心事件通道
//!
//! 注册中心的每一次状态变化都以 `RegistryEvent` 发布到有界广播通道。
//! 通道开启溢出模式：消费者过慢时丢弃最旧的事件，发布方永不阻塞。

use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use serde::Serialize;

/// 默认事件通道容量
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// 注册中心状态变化事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    ServiceRegistered {
        service_id: String,
        instances: usize,
    },
    ServiceDeregistered {
        service_id: String,
    },
    InstanceHealthChanged {
        service_id: String,
        instance_id: String,
        healthy: bool,
    },
    HealthCheckFailed {
        service_id: String,
        instance_id: String,
        reason: String,
    },
    ServiceConfigUpdated {
        service_id: String,
    },
    EndpointsUpdated {
        service_id: String,
        instances: usize,
    },
    VersionRegistered {
        service_id: String,
        version: String,
        is_default: bool,
    },
    VersionDeprecated {
        service_id: String,
        version: String,
        deprecation_date: chrono::DateTime<chrono::Utc>,
    },
    RewriteRuleAdded {
        service_id: String,
        pattern: String,
    },
    RewriteRuleRemoved {
        service_id: String,
        pattern: String,
    },
    DiscoveryCompleted {
        provider: String,
        discovered: usize,
        changed: usize,
    },
    DiscoveryFailed {
        provider: String,
        error: String,
    },
}

impl RegistryEvent {
    /// 事件关联的服务 ID（注册中心级事件返回 None）
    pub fn service_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::ServiceRegistered { service_id, .. }
            | RegistryEvent::ServiceDeregistered { service_id }
            | RegistryEvent::InstanceHealthChanged { service_id, .. }
            | RegistryEvent::HealthCheckFailed { service_id, .. }
            | RegistryEvent::ServiceConfigUpdated { service_id }
            | RegistryEvent::EndpointsUpdated { service_id, .. }
            | RegistryEvent::VersionRegistered { service_id, .. }
            | RegistryEvent::VersionDeprecated { service_id, .. }
            | RegistryEvent::RewriteRuleAdded { service_id, .. }
            | RegistryEvent::RewriteRuleRemoved { service_id, .. } => Some(service_id),
            RegistryEvent::DiscoveryCompleted { .. } | RegistryEvent::DiscoveryFailed { .. } => {
                None
            }
        }
    }
}

/// 事件总线
pub struct EventBus {
    sender: Sender<RegistryEvent>,
    // 保持通道打开，新订阅者从这里激活
    template: InactiveReceiver<RegistryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        sender.set_await_active(false);
        Self {
            sender,
            template: receiver.deactivate(),
        }
    }

    /// 发布事件，从不阻塞
    pub fn publish(&self, event: RegistryEvent) {
        match self.sender.try_broadcast(event) {
            Ok(None) => {}
            Ok(Some(dropped)) => {
                tracing::trace!(event = ?dropped, "Event bus overflowed, oldest event dropped");
            }
            // 没有订阅者或通道已关闭时直接丢弃
            Err(TrySendError::Inactive(_)) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event bus full, event dropped");
            }
        }
    }

    /// 订阅事件，只接收订阅之后发布的事件
    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        self.template.activate_cloned()
    }

    /// 关闭通道，所有订阅者随后收到关闭信号
    pub fn close(&self) {
        self.sender.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
