//! 注册中心事件日志
//!
//! 独立任务消费注册中心事件并写入 tracing 日志。事件通道开启了溢出模式，
//! 消费过慢时最旧的事件被丢弃，注册中心不会因此阻塞。

use async_broadcast::{Receiver, RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{RegistryEvent, ServiceRegistry};

/// 事件日志任务
pub struct EventLogger {
    handle: JoinHandle<u64>,
}

impl EventLogger {
    /// 订阅注册中心并启动日志任务
    pub fn spawn(registry: &ServiceRegistry) -> Self {
        Self::from_receiver(registry.subscribe())
    }

    pub fn from_receiver(receiver: Receiver<RegistryEvent>) -> Self {
        Self {
            handle: tokio::spawn(run(receiver)),
        }
    }

    /// 等待事件通道关闭，返回记录的事件数
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Event logger task failed");
                0
            }
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run(mut receiver: Receiver<RegistryEvent>) -> u64 {
    let mut logged = 0u64;
    loop {
        match receiver.recv().await {
            Ok(event) => {
                log_event(&event);
                logged += 1;
            }
            Err(RecvError::Overflowed(skipped)) => {
                warn!(skipped, "Event logger lagging, events dropped");
            }
            Err(RecvError::Closed) => {
                debug!(logged, "Registry event channel closed");
                return logged;
            }
        }
    }
}

fn log_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::ServiceRegistered {
            service_id,
            instances,
        } => info!(service_id = %service_id, instances, "event: service registered"),
        RegistryEvent::ServiceDeregistered { service_id } => {
            info!(service_id = %service_id, "event: service deregistered")
        }
        RegistryEvent::InstanceHealthChanged {
            service_id,
            instance_id,
            healthy,
        } => {
            if *healthy {
                info!(service_id = %service_id, instance_id = %instance_id, "event: instance healthy");
            } else {
                warn!(service_id = %service_id, instance_id = %instance_id, "event: instance unhealthy");
            }
        }
        RegistryEvent::HealthCheckFailed {
            service_id,
            instance_id,
            reason,
        } => debug!(
            service_id = %service_id,
            instance_id = %instance_id,
            reason = %reason,
            "event: health check failed"
        ),
        RegistryEvent::DiscoveryFailed { provider, error } => {
            warn!(provider = %provider, error = %error, "event: discovery failed")
        }
        other => {
            // 其余事件结构简单，直接输出 JSON
            let payload = serde_json::to_string(other).unwrap_or_default();
            info!(service_id = ?other.service_id(), event = %payload, "event: registry updated");
        }
    }
}
