//! 会话保持：会话键提取与有界的会话绑定表

use http::HeaderMap;
use http::header::COOKIE;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::registry::LoadBalancingConfig;

/// 从请求中提取会话键
///
/// 依次尝试会话请求头、会话 Cookie，最后退回到客户端 IP。
pub fn session_key_from_request(
    headers: &HeaderMap,
    client_addr: Option<SocketAddr>,
    config: &LoadBalancingConfig,
) -> Option<String> {
    if let Some(value) = headers
        .get(config.session_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    if let Some(value) = cookie_value(headers, &config.session_cookie) {
        return Some(value);
    }

    client_addr.map(|addr| addr.ip().to_string())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// 每个服务默认最多保留的会话绑定数
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;
/// 会话绑定默认的空闲过期时间
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// 会话绑定表的容量与过期限制
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub capacity: usize,
    pub ttl: Duration,
}

impl SessionLimits {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL)
    }
}

#[derive(Debug, Clone)]
struct SessionBinding {
    instance_id: String,
    last_access: Instant,
}

/// 单个服务的会话绑定表
///
/// 空闲超过 TTL 的绑定视为失效；表满时先清理失效绑定和指向
/// 已不在候选列表中的实例的绑定，仍然满则淘汰最久未访问的绑定。
#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    bindings: HashMap<String, SessionBinding>,
}

impl SessionTable {
    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 查找仍在有效期内的绑定并刷新访问时间，过期的绑定直接删除
    pub(crate) fn touch(&mut self, key: &str, ttl: Duration) -> Option<String> {
        match self.bindings.get_mut(key) {
            Some(binding) if binding.last_access.elapsed() < ttl => {
                binding.last_access = Instant::now();
                return Some(binding.instance_id.clone());
            }
            Some(_) => {}
            None => return None,
        }
        self.bindings.remove(key);
        None
    }

    /// 记录绑定，返回为腾出空间淘汰的绑定数
    pub(crate) fn bind(
        &mut self,
        key: &str,
        instance_id: &str,
        limits: &SessionLimits,
        is_live: impl Fn(&str) -> bool,
    ) -> usize {
        let mut evicted = 0;
        if !self.bindings.contains_key(key) && self.bindings.len() >= limits.capacity {
            let before = self.bindings.len();
            self.bindings.retain(|_, binding| {
                binding.last_access.elapsed() < limits.ttl && is_live(&binding.instance_id)
            });
            evicted = before - self.bindings.len();

            while self.bindings.len() >= limits.capacity {
                let oldest = self
                    .bindings
                    .iter()
                    .min_by_key(|(_, binding)| binding.last_access)
                    .map(|(key, _)| key.clone());
                let Some(oldest) = oldest else {
                    break;
                };
                self.bindings.remove(&oldest);
                evicted += 1;
            }
        }

        self.bindings.insert(
            key.to_string(),
            SessionBinding {
                instance_id: instance_id.to_string(),
                last_access: Instant::now(),
            },
        );
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_header_wins_over_cookie_and_address() {
        let config = LoadBalancingConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", HeaderValue::from_static("abc"));
        headers.insert(COOKIE, HeaderValue::from_static("SESSIONID=def"));
        let addr: SocketAddr = "10.0.0.1:4000".parse().expect("addr");

        assert_eq!(
            session_key_from_request(&headers, Some(addr), &config).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_cookie_then_client_address() {
        let config = LoadBalancingConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; SESSIONID=def"));
        assert_eq!(
            session_key_from_request(&headers, None, &config).as_deref(),
            Some("def")
        );

        let addr: SocketAddr = "10.0.0.1:4000".parse().expect("addr");
        assert_eq!(
            session_key_from_request(&HeaderMap::new(), Some(addr), &config).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(session_key_from_request(&HeaderMap::new(), None, &config), None);
    }

    #[test]
    fn test_full_table_drops_bindings_to_departed_instances_first() {
        let limits = SessionLimits::new(2, Duration::from_secs(600));
        let mut table = SessionTable::default();
        table.bind("a", "svc-0", &limits, |_| true);
        table.bind("b", "svc-1", &limits, |_| true);

        let evicted = table.bind("c", "svc-1", &limits, |id| id == "svc-1");
        assert_eq!(evicted, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.touch("a", limits.ttl), None);
        assert_eq!(table.touch("b", limits.ttl).as_deref(), Some("svc-1"));
    }

    #[test]
    fn test_expired_binding_is_removed_on_lookup() {
        let mut table = SessionTable::default();
        table.bind("a", "svc-0", &SessionLimits::default(), |_| true);
        assert_eq!(table.touch("a", Duration::ZERO), None);
        assert_eq!(table.len(), 0);
    }
}
