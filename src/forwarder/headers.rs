//! 转发请求头处理

use http::header::{HOST, HeaderName};
use http::{HeaderMap, HeaderValue};
use std::net::SocketAddr;

/// 不应跨越代理转发的逐跳头
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_CORRELATION_ID: &str = "x-correlation-id";
pub const X_GATEWAY_VERSION: &str = "x-gateway-version";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_RESPONSE_TIME: &str = "x-response-time";
pub const X_INSTANCE_ID: &str = "x-instance-id";
pub const X_SERVICE_NAME: &str = "x-service-name";
pub const X_RETRY_COUNT: &str = "x-retry-count";

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// 读取客户端携带的关联 ID
pub fn incoming_correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 读取或生成关联 ID
pub fn correlation_id_from(headers: &HeaderMap) -> String {
    incoming_correlation_id(headers).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// 构建发往上游的请求头
///
/// 去掉逐跳头、`host` 和 `content-length`（由客户端按实际请求体重新计算），
/// 追加 `x-forwarded-*`、关联 ID 和网关版本。
pub fn outbound_headers(
    inbound: &HeaderMap,
    client_addr: Option<SocketAddr>,
    correlation_id: &str,
    gateway_version: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 6);
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name == HOST || name == http::header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(addr) = client_addr {
        let client_ip = addr.ip().to_string();
        let forwarded_for = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{}, {}", existing, client_ip),
            _ => client_ip,
        };
        insert_str(&mut headers, X_FORWARDED_FOR, &forwarded_for);
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if let Some(host) = inbound.get(HOST) {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }

    insert_str(&mut headers, X_CORRELATION_ID, correlation_id);
    insert_str(&mut headers, X_GATEWAY_VERSION, gateway_version);
    headers
}

/// 复制上游响应头，去掉逐跳头和 `content-length`
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 5);
    for (name, value) in upstream {
        if is_hop_by_hop(name) || name == http::header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// 插入字符串头，非法值直接忽略
pub fn insert_str(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
