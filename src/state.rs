// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 处理器共享的应用状态。
//!
//! 除处理器缓存之外，这是唯一跨请求共享的结构。大部分字段只读；
//! 可变的字符串配置放在读写锁之后。

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::RwLock;

use chrono::{DateTime, Local, Utc};
use log::warn;

use crate::{param::SERVER_VERSION, properties::Properties, request::RequestContext};

/// 记录被调用过的处理器路径
pub const SERVLETS_CALLED: &str = "server.servlets.called";
/// 记录带参数提交过的处理器路径
pub const SERVLETS_SUBMITTED: &str = "server.servlets.submitted";

/// 访问级别判定。0 表示未认证，1 为普通用户，2 及以上为管理员。
pub trait Authenticator: Send + Sync {
    fn access_level(&self, request: &RequestContext) -> u8;
}

/// 回环地址来的请求视为管理员，其余不认证
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalhostAuthenticator;

impl Authenticator for LocalhostAuthenticator {
    fn access_level(&self, request: &RequestContext) -> u8 {
        let ip = request.client().and_then(|c| {
            c.parse::<SocketAddr>()
                .map(|a| a.ip())
                .ok()
                .or_else(|| c.parse::<IpAddr>().ok())
        });
        match ip {
            Some(ip) if ip.is_loopback() => 2,
            _ => 0,
        }
    }
}

/// 任何人都无权限
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn access_level(&self, _request: &RequestContext) -> u8 {
        0
    }
}

pub struct ServerState {
    version: String,
    started: DateTime<Utc>,
    peer_name: String,
    config: RwLock<HashMap<String, String>>,
    authenticator: Box<dyn Authenticator>,
}

impl ServerState {
    pub fn new(peer_name: &str, authenticator: Box<dyn Authenticator>) -> Self {
        Self {
            version: SERVER_VERSION.to_string(),
            started: Utc::now(),
            peer_name: peer_name.to_string(),
            config: RwLock::new(HashMap::new()),
            authenticator,
        }
    }

    pub fn get_config(&self, key: &str, default: &str) -> String {
        match self.config.read() {
            Ok(map) => map.get(key).cloned().unwrap_or_else(|| default.to_string()),
            Err(poisoned) => {
                warn!("共享配置锁被污染，恢复并继续");
                poisoned
                    .into_inner()
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| default.to_string())
            }
        }
    }

    pub fn set_config(&self, key: &str, value: impl Into<String>) {
        let mut map = match self.config.write() {
            Ok(map) => map,
            Err(poisoned) => {
                warn!("共享配置锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        map.insert(key.to_string(), value.into());
    }

    /// 把路径追加到逗号分隔的列表配置中，已存在则不重复
    pub fn append_path(&self, key: &str, path: &str) {
        let list = self.get_config(key, "");
        let updated = if list.is_empty() {
            path.to_string()
        } else if list.split(',').any(|p| p == path) {
            return;
        } else {
            format!("{},{}", list, path)
        };
        self.set_config(key, updated);
    }

    pub fn access_level(&self, request: &RequestContext) -> u8 {
        self.authenticator.access_level(request)
    }

    /// 运行时长（分钟）
    pub fn uptime_minutes(&self) -> i64 {
        (Utc::now() - self.started).num_minutes()
    }

    /// 往处理器输出中补充标准属性，处理器自己设置过的键保持不变
    pub fn add_standard_properties(&self, props: &mut Properties, request: &RequestContext) {
        props.put_default("version", self.version.as_str());
        props.put_default("uptime", self.uptime_minutes());
        props.put_default("clientname", self.peer_name.as_str());
        props.put_default("mytime", Local::now().format("%Y%m%d%H%M%S").to_string());
        let authorized = if self.access_level(request) >= 2 { 1 } else { 0 };
        props.put_default("authorized", authorized as i64);
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(crate::param::SERVER_NAME, Box::new(LocalhostAuthenticator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::HttpRequestMethod;
    use crate::properties::PropValue;

    fn request(client: &str) -> RequestContext {
        RequestContext::new(HttpRequestMethod::Get, "/", 0)
            .unwrap()
            .with_client(client)
    }

    #[test]
    fn test_localhost_authenticator() {
        let auth = LocalhostAuthenticator;
        assert_eq!(auth.access_level(&request("127.0.0.1:5000")), 2);
        assert_eq!(auth.access_level(&request("::1")), 2);
        assert_eq!(auth.access_level(&request("10.1.2.3:80")), 0);
        assert_eq!(DenyAll.access_level(&request("127.0.0.1:5000")), 0);
    }

    #[test]
    fn test_append_path() {
        let state = ServerState::default();
        state.append_path(SERVLETS_CALLED, "/a.html");
        state.append_path(SERVLETS_CALLED, "/b.html");
        state.append_path(SERVLETS_CALLED, "/a.html");
        assert_eq!(state.get_config(SERVLETS_CALLED, ""), "/a.html,/b.html");
    }

    #[test]
    fn test_standard_properties() {
        let state = ServerState::new("peer-x", Box::new(DenyAll));
        let mut props = Properties::new();
        props.put("clientname", "mine");
        state.add_standard_properties(&mut props, &request("127.0.0.1:1"));
        assert_eq!(props.get_text("clientname"), Some("mine".to_string()));
        assert_eq!(props.get_text("version"), Some(SERVER_VERSION.to_string()));
        assert_eq!(props.get("authorized"), Some(&PropValue::Number(0)));
        assert_eq!(props.get("uptime"), Some(&PropValue::Number(0)));
        assert_eq!(props.get_text("mytime").map(|t| t.len()), Some(14));
    }
}
