// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责把从连接中读出的原始请求头解析为 [`RequestContext`]：
//! 1. 请求行（方法、目标路径、版本）。
//! 2. 大小写不敏感、保留多值顺序的请求头表 [`Headers`]。
//! 3. 路径的百分号解码与查询串参数。
//! 4. Basic 认证中的用户名。
//!
//! 一个 `RequestContext` 只属于一个请求，处理完毕即丢弃。

use crate::{args::Arguments, exception::Exception, param::*, util::percent_decode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::error;

/// 请求头表：名字大小写不敏感，同名头按到达顺序保存全部取值
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// 替换同名头的全部取值
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.entries.push((name.to_string(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 一次请求的全部上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 请求 ID，用于日志追踪
    id: u128,
    method: HttpRequestMethod,
    version: HttpVersion,
    /// 百分号解码后的路径，不含查询串
    path: String,
    /// 原始查询串（不含 `?`）
    query: Option<String>,
    args: Arguments,
    headers: Headers,
    client: Option<String>,
    body: Vec<u8>,
}

impl RequestContext {
    /// 以给定方法与目标（路径加可选的查询串）构造请求上下文，版本为 HTTP/1.1
    pub fn new(method: HttpRequestMethod, target: &str, id: u128) -> Result<Self, Exception> {
        let (path, query) = split_target(target)?;
        let args = match &query {
            Some(q) => Arguments::from_query(q),
            None => Arguments::new(),
        };
        Ok(Self {
            id,
            method,
            version: HttpVersion::V1_1,
            path,
            query,
            args,
            headers: Headers::new(),
            client: None,
            body: Vec::new(),
        })
    }

    /// 解析请求头部分（到空行为止，不含请求体）
    ///
    /// # 错误处理
    /// - 非 UTF-8：`RequestIsNotUtf8`
    /// - 请求行或头部行格式错误：`MalformedRequest`
    /// - 未知方法：`UnSupportedRequestMethod`
    /// - 非 HTTP/1.0 或 HTTP/1.1：`UnsupportedHttpVersion`
    pub fn parse_head(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = request_string.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method_str = parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "TRACE" => HttpRequestMethod::Trace,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = parts[2].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let mut request = RequestContext::new(method, parts[1], id)?;
        request.version = version;

        for line in lines {
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    request.headers.append(name.trim(), value.trim());
                }
                _ => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }
        Ok(request)
    }

    /// 为 include 生成子请求：沿用请求头与客户端信息，换成新的目标路径
    pub fn derive(&self, target: &str) -> Result<Self, Exception> {
        let mut sub = RequestContext::new(HttpRequestMethod::Get, target, self.id)?;
        sub.version = self.version;
        sub.headers = self.headers.clone();
        sub.client = self.client.clone();
        Ok(sub)
    }

    /// 内部转发（例如欢迎页），保留方法、请求体与参数
    pub fn forward(&self, path: &str) -> Self {
        let mut forwarded = self.clone();
        forwarded.path = path.to_string();
        forwarded
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// 去掉同名请求头的全部取值
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }
}

/// 拆分请求目标为（解码后的路径，查询串）
fn split_target(target: &str) -> Result<(String, Option<String>), Exception> {
    let (raw_path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (target, None),
    };
    let decoded = percent_decode(raw_path, false);
    if decoded.contains(&0) {
        return Err(Exception::InvalidPath);
    }
    let path = String::from_utf8_lossy(&decoded).into_owned();
    Ok((path, query))
}

// --- Getter 访问器实现 ---

impl RequestContext {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 解码后的路径
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn set_client(&mut self, client: impl Into<String>) {
        self.client = Some(client.into());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// 声明的请求体长度
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// Basic 认证中的用户名
    pub fn principal(&self) -> Option<String> {
        let value = self.headers.get("Authorization")?;
        let (scheme, credentials) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(credentials.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let user = match decoded.split_once(':') {
            Some((u, _)) => u,
            None => decoded.as_str(),
        };
        if user.is_empty() {
            None
        } else {
            Some(user.to_string())
        }
    }

    /// 把路径连同原始查询串还原出来，用于重定向
    pub fn path_with_query(&self, path: &str) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", path, q),
            None => path.to_string(),
        }
    }
}
