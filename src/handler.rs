// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 处理器注册表
//!
//! 动态页面由“处理单元”提供。每个单元按名字导出若干入口，分发时只使用 `respond` 入口。
//! 单元在启动时注册进 [`HandlerRegistry`]，之后只读。
//!
//! 请求路径到单元名的映射见 [`class_name`]：去掉开头的 `/` 与扩展名，再把 `/` 换成 `.`，
//! 例如 `/api/status.html` 对应 `api.status`。

use crate::{
    args::Arguments, exception::Exception, properties::Properties, request::RequestContext,
    state::ServerState,
};

use std::{collections::HashMap, fmt, io::Read, sync::Arc};

/// 分发时调用的入口名
pub const RESPOND_ENTRY: &str = "respond";

/// 处理器的输出
pub enum HandlerOutput {
    /// 模板属性，之后交给模板引擎渲染
    Properties(Properties),
    /// 图片负载；`is_static` 表示内容不会变化，可缓存一小时
    Image { bytes: Vec<u8>, is_static: bool },
    /// 原样复制给客户端的字节流
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutput::Properties(p) => write!(f, "Properties({} keys)", p.len()),
            HandlerOutput::Image { bytes, is_static } => {
                write!(f, "Image({} bytes, static={})", bytes.len(), is_static)
            }
            HandlerOutput::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// 处理器入口：请求上下文、参数（没有参数时为 `None`）、共享状态
pub type RespondFn =
    Arc<dyn Fn(&RequestContext, Option<&Arguments>, &ServerState) -> HandlerOutput + Send + Sync>;

/// 一个处理单元，按名字导出入口
#[derive(Clone)]
pub struct HandlerUnit {
    name: String,
    entries: HashMap<String, RespondFn>,
}

impl HandlerUnit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// 只导出 `respond` 入口的单元
    pub fn respond<F>(name: &str, f: F) -> Self
    where
        F: Fn(&RequestContext, Option<&Arguments>, &ServerState) -> HandlerOutput
            + Send
            + Sync
            + 'static,
    {
        Self::new(name).with_entry(RESPOND_ENTRY, f)
    }

    pub fn with_entry<F>(mut self, entry: &str, f: F) -> Self
    where
        F: Fn(&RequestContext, Option<&Arguments>, &ServerState) -> HandlerOutput
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(entry.to_string(), Arc::new(f));
        self
    }

    pub fn entry(&self, entry: &str) -> Option<RespondFn> {
        self.entries.get(entry).cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for HandlerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("HandlerUnit")
            .field("name", &self.name)
            .field("entries", &names)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    units: HashMap<String, HandlerUnit>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理单元，同名单元会被替换
    pub fn register(&mut self, unit: HandlerUnit) {
        self.units.insert(unit.name.clone(), unit);
    }

    /// 是否存在该名字的处理单元（不检查入口）
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// 查找单元的 `respond` 入口
    pub fn lookup(&self, name: &str) -> Result<RespondFn, Exception> {
        let unit = self
            .units
            .get(name)
            .ok_or_else(|| Exception::DispatchError(format!("no handler unit named {}", name)))?;
        unit.entry(RESPOND_ENTRY).ok_or_else(|| {
            Exception::DispatchError(format!(
                "handler unit {} has no {} entry point",
                name, RESPOND_ENTRY
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// 由请求路径推导处理单元名；最后一段没有扩展名时返回 `None`
pub fn class_name(path: &str) -> Option<String> {
    let trimmed = path.trim_start_matches('/');
    let last_segment_start = trimmed.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = trimmed[last_segment_start..].rfind('.')? + last_segment_start;
    let stem = &trimmed[..dot];
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace('/', "."))
}

/// 请求路径的扩展名（不含 `.`）
pub fn extension(path: &str) -> &str {
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rfind('.') {
        Some(i) => &last[i + 1..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(_: &RequestContext, _: Option<&Arguments>, _: &ServerState) -> HandlerOutput {
        HandlerOutput::Properties(Properties::new())
    }

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("/Status.html"), Some("Status".to_string()));
        assert_eq!(class_name("/api/status.json"), Some("api.status".to_string()));
        assert_eq!(class_name("/a.b/c"), None);
        assert_eq!(class_name("/dir/"), None);
        assert_eq!(class_name("/.hidden"), None);
        assert_eq!(class_name("/x/y/z.tar.gz"), Some("x.y.z.tar".to_string()));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/img/logo.png"), "png");
        assert_eq!(extension("/a.b/c"), "");
        assert_eq!(extension("/style.css"), "css");
    }

    #[test]
    fn test_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerUnit::respond("Status", empty));
        registry.register(HandlerUnit::new("Broken").with_entry("other", empty));

        assert!(registry.lookup("Status").is_ok());
        assert!(registry.contains("Broken"));
        match registry.lookup("Broken") {
            Err(Exception::DispatchError(cause)) => assert!(cause.contains("respond")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(matches!(registry.lookup("Missing"), Err(Exception::DispatchError(_))));
    }
}
