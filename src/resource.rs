// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 资源定位模块
//!
//! 把请求路径映射为文件系统中的 [`Resource`]。查找顺序：
//! 1. 主资源根目录 `www_root`；
//! 2. 主目录找不到时，后备根目录 `htdocs_root`；
//! 3. 模板另外支持按语言查找：`<locale_root>/<locale>/<path>` 优先。
//!
//! 任何含 `..` 段的路径直接拒绝；解析出的文件在规范化之后必须仍位于其根目录内，
//! 以防符号链接逃逸。`Resource` 每次请求都重新解析，不做缓存。

use crate::{config::Config, exception::Exception, param::mime_by_name};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::json;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    time::SystemTime,
};

/// 已解析的资源
#[derive(Debug, Clone)]
pub struct Resource {
    path: PathBuf,
    exists: bool,
    is_dir: bool,
    /// 字节长度，未知时为 -1
    length: i64,
    last_modified: Option<SystemTime>,
}

impl Resource {
    fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            is_dir: false,
            length: -1,
            last_modified: None,
        }
    }

    fn from_path(path: PathBuf) -> Self {
        match fs::metadata(&path) {
            Ok(meta) => Self {
                exists: true,
                is_dir: meta.is_dir(),
                length: if meta.is_dir() { -1 } else { meta.len() as i64 },
                last_modified: meta.modified().ok(),
                path,
            },
            Err(_) => Self::missing(path),
        }
    }

    /// 打开资源的字节流
    pub fn open(&self) -> Result<File, Exception> {
        if !self.exists || self.is_dir {
            return Err(Exception::FileNotFound);
        }
        Ok(File::open(&self.path)?)
    }

    /// 读出全部内容
    pub fn read_all(&self) -> Result<Vec<u8>, Exception> {
        if !self.exists || self.is_dir {
            return Err(Exception::FileNotFound);
        }
        Ok(fs::read(&self.path)?)
    }

    /// 文件名，用于按扩展名推断类型
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn content_type(&self) -> &'static str {
        mime_by_name(&self.name())
    }

    pub fn last_modified_utc(&self) -> Option<DateTime<Utc>> {
        self.last_modified.map(DateTime::<Utc>::from)
    }

    /// 目录内容，目录在前，其余按名称排序
    pub fn list(&self) -> Result<Vec<ListingEntry>, Exception> {
        if !self.is_dir {
            return Err(Exception::FileNotFound);
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("无法读取{:?}的元数据：{}", entry.path(), e);
                    continue;
                }
            };
            entries.push(ListingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta.modified().ok(),
            });
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }
}

/// 目录浏览中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}

/// 目录浏览的 JSON 形式
pub fn listing_json(entries: &[ListingEntry]) -> Vec<u8> {
    let items: Vec<_> = entries
        .iter()
        .map(|e| {
            json!({
                "name": e.name,
                "type": if e.is_dir { "dir" } else { "file" },
                "size": if e.is_dir { "-".to_string() } else { crate::util::format_file_size(e.size) },
                "raw_size": e.size,
                "date": e.modified.map(|t| DateTime::<Utc>::from(t).to_rfc3339()).unwrap_or_default(),
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string().into_bytes()
}

/// 路径中是否含有 `..` 段（`/` 与 `\` 都视为分隔符）
pub fn has_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// 资源定位器，持有各个根目录与欢迎页列表
#[derive(Debug, Clone)]
pub struct ResourceAccessor {
    www_root: PathBuf,
    htdocs_root: Option<PathBuf>,
    locale_root: PathBuf,
    locale: String,
    welcome_files: Vec<String>,
}

impl ResourceAccessor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            www_root: PathBuf::from(config.www_root()),
            htdocs_root: config.htdocs_root().map(PathBuf::from),
            locale_root: PathBuf::from(config.locale_root()),
            locale: config.locale().to_string(),
            welcome_files: config.welcome_files().to_vec(),
        }
    }

    /// 在主根目录与后备根目录中解析请求路径
    ///
    /// 含 `..` 段的路径返回 `Forbidden`；根目录中都不存在时返回一个 `exists() == false` 的资源。
    pub fn resolve(&self, path: &str) -> Result<Resource, Exception> {
        if has_traversal(path) {
            warn!("拒绝含有..的路径：{}", path);
            return Err(Exception::Forbidden);
        }
        let primary = self.locate(&self.www_root, path)?;
        if primary.exists() {
            debug!("在主目录中找到资源：{:?}", primary.path());
            return Ok(primary);
        }
        if let Some(htdocs) = &self.htdocs_root {
            let fallback = self.locate(htdocs, path)?;
            if fallback.exists() {
                debug!("在后备目录中找到资源：{:?}", fallback.path());
                return Ok(fallback);
            }
        }
        Ok(primary)
    }

    /// 按语言查找模板：语言目录、后备根目录、主根目录依次尝试
    pub fn resolve_localized(&self, path: &str) -> Result<Resource, Exception> {
        if has_traversal(path) {
            return Err(Exception::Forbidden);
        }
        if self.locale != "default" {
            let root = self.locale_root.join(&self.locale);
            let localized = self.locate(&root, path)?;
            if localized.exists() && !localized.is_dir() {
                debug!("使用{}语言版本：{:?}", self.locale, localized.path());
                return Ok(localized);
            }
        }
        if let Some(htdocs) = &self.htdocs_root {
            let fallback = self.locate(htdocs, path)?;
            if fallback.exists() && !fallback.is_dir() {
                return Ok(fallback);
            }
        }
        self.locate(&self.www_root, path)
    }

    /// 在目录中依次寻找欢迎页，返回其请求路径
    pub fn welcome_file(&self, dir_path: &str) -> Option<String> {
        let base = if dir_path.ends_with('/') {
            dir_path.to_string()
        } else {
            format!("{}/", dir_path)
        };
        for welcome in &self.welcome_files {
            let candidate = format!("{}{}", base, welcome);
            if let Ok(resource) = self.resolve(&candidate) {
                if resource.exists() && !resource.is_dir() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// 把请求路径拼到根目录下；文件存在时确认规范化后的路径仍在根目录内
    fn locate(&self, root: &Path, path: &str) -> Result<Resource, Exception> {
        let relative = path.trim_start_matches(['/', '\\']);
        let candidate = if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        };
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(Resource::missing(candidate));
        }
        let canonical_root = match fs::canonicalize(root) {
            Ok(r) => r,
            Err(_) => return Ok(Resource::missing(candidate)),
        };
        let canonical = match fs::canonicalize(&candidate) {
            Ok(c) => c,
            // 悬空的符号链接
            Err(_) => return Ok(Resource::missing(candidate)),
        };
        if !canonical.starts_with(&canonical_root) {
            warn!("资源{:?}越出了根目录{:?}", canonical, canonical_root);
            return Err(Exception::Forbidden);
        }
        Ok(Resource::from_path(canonical))
    }

    pub fn www_root(&self) -> &Path {
        &self.www_root
    }
}
