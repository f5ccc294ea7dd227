// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use core::str;
use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::exception::Exception;

/// 服务器的静态配置，从 TOML 文件读取，启动后只读
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    /// 主资源根目录找不到时的后备根目录
    #[serde(default)]
    htdocs_root: Option<String>,
    #[serde(default = "default_locale_root")]
    locale_root: String,
    #[serde(default = "default_locale")]
    locale: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_true")]
    accept_ranges: bool,
    #[serde(default = "default_true")]
    dir_allowed: bool,
    #[serde(default = "default_welcome_files")]
    welcome_files: Vec<String>,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_max_upload_size")]
    max_upload_size: u64,
    #[serde(default = "default_memory_factor")]
    memory_factor: u64,
    #[serde(default = "default_memory_limit")]
    memory_limit: u64,
    #[serde(default = "default_memory_min_free")]
    memory_min_free: u64,
    #[serde(default = "default_form_charset")]
    form_default_charset: String,
    /// 未知占位符的替换值，不设置时保留原样
    #[serde(default)]
    unknown_placeholder: Option<String>,
    #[serde(default = "default_include_max_depth")]
    include_max_depth: usize,
    #[serde(default = "default_include_timeout_ms")]
    include_timeout_ms: u64,
    #[serde(default = "default_quiet_include_paths")]
    quiet_include_paths: Vec<String>,
    #[serde(default = "default_auth_realm")]
    auth_realm: String,
    #[serde(default = "default_max_header_size")]
    max_header_size: usize,
}

fn default_www_root() -> String {
    ".".to_string()
}

fn default_locale_root() -> String {
    "locale".to_string()
}

fn default_locale() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_welcome_files() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

fn default_max_upload_size() -> u64 {
    104857600 // 100MB
}

fn default_memory_factor() -> u64 {
    3
}

fn default_memory_limit() -> u64 {
    2147483648 // 2GB
}

fn default_memory_min_free() -> u64 {
    33554432 // 32MB
}

fn default_form_charset() -> String {
    "utf-8".to_string()
}

fn default_include_max_depth() -> usize {
    8
}

fn default_include_timeout_ms() -> u64 {
    3000
}

fn default_quiet_include_paths() -> Vec<String> {
    vec!["/search".to_string()]
}

fn default_auth_realm() -> String {
    "htserve".to_string()
}

fn default_max_header_size() -> usize {
    16384
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: default_www_root(),
            htdocs_root: None,
            locale_root: default_locale_root(),
            locale: default_locale(),
            port: default_port(),
            local: default_local(),
            worker_threads: 0,
            accept_ranges: true,
            dir_allowed: true,
            welcome_files: default_welcome_files(),
            chunk_size: default_chunk_size(),
            max_upload_size: default_max_upload_size(),
            memory_factor: default_memory_factor(),
            memory_limit: default_memory_limit(),
            memory_min_free: default_memory_min_free(),
            form_default_charset: default_form_charset(),
            unknown_placeholder: None,
            include_max_depth: default_include_max_depth(),
            include_timeout_ms: default_include_timeout_ms(),
            quiet_include_paths: default_quiet_include_paths(),
            auth_realm: default_auth_realm(),
            max_header_size: default_max_header_size(),
        }
    }

    /// 读取 TOML 配置文件，失败时记录错误并退回默认配置
    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件 {}：{}，使用默认配置", filename, e);
                return Config::new().normalized();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件 {} 失败：{}，使用默认配置", filename, e);
            return Config::new().normalized();
        }

        match Config::from_toml_str(&str_val) {
            Ok(config) => config,
            Err(_) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置");
                Config::new().normalized()
            }
        }
    }

    /// 从 TOML 文本构建配置
    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let raw_config: Config = toml::from_str(content).map_err(|e| {
            warn!("配置解析失败：{}", e);
            Exception::Io(e.to_string())
        })?;
        Ok(raw_config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.memory_factor == 0 {
            warn!("memory_factor被设置为0，将被改为1");
            self.memory_factor = 1;
        }
        if self.include_max_depth == 0 {
            warn!("include_max_depth被设置为0，所有include都将被丢弃");
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new().normalized()
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn htdocs_root(&self) -> Option<&str> {
        self.htdocs_root.as_deref()
    }

    pub fn locale_root(&self) -> &str {
        &self.locale_root
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn accept_ranges(&self) -> bool {
        self.accept_ranges
    }

    pub fn dir_allowed(&self) -> bool {
        self.dir_allowed
    }

    pub fn welcome_files(&self) -> &[String] {
        &self.welcome_files
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    pub fn memory_factor(&self) -> u64 {
        self.memory_factor
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn memory_min_free(&self) -> u64 {
        self.memory_min_free
    }

    pub fn form_default_charset(&self) -> &str {
        &self.form_default_charset
    }

    pub fn unknown_placeholder(&self) -> Option<&str> {
        self.unknown_placeholder.as_deref()
    }

    pub fn include_max_depth(&self) -> usize {
        self.include_max_depth
    }

    pub fn include_timeout_ms(&self) -> u64 {
        self.include_timeout_ms
    }

    pub fn quiet_include_paths(&self) -> &[String] {
        &self.quiet_include_paths
    }

    pub fn auth_realm(&self) -> &str {
        &self.auth_realm
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }
}
