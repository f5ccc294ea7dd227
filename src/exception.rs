// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类异常。
//!
//! 每个变体都能通过 [`Exception::status_code`] 映射到一个 HTTP 状态码，
//! 上层据此构造错误页面；`Display` 输出用于日志。

use std::fmt;
use std::io;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求行或请求头无法解析为 UTF-8
    RequestIsNotUtf8,
    /// 请求行或请求头格式错误
    MalformedRequest,
    /// 请求头超出配置的上限
    HeaderTooLarge,
    /// 不支持的 HTTP 方法（包括 TRACE）
    UnSupportedRequestMethod,
    /// 不支持的 HTTP 协议版本
    UnsupportedHttpVersion,
    /// 资源不存在，对应 `404 Not Found`
    FileNotFound,
    /// 路径中含有 `..` 段或越出资源根目录，以及被禁止的目录浏览
    Forbidden,
    /// 路径含有 NUL 字节等非法内容
    InvalidPath,
    /// `If-Modified-Since` 等条件头的日期无法解析
    BadDate(String),
    /// 处理器不存在，或处理单元缺少 `respond` 入口
    DispatchError(String),
    /// 处理器返回了空的图片负载
    EmptyImage,
    /// 上传的请求体超过了配置的上限
    UploadTooLarge(u64),
    /// 可用内存不足以处理上传
    InsufficientMemory(u64),
    /// include 嵌套层数超过上限
    IncludeDepthExceeded(usize),
    /// include 超出了时间预算（毫秒）
    IncludeTimeout(u64),
    /// 底层 I/O 错误
    Io(String),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest | InvalidPath | BadDate(_) => 400,
            Forbidden => 403,
            FileNotFound => 404,
            UnSupportedRequestMethod => 405,
            UploadTooLarge(_) => 413,
            HeaderTooLarge => 431,
            DispatchError(_) | EmptyImage | IncludeDepthExceeded(_) | IncludeTimeout(_) | Io(_) => {
                500
            }
            InsufficientMemory(_) => 503,
            UnsupportedHttpVersion => 505,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request line or header"),
            HeaderTooLarge => write!(f, "Request header too large"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            FileNotFound => write!(f, "File not found (404)"),
            Forbidden => write!(f, "Access forbidden (403)"),
            InvalidPath => write!(f, "Invalid path (400)"),
            BadDate(value) => write!(f, "Unparseable date header: {}", value),
            DispatchError(cause) => write!(f, "Handler dispatch failed: {}", cause),
            EmptyImage => write!(f, "Handler returned an empty image"),
            UploadTooLarge(len) => write!(f, "Upload of {} bytes exceeds the limit", len),
            InsufficientMemory(len) => write!(f, "Not enough memory to accept {} bytes", len),
            IncludeDepthExceeded(depth) => write!(f, "Include depth {} exceeded", depth),
            IncludeTimeout(ms) => write!(f, "Include exceeded its {} ms budget", ms),
            Io(cause) => write!(f, "I/O error: {}", cause),
        }
    }
}

impl std::error::Error for Exception {}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileNotFound,
            io::ErrorKind::PermissionDenied => Forbidden,
            _ => Io(e.to_string()),
        }
    }
}
