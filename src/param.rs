// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块集中定义服务端遵循的 HTTP 协议常量：
//! - 状态码与原因短语。
//! - 按扩展名查找的 MIME 类型表。
//! - HTTP 方法、版本与请求体编码的强类型枚举。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// 服务器名称标识，用于响应头的 `Server` 字段
pub const SERVER_NAME: &str = "htserve";

/// 服务器版本号，会作为标准属性注入每个模板
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// OPTIONS 响应中 `Allow` 头的取值
pub const ALLOW_HEADER: &str = "GET, HEAD, POST, OPTIONS";

/// 未知扩展名时使用的兜底类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

lazy_static! {
    /// 服务器允许处理的 HTTP 方法。TRACE 能被解析，但总是得到 405。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![
            HttpRequestMethod::Get,
            HttpRequestMethod::Head,
            HttpRequestMethod::Post,
            HttpRequestMethod::Options,
        ]
    };
}

lazy_static! {
    /// 本服务器会用到的状态码与原因短语。
    ///
    /// 参考标准：[RFC 9110](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(304, "Not Modified");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(408, "Request Timeout");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(416, "Range Not Satisfiable");
        map.insert(431, "Request Header Fields Too Large");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表，供静态资源与模板响应设置 `Content-Type`。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        // 文本
        map.insert("html", "text/html; charset=utf-8");
        map.insert("htm", "text/html; charset=utf-8");
        map.insert("xhtml", "application/xhtml+xml");
        map.insert("css", "text/css; charset=utf-8");
        map.insert("csv", "text/csv");
        map.insert("txt", "text/plain; charset=utf-8");
        map.insert("xml", "text/xml");
        map.insert("rss", "application/rss+xml");
        map.insert("js", "text/javascript; charset=utf-8");
        map.insert("mjs", "text/javascript; charset=utf-8");
        map.insert("json", "application/json");
        map.insert("jsonld", "application/ld+json");
        map.insert("ics", "text/calendar");
        // 图片
        map.insert("png", "image/png");
        map.insert("gif", "image/gif");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("bmp", "image/bmp");
        map.insert("ico", "image/x-icon");
        map.insert("svg", "image/svg+xml");
        map.insert("webp", "image/webp");
        map.insert("tif", "image/tiff");
        map.insert("tiff", "image/tiff");
        // 音视频
        map.insert("mp3", "audio/mpeg");
        map.insert("wav", "audio/wav");
        map.insert("oga", "audio/ogg");
        map.insert("mp4", "video/mp4");
        map.insert("mpeg", "video/mpeg");
        map.insert("webm", "video/webm");
        map.insert("ogv", "video/ogg");
        // 字体
        map.insert("otf", "font/otf");
        map.insert("ttf", "font/ttf");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("eot", "application/vnd.ms-fontobject");
        // 文档与归档
        map.insert("pdf", "application/pdf");
        map.insert("zip", "application/zip");
        map.insert("gz", "application/gzip");
        map.insert("tar", "application/x-tar");
        map.insert("7z", "application/x-7z-compressed");
        map.insert("wasm", "application/wasm");
        map
    };
}

/// 按扩展名查找 MIME 类型，找不到时返回 `fallback`。
pub fn mime_by_extension<'a>(extension: &str, fallback: &'a str) -> &'a str {
    match MIME_TYPES.get(extension.to_ascii_lowercase().as_str()) {
        Some(v) => v,
        None => fallback,
    }
}

/// 按资源名称（取最后一个 `.` 之后的部分）查找 MIME 类型
pub fn mime_by_name(name: &str) -> &'static str {
    match name.rsplit_once('.') {
        Some((_, ext)) => mime_by_extension(ext, DEFAULT_MIME),
        None => DEFAULT_MIME,
    }
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

/// 可被解析的 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    /// 与 GET 走同一条流水线，但不发送响应体，也不做条件请求判断
    Head,
    Options,
    /// 与 GET 走同一条流水线，另外解析表单请求体
    Post,
    /// 能被识别，但永远返回 405
    Trace,
}

/// 请求体可能携带的内容编码
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    Gzip,
    Deflate,
}

impl HttpEncoding {
    /// 解析 `Content-Encoding` 头，未识别的编码返回 `None`
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(HttpEncoding::Gzip),
            "deflate" => Some(HttpEncoding::Deflate),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Trace => write!(f, "TRACE"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
        }
    }
}
