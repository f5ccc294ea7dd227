// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! [`Response`] 由状态行、有序的响应头和 [`Body`] 组成。
//! 文件类的响应体在协商阶段就已打开，写出时按 `chunk_size` 分块发送，
//! 文件句柄随 `Response` 一起释放。

use crate::{
    exception::Exception,
    param::*,
    util::{format_http_date, HtmlBuilder},
};

use bytes::Bytes;
use chrono::prelude::*;
use log::error;

use std::{
    fmt,
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
};

/// multipart/byteranges 响应中的一个分段
#[derive(Debug, Clone, PartialEq)]
pub struct PartHead {
    /// 分段前导：分隔线、Content-Type、Content-Range 与空行
    pub header: String,
    pub first: u64,
    pub length: u64,
}

/// 响应体
pub enum Body {
    Empty,
    Bytes(Bytes),
    /// 文件中 `[offset, offset + length)` 的一段
    File {
        file: File,
        offset: u64,
        length: u64,
    },
    /// 多段字节范围，`closing` 为结束分隔线
    Multipart {
        file: File,
        parts: Vec<PartHead>,
        closing: String,
    },
    /// 长度未知的字节流，写完为止
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::File { offset, length, .. } => write!(f, "File({}+{})", offset, length),
            Body::Multipart { parts, .. } => write!(f, "Multipart({} parts)", parts.len()),
            Body::Stream(_) => write!(f, "Stream"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    content_length: Option<u64>,
    date: DateTime<Utc>,
    server_name: String,
    body: Body,
    head_only: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            content_length: Some(0),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            body: Body::Empty,
            head_only: false,
        }
    }

    /// 错误页面，正文由 `HtmlBuilder` 生成
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        let content = match code {
            404 => HtmlBuilder::from_status_code(404, Some("你指定的网页无法找到。")),
            405 => HtmlBuilder::from_status_code(
                405,
                Some("本服务器仅支持 GET、HEAD、POST 与 OPTIONS 方法。"),
            ),
            500 => HtmlBuilder::from_status_code(500, note.or(Some("服务器出现了一个内部错误。"))),
            _ => HtmlBuilder::from_status_code(code, note),
        }
        .build();
        response.set_header("Content-Type", "text/html; charset=utf-8");
        response.set_bytes(Bytes::from(content));
        response
    }

    pub fn from_exception(e: &Exception) -> Self {
        let mut response = Self::from_status_code(e.status_code(), None);
        if e.status_code() == 405 {
            response.set_header("Allow", ALLOW_HEADER);
        }
        response
    }

    /// 以内存数据作为响应体
    pub fn from_bytes(content_type: &str, content: impl Into<Bytes>) -> Self {
        let mut response = Self::new();
        response.set_header("Content-Type", content_type);
        response.set_bytes(content.into());
        response
    }

    /// OPTIONS 请求的响应
    pub fn options() -> Self {
        let mut response = Self::new();
        response.set_header("Allow", ALLOW_HEADER);
        response
    }

    /// 302 重定向
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::new();
        response.set_code(302);
        response.set_header("Location", location);
        response
    }

    /// 304，不带响应体
    pub fn not_modified() -> Self {
        let mut response = Self::new();
        response.set_code(304);
        response.content_length = None;
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    /// 设置响应头，同名旧值被替换
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn set_date_header(&mut self, name: &str, time: DateTime<Utc>) -> &mut Self {
        self.set_header(name, format_http_date(time))
    }

    pub fn set_bytes(&mut self, content: Bytes) -> &mut Self {
        self.content_length = Some(content.len() as u64);
        self.body = Body::Bytes(content);
        self
    }

    /// 设置响应体以及预先算好的长度；`None` 表示长度未知
    pub fn set_body(&mut self, body: Body, content_length: Option<u64>) -> &mut Self {
        self.body = body;
        self.content_length = content_length;
        self
    }

    /// HEAD 请求只写响应头，`Content-Length` 仍然是完整长度
    pub fn set_head_only(&mut self, head_only: bool) -> &mut Self {
        self.head_only = head_only;
        self
    }

    /// 状态行与响应头
    pub fn header_bytes(&self) -> Vec<u8> {
        let version = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let mut header = String::with_capacity(256);
        header.push_str(&format!(
            "{} {} {}{}",
            version, self.status_code, self.information, CRLF
        ));
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        if let Some(len) = self.content_length {
            header.push_str(&format!("Content-Length: {}{}", len, CRLF));
        }
        header.push_str(&format!("Date: {}{}", format_http_date(self.date), CRLF));
        header.push_str(&format!("Server: {}{}", self.server_name, CRLF));
        header.push_str(&format!("Connection: close{}", CRLF));
        header.push_str(CRLF);
        header.into_bytes()
    }

    /// 写出完整响应，返回写出的响应体字节数
    pub fn write_to<W: Write>(self, writer: &mut W, chunk_size: usize) -> io::Result<u64> {
        writer.write_all(&self.header_bytes())?;
        if self.head_only {
            writer.flush()?;
            return Ok(0);
        }
        let written = write_body(self.body, writer, chunk_size)?;
        writer.flush()?;
        Ok(written)
    }

    /// 把整个响应（含头部）写入内存
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer, 65536)?;
        Ok(buffer)
    }

    /// 只取响应体
    pub fn into_body_bytes(self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        if !self.head_only {
            write_body(self.body, &mut buffer, 65536)?;
        }
        Ok(buffer)
    }
}

fn copy_range<W: Write>(
    file: &mut File,
    offset: u64,
    length: u64,
    writer: &mut W,
    buffer: &mut [u8],
) -> io::Result<u64> {
    file.seek(SeekFrom::Start(offset))?;
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let n = file.read(&mut buffer[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while being sent",
            ));
        }
        writer.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }
    Ok(length)
}

fn write_body<W: Write>(body: Body, writer: &mut W, chunk_size: usize) -> io::Result<u64> {
    let chunk_size = chunk_size.max(1024);
    match body {
        Body::Empty => Ok(0),
        Body::Bytes(b) => {
            writer.write_all(&b)?;
            Ok(b.len() as u64)
        }
        Body::File {
            mut file,
            offset,
            length,
        } => {
            let mut buffer = vec![0u8; chunk_size.min(length.max(1) as usize)];
            copy_range(&mut file, offset, length, writer, &mut buffer)
        }
        Body::Multipart {
            mut file,
            parts,
            closing,
        } => {
            let mut buffer = vec![0u8; chunk_size];
            let mut written = 0u64;
            for part in &parts {
                writer.write_all(part.header.as_bytes())?;
                written += part.header.len() as u64;
                written += copy_range(&mut file, part.first, part.length, writer, &mut buffer)?;
            }
            writer.write_all(closing.as_bytes())?;
            written += closing.len() as u64;
            Ok(written)
        }
        Body::Stream(mut reader) => io::copy(&mut reader, writer),
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_head_only(&self) -> bool {
        self.head_only
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_response_new() {
        let response = Response::new();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
        assert_eq!(response.content_length(), Some(0));
    }

    #[test]
    fn test_response_as_bytes_with_content() {
        let response = Response::from_bytes("text/plain", "Hello");
        let bytes = response.into_bytes().unwrap();
        let response_str = String::from_utf8_lossy(&bytes);

        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Type: text/plain\r\n"));
        assert!(response_str.contains("Content-Length: 5\r\n"));
        assert!(response_str.contains("Server: htserve\r\n"));
        assert!(response_str.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_set_header_replaces() {
        let mut response = Response::new();
        response.set_header("Expires", "a");
        response.set_header("expires", "b");
        assert_eq!(response.header("EXPIRES"), Some("b"));
        assert_eq!(response.headers.len(), 1);
    }

    #[test]
    fn test_status_code_setter() {
        for (code, expected_info) in [
            (206, "Partial Content"),
            (304, "Not Modified"),
            (412, "Precondition Failed"),
            (416, "Range Not Satisfiable"),
            (503, "Service Unavailable"),
        ] {
            let mut response = Response::new();
            response.set_code(code);
            assert_eq!(response.status_code(), code);
            assert_eq!(response.information(), expected_info);
        }
    }

    #[test]
    fn test_head_only_keeps_length() {
        let mut response = Response::from_bytes("text/plain", "Hello");
        response.set_head_only(true);
        let bytes = response.into_bytes().unwrap();
        let response_str = String::from_utf8_lossy(&bytes);
        assert!(response_str.contains("Content-Length: 5\r\n"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_options_and_not_modified() {
        let response = Response::options();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.header("Allow"), Some("GET, HEAD, POST, OPTIONS"));
        let text = String::from_utf8(response.into_bytes().unwrap()).unwrap();
        assert!(text.contains("Content-Length: 0\r\n"));

        let response = Response::not_modified();
        assert_eq!(response.status_code(), 304);
        assert!(response.into_body_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_error_page() {
        let response = Response::from_exception(&Exception::UnSupportedRequestMethod);
        assert_eq!(response.status_code(), 405);
        assert_eq!(response.header("Allow"), Some(ALLOW_HEADER));
        let body = String::from_utf8(response.into_body_bytes().unwrap()).unwrap();
        assert!(body.contains("405"));
    }

    #[test]
    fn test_file_range_body() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let mut response = Response::new();
        response.set_body(
            Body::File {
                file: tmp,
                offset: 2,
                length: 5,
            },
            Some(5),
        );
        assert_eq!(response.into_body_bytes().unwrap(), b"23456");
    }

    #[test]
    fn test_stream_body() {
        let mut response = Response::new();
        response.set_body(Body::Stream(Box::new(Cursor::new(b"streamed".to_vec()))), None);
        let text = String::from_utf8(response.into_bytes().unwrap()).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("streamed"));
    }
}
