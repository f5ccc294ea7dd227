// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # multipart/form-data 上传解析
//!
//! 解析前先做两项检查：请求体不能超过 `max_upload_size`，
//! 可用内存至少要有 `长度 × memory_factor` 字节。
//!
//! 普通字段按声明的字符集（没有声明时用 `form_default_charset`）解码后追加到参数中。
//! 文件字段先把原始文件名记到参数里，内容排队；随后每个文件被 base64 编码：
//! `field$file` 存放编码结果，`field` 改为 `<文件名>.base64`。
//! 多于一个文件时由一个小线程池并行编码。

use std::sync::Mutex;
use std::thread;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crossbeam_channel::bounded;
use log::{debug, warn};

use crate::{args::Arguments, config::Config, exception::Exception, memory::MemoryControl};

/// 一个上传的表单项
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub field: String,
    pub filename: Option<String>,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// 从 `Content-Type` 中取出 boundary 参数
pub fn boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    header_param(params, "boundary").filter(|b| !b.is_empty())
}

/// 在 `; k=v; k2="v2"` 形式的参数串中查找参数
fn header_param(params: &str, name: &str) -> Option<String> {
    params.split(';').find_map(|p| {
        let (k, v) = p.split_once('=')?;
        if k.trim().eq_ignore_ascii_case(name) {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// 把请求体拆成表单项
pub fn split_parts(body: &[u8], boundary: &str) -> Result<Vec<UploadItem>, Exception> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let next_delimiter = format!("\r\n--{}", boundary).into_bytes();
    let mut pos = match find(body, &delimiter, 0) {
        Some(p) => p + delimiter.len(),
        None => return Err(Exception::MalformedRequest),
    };
    let mut items = Vec::new();
    loop {
        if body[pos..].starts_with(b"--") {
            break;
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(Exception::MalformedRequest);
        }
        pos += 2;
        let head_end = find(body, b"\r\n\r\n", pos).ok_or(Exception::MalformedRequest)?;
        let head = std::str::from_utf8(&body[pos..head_end])
            .map_err(|_| Exception::MalformedRequest)?;
        let content_start = head_end + 4;
        let content_end =
            find(body, &next_delimiter, content_start).ok_or(Exception::MalformedRequest)?;

        let mut field = None;
        let mut filename = None;
        let mut content_type = None;
        for line in head.split("\r\n") {
            let (name, value) = match line.split_once(':') {
                Some(pair) => pair,
                None => continue,
            };
            if name.trim().eq_ignore_ascii_case("Content-Disposition") {
                field = header_param(value, "name");
                filename = header_param(value, "filename");
            } else if name.trim().eq_ignore_ascii_case("Content-Type") {
                content_type = Some(value.trim().to_string());
            }
        }
        match field {
            Some(field) => items.push(UploadItem {
                field,
                filename,
                content: body[content_start..content_end].to_vec(),
                content_type,
            }),
            None => debug!("跳过没有name的表单项"),
        }
        pos = content_end + next_delimiter.len();
        if pos > body.len() {
            return Err(Exception::MalformedRequest);
        }
    }
    Ok(items)
}

/// 按字符集把字段值解码成字符串
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin1" | "latin-1" | "iso8859-1" => {
            bytes.iter().map(|&b| b as char).collect()
        }
        "us-ascii" | "ascii" => bytes
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
            .collect(),
        other => {
            warn!("不支持的字符集{}，按UTF-8解码", other);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// 解析 multipart 请求体，把字段与文件并入参数
pub fn parse(
    body: &[u8],
    content_type: &str,
    content_length: u64,
    args: &mut Arguments,
    config: &Config,
    memory: &MemoryControl,
) -> Result<(), Exception> {
    if content_length > config.max_upload_size() {
        warn!(
            "上传{}字节超过上限{}字节",
            content_length,
            config.max_upload_size()
        );
        return Err(Exception::UploadTooLarge(content_length));
    }
    let needed = content_length.saturating_mul(config.memory_factor());
    if !memory.request(needed) {
        return Err(Exception::InsufficientMemory(needed));
    }
    let boundary = boundary(content_type).ok_or(Exception::MalformedRequest)?;

    let mut files = Vec::new();
    for item in split_parts(body, &boundary)? {
        match &item.filename {
            Some(filename) => {
                args.add(item.field.as_str(), filename.as_str());
                files.push(item);
            }
            None => {
                let charset = item
                    .content_type
                    .as_deref()
                    .and_then(|ct| ct.split_once(';'))
                    .and_then(|(_, params)| header_param(params, "charset"))
                    .unwrap_or_else(|| config.form_default_charset().to_string());
                let value = decode_charset(&item.content, &charset);
                args.add(item.field, value);
            }
        }
    }

    let workers = files.len().min(num_cpus::get());
    merge_files(args, files, workers);
    Ok(())
}

fn store(args: &mut Arguments, field: String, filename: Option<String>, encoded: String) {
    args.put(format!("{}$file", field), encoded);
    args.remove(&field);
    args.put(field, format!("{}.base64", filename.unwrap_or_default()));
}

/// 把排队的文件编码后写入参数
///
/// 不超过一个文件时就地处理；否则起 `workers` 个线程从有界队列取任务，
/// 每个线程收到一个 `None` 后退出，所有写入都在同一把锁下进行，返回前等待全部线程结束。
pub fn merge_files(args: &mut Arguments, files: Vec<UploadItem>, workers: usize) {
    if files.len() <= 1 {
        for item in files {
            let encoded = STANDARD.encode(&item.content);
            store(args, item.field, item.filename, encoded);
        }
        return;
    }

    let workers = workers.clamp(1, files.len());
    debug!("用{}个线程编码{}个上传文件", workers, files.len());
    let (tx, rx) = bounded::<Option<UploadItem>>(files.len() + workers);
    let shared = Mutex::new(args);

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let shared = &shared;
            scope.spawn(move || {
                while let Ok(Some(item)) = rx.recv() {
                    let encoded = STANDARD.encode(&item.content);
                    let mut args = match shared.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    store(&mut **args, item.field, item.filename, encoded);
                }
            });
        }
        // 队列容量足够放下全部任务和结束标记，发送不会阻塞
        for item in files {
            let _ = tx.send(Some(item));
        }
        for _ in 0..workers {
            let _ = tx.send(None);
        }
    });
}
