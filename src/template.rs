// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板与 include 引擎
//!
//! 渲染分两遍进行：
//! 1. 单遍替换 `${name}` 占位符，替换进来的值不会再被扫描；
//! 2. 展开 `<!--#include virtual="PATH" -->` 指令，每个 PATH 交给调用方重新走一遍完整的分发流程，
//!    得到的响应体拼接到指令所在位置。
//!
//! 指令格式错误（缺少右引号）时丢弃该指令；没有 `-->` 结尾时把剩余内容原样输出。
//! include 失败或超时得到一段空内容。

use crate::{config::Config, exception::Exception, properties::Properties};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::bytes::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$\{([A-Za-z0-9_\-.]+)\}").expect("placeholder pattern");
}

const INCLUDE_OPEN: &[u8] = b"<!--#include virtual=\"";
const INCLUDE_CLOSE: &[u8] = b"-->";

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    unknown_placeholder: Option<String>,
    quiet_paths: Vec<String>,
}

impl TemplateEngine {
    pub fn new(unknown_placeholder: Option<String>, quiet_paths: Vec<String>) -> Self {
        Self {
            unknown_placeholder,
            quiet_paths,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.unknown_placeholder().map(str::to_string),
            config.quiet_include_paths().to_vec(),
        )
    }

    /// 替换 `${name}` 占位符
    pub fn substitute(&self, template: &[u8], props: &Properties) -> Vec<u8> {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| -> Vec<u8> {
                let name = String::from_utf8_lossy(&caps[1]);
                match props.get(&name) {
                    Some(value) => value.as_bytes().into_owned(),
                    None => match &self.unknown_placeholder {
                        Some(default) => default.as_bytes().to_vec(),
                        None => caps[0].to_vec(),
                    },
                }
            })
            .into_owned()
    }

    /// 失败时只记 debug 日志的 include 目标
    pub fn is_quiet(&self, path: &str) -> bool {
        self.quiet_paths.iter().any(|q| path.starts_with(q.as_str()))
    }

    /// 展开 include 指令
    ///
    /// `include` 为每个目标路径返回其响应体；返回错误时该位置留空。
    pub fn expand_includes<F>(&self, body: &[u8], id: u128, mut include: F) -> Vec<u8>
    where
        F: FnMut(&str) -> Result<Vec<u8>, Exception>,
    {
        let mut out = Vec::with_capacity(body.len());
        let mut offset = 0;
        let mut p = find(body, INCLUDE_OPEN, offset);
        while let Some(start) = p {
            // 最短的完整指令是 <!--#include virtual="a"-->
            let end = match find(body, INCLUDE_CLOSE, start + INCLUDE_OPEN.len() + 2) {
                Some(e) => e,
                None => {
                    warn!("[ID{}]include指令没有结束标记，剩余内容原样输出", id);
                    break;
                }
            };
            out.extend_from_slice(&body[offset..start]);
            let path_start = start + INCLUDE_OPEN.len();
            match find(body, b"\"", path_start + 1) {
                Some(quote) if quote < end => {
                    let path = String::from_utf8_lossy(&body[path_start..quote]).into_owned();
                    match include(&path) {
                        Ok(content) => out.extend_from_slice(&content),
                        Err(e) => {
                            if self.is_quiet(&path) {
                                debug!("[ID{}]include {} 失败：{}", id, path, e);
                            } else {
                                warn!("[ID{}]include {} 失败：{}", id, path, e);
                            }
                        }
                    }
                }
                _ => {
                    warn!(
                        "[ID{}]include指令缺少右引号：{}",
                        id,
                        String::from_utf8_lossy(&body[start..end])
                    );
                }
            }
            offset = end + INCLUDE_CLOSE.len();
            p = find(body, INCLUDE_OPEN, offset);
        }
        out.extend_from_slice(&body[offset..]);
        out
    }
}
