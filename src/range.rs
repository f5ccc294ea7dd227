// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 范围协商模块
//!
//! 负责静态资源的条件请求判断与字节范围发送：
//! - `If-Modified-Since` / `If-Unmodified-Since` 以秒为精度比较；
//! - `Range` 头解析为若干 [`RangeSpec`]，重叠的范围会被合并；
//! - 无可满足范围时返回 416 但仍发送完整内容；
//! - 单个范围返回 206 与对应片段；
//! - 多个范围返回 `multipart/byteranges`，`Content-Length` 在写出响应头之前算好。

use crate::{
    exception::Exception,
    param::CRLF,
    request::{Headers, RequestContext},
    resource::Resource,
    response::{Body, PartHead, Response},
    util::parse_http_date,
};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rand::Rng;

/// 静态内容的过期时间
const STATIC_EXPIRES_SECS: i64 = 600;

/// 已校验的闭区间 `[first, last]`，满足 `first <= last < length`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    first: u64,
    last: u64,
}

impl RangeSpec {
    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn size(&self) -> u64 {
        self.last - self.first + 1
    }

    /// `Content-Range` 的取值，例如 `bytes 0-9/100`
    pub fn header_value(&self, length: u64) -> String {
        format!("bytes {}-{}/{}", self.first, self.last, length)
    }

    fn overlaps(&self, other: &RangeSpec) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// 416 响应的 `Content-Range` 取值
pub fn unsatisfiable_header_value(length: u64) -> String {
    format!("bytes */{}", length)
}

/// 解析一个 `bytes=` 范围集合。格式错误时整条头部作废，返回 `None`。
fn parse_one_header(value: &str, length: u64) -> Option<Vec<RangeSpec>> {
    let value = value.trim();
    let (unit, set) = value.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    let mut result = Vec::new();
    for token in set.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (first, last) = token.split_once('-')?;
        let (first, last) = (first.trim(), last.trim());
        if first.is_empty() {
            // 后缀形式 -n，表示最后 n 个字节
            let suffix: u64 = last.parse().ok()?;
            if suffix == 0 || length == 0 {
                continue;
            }
            result.push(RangeSpec {
                first: length.saturating_sub(suffix),
                last: length - 1,
            });
            continue;
        }
        let first: u64 = first.parse().ok()?;
        let last: Option<u64> = if last.is_empty() {
            None
        } else {
            Some(last.parse().ok()?)
        };
        if let Some(l) = last {
            if l < first {
                return None;
            }
        }
        if first >= length {
            // 语法正确但不可满足
            continue;
        }
        let last = match last {
            Some(l) => l.min(length - 1),
            None => length - 1,
        };
        result.push(RangeSpec { first, last });
    }
    Some(result)
}

/// 把全部 `Range` 头解析为可满足且互不重叠的范围列表，保持首次出现的顺序
pub fn parse_ranges(values: &[&str], length: u64) -> Vec<RangeSpec> {
    let mut ranges: Vec<RangeSpec> = Vec::new();
    for value in values {
        let parsed = match parse_one_header(value, length) {
            Some(p) => p,
            None => {
                warn!("无法解析的Range头，已忽略：{}", value);
                continue;
            }
        };
        for mut merged in parsed {
            // 合并后的范围可能又与更早的范围重叠，需要反复合并
            let mut slot: Option<usize> = None;
            while let Some(i) = ranges.iter().position(|r| r.overlaps(&merged)) {
                let existing = ranges.remove(i);
                merged = RangeSpec {
                    first: existing.first.min(merged.first),
                    last: existing.last.max(merged.last),
                };
                slot = Some(slot.map_or(i, |s| s.min(i)));
            }
            match slot {
                Some(i) => ranges.insert(i, merged),
                None => ranges.push(merged),
            }
        }
    }
    ranges
}

/// 条件请求的判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conditional {
    Proceed,
    NotModified,
    PreconditionFailed,
}

fn header_date(headers: &Headers, name: &str) -> Result<Option<DateTime<Utc>>, Exception> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => match parse_http_date(value) {
            Some(t) => Ok(Some(t)),
            None => Err(Exception::BadDate(value.to_string())),
        },
    }
}

/// 判定 `If-Modified-Since` 与 `If-Unmodified-Since`，两边都截断到秒再比较
///
/// 日期无法解析时返回 `BadDate`。资源修改时间未知时总是放行。
pub fn evaluate_conditionals(
    headers: &Headers,
    last_modified: Option<DateTime<Utc>>,
) -> Result<Conditional, Exception> {
    let if_modified_since = header_date(headers, "If-Modified-Since")?;
    let if_unmodified_since = header_date(headers, "If-Unmodified-Since")?;
    let modified = match last_modified {
        Some(t) => t.timestamp(),
        None => return Ok(Conditional::Proceed),
    };
    if let Some(ims) = if_modified_since {
        if modified <= ims.timestamp() {
            return Ok(Conditional::NotModified);
        }
    }
    if let Some(ius) = if_unmodified_since {
        if modified > ius.timestamp() {
            return Ok(Conditional::PreconditionFailed);
        }
    }
    Ok(Conditional::Proceed)
}

/// 随机生成 multipart 分隔符
pub fn generate_boundary() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// 计算 multipart/byteranges 的分段前导、结束行以及总长度
pub fn multipart_layout(
    ranges: &[RangeSpec],
    length: u64,
    mime: &str,
    boundary: &str,
) -> (Vec<PartHead>, String, u64) {
    let mut parts = Vec::with_capacity(ranges.len());
    let mut total = 0u64;
    for (i, range) in ranges.iter().enumerate() {
        let mut header = String::new();
        if i > 0 {
            header.push_str(CRLF);
        }
        header.push_str(&format!("--{}{}", boundary, CRLF));
        header.push_str(&format!("Content-Type: {}{}", mime, CRLF));
        header.push_str(&format!("Content-Range: {}{}", range.header_value(length), CRLF));
        header.push_str(CRLF);
        total += header.len() as u64 + range.size();
        parts.push(PartHead {
            header,
            first: range.first,
            length: range.size(),
        });
    }
    let closing = format!("{}--{}--{}", CRLF, boundary, CRLF);
    total += closing.len() as u64;
    (parts, closing, total)
}

/// 发送静态资源，处理条件请求与字节范围
///
/// `included` 为真时（include 子请求）跳过条件判断。
pub fn serve(
    resource: &Resource,
    request: &RequestContext,
    accept_ranges: bool,
    included: bool,
) -> Result<Response, Exception> {
    let id = request.id();
    let last_modified = resource.last_modified_utc();

    if !included && request.method() != crate::param::HttpRequestMethod::Head {
        match evaluate_conditionals(request.headers(), last_modified)? {
            Conditional::NotModified => {
                debug!("[ID{}]资源未修改，返回304", id);
                return Ok(Response::not_modified());
            }
            Conditional::PreconditionFailed => {
                debug!("[ID{}]If-Unmodified-Since不满足，返回412", id);
                return Ok(Response::from_status_code(412, None));
            }
            Conditional::Proceed => {}
        }
    }

    let mime = resource.content_type();
    let mut response = Response::new();
    response.set_header("Content-Type", mime);
    response.set_date_header("Expires", Utc::now() + Duration::seconds(STATIC_EXPIRES_SECS));
    if let Some(t) = last_modified {
        response.set_date_header("Last-Modified", t);
    }
    if accept_ranges {
        response.set_header("Accept-Ranges", "bytes");
    }

    let file = resource.open()?;
    let range_values = request.headers().get_all("Range");
    if range_values.is_empty() || resource.length() < 0 {
        let length = resource.length().max(0) as u64;
        debug!("[ID{}]发送完整内容，{}字节", id, length);
        response.set_body(
            Body::File {
                file,
                offset: 0,
                length,
            },
            Some(length),
        );
        return Ok(response);
    }

    let length = resource.length() as u64;
    let ranges = parse_ranges(&range_values, length);
    match ranges.len() {
        0 => {
            debug!("[ID{}]没有可满足的Range，返回416", id);
            response.set_code(416);
            response.set_header("Content-Range", unsatisfiable_header_value(length));
            response.set_body(
                Body::File {
                    file,
                    offset: 0,
                    length,
                },
                Some(length),
            );
        }
        1 => {
            let range = ranges[0];
            debug!("[ID{}]单个Range：{}", id, range.header_value(length));
            response.set_code(206);
            response.set_header("Content-Range", range.header_value(length));
            response.set_body(
                Body::File {
                    file,
                    offset: range.first(),
                    length: range.size(),
                },
                Some(range.size()),
            );
        }
        n => {
            let boundary = generate_boundary();
            let (parts, closing, total) = multipart_layout(&ranges, length, mime, &boundary);
            debug!("[ID{}]{}个Range，multipart总长度{}", id, n, total);
            let content_type = if request.headers().contains("Request-Range") {
                format!("multipart/x-byteranges; boundary={}", boundary)
            } else {
                format!("multipart/byteranges; boundary={}", boundary)
            };
            response.set_code(206);
            response.set_header("Content-Type", content_type);
            response.set_body(
                Body::Multipart {
                    file,
                    parts,
                    closing,
                },
                Some(total),
            );
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_simple_forms() {
        assert_eq!(parse_ranges(&["bytes=0-9"], 100), vec![RangeSpec { first: 0, last: 9 }]);
        assert_eq!(parse_ranges(&["bytes=90-"], 100), vec![RangeSpec { first: 90, last: 99 }]);
        assert_eq!(parse_ranges(&["bytes=-10"], 100), vec![RangeSpec { first: 90, last: 99 }]);
        assert_eq!(parse_ranges(&["bytes=-500"], 100), vec![RangeSpec { first: 0, last: 99 }]);
        assert_eq!(parse_ranges(&["bytes=50-500"], 100), vec![RangeSpec { first: 50, last: 99 }]);
    }

    #[test]
    fn test_unsatisfiable_and_invalid() {
        assert!(parse_ranges(&["bytes=100-"], 100).is_empty());
        assert!(parse_ranges(&["bytes=-0"], 100).is_empty());
        assert!(parse_ranges(&["bytes=9-1"], 100).is_empty());
        assert!(parse_ranges(&["items=0-1"], 100).is_empty());
        assert!(parse_ranges(&["bytes=a-b"], 100).is_empty());
        // 一条头部格式错误时整条作废，但不影响其它头部
        assert_eq!(
            parse_ranges(&["bytes=0-1,x", "bytes=5-6"], 100),
            vec![RangeSpec { first: 5, last: 6 }]
        );
        // 单个不可满足的范围只丢弃它自己
        assert_eq!(
            parse_ranges(&["bytes=200-300,0-0"], 100),
            vec![RangeSpec { first: 0, last: 0 }]
        );
    }

    #[test]
    fn test_overlapping_ranges_coalesce() {
        assert_eq!(
            parse_ranges(&["bytes=0-10,5-20,50-60"], 100),
            vec![RangeSpec { first: 0, last: 20 }, RangeSpec { first: 50, last: 60 }]
        );
        // 新范围同时覆盖两个旧范围
        assert_eq!(
            parse_ranges(&["bytes=0-5,10-15,3-12"], 100),
            vec![RangeSpec { first: 0, last: 15 }]
        );
        // 相邻但不重叠的范围保持独立
        assert_eq!(parse_ranges(&["bytes=0-4,5-9"], 100).len(), 2);
    }

    #[test]
    fn test_conditionals() {
        let lm = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut headers = Headers::new();
        headers.append("If-Modified-Since", "Mon, 01 Jan 2024 12:00:00 GMT");
        assert_eq!(evaluate_conditionals(&headers, Some(lm)).unwrap(), Conditional::NotModified);

        let mut headers = Headers::new();
        headers.append("If-Modified-Since", "Mon, 01 Jan 2024 11:59:59 GMT");
        assert_eq!(evaluate_conditionals(&headers, Some(lm)).unwrap(), Conditional::Proceed);

        let mut headers = Headers::new();
        headers.append("If-Unmodified-Since", "Mon, 01 Jan 2024 11:00:00 GMT");
        assert_eq!(
            evaluate_conditionals(&headers, Some(lm)).unwrap(),
            Conditional::PreconditionFailed
        );

        let mut headers = Headers::new();
        headers.append("If-Modified-Since", "not a date");
        assert!(matches!(
            evaluate_conditionals(&headers, Some(lm)),
            Err(Exception::BadDate(_))
        ));
    }

    #[test]
    fn test_conditionals_truncate_to_seconds() {
        let lm = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::milliseconds(900);
        let mut headers = Headers::new();
        headers.append("If-Modified-Since", "Mon, 01 Jan 2024 12:00:00 GMT");
        assert_eq!(evaluate_conditionals(&headers, Some(lm)).unwrap(), Conditional::NotModified);
    }

    #[test]
    fn test_multipart_layout_length() {
        let ranges = vec![RangeSpec { first: 0, last: 1 }, RangeSpec { first: 5, last: 9 }];
        let (parts, closing, total) = multipart_layout(&ranges, 10, "text/plain", "BOUNDARY");
        assert_eq!(
            parts[0].header,
            "--BOUNDARY\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-1/10\r\n\r\n"
        );
        assert!(parts[1].header.starts_with("\r\n--BOUNDARY\r\n"));
        assert_eq!(closing, "\r\n--BOUNDARY--\r\n");
        let expected: u64 = parts.iter().map(|p| p.header.len() as u64 + p.length).sum::<u64>()
            + closing.len() as u64;
        assert_eq!(total, expected);
    }

    #[test]
    fn test_boundary() {
        let b = generate_boundary();
        assert_eq!(b.len(), 24);
        assert!(b.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
