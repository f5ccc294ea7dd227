// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::{param::STATUS_CODES, resource::ListingEntry};

/// HTTP 日期格式（IMF-fixdate）
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// 服务端生成的 HTML 页面（状态页、目录浏览页）
pub struct HtmlBuilder {
    title: String,
    css: &'static str,
    body: String,
}

const STATUS_CSS: &str = "body { max-width: 40em; margin: 2em auto; font-family: sans-serif; }";
const LISTING_CSS: &str = "table { border-collapse: collapse; width: 100%; } \
    th, td { padding: 6px 10px; text-align: left; } \
    td.size { text-align: right; white-space: nowrap; }";

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let reason = STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status");
        let description = note.unwrap_or(reason);
        Self {
            title: format!("{} {}", code, reason),
            css: STATUS_CSS,
            body: format!(
                "<h1>{} {}</h1>\n<p>{}</p>\n<hr><address>{}</address>",
                code,
                reason,
                escape_html(description),
                crate::param::SERVER_NAME
            ),
        }
    }

    /// 生成目录浏览页面，`entries` 需要已经排好序
    pub fn from_listing(path: &str, entries: &[ListingEntry]) -> Self {
        let shown = escape_html(path.strip_suffix('/').unwrap_or(path));
        let mut rows = String::from("<tr><td><a href=\"../\">../</a></td><td></td><td></td></tr>\n");
        for entry in entries {
            let modified = entry
                .modified
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let name = escape_html(&entry.name);
            let (href, size) = match entry.is_dir {
                true => (format!("{}/", name), "-".to_string()),
                false => (name.clone(), format_file_size(entry.size)),
            };
            rows.push_str(&format!(
                "<tr><td><a href=\"{0}\">{0}</a></td><td class=\"size\">{1}</td><td>{2}</td></tr>\n",
                href, size, modified
            ));
        }
        Self {
            title: format!("{}/ 的目录", shown),
            css: LISTING_CSS,
            body: format!(
                "<h1>{}/ 的目录</h1>\n<table>\n<thead><tr><th>名称</th><th>大小</th><th>修改时间</th></tr></thead>\n<tbody>\n{}</tbody>\n</table>",
                shown, rows
            ),
        }
    }

    pub fn build(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            self.title, self.css, self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 百分号解码。非法的转义序列原样保留；`plus_as_space` 用于表单数据。
pub fn percent_decode(input: &str, plus_as_space: bool) -> Vec<u8> {
    if plus_as_space && input.contains('+') {
        let spaced = input.replace('+', " ");
        return urlencoding::decode_binary(spaced.as_bytes()).into_owned();
    }
    urlencoding::decode_binary(input.as_bytes()).into_owned()
}

/// 格式化为 HTTP 日期，例如 `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// 解析 HTTP 日期，依次尝试 RFC 1123、RFC 850 与 asctime 三种格式
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    // 部分客户端会在日期后追加 `; length=...`
    let value = value.split(';').next().unwrap_or(value).trim();
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.with_timezone(&Utc));
    }
    for format in [
        HTTP_DATE_FORMAT,
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
