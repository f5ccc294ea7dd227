// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 字节范围的性质测试

use std::fs;

use htserve::{
    range::{self, multipart_layout, parse_ranges},
    request::Headers,
    resource::ResourceAccessor,
    Config, HttpRequestMethod, RequestContext,
};
use proptest::prelude::*;
use tempfile::TempDir;

proptest! {
    /// 解析出的范围都落在文件内，且两两不重叠
    #[test]
    fn test_parsed_ranges_are_valid(
        length in 1u64..10_000,
        bounds in prop::collection::vec((0u64..12_000, 0u64..12_000), 1..6),
    ) {
        let header = format!(
            "bytes={}",
            bounds
                .iter()
                .map(|(a, b)| format!("{}-{}", a, b))
                .collect::<Vec<_>>()
                .join(",")
        );
        let ranges = parse_ranges(&[header.as_str()], length);
        for r in &ranges {
            prop_assert!(r.first() <= r.last());
            prop_assert!(r.last() < length);
        }
        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                prop_assert!(a.last() < b.first() || b.last() < a.first());
            }
        }
    }

    /// 单个范围：Content-Length 等于 last - first + 1，Content-Range 与之一致
    #[test]
    fn test_single_range_length_and_header(
        length in 1u64..5_000,
        a in 0u64..5_000,
        b in 0u64..5_000,
    ) {
        let (first, last) = (a.min(b), a.max(b));
        prop_assume!(first < length);
        let ranges = parse_ranges(&[format!("bytes={}-{}", first, last).as_str()], length);
        prop_assert_eq!(ranges.len(), 1);
        let r = ranges[0];
        let expected_last = last.min(length - 1);
        prop_assert_eq!(r.size(), expected_last - first + 1);
        prop_assert_eq!(
            r.header_value(length),
            format!("bytes {}-{}/{}", first, expected_last, length)
        );
    }

    /// 多段响应预先计算的长度等于实际布局的总字节数
    #[test]
    fn test_multipart_layout_length(
        length in 100u64..10_000,
        cuts in prop::collection::vec(0u64..100, 2..5),
    ) {
        let items: Vec<String> = cuts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let first = i as u64 * (length / 5) + c % (length / 10).max(1);
                format!("{}-{}", first, first + 3)
            })
            .collect();
        let header = format!("bytes={}", items.join(","));
        let ranges = parse_ranges(&[header.as_str()], length);
        let (parts, closing, total) = multipart_layout(&ranges, length, "text/plain", "BOUNDARY");
        let written: u64 = parts.iter().map(|p| p.header.len() as u64 + p.length).sum::<u64>()
            + closing.len() as u64;
        prop_assert_eq!(total, written);
    }
}

#[test]
fn test_malformed_header_ignored() {
    assert!(parse_ranges(&["bytes=0-1,x-y"], 100).is_empty());
    assert!(parse_ranges(&["lines=0-1"], 100).is_empty());
}

#[test]
fn test_suffix_and_open_ranges() {
    let ranges = parse_ranges(&["bytes=-10"], 100);
    assert_eq!((ranges[0].first(), ranges[0].last()), (90, 99));
    let ranges = parse_ranges(&["bytes=95-"], 100);
    assert_eq!((ranges[0].first(), ranges[0].last()), (95, 99));
}

#[test]
fn test_overlapping_ranges_coalesced() {
    let ranges = parse_ranges(&["bytes=0-10,5-20", "bytes=50-60"], 100);
    assert_eq!(ranges.len(), 2);
    assert_eq!((ranges[0].first(), ranges[0].last()), (0, 20));
    assert_eq!((ranges[1].first(), ranges[1].last()), (50, 60));
}

#[test]
fn test_multipart_bytes_written_match_content_length() {
    let root = TempDir::new().unwrap();
    let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    fs::write(root.path().join("data.bin"), &content).unwrap();
    let config = Config::from_toml_str(&format!("www_root = '{}'", root.path().display())).unwrap();
    let resource = ResourceAccessor::from_config(&config).resolve("/data.bin").unwrap();
    let request = RequestContext::new(HttpRequestMethod::Get, "/data.bin", 0)
        .unwrap()
        .with_header("Range", "bytes=0-99,1000-1099,-50");
    let response = range::serve(&resource, &request, true, false).unwrap();
    assert_eq!(response.status_code(), 206);
    let declared = response.content_length().unwrap();
    let mut sink = Vec::new();
    let head_len = response.header_bytes().len() as u64;
    let written = response.write_to(&mut sink, 128).unwrap();
    assert_eq!(written, declared);
    assert_eq!(sink.len() as u64, head_len + declared);
}

#[test]
fn test_conditionals_truncate_to_seconds() {
    use chrono::{TimeZone, Utc};
    use htserve::range::{evaluate_conditionals, Conditional};

    let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        + chrono::Duration::milliseconds(700);
    let mut headers = Headers::new();
    headers.append("If-Modified-Since", "Fri, 01 Mar 2024 12:00:00 GMT");
    assert_eq!(
        evaluate_conditionals(&headers, Some(modified)).unwrap(),
        Conditional::NotModified
    );

    let mut headers = Headers::new();
    headers.append("If-Unmodified-Since", "Fri, 01 Mar 2024 11:59:59 GMT");
    assert_eq!(
        evaluate_conditionals(&headers, Some(modified)).unwrap(),
        Conditional::PreconditionFailed
    );
}
