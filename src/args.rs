// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求参数表。
//!
//! 查询串、urlencoded 表单与 multipart 表单的字段最终都汇入 [`Arguments`]。
//! 同名键通过 `add` 追加，保持到达顺序；`put` 则覆盖同名的全部取值。

use crate::util::percent_decode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: Vec<(String, String)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 解析 `a=1&b=2` 形式的查询串或 urlencoded 表单
    pub fn from_query(query: &str) -> Self {
        let mut args = Arguments::new();
        args.merge_query(query);
        args
    }

    /// 把查询串中的字段追加进来
    pub fn merge_query(&mut self, query: &str) {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            let key = String::from_utf8_lossy(&percent_decode(key, true)).into_owned();
            if key.is_empty() {
                continue;
            }
            let value = String::from_utf8_lossy(&percent_decode(value, true)).into_owned();
            self.add(key, value);
        }
    }

    /// 追加一个取值，不影响已有的同名取值
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// 设置取值，同名的已有取值全部被替换
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// 删除键的全部取值，返回第一个
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let mut first = None;
        let mut kept = Vec::with_capacity(self.entries.len());
        for (k, v) in self.entries.drain(..) {
            if k == key {
                if first.is_none() {
                    first = Some(v);
                }
            } else {
                kept.push((k, v));
            }
        }
        self.entries = kept;
        first
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn extend(&mut self, other: Arguments) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_order() {
        let mut args = Arguments::new();
        args.add("tag", "a");
        args.add("other", "x");
        args.add("tag", "b");
        assert_eq!(args.get("tag"), Some("a"));
        assert_eq!(args.get_all("tag"), vec!["a", "b"]);
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_put_replaces_all() {
        let mut args = Arguments::new();
        args.add("k", "1");
        args.add("k", "2");
        args.put("k", "3");
        assert_eq!(args.get_all("k"), vec!["3"]);
    }

    #[test]
    fn test_remove() {
        let mut args = Arguments::new();
        args.add("k", "1");
        args.add("j", "x");
        args.add("k", "2");
        assert_eq!(args.remove("k"), Some("1".to_string()));
        assert!(!args.contains("k"));
        assert_eq!(args.get("j"), Some("x"));
        assert_eq!(args.remove("missing"), None);
    }

    #[test]
    fn test_from_query() {
        let args = Arguments::from_query("q=hello+world&x=%41%42&flag&&=skip&q=2");
        assert_eq!(args.get_all("q"), vec!["hello world", "2"]);
        assert_eq!(args.get("x"), Some("AB"));
        assert_eq!(args.get("flag"), Some(""));
        assert_eq!(args.len(), 4);
    }
}
