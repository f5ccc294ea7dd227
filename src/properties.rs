// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 处理器输出的属性表，模板中的 `${name}` 从这里取值。

use std::collections::HashMap;
use std::fmt;

/// 保留键：存在时向客户端发起认证质询（401）
pub const AUTHENTICATE: &str = "AUTHENTICATE";
/// 保留键：存在时重定向（302），空值表示重定向到请求路径本身
pub const LOCATION: &str = "LOCATION";

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Text(String),
    Number(i64),
    Bytes(Vec<u8>),
}

impl PropValue {
    /// 写入模板时使用的字节表示
    pub fn as_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self {
            PropValue::Text(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
            PropValue::Number(n) => std::borrow::Cow::Owned(n.to_string().into_bytes()),
            PropValue::Bytes(b) => std::borrow::Cow::Borrowed(b),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(s) => write!(f, "{}", s),
            PropValue::Number(n) => write!(f, "{}", n),
            PropValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Text(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Text(s)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Number(n)
    }
}

impl From<Vec<u8>> for PropValue {
    fn from(b: Vec<u8>) -> Self {
        PropValue::Bytes(b)
    }
}

/// 保持插入顺序的属性表，重复 `put` 会原地覆盖
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(String, PropValue)>,
    index: HashMap<String, usize>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// 仅在键不存在时写入，处理器自己给出的值优先
    pub fn put_default(&mut self, key: &str, value: impl Into<PropValue>) {
        if !self.index.contains_key(key) {
            self.put(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
