// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 处理器解析缓存。
//!
//! 记住单元名到 `respond` 入口的解析结果。条目随时可能消失：
//! 内存吃紧时整个缓存被清空，而不是逐条淘汰。
//! 同一名字被并发解析时可能重复工作，但不会破坏缓存。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};

use crate::{
    exception::Exception,
    handler::{HandlerRegistry, RespondFn},
    memory::MemoryControl,
};

#[derive(Default)]
pub struct HandlerCache {
    cache: RwLock<HashMap<String, RespondFn>>,
    resolutions: AtomicU64,
}

impl HandlerCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RespondFn>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("处理器缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RespondFn>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("处理器缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 查找处理器，未命中时从注册表解析
    ///
    /// 解析失败不会被缓存，下次请求会重新尝试并再次失败。
    /// 解析成功后，若内存吃紧则清空整个缓存，否则存入。
    pub fn resolve(
        &self,
        name: &str,
        registry: &HandlerRegistry,
        memory: &MemoryControl,
    ) -> Result<RespondFn, Exception> {
        if let Some(f) = self.read().get(name) {
            return Ok(f.clone());
        }
        let f = registry.lookup(name)?;
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if memory.short_status() {
            debug!("内存吃紧，清空处理器缓存（解析{}时）", name);
            self.clear();
        } else {
            self.write().insert(name.to_string(), f.clone());
        }
        Ok(f)
    }

    /// 清空全部条目
    pub fn clear(&self) {
        self.write().clear();
    }

    /// 累计从注册表解析的次数
    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
