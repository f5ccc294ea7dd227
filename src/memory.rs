// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 内存控制
//!
//! [`MemoryProbe`] 报告当前还能使用多少字节，[`MemoryControl`] 在此之上给出两个判断：
//! - `request(n)`：是否还能再分配 `n` 字节（上传解析前使用）；
//! - `short_status()`：内存是否吃紧（吃紧时清空处理器缓存）。

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};

/// 可用内存探针
#[cfg_attr(test, mockall::automock)]
pub trait MemoryProbe: Send + Sync {
    /// 当前可用的字节数
    fn available(&self) -> u64;
}

/// 以进程常驻内存对比配置的预算
#[derive(Debug, Clone)]
pub struct ProcessMemory {
    limit: u64,
}

impl ProcessMemory {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl MemoryProbe for ProcessMemory {
    fn available(&self) -> u64 {
        match memory_stats::memory_stats() {
            Some(usage) => self.limit.saturating_sub(usage.physical_mem as u64),
            None => {
                debug!("当前平台无法获取进程内存，按预算全部可用处理");
                self.limit
            }
        }
    }
}

pub struct MemoryControl {
    probe: Box<dyn MemoryProbe>,
    min_free: u64,
    force_short: AtomicBool,
}

impl MemoryControl {
    pub fn new(probe: Box<dyn MemoryProbe>, min_free: u64) -> Self {
        Self {
            probe,
            min_free,
            force_short: AtomicBool::new(false),
        }
    }

    pub fn available(&self) -> u64 {
        self.probe.available()
    }

    /// 是否还能分配 `bytes` 字节
    pub fn request(&self, bytes: u64) -> bool {
        let available = self.probe.available();
        if available < bytes {
            warn!("内存不足：请求{}字节，可用{}字节", bytes, available);
            return false;
        }
        true
    }

    /// 可用内存低于阈值，或被手动标记为吃紧
    pub fn short_status(&self) -> bool {
        self.force_short.load(Ordering::Relaxed) || self.probe.available() < self.min_free
    }

    /// 手动标记内存吃紧，主要用于管理命令与测试
    pub fn set_force_short(&self, short: bool) {
        self.force_short.store(short, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for MemoryControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryControl")
            .field("min_free", &self.min_free)
            .field("force_short", &self.force_short.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_against_probe() {
        let mut probe = MockMemoryProbe::new();
        probe.expect_available().return_const(1000u64);
        let control = MemoryControl::new(Box::new(probe), 100);
        assert!(control.request(1000));
        assert!(!control.request(1001));
        assert!(!control.short_status());
    }

    #[test]
    fn test_short_status() {
        let mut probe = MockMemoryProbe::new();
        probe.expect_available().return_const(50u64);
        let control = MemoryControl::new(Box::new(probe), 100);
        assert!(control.short_status());
    }

    #[test]
    fn test_force_short() {
        let mut probe = MockMemoryProbe::new();
        probe.expect_available().return_const(u64::MAX);
        let control = MemoryControl::new(Box::new(probe), 0);
        assert!(!control.short_status());
        control.set_force_short(true);
        assert!(control.short_status());
        control.set_force_short(false);
        assert!(!control.short_status());
    }

    #[test]
    fn test_process_memory_never_exceeds_limit() {
        let probe = ProcessMemory::new(1 << 20);
        assert!(probe.available() <= 1 << 20);
    }
}
