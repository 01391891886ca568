//! 正则表达式缓存
//!
//! 使用 DashMap 在多个评估调用之间共享已编译的正则，避免每次 `match` 都重新编译。
//! 缓存只影响性能，不影响结果：达到容量上限后新模式照常编译，但不再入缓存。

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, RuleError};

/// 默认缓存容量
pub const DEFAULT_CAPACITY: usize = 256;

/// 正则缓存
#[derive(Clone)]
pub struct PatternCache {
    patterns: Arc<DashMap<String, Regex>>,
    capacity: usize,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            patterns: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// 获取已编译的正则，不存在时编译并缓存
    #[instrument(level = "trace", skip(self))]
    pub fn get_or_compile(&self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self.patterns.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        if self.patterns.len() < self.capacity {
            self.patterns.insert(pattern.to_string(), regex.clone());
        } else {
            debug!(capacity = self.capacity, "pattern cache full, not caching");
        }

        Ok(regex)
    }

    /// 获取当前缓存的正则数量
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// 检查缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 检查模式是否已缓存
    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.contains_key(pattern)
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.patterns.clear();
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}
