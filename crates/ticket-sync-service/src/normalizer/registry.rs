//! Normalizer 注册表
//!
//! 按平台索引各归一化策略。新增平台只需实现 [`PlatformNormalizer`] 并注册，
//! Dispatcher 与轮询任务无需改动。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{EventbriteNormalizer, HumanitixNormalizer, PlatformNormalizer};
use crate::models::Platform;

pub struct NormalizerRegistry {
    normalizers: HashMap<Platform, Arc<dyn PlatformNormalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    /// 注册全部内置平台
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(HumanitixNormalizer::new()))
            .register(Arc::new(EventbriteNormalizer::new()));
        registry
    }

    /// 同一平台重复注册时后者覆盖前者
    pub fn register(&mut self, normalizer: Arc<dyn PlatformNormalizer>) -> &mut Self {
        let platform = normalizer.platform();
        debug!(platform = %platform, "注册平台归一化策略");
        self.normalizers.insert(platform, normalizer);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformNormalizer>> {
        self.normalizers.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.normalizers.keys().copied().collect()
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_platforms() {
        let registry = NormalizerRegistry::with_defaults();
        for platform in Platform::ALL {
            let normalizer = registry.get(platform).unwrap();
            assert_eq!(normalizer.platform(), platform);
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = NormalizerRegistry::new();
        assert!(registry.get(Platform::Humanitix).is_none());
        assert!(registry.platforms().is_empty());
    }
}
