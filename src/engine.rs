use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::{EdgeIdCounter, build_graph};
use crate::cache::{LayoutCache, StructuralKey, structural_key};
use crate::config::LayoutConfig;
use crate::ir::SystemData;
use crate::layout::{Layout, LayoutStrategy, Result};
use crate::layout::{compute_layout_with, estimate_sizes, strategy_for};

/// Builder, size estimation, layout strategy and label placement behind an
/// optional structural cache.
///
/// Engines share nothing but the cache, so one cache can back several
/// engines running on different threads.
pub struct LayoutEngine {
    config: LayoutConfig,
    /// Serialized `config`, mixed into every cache key.
    fingerprint: Option<String>,
    strategy: Box<dyn LayoutStrategy>,
    cache: Option<Arc<LayoutCache>>,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let strategy = strategy_for(config.strategy);
        let fingerprint = match serde_json::to_string(&config) {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!(error = %err, "layout config not serializable; caching disabled");
                None
            }
        };
        Self {
            config,
            fingerprint,
            strategy,
            cache: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn LayoutStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cache(mut self, cache: Arc<LayoutCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<LayoutCache>> {
        self.cache.as_ref()
    }

    /// Cache slot for `data` under this engine's strategy and settings.
    fn cache_key(&self, data: &SystemData) -> Option<StructuralKey> {
        let fingerprint = self.fingerprint.as_deref()?;
        let key = structural_key(data)
            .salted(self.strategy.kind().as_str())
            .salted(fingerprint);
        Some(key)
    }

    pub fn layout_sync(&self, data: &SystemData) -> Result<Layout> {
        let cached = self.cache.as_ref().zip(self.cache_key(data));
        if let Some((cache, key)) = cached {
            if let Some(layout) = cache.get(&key) {
                debug!(%key, "layout cache hit");
                return Ok(layout);
            }
        }

        let mut graph = build_graph(data, &mut EdgeIdCounter::new());
        estimate_sizes(&mut graph, &self.config.sizing);
        let layout = compute_layout_with(self.strategy.as_ref(), &graph, &self.config)?;

        if let Some((cache, key)) = cached {
            cache.put(key, &layout);
            debug!(%key, entries = cache.len(), "layout cached");
        }
        Ok(layout)
    }

    /// Runs the whole pipeline for `data` to completion.
    ///
    /// This is a thin wrapper over [`LayoutEngine::layout_sync`]: the work
    /// happens on the polling task and there is no await point inside. Use
    /// the runtime's blocking pool around `layout_sync` to keep large
    /// layouts off an executor thread.
    pub async fn layout(&self, data: &SystemData) -> Result<Layout> {
        self.layout_sync(data)
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("strategy", &self.strategy.kind())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::ir::Direction;
    use crate::layout::ConcentricLayout;

    fn data(input: &str) -> SystemData {
        SystemData::from_json(input).expect("fixture")
    }

    const TWO: &str = r#"{ "components": [ { "id": "a", "connections": ["b"] }, { "id": "b" } ] }"#;

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LayoutEngine>();
    }

    #[test]
    fn cache_hit_returns_stored_layout() {
        let cache = Arc::new(LayoutCache::new());
        let engine = LayoutEngine::default().with_cache(Arc::clone(&cache));
        let first = engine.layout_sync(&data(TWO)).expect("layout");
        assert_eq!(cache.len(), 1);
        let second = engine.layout_sync(&data(TWO)).expect("layout");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn strategies_do_not_share_entries() {
        let cache = Arc::new(LayoutCache::new());
        let layered = LayoutEngine::default().with_cache(Arc::clone(&cache));
        let rings = LayoutEngine::default()
            .with_strategy(Box::new(ConcentricLayout))
            .with_cache(Arc::clone(&cache));
        let a = layered.layout_sync(&data(TWO)).expect("layered");
        let b = rings.layout_sync(&data(TWO)).expect("rings");
        assert_eq!(a.strategy, StrategyKind::Hierarchical);
        assert_eq!(b.strategy, StrategyKind::Concentric);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn configs_do_not_share_entries() {
        let cache = Arc::new(LayoutCache::new());
        let across = LayoutEngine::default().with_cache(Arc::clone(&cache));
        let down = LayoutEngine::new(LayoutConfig {
            direction: Direction::TopDown,
            ..Default::default()
        })
        .with_cache(Arc::clone(&cache));
        let wide = across.layout_sync(&data(TWO)).expect("left-right");
        let tall = down.layout_sync(&data(TWO)).expect("top-down");

        let a = wide.node("a").expect("a");
        let b = wide.node("b").expect("b");
        assert!(a.right() <= b.left());
        let a = tall.node("a").expect("a");
        let b = tall.node("b").expect("b");
        assert!(a.bottom() <= b.top());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn async_entry_matches_sync() {
        let engine = LayoutEngine::default();
        let input = data(TWO);
        let sync = engine.layout_sync(&input).expect("sync");
        let asynchronous = futures::executor::block_on(engine.layout(&input)).expect("async");
        assert_eq!(sync, asynchronous);
    }
}
