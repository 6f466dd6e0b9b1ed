use std::sync::Arc;

use archlayout::{Direction, LayoutCache, LayoutConfig, LayoutEngine, StrategyKind, SystemData};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOptions {
    strategy: Option<String>,
    direction: Option<String>,
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    canvas_margin: Option<f32>,
}

fn parse_options(options_json: Option<String>) -> Result<LayoutOptions, String> {
    match options_json {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str::<LayoutOptions>(&raw).map_err(|error| error.to_string())
        }
        _ => Ok(LayoutOptions::default()),
    }
}

fn build_layout_config(options: LayoutOptions) -> Result<LayoutConfig, String> {
    let mut config = LayoutConfig::default();
    if let Some(token) = options.strategy.as_deref() {
        config.strategy = StrategyKind::from_token(token)
            .ok_or_else(|| format!("unknown layout strategy '{token}'"))?;
    }
    if let Some(token) = options.direction.as_deref() {
        config.direction = Direction::from_token(token)
            .ok_or_else(|| format!("unknown layout direction '{token}'"))?;
    }
    if let Some(value) = options.node_spacing {
        config.node_spacing = value;
    }
    if let Some(value) = options.rank_spacing {
        config.rank_spacing = value;
    }
    if let Some(value) = options.canvas_margin {
        config.canvas_margin = value;
    }
    config.validate().map_err(|error| error.to_string())?;
    Ok(config)
}

fn layout_to_json(engine: &LayoutEngine, data_json: &str) -> Result<String, String> {
    let data = SystemData::from_json(data_json).map_err(|error| error.to_string())?;
    let layout = engine.layout_sync(&data).map_err(|error| error.to_string())?;
    serde_json::to_string(&layout).map_err(|error| error.to_string())
}

/// One-shot layout without caching.
#[wasm_bindgen]
pub fn compute_layout_json(
    data_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let config = parse_options(options_json)
        .and_then(build_layout_config)
        .map_err(|error| JsValue::from_str(&error))?;
    layout_to_json(&LayoutEngine::new(config), data_json).map_err(|error| JsValue::from_str(&error))
}

/// Engine with its own cache, kept alive by the page between refreshes.
#[wasm_bindgen]
pub struct LayoutSession {
    engine: LayoutEngine,
    cache: Arc<LayoutCache>,
}

#[wasm_bindgen]
impl LayoutSession {
    #[wasm_bindgen(constructor)]
    pub fn new(options_json: Option<String>) -> Result<LayoutSession, JsValue> {
        let config = parse_options(options_json)
            .and_then(build_layout_config)
            .map_err(|error| JsValue::from_str(&error))?;
        let cache = Arc::new(LayoutCache::new());
        let engine = LayoutEngine::new(config).with_cache(Arc::clone(&cache));
        Ok(LayoutSession { engine, cache })
    }

    pub fn layout(&self, data_json: &str) -> Result<String, JsValue> {
        layout_to_json(&self.engine, data_json).map_err(|error| JsValue::from_str(&error))
    }

    #[wasm_bindgen(js_name = clearCache)]
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[wasm_bindgen(js_name = cachedLayouts)]
    pub fn cached_layouts(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use archlayout::{Direction, LayoutEngine, StrategyKind};

    use crate::{build_layout_config, layout_to_json, parse_options};

    #[test]
    fn options_map_onto_layout_config() {
        let options = parse_options(Some(
            r#"{ "strategy": "concentric", "direction": "TD", "nodeSpacing": 40 }"#.to_string(),
        ))
        .expect("options");
        let config = build_layout_config(options).expect("config");
        assert_eq!(config.strategy, StrategyKind::Concentric);
        assert_eq!(config.direction, Direction::TopDown);
        assert_eq!(config.node_spacing, 40.0);
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let options =
            parse_options(Some(r#"{ "strategy": "force" }"#.to_string())).expect("options");
        assert!(build_layout_config(options).is_err());
    }

    #[test]
    fn lays_out_nested_components() {
        let data = r#"{ "components": [
            { "id": "api", "name": "API", "connections": [{ "target": "db", "name": "sql" }],
              "components": [ { "id": "worker", "name": "Worker" } ] },
            { "id": "db", "name": "Postgres" }
        ] }"#;
        let config = build_layout_config(parse_options(None).expect("defaults")).expect("config");
        let json = layout_to_json(&LayoutEngine::new(config), data).expect("layout");
        assert!(json.contains("\"worker\""));
        assert!(json.contains("\"parentId\":\"api\""));
        assert!(json.contains("\"labelAnchor\""));
    }
}
