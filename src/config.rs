use crate::ir::Direction;
use crate::layout::LayoutError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    /// Layered layout with nested containers.
    #[default]
    Hierarchical,
    /// Rings by connectivity degree, edges routed around boxes.
    Concentric,
}

impl StrategyKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "hierarchical" | "layered" | "elk" => Some(Self::Hierarchical),
            "concentric" | "connectivity" => Some(Self::Concentric),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Hierarchical => "hierarchical",
            StrategyKind::Concentric => "concentric",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Default for Padding {
    fn default() -> Self {
        // Top padding reserves the container title band.
        Self {
            top: 60.0,
            right: 20.0,
            bottom: 20.0,
            left: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SizingConfig {
    pub main_width: f32,
    pub sub_width: f32,
    pub header_height: f32,
    pub content_padding: f32,
    pub max_displayed_attributes: usize,
    pub attributes_per_row: usize,
    pub row_height: f32,
    pub row_gap: f32,
    pub more_indicator_height: f32,
    pub min_height: f32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            main_width: 320.0,
            sub_width: 320.0,
            header_height: 32.0,
            content_padding: 12.0,
            max_displayed_attributes: 5,
            attributes_per_row: 2,
            row_height: 24.0,
            row_gap: 6.0,
            more_indicator_height: 24.0,
            min_height: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Inflation applied to obstacle boxes by the connection router.
    pub obstacle_padding: f32,
    pub max_waypoints: usize,
    /// Fraction of a node side used to spread edge ports.
    pub port_spread_ratio: f32,
    pub self_loop_pad: f32,
    /// Cell size of the grid used to detour hierarchical routes.
    pub grid_cell: f32,
    pub max_grid_cells: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            obstacle_padding: 20.0,
            max_waypoints: 4,
            port_spread_ratio: 0.6,
            self_loop_pad: 20.0,
            grid_cell: 10.0,
            max_grid_cells: 250_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelConfig {
    pub max_attempts: usize,
    pub step: f32,
    pub padding: f32,
    pub char_width: f32,
    pub line_height: f32,
    pub padding_x: f32,
    pub padding_y: f32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            step: 10.0,
            padding: 10.0,
            char_width: 7.0,
            line_height: 16.0,
            padding_x: 8.0,
            padding_y: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConcentricConfig {
    /// Gap added to the largest node diagonal to get the ring spacing.
    pub spacing: f32,
    /// Ring `k` holds up to `ring_capacity * k` nodes.
    pub ring_capacity: usize,
}

impl Default for ConcentricConfig {
    fn default() -> Self {
        Self {
            spacing: 60.0,
            ring_capacity: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub strategy: StrategyKind,
    pub direction: Direction,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub container_padding: Padding,
    pub canvas_margin: f32,
    pub order_passes: usize,
    pub sizing: SizingConfig,
    pub routing: RoutingConfig,
    pub labels: LabelConfig,
    pub concentric: ConcentricConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            direction: Direction::LeftRight,
            node_spacing: 80.0,
            rank_spacing: 80.0,
            container_padding: Padding::default(),
            canvas_margin: 20.0,
            order_passes: 4,
            sizing: SizingConfig::default(),
            routing: RoutingConfig::default(),
            labels: LabelConfig::default(),
            concentric: ConcentricConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Rejects spacing or sizing values that cannot produce a valid drawing.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let non_negative = [
            ("nodeSpacing", self.node_spacing),
            ("rankSpacing", self.rank_spacing),
            ("canvasMargin", self.canvas_margin),
            ("containerPadding.top", self.container_padding.top),
            ("containerPadding.right", self.container_padding.right),
            ("containerPadding.bottom", self.container_padding.bottom),
            ("containerPadding.left", self.container_padding.left),
            ("routing.obstaclePadding", self.routing.obstacle_padding),
            ("routing.portSpreadRatio", self.routing.port_spread_ratio),
            ("routing.selfLoopPad", self.routing.self_loop_pad),
            ("labels.step", self.labels.step),
            ("labels.padding", self.labels.padding),
            ("concentric.spacing", self.concentric.spacing),
            ("sizing.rowHeight", self.sizing.row_height),
            ("sizing.rowGap", self.sizing.row_gap),
            ("sizing.headerHeight", self.sizing.header_height),
            ("sizing.contentPadding", self.sizing.content_padding),
            ("sizing.moreIndicatorHeight", self.sizing.more_indicator_height),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::InvalidConfig {
                    message: format!("{name} must be a finite non-negative number, got {value}"),
                });
            }
        }
        let positive = [
            ("sizing.mainWidth", self.sizing.main_width),
            ("sizing.subWidth", self.sizing.sub_width),
            ("sizing.minHeight", self.sizing.min_height),
            ("routing.gridCell", self.routing.grid_cell),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidConfig {
                    message: format!("{name} must be a finite positive number, got {value}"),
                });
            }
        }
        if self.routing.port_spread_ratio > 1.0 {
            return Err(LayoutError::InvalidConfig {
                message: "routing.portSpreadRatio must not exceed 1.0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Optional JSON file the CLI loads the cache from and saves it to.
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    strategy: Option<String>,
    direction: Option<String>,
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    container_padding: Option<Padding>,
    canvas_margin: Option<f32>,
    order_passes: Option<usize>,
    sizing: Option<SizingConfig>,
    routing: Option<RoutingConfig>,
    labels: Option<LabelConfig>,
    concentric: Option<ConcentricConfig>,
    cache: Option<CacheConfig>,
}

fn parse_config_file(contents: &str) -> anyhow::Result<ConfigFile> {
    match serde_json::from_str(contents) {
        Ok(parsed) => Ok(parsed),
        Err(json_err) => json5::from_str(contents)
            .map_err(|json5_err| anyhow::anyhow!("{json_err} (json5: {json5_err})")),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let parsed = parse_config_file(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;

    if let Some(token) = parsed.strategy.as_deref() {
        config.layout.strategy = StrategyKind::from_token(token)
            .ok_or_else(|| anyhow::anyhow!("unknown layout strategy '{token}'"))?;
    }
    if let Some(token) = parsed.direction.as_deref() {
        config.layout.direction = Direction::from_token(token)
            .ok_or_else(|| anyhow::anyhow!("unknown layout direction '{token}'"))?;
    }
    if let Some(v) = parsed.node_spacing {
        config.layout.node_spacing = v;
    }
    if let Some(v) = parsed.rank_spacing {
        config.layout.rank_spacing = v;
    }
    if let Some(v) = parsed.container_padding {
        config.layout.container_padding = v;
    }
    if let Some(v) = parsed.canvas_margin {
        config.layout.canvas_margin = v;
    }
    if let Some(v) = parsed.order_passes {
        config.layout.order_passes = v;
    }
    if let Some(v) = parsed.sizing {
        config.layout.sizing = v;
    }
    if let Some(v) = parsed.routing {
        config.layout.routing = v;
    }
    if let Some(v) = parsed.labels {
        config.layout.labels = v;
    }
    if let Some(v) = parsed.concentric {
        config.layout.concentric = v;
    }
    if let Some(v) = parsed.cache {
        config.cache = v;
    }

    config.layout.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(LayoutConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_spacing_is_rejected() {
        let config = LayoutConfig {
            node_spacing: -1.0,
            ..Default::default()
        };
        let err = config.validate().expect_err("negative spacing");
        assert!(err.to_string().contains("nodeSpacing"));
    }

    #[test]
    fn nan_width_is_rejected() {
        let mut config = LayoutConfig::default();
        config.sizing.main_width = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_grid_cell_is_rejected() {
        let mut config = LayoutConfig::default();
        config.routing.grid_cell = 0.0;
        let err = config.validate().expect_err("zero grid cell");
        assert!(err.to_string().contains("routing.gridCell"));
    }

    #[test]
    fn missing_path_gives_defaults() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config.layout.node_spacing, 80.0);
        assert!(config.cache.enabled);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let parsed = parse_config_file(
            r#"{ direction: "TD", nodeSpacing: 40, sizing: { minHeight: 100 }, // json5
            }"#,
        )
        .expect("json5 config");
        assert_eq!(parsed.direction.as_deref(), Some("TD"));
        assert_eq!(parsed.node_spacing, Some(40.0));
        let sizing = parsed.sizing.expect("sizing");
        assert_eq!(sizing.min_height, 100.0);
        assert_eq!(sizing.main_width, 320.0);
    }

    #[test]
    fn strategy_tokens() {
        assert_eq!(
            StrategyKind::from_token("Concentric"),
            Some(StrategyKind::Concentric)
        );
        assert_eq!(
            StrategyKind::from_token("layered"),
            Some(StrategyKind::Hierarchical)
        );
        assert_eq!(StrategyKind::from_token("force"), None);
    }
}
