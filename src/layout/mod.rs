mod concentric;
mod error;
pub mod geometry;
mod hierarchy;
pub mod label_placement;
mod ranking;
pub mod routing;
pub mod sizing;
pub(crate) mod types;

pub use concentric::ConcentricLayout;
pub use error::{LayoutError, Result};
pub use geometry::{Point, Rect, box_of, boxes_of, overlaps};
pub use hierarchy::HierarchicalLayout;
pub use label_placement::{estimate_label_size, place_label, resolve_label_positions};
pub use routing::{route, route_between};
pub use sizing::{Size, estimate, estimate_sizes};
pub use types::*;

use crate::config::{LayoutConfig, StrategyKind};
use crate::ir::Graph;

/// A way of turning a sized graph into a positioned layout.
///
/// Implementations receive node sizes already estimated and must not
/// attach label anchors; [`compute_layout_with`] runs label placement
/// once the strategy returns.
pub trait LayoutStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn compute(&self, graph: &Graph, config: &LayoutConfig) -> Result<Layout>;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn LayoutStrategy> {
    match kind {
        StrategyKind::Hierarchical => Box::new(HierarchicalLayout),
        StrategyKind::Concentric => Box::new(ConcentricLayout),
    }
}

/// Lays out `graph` with the strategy named in `config`.
pub fn compute_layout(graph: &Graph, config: &LayoutConfig) -> Result<Layout> {
    compute_layout_with(strategy_for(config.strategy).as_ref(), graph, config)
}

pub fn compute_layout_with(
    strategy: &dyn LayoutStrategy,
    graph: &Graph,
    config: &LayoutConfig,
) -> Result<Layout> {
    config.validate()?;
    let mut layout = strategy.compute(graph, config)?;

    // Final pass: label anchors see every node box in its final place.
    resolve_label_positions(&mut layout, &config.labels);

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node, NodeKind};

    fn graph() -> Graph {
        let node = |id: &str| Node {
            id: id.to_string(),
            name: id.to_string(),
            attributes: Vec::new(),
            parent_id: None,
            depth: 0,
            kind: NodeKind::Leaf,
            width: 320.0,
            height: 80.0,
        };
        Graph {
            nodes: vec![node("a"), node("b")],
            edges: vec![Edge {
                id: "e0".to_string(),
                source: "a".to_string(),
                target: "b".to_string(),
                label: Some("Kafka".to_string()),
            }],
        }
    }

    #[test]
    fn strategy_follows_config() {
        for kind in [StrategyKind::Hierarchical, StrategyKind::Concentric] {
            let config = LayoutConfig {
                strategy: kind,
                ..Default::default()
            };
            let layout = compute_layout(&graph(), &config).expect("layout");
            assert_eq!(layout.strategy, kind);
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }

    #[test]
    fn label_anchor_sits_between_nodes() {
        let layout = compute_layout(&graph(), &LayoutConfig::default()).expect("layout");
        let edge = layout.edge("e0").expect("edge");
        assert_eq!(edge.label_anchor, Some((380.0, 60.0)));
    }

    #[test]
    fn invalid_config_is_rejected_before_layout() {
        let config = LayoutConfig {
            rank_spacing: f32::NAN,
            ..Default::default()
        };
        let err = compute_layout(&graph(), &config).expect_err("invalid");
        assert!(matches!(err, LayoutError::InvalidConfig { .. }));
    }

    #[test]
    fn layout_round_trips_through_json() {
        let layout = compute_layout(&graph(), &LayoutConfig::default()).expect("layout");
        let json = serde_json::to_string(&layout).expect("serialize");
        assert!(json.contains("\"labelAnchor\""));
        let back: Layout = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, layout);
    }
}
