use std::collections::HashMap;

use tracing::{debug, warn};

use super::geometry::{Rect, boxes_of};
use super::routing::{route_between, self_loop};
use super::{EdgeLayout, Layout, LayoutError, LayoutStrategy, NodeLayout, Result};
use crate::config::{LayoutConfig, StrategyKind};
use crate::ir::Graph;

/// Places nodes on rings by connectivity, most connected at the center.
///
/// Containers are drawn at their intrinsic size and children are placed as
/// ordinary ring members, so this strategy does not guarantee containment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentricLayout;

impl LayoutStrategy for ConcentricLayout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Concentric
    }

    fn compute(&self, graph: &Graph, config: &LayoutConfig) -> Result<Layout> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
        for (idx, node) in graph.nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), idx).is_some() {
                return Err(LayoutError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
            let valid = node.width.is_finite()
                && node.height.is_finite()
                && node.width > 0.0
                && node.height > 0.0;
            if !valid {
                return Err(LayoutError::InvalidNodeSize {
                    id: node.id.clone(),
                    width: node.width,
                    height: node.height,
                });
            }
        }

        let mut degree = vec![0usize; graph.nodes.len()];
        let mut live_edges = Vec::with_capacity(graph.edges.len());
        for edge in &graph.edges {
            match (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                (Some(&s), Some(&t)) => {
                    degree[s] += 1;
                    degree[t] += 1;
                    live_edges.push(edge);
                }
                _ => warn!(
                    edge = %edge.id,
                    source = %edge.source,
                    target = %edge.target,
                    "dropping edge with unknown endpoint"
                ),
            }
        }

        let mut order: Vec<usize> = (0..graph.nodes.len()).collect();
        order.sort_by(|a, b| degree[*b].cmp(&degree[*a]).then(a.cmp(b)));

        let diagonal = graph
            .nodes
            .iter()
            .map(|node| node.width.hypot(node.height))
            .fold(0.0, f32::max);
        let ring_spacing = diagonal + config.concentric.spacing;
        let capacity = config.concentric.ring_capacity.max(1);

        let mut centers = vec![(0.0f32, 0.0f32); graph.nodes.len()];
        let mut cursor = 0;
        let mut ring = 0usize;
        while cursor < order.len() {
            let slots = if ring == 0 { 1 } else { capacity * ring };
            let members = &order[cursor..(cursor + slots).min(order.len())];
            let radius = ring as f32 * ring_spacing;
            let step = std::f32::consts::TAU / members.len() as f32;
            for (slot, &idx) in members.iter().enumerate() {
                let angle = -std::f32::consts::FRAC_PI_2 + step * slot as f32;
                centers[idx] = (radius * angle.cos(), radius * angle.sin());
            }
            cursor += members.len();
            ring += 1;
        }

        let margin = config.canvas_margin;
        let min_x = graph
            .nodes
            .iter()
            .zip(&centers)
            .map(|(node, c)| c.0 - node.width / 2.0)
            .fold(f32::INFINITY, f32::min);
        let min_y = graph
            .nodes
            .iter()
            .zip(&centers)
            .map(|(node, c)| c.1 - node.height / 2.0)
            .fold(f32::INFINITY, f32::min);
        let (shift_x, shift_y) = if graph.nodes.is_empty() {
            (0.0, 0.0)
        } else {
            (margin - min_x, margin - min_y)
        };

        let nodes: Vec<NodeLayout> = graph
            .nodes
            .iter()
            .zip(&centers)
            .map(|(node, c)| NodeLayout {
                id: node.id.clone(),
                name: node.name.clone(),
                parent_id: node.parent_id.clone(),
                depth: node.depth,
                x: c.0 + shift_x,
                y: c.1 + shift_y,
                width: node.width,
                height: node.height,
                is_container: node.is_container(),
            })
            .collect();
        if let Some(bad) = nodes.iter().find(|n| !n.x.is_finite() || !n.y.is_finite()) {
            return Err(LayoutError::NonFiniteGeometry { id: bad.id.clone() });
        }

        let boxes = boxes_of(&nodes);
        let horizontal = config.direction.is_horizontal();
        let mut edges = Vec::with_capacity(live_edges.len());
        for edge in live_edges {
            let points = if edge.source == edge.target {
                boxes
                    .get(&edge.source)
                    .map(|rect| self_loop(rect, config.routing.self_loop_pad, horizontal))
            } else {
                route_between(&edge.source, &edge.target, &boxes, &config.routing)
            };
            let Some(points) = points else {
                continue;
            };
            edges.push(EdgeLayout {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label.clone(),
                points,
                label_anchor: None,
            });
        }

        let mut extent = Rect::new(0.0, 0.0, margin, margin);
        for rect in boxes.values() {
            extent = extent.union(rect);
        }
        let mut width = extent.right() + margin;
        let mut height = extent.bottom() + margin;
        for point in edges.iter().flat_map(|edge| edge.points.iter()) {
            width = width.max(point.0 + margin);
            height = height.max(point.1 + margin);
        }

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            rings = ring,
            "concentric layout complete"
        );

        Ok(Layout {
            strategy: StrategyKind::Concentric,
            nodes,
            edges,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node, NodeKind};
    use crate::layout::geometry::box_of;
    use crate::layout::overlaps;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_uppercase(),
            attributes: Vec::new(),
            parent_id: None,
            depth: 0,
            kind: NodeKind::Leaf,
            width: 320.0,
            height: 80.0,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            label: None,
        }
    }

    fn star() -> Graph {
        let mut graph = Graph::new();
        for id in ["leaf1", "hub", "leaf2", "leaf3", "leaf4"] {
            graph.nodes.push(node(id));
        }
        for (idx, leaf) in ["leaf1", "leaf2", "leaf3", "leaf4"].iter().enumerate() {
            graph.edges.push(edge(&format!("e{idx}"), "hub", leaf));
        }
        graph
    }

    #[test]
    fn most_connected_node_sits_in_the_middle() {
        let layout = ConcentricLayout
            .compute(&star(), &LayoutConfig::default())
            .expect("layout");
        let hub = layout.node("hub").expect("hub");
        let center_x = layout.nodes.iter().map(|n| n.x).sum::<f32>() / 5.0;
        assert!((hub.x - center_x).abs() < 1.0);
        assert_eq!(layout.strategy, StrategyKind::Concentric);
    }

    #[test]
    fn ring_members_do_not_overlap() {
        let layout = ConcentricLayout
            .compute(&star(), &LayoutConfig::default())
            .expect("layout");
        for (i, a) in layout.nodes.iter().enumerate() {
            for b in layout.nodes.iter().skip(i + 1) {
                assert!(!overlaps(&box_of(a), &box_of(b), 0.0), "{} vs {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn canvas_starts_at_margin() {
        let layout = ConcentricLayout
            .compute(&star(), &LayoutConfig::default())
            .expect("layout");
        let min_left = layout.nodes.iter().map(|n| n.left()).fold(f32::INFINITY, f32::min);
        let min_top = layout.nodes.iter().map(|n| n.top()).fold(f32::INFINITY, f32::min);
        assert!((min_left - 20.0).abs() < 1e-3);
        assert!((min_top - 20.0).abs() < 1e-3);
        for n in &layout.nodes {
            assert!(n.right() <= layout.width);
            assert!(n.bottom() <= layout.height);
        }
    }

    #[test]
    fn dangling_and_self_edges() {
        let mut graph = star();
        graph.edges.push(edge("e8", "hub", "nowhere"));
        graph.edges.push(edge("e9", "leaf1", "leaf1"));
        let layout = ConcentricLayout
            .compute(&graph, &LayoutConfig::default())
            .expect("layout");
        assert_eq!(layout.edges.len(), 5);
        assert!(layout.edge("e8").is_none());
        assert_eq!(layout.edge("e9").expect("loop").points.len(), 4);
        assert!(layout.edges.iter().all(|e| e.points.len() >= 2));
    }

    #[test]
    fn empty_graph_has_margin_canvas() {
        let layout = ConcentricLayout
            .compute(&Graph::new(), &LayoutConfig::default())
            .expect("layout");
        assert!(layout.nodes.is_empty());
        assert_eq!(layout.width, 40.0);
        assert_eq!(layout.height, 40.0);
    }
}
