use crate::config::SizingConfig;
use crate::ir::{Graph, Node, NodeClass};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Number of attribute rows drawn for `count` attributes.
pub fn attribute_rows(count: usize, config: &SizingConfig) -> usize {
    let shown = count.min(config.max_displayed_attributes);
    shown.div_ceil(config.attributes_per_row.max(1))
}

/// Intrinsic box of a node before any children are placed inside it.
pub fn estimate(node: &Node, config: &SizingConfig) -> Size {
    let width = match node.class() {
        NodeClass::Main => config.main_width,
        NodeClass::Sub => config.sub_width,
    };

    let count = node.attributes.len();
    let mut height = config.header_height + config.content_padding;
    let rows = attribute_rows(count, config);
    if rows > 0 {
        height += rows as f32 * config.row_height + (rows - 1) as f32 * config.row_gap;
    }
    if count > config.max_displayed_attributes {
        height += config.more_indicator_height;
    }

    Size {
        width,
        height: height.max(config.min_height),
    }
}

pub fn estimate_sizes(graph: &mut Graph, config: &SizingConfig) {
    for node in &mut graph.nodes {
        let size = estimate(node, config);
        node.width = size.width;
        node.height = size.height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Attribute, NodeKind};

    fn node_with(count: usize, depth: usize) -> Node {
        Node {
            id: "n".to_string(),
            name: "N".to_string(),
            attributes: (0..count)
                .map(|idx| Attribute {
                    label: format!("k{idx}"),
                    evaluator: String::new(),
                })
                .collect(),
            parent_id: None,
            depth,
            kind: NodeKind::Leaf,
            width: 0.0,
            height: 0.0,
        }
    }

    #[test]
    fn empty_node_hits_floor() {
        let size = estimate(&node_with(0, 0), &SizingConfig::default());
        assert_eq!(size.height, 80.0);
        assert_eq!(size.width, 320.0);
    }

    #[test]
    fn twelve_attributes_are_capped() {
        // 44 base + 3 rows * 24 + 2 gaps * 6 + 24 overflow row
        let size = estimate(&node_with(12, 1), &SizingConfig::default());
        assert_eq!(size.height, 152.0);
    }

    #[test]
    fn height_is_monotonic_and_floored() {
        let config = SizingConfig::default();
        let mut previous = 0.0;
        for count in 0..20 {
            let height = estimate(&node_with(count, 0), &config).height;
            assert!(height >= config.min_height);
            assert!(height >= previous, "count {count} shrank the box");
            previous = height;
        }
    }

    #[test]
    fn sub_width_applies_below_top_level() {
        let config = SizingConfig {
            sub_width: 240.0,
            ..Default::default()
        };
        assert_eq!(estimate(&node_with(1, 0), &config).width, 320.0);
        assert_eq!(estimate(&node_with(1, 2), &config).width, 240.0);
    }

    #[test]
    fn estimate_sizes_is_idempotent() {
        let mut graph = Graph::new();
        graph.nodes.push(node_with(3, 0));
        let config = SizingConfig::default();
        estimate_sizes(&mut graph, &config);
        let first = graph.clone();
        estimate_sizes(&mut graph, &config);
        assert_eq!(first, graph);
        assert_eq!(graph.nodes[0].height, 98.0);
    }
}
