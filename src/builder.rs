//! Flattens a nested component tree into a [`Graph`].

use tracing::debug;

use crate::ir::{Component, ComponentEntry, Edge, Graph, Node, NodeKind, SystemData};

/// Source of synthetic edge ids (`e0`, `e1`, ...).
///
/// Ids are unique per counter, so two builds produce identical ids only when
/// they start from the same counter state.
#[derive(Debug, Clone, Default)]
pub struct EdgeIdCounter {
    next: usize,
}

impl EdgeIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: usize) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("e{}", self.next);
        self.next += 1;
        id
    }

    pub fn peek(&self) -> usize {
        self.next
    }
}

/// Builds the flat node and edge lists for `data`.
///
/// Entries without an id are skipped. Edge endpoints are not checked here;
/// dangling targets are dropped by the layout strategies.
pub fn build_graph(data: &SystemData, ids: &mut EdgeIdCounter) -> Graph {
    let graph = fold_entries(&data.components, None, 0, ids, Graph::new());
    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "built component graph"
    );
    graph
}

fn fold_entries(
    entries: &[ComponentEntry],
    parent: Option<&str>,
    depth: usize,
    ids: &mut EdgeIdCounter,
    acc: Graph,
) -> Graph {
    entries.iter().fold(acc, |acc, entry| match entry.as_component() {
        Some(component) => fold_component(component, parent, depth, &mut *ids, acc),
        None => {
            debug!(?parent, "skipping component entry without id");
            acc
        }
    })
}

fn fold_component(
    component: &Component,
    parent: Option<&str>,
    depth: usize,
    ids: &mut EdgeIdCounter,
    mut acc: Graph,
) -> Graph {
    let children: Vec<String> = component
        .components
        .iter()
        .filter_map(ComponentEntry::as_component)
        .map(|child| child.id.clone())
        .collect();
    let kind = if children.is_empty() {
        NodeKind::Leaf
    } else {
        NodeKind::Container { children }
    };

    acc.nodes.push(Node {
        id: component.id.clone(),
        name: component.name.clone(),
        attributes: component.labels.clone(),
        parent_id: parent.map(str::to_string),
        depth,
        kind,
        width: 0.0,
        height: 0.0,
    });

    for connection in &component.connections {
        let Some(target) = connection.target_id() else {
            debug!(source = %component.id, "skipping connection without target");
            continue;
        };
        acc.edges.push(Edge {
            id: ids.next_id(),
            source: component.id.clone(),
            target: target.to_string(),
            label: connection.label().map(str::to_string),
        });
    }

    fold_entries(
        &component.components,
        Some(component.id.as_str()),
        depth + 1,
        ids,
        acc,
    )
}
