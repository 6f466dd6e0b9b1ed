use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::geometry::{Point, Rect, compress_path, segment_intersects_rect};
use super::ranking::{ScopeEdge, compute_ranks, order_rank_nodes};
use super::routing::{GridRequest, route_on_grid, self_loop};
use super::{EdgeLayout, Layout, LayoutError, LayoutStrategy, NodeLayout, Result};
use crate::config::{LayoutConfig, StrategyKind};
use crate::ir::Graph;

const CONTAINMENT_TOLERANCE: f32 = 1e-3;

/// Layered layout with nested containers.
///
/// Every container lays out its direct children in its own frame, deepest
/// containers first, so a parent is sized only after all of its children
/// are. A final top-down pass turns the relative frames into absolute
/// canvas coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalLayout;

impl LayoutStrategy for HierarchicalLayout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hierarchical
    }

    fn compute(&self, graph: &Graph, config: &LayoutConfig) -> Result<Layout> {
        let forest = Forest::build(graph)?;
        for node in &graph.nodes {
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

        let horizontal = config.direction.is_horizontal();
        let endpoints = resolve_endpoints(graph, &forest);
        let scoped_edges: Vec<(usize, usize)> = endpoints.iter().flatten().copied().collect();

        let count = graph.nodes.len();
        let mut sizes: Vec<(f32, f32)> = graph
            .nodes
            .iter()
            .map(|node| (node.width, node.height))
            .collect();
        let mut rel: Vec<Point> = vec![(0.0, 0.0); count];
        let mut grids: HashMap<Option<usize>, ScopeGrid> = HashMap::new();

        let mut containers: Vec<usize> = (0..count)
            .filter(|idx| !forest.children[*idx].is_empty())
            .collect();
        containers.sort_by_key(|idx| Reverse(forest.depth[*idx]));

        let pad = config.container_padding;
        for container in containers {
            let ctx = ScopeContext {
                graph,
                forest: &forest,
                edges: &scoped_edges,
                sizes: &sizes,
                config,
                horizontal,
            };
            let arrangement = ctx.arrange(&forest.children[container], Some(container));
            let content = to_xy(arrangement.main_extent, arrangement.cross_extent, horizontal);
            let needed = (
                content.0 + pad.left + pad.right,
                content.1 + pad.top + pad.bottom,
            );
            let intrinsic = sizes[container];
            let size = (intrinsic.0.max(needed.0), intrinsic.1.max(needed.1));
            let origin = (pad.left + (size.0 - needed.0) / 2.0, pad.top);
            sizes[container] = size;
            let grid = place(arrangement, origin, size, &mut rel, horizontal);
            grids.insert(Some(container), grid);
            debug!(
                container = %graph.nodes[container].id,
                width = size.0,
                height = size.1,
                "sized container"
            );
        }

        let margin = config.canvas_margin;
        let ctx = ScopeContext {
            graph,
            forest: &forest,
            edges: &scoped_edges,
            sizes: &sizes,
            config,
            horizontal,
        };
        let arrangement = ctx.arrange(&forest.roots, None);
        let content = to_xy(arrangement.main_extent, arrangement.cross_extent, horizontal);
        let root_frame = (content.0 + margin * 2.0, content.1 + margin * 2.0);
        let grid = place(arrangement, (margin, margin), root_frame, &mut rel, horizontal);
        grids.insert(None, grid);

        let abs = flatten(&forest, &rel);
        let frames = Frames {
            forest: &forest,
            rel: &rel,
            abs: &abs,
            sizes: &sizes,
        };

        let plans = plan_routes(&endpoints, &frames, &grids, horizontal);
        let offsets = spread_ports(&plans, &frames, config.routing.port_spread_ratio, horizontal);
        let root = Rect::new(0.0, 0.0, root_frame.0, root_frame.1);

        let mut edges = Vec::with_capacity(plans.len());
        for (plan_idx, plan) in plans.iter().enumerate() {
            let edge = &graph.edges[plan.edge];
            let mut points = plan.points(plan_idx, &frames, &offsets, config, horizontal);
            if !matches!(plan.shape, Shape::SelfLoop) {
                points = detour_blocked(plan, points, &frames, root, config);
            }
            if points.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
                return Err(LayoutError::NonFiniteGeometry {
                    id: edge.id.clone(),
                });
            }
            edges.push(EdgeLayout {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label.clone(),
                points,
                label_anchor: None,
            });
        }

        let mut nodes = Vec::with_capacity(count);
        for (idx, node) in graph.nodes.iter().enumerate() {
            let (width, height) = sizes[idx];
            let layout = NodeLayout {
                id: node.id.clone(),
                name: node.name.clone(),
                parent_id: forest.parent[idx].map(|p| graph.nodes[p].id.clone()),
                depth: forest.depth[idx],
                x: abs[idx].0 + width / 2.0,
                y: abs[idx].1 + height / 2.0,
                width,
                height,
                is_container: !forest.children[idx].is_empty(),
            };
            let finite = [layout.x, layout.y, layout.width, layout.height]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(LayoutError::NonFiniteGeometry {
                    id: node.id.clone(),
                });
            }
            nodes.push(layout);
        }

        verify_containment(graph, &forest, &frames, config)?;

        let mut width = root_frame.0;
        let mut height = root_frame.1;
        for point in edges.iter().flat_map(|edge| edge.points.iter()) {
            width = width.max(point.0 + margin);
            height = height.max(point.1 + margin);
        }

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            width,
            height,
            "hierarchical layout complete"
        );

        Ok(Layout {
            strategy: StrategyKind::Hierarchical,
            nodes,
            edges,
            width,
            height,
        })
    }
}

// ── Forest ──────────────────────────────────────────────────────────

struct Forest {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    depth: Vec<usize>,
    index: HashMap<String, usize>,
}

impl Forest {
    fn build(graph: &Graph) -> Result<Self> {
        let count = graph.nodes.len();
        let mut index: HashMap<String, usize> = HashMap::with_capacity(count);
        for (idx, node) in graph.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), idx).is_some() {
                return Err(LayoutError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }

        let mut parent: Vec<Option<usize>> = vec![None; count];
        for (idx, node) in graph.nodes.iter().enumerate() {
            let Some(parent_id) = node.parent_id.as_deref() else {
                continue;
            };
            match index.get(parent_id) {
                Some(&resolved) => parent[idx] = Some(resolved),
                None => warn!(
                    node = %node.id,
                    parent = parent_id,
                    "unknown parent id; laying node out at top level"
                ),
            }
        }

        let mut depth = vec![0; count];
        for idx in 0..count {
            let mut steps = 0;
            let mut cursor = parent[idx];
            while let Some(up) = cursor {
                steps += 1;
                if steps > count {
                    return Err(LayoutError::ParentCycle {
                        id: graph.nodes[idx].id.clone(),
                    });
                }
                cursor = parent[up];
            }
            depth[idx] = steps;
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for idx in 0..count {
            match parent[idx] {
                Some(up) => children[up].push(idx),
                None => roots.push(idx),
            }
        }

        Ok(Self {
            parent,
            children,
            roots,
            depth,
            index,
        })
    }

    /// Ancestor-or-self of `node` whose parent is `scope`.
    fn lift(&self, node: usize, scope: Option<usize>) -> Option<usize> {
        let mut cursor = node;
        loop {
            if self.parent[cursor] == scope {
                return Some(cursor);
            }
            cursor = self.parent[cursor]?;
        }
    }

    fn is_strict_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut cursor = self.parent[node];
        while let Some(up) = cursor {
            if up == ancestor {
                return true;
            }
            cursor = self.parent[up];
        }
        false
    }

    /// Deepest node that is a strict ancestor of both `a` and `b`, or `None`
    /// for the root scope.
    fn routing_scope(&self, a: usize, b: usize) -> Option<usize> {
        let mut above_a = HashSet::new();
        let mut cursor = self.parent[a];
        while let Some(up) = cursor {
            above_a.insert(up);
            cursor = self.parent[up];
        }
        let mut cursor = self.parent[b];
        while let Some(up) = cursor {
            if above_a.contains(&up) {
                return Some(up);
            }
            cursor = self.parent[up];
        }
        None
    }
}

fn resolve_endpoints(graph: &Graph, forest: &Forest) -> Vec<Option<(usize, usize)>> {
    graph
        .edges
        .iter()
        .map(|edge| {
            let source = forest.index.get(&edge.source).copied();
            let target = forest.index.get(&edge.target).copied();
            match (source, target) {
                (Some(s), Some(t)) => Some((s, t)),
                _ => {
                    warn!(
                        edge = %edge.id,
                        source = %edge.source,
                        target = %edge.target,
                        "dropping edge with unknown endpoint"
                    );
                    None
                }
            }
        })
        .collect()
}

// ── Scope arrangement ───────────────────────────────────────────────

fn to_xy(main: f32, cross: f32, horizontal: bool) -> Point {
    if horizontal { (main, cross) } else { (cross, main) }
}

fn from_xy(point: Point, horizontal: bool) -> (f32, f32) {
    if horizontal {
        point
    } else {
        (point.1, point.0)
    }
}

struct ScopeContext<'a> {
    graph: &'a Graph,
    forest: &'a Forest,
    edges: &'a [(usize, usize)],
    sizes: &'a [(f32, f32)],
    config: &'a LayoutConfig,
    horizontal: bool,
}

/// Member positions relative to the scope's content origin, in main/cross
/// axis coordinates.
struct Arrangement {
    placed: Vec<(usize, f32, f32)>,
    main_extent: f32,
    cross_extent: f32,
    rank_of: HashMap<usize, usize>,
    spans: Vec<(f32, f32)>,
}

impl ScopeContext<'_> {
    fn arrange(&self, members: &[usize], scope: Option<usize>) -> Arrangement {
        let id_of = |idx: usize| self.graph.nodes[idx].id.clone();
        let ids: Vec<String> = members.iter().map(|m| id_of(*m)).collect();
        let member_of: HashMap<&str, usize> = ids
            .iter()
            .zip(members)
            .map(|(id, m)| (id.as_str(), *m))
            .collect();
        let node_order: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut scope_edges: Vec<ScopeEdge> = Vec::new();
        for &(source, target) in self.edges {
            let lifted = (
                self.forest.lift(source, scope),
                self.forest.lift(target, scope),
            );
            let (Some(from), Some(to)) = lifted else {
                continue;
            };
            if from != to && seen.insert((from, to)) {
                scope_edges.push(ScopeEdge {
                    from: id_of(from),
                    to: id_of(to),
                });
            }
        }

        let ranks = compute_ranks(&ids, &scope_edges, &node_order);
        let max_rank = ranks.values().copied().max().unwrap_or(0);
        let mut buckets: Vec<Vec<String>> = vec![Vec::new(); max_rank + 1];
        for id in &ids {
            let rank = ranks.get(id).copied().unwrap_or(0);
            buckets[rank].push(id.clone());
        }
        buckets.retain(|bucket| !bucket.is_empty());
        order_rank_nodes(
            &mut buckets,
            &scope_edges,
            &node_order,
            self.config.order_passes,
        );

        let dims = |idx: usize| from_xy(self.sizes[idx], self.horizontal);
        let spacing = self.config.node_spacing;
        let rows: Vec<Vec<usize>> = buckets
            .iter()
            .map(|bucket| {
                bucket
                    .iter()
                    .filter_map(|id| member_of.get(id.as_str()).copied())
                    .collect()
            })
            .collect();
        let rank_cross: Vec<f32> = rows
            .iter()
            .map(|row| {
                let total: f32 = row.iter().map(|m| dims(*m).1).sum();
                total + spacing * row.len().saturating_sub(1) as f32
            })
            .collect();
        let cross_extent = rank_cross.iter().copied().fold(0.0, f32::max);

        let mut placed = Vec::with_capacity(members.len());
        let mut rank_of = HashMap::with_capacity(members.len());
        let mut spans = Vec::with_capacity(rows.len());
        let mut cursor = 0.0;
        for (rank, row) in rows.iter().enumerate() {
            let rank_main = row.iter().map(|m| dims(*m).0).fold(0.0, f32::max);
            let mut cross = (cross_extent - rank_cross[rank]) / 2.0;
            for &member in row {
                let (main_len, cross_len) = dims(member);
                placed.push((member, cursor + (rank_main - main_len) / 2.0, cross));
                rank_of.insert(member, rank);
                cross += cross_len + spacing;
            }
            spans.push((cursor, cursor + rank_main));
            cursor += rank_main + self.config.rank_spacing;
        }
        let main_extent = spans.last().map(|span| span.1).unwrap_or(0.0);

        debug!(
            scope = scope.map(|s| self.graph.nodes[s].id.as_str()).unwrap_or("<root>"),
            members = members.len(),
            edges = scope_edges.len(),
            ranks = spans.len(),
            "arranged scope"
        );

        Arrangement {
            placed,
            main_extent,
            cross_extent,
            rank_of,
            spans,
        }
    }
}

/// Rank columns of one scope in that scope's frame.
struct ScopeGrid {
    rank_of: HashMap<usize, usize>,
    spans: Vec<(f32, f32)>,
    frame_main: f32,
    frame_cross: f32,
    cross_end: f32,
}

impl ScopeGrid {
    fn gap_before(&self, rank: usize) -> f32 {
        if rank == 0 {
            self.spans[0].0
        } else {
            self.spans[rank].0 - self.spans[rank - 1].1
        }
    }

    fn gap_after(&self, rank: usize) -> f32 {
        match self.spans.get(rank + 1) {
            Some(next) => next.0 - self.spans[rank].1,
            None => self.frame_main - self.spans[rank].1,
        }
    }

    fn far_room(&self) -> f32 {
        self.frame_cross - self.cross_end
    }
}

fn place(
    arrangement: Arrangement,
    origin: Point,
    frame: (f32, f32),
    rel: &mut [Point],
    horizontal: bool,
) -> ScopeGrid {
    let (main_off, cross_off) = from_xy(origin, horizontal);
    let (frame_main, frame_cross) = from_xy(frame, horizontal);
    for &(member, main, cross) in &arrangement.placed {
        rel[member] = to_xy(main_off + main, cross_off + cross, horizontal);
    }
    ScopeGrid {
        rank_of: arrangement.rank_of,
        spans: arrangement
            .spans
            .iter()
            .map(|(start, end)| (start + main_off, end + main_off))
            .collect(),
        frame_main,
        frame_cross,
        cross_end: cross_off + arrangement.cross_extent,
    }
}

// ── Flattening ──────────────────────────────────────────────────────

fn flatten(forest: &Forest, rel: &[Point]) -> Vec<Point> {
    let mut abs = vec![(0.0, 0.0); rel.len()];
    let mut stack: Vec<usize> = forest.roots.iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        let base = forest.parent[idx].map(|p| abs[p]).unwrap_or((0.0, 0.0));
        abs[idx] = (base.0 + rel[idx].0, base.1 + rel[idx].1);
        stack.extend(forest.children[idx].iter().rev());
    }
    abs
}

struct Frames<'a> {
    forest: &'a Forest,
    rel: &'a [Point],
    abs: &'a [Point],
    sizes: &'a [(f32, f32)],
}

impl Frames<'_> {
    fn absolute(&self, node: usize) -> Rect {
        let (w, h) = self.sizes[node];
        Rect::new(self.abs[node].0, self.abs[node].1, w, h)
    }

    /// Box of `node` in the frame of `scope`, summing relative offsets.
    fn local(&self, node: usize, scope: Option<usize>) -> Rect {
        let (mut x, mut y) = self.rel[node];
        let mut cursor = self.forest.parent[node];
        while cursor != scope {
            let Some(up) = cursor else {
                break;
            };
            x += self.rel[up].0;
            y += self.rel[up].1;
            cursor = self.forest.parent[up];
        }
        let (w, h) = self.sizes[node];
        Rect::new(x, y, w, h)
    }

    fn origin(&self, scope: Option<usize>) -> Point {
        scope.map(|s| self.abs[s]).unwrap_or((0.0, 0.0))
    }
}

// ── Edge routing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Leading,
    Trailing,
    Near,
    Far,
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    SelfLoop,
    Nested { outer_is_source: bool },
    Forward { mid: f32 },
    Backward { exit: f32, entry: f32, far: f32 },
    Lateral { source_side: Side, target_side: Side },
    Direct,
}

#[derive(Debug, Clone, Copy)]
struct AxisBox {
    main: f32,
    cross: f32,
    main_len: f32,
    cross_len: f32,
}

impl AxisBox {
    fn of(rect: &Rect, horizontal: bool) -> Self {
        let (main, cross) = from_xy((rect.x, rect.y), horizontal);
        let (main_len, cross_len) = from_xy((rect.width, rect.height), horizontal);
        Self {
            main,
            cross,
            main_len,
            cross_len,
        }
    }

    fn side_len(&self, side: Side) -> f32 {
        match side {
            Side::Leading | Side::Trailing => self.cross_len,
            Side::Near | Side::Far => self.main_len,
        }
    }

    fn port(&self, side: Side, offset: f32) -> (f32, f32) {
        let main_mid = self.main + self.main_len / 2.0;
        let cross_mid = self.cross + self.cross_len / 2.0;
        match side {
            Side::Leading => (self.main, cross_mid + offset),
            Side::Trailing => (self.main + self.main_len, cross_mid + offset),
            Side::Near => (main_mid + offset, self.cross),
            Side::Far => (main_mid + offset, self.cross + self.cross_len),
        }
    }
}

struct RoutePlan {
    edge: usize,
    source: usize,
    target: usize,
    scope: Option<usize>,
    shape: Shape,
}

impl RoutePlan {
    fn ports(&self) -> [Option<(usize, Side)>; 2] {
        match self.shape {
            Shape::Forward { .. } | Shape::Backward { .. } => [
                Some((self.source, Side::Trailing)),
                Some((self.target, Side::Leading)),
            ],
            Shape::Lateral {
                source_side,
                target_side,
            } => [
                Some((self.source, source_side)),
                Some((self.target, target_side)),
            ],
            Shape::Nested {
                outer_is_source: true,
            } => [None, Some((self.target, Side::Leading))],
            Shape::Nested {
                outer_is_source: false,
            } => [Some((self.source, Side::Leading)), None],
            Shape::SelfLoop | Shape::Direct => [None, None],
        }
    }

    fn points(
        &self,
        plan_idx: usize,
        frames: &Frames<'_>,
        offsets: &HashMap<(usize, usize), f32>,
        config: &LayoutConfig,
        horizontal: bool,
    ) -> Vec<Point> {
        let source_rect = frames.local(self.source, self.scope);
        let target_rect = frames.local(self.target, self.scope);
        let source = AxisBox::of(&source_rect, horizontal);
        let target = AxisBox::of(&target_rect, horizontal);
        let offset = |end: usize| offsets.get(&(plan_idx, end)).copied().unwrap_or(0.0);

        let local: Vec<Point> = match self.shape {
            Shape::SelfLoop => self_loop(&source_rect, config.routing.self_loop_pad, horizontal),
            Shape::Direct => vec![source_rect.center(), target_rect.center()],
            Shape::Nested { outer_is_source } => {
                let (outer, inner, end) = if outer_is_source {
                    (source, target, 1)
                } else {
                    (target, source, 0)
                };
                let inner_port = inner.port(Side::Leading, offset(end));
                let outer_point = (outer.main, inner_port.1);
                let path = if outer_is_source {
                    [outer_point, inner_port]
                } else {
                    [inner_port, outer_point]
                };
                path.iter().map(|p| to_xy(p.0, p.1, horizontal)).collect()
            }
            Shape::Forward { mid } => {
                let start = source.port(Side::Trailing, offset(0));
                let end = target.port(Side::Leading, offset(1));
                [start, (mid, start.1), (mid, end.1), end]
                    .iter()
                    .map(|p| to_xy(p.0, p.1, horizontal))
                    .collect()
            }
            Shape::Backward { exit, entry, far } => {
                let start = source.port(Side::Trailing, offset(0));
                let end = target.port(Side::Leading, offset(1));
                [
                    start,
                    (exit, start.1),
                    (exit, far),
                    (entry, far),
                    (entry, end.1),
                    end,
                ]
                .iter()
                .map(|p| to_xy(p.0, p.1, horizontal))
                .collect()
            }
            Shape::Lateral {
                source_side,
                target_side,
            } => {
                let start = source.port(source_side, offset(0));
                let end = target.port(target_side, offset(1));
                let mid = (start.1 + end.1) / 2.0;
                [start, (start.0, mid), (end.0, mid), end]
                    .iter()
                    .map(|p| to_xy(p.0, p.1, horizontal))
                    .collect()
            }
        };

        let (ox, oy) = frames.origin(self.scope);
        let absolute: Vec<Point> = local.iter().map(|p| (p.0 + ox, p.1 + oy)).collect();
        compress_path(&absolute)
    }
}

/// Replaces a planned route that runs through an unrelated box with a grid
/// route around every such box in the routing scope.
///
/// Boxes of the two endpoints and of their ancestors are not obstacles: the
/// route starts or ends inside them.
fn detour_blocked(
    plan: &RoutePlan,
    planned: Vec<Point>,
    frames: &Frames<'_>,
    root: Rect,
    config: &LayoutConfig,
) -> Vec<Point> {
    let forest = frames.forest;
    let obstacles: Vec<Rect> = (0..forest.parent.len())
        .filter(|&idx| idx != plan.source && idx != plan.target)
        .filter(|&idx| {
            !forest.is_strict_ancestor(idx, plan.source)
                && !forest.is_strict_ancestor(idx, plan.target)
        })
        .map(|idx| frames.absolute(idx))
        .collect();
    let blocked = planned.windows(2).any(|leg| {
        obstacles
            .iter()
            .any(|rect| segment_intersects_rect(leg[0], leg[1], rect))
    });
    if !blocked || planned.len() < 2 {
        return planned;
    }

    let last = planned.len() - 1;
    let request = GridRequest {
        bounds: plan.scope.map(|s| frames.absolute(s)).unwrap_or(root),
        obstacles: &obstacles,
        start: planned[0],
        start_dir: axis_dir(planned[0], planned[1]),
        end: planned[last],
        end_dir: axis_dir(planned[last - 1], planned[last]),
    };
    match route_on_grid(&request, &config.routing) {
        Some(points) => points,
        None => {
            debug!(edge = plan.edge, "no clear grid route; keeping planned route");
            planned
        }
    }
}

/// Unit step along the dominant axis of `from -> to`.
fn axis_dir(from: Point, to: Point) -> (i32, i32) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    if dx.abs() >= dy.abs() {
        (if dx < 0.0 { -1 } else { 1 }, 0)
    } else {
        (0, if dy < 0.0 { -1 } else { 1 })
    }
}

fn plan_routes(
    endpoints: &[Option<(usize, usize)>],
    frames: &Frames<'_>,
    grids: &HashMap<Option<usize>, ScopeGrid>,
    horizontal: bool,
) -> Vec<RoutePlan> {
    let forest = frames.forest;
    let mut plans = Vec::new();
    for (edge, ends) in endpoints.iter().enumerate() {
        let Some((source, target)) = *ends else {
            continue;
        };
        let scope = forest.routing_scope(source, target);
        let shape = if source == target {
            Shape::SelfLoop
        } else if forest.is_strict_ancestor(source, target) {
            Shape::Nested {
                outer_is_source: true,
            }
        } else if forest.is_strict_ancestor(target, source) {
            Shape::Nested {
                outer_is_source: false,
            }
        } else {
            layered_shape(source, target, scope, frames, grids, horizontal)
        };
        plans.push(RoutePlan {
            edge,
            source,
            target,
            scope,
            shape,
        });
    }
    plans
}

fn layered_shape(
    source: usize,
    target: usize,
    scope: Option<usize>,
    frames: &Frames<'_>,
    grids: &HashMap<Option<usize>, ScopeGrid>,
    horizontal: bool,
) -> Shape {
    let forest = frames.forest;
    let Some(grid) = grids.get(&scope) else {
        return Shape::Direct;
    };
    let lifted = (forest.lift(source, scope), forest.lift(target, scope));
    let (Some(from), Some(to)) = lifted else {
        return Shape::Direct;
    };
    let ranks = (grid.rank_of.get(&from), grid.rank_of.get(&to));
    let (Some(&from_rank), Some(&to_rank)) = ranks else {
        return Shape::Direct;
    };

    if to_rank > from_rank {
        Shape::Forward {
            mid: grid.spans[to_rank].0 - grid.gap_before(to_rank) / 2.0,
        }
    } else if to_rank < from_rank {
        Shape::Backward {
            exit: grid.spans[from_rank].1 + grid.gap_after(from_rank) / 2.0,
            entry: grid.spans[to_rank].0 - grid.gap_before(to_rank) / 2.0,
            far: grid.cross_end + grid.far_room() / 2.0,
        }
    } else {
        let from_box = AxisBox::of(&frames.local(from, scope), horizontal);
        let to_box = AxisBox::of(&frames.local(to, scope), horizontal);
        if from_box.cross <= to_box.cross {
            Shape::Lateral {
                source_side: Side::Far,
                target_side: Side::Near,
            }
        } else {
            Shape::Lateral {
                source_side: Side::Near,
                target_side: Side::Far,
            }
        }
    }
}

/// Offsets for every port sharing a node side, keyed by `(plan, end)`.
///
/// Ports are ordered by the position of the opposite endpoint so that
/// neighbouring routes do not cross right at the node.
fn spread_ports(
    plans: &[RoutePlan],
    frames: &Frames<'_>,
    spread: f32,
    horizontal: bool,
) -> HashMap<(usize, usize), f32> {
    let mut groups: HashMap<(usize, Side), Vec<(f32, usize, usize)>> = HashMap::new();
    for (plan_idx, plan) in plans.iter().enumerate() {
        for (end, port) in plan.ports().iter().enumerate() {
            let Some((node, side)) = *port else {
                continue;
            };
            let other = if end == 0 { plan.target } else { plan.source };
            let (main, cross) = from_xy(frames.absolute(other).center(), horizontal);
            let key = match side {
                Side::Leading | Side::Trailing => cross,
                Side::Near | Side::Far => main,
            };
            groups
                .entry((node, side))
                .or_default()
                .push((key, plan_idx, end));
        }
    }

    let mut offsets = HashMap::new();
    for ((node, side), mut group) in groups {
        group.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
        let side_len = AxisBox::of(&frames.absolute(node), horizontal).side_len(side);
        let slots = group.len() as f32 + 1.0;
        for (idx, (_, plan_idx, end)) in group.into_iter().enumerate() {
            let offset = side_len * spread * ((idx as f32 + 1.0) / slots - 0.5);
            offsets.insert((plan_idx, end), offset);
        }
    }
    offsets
}

fn verify_containment(
    graph: &Graph,
    forest: &Forest,
    frames: &Frames<'_>,
    config: &LayoutConfig,
) -> Result<()> {
    let pad = config.container_padding;
    let margins = (pad.top, pad.right, pad.bottom, pad.left);
    for (idx, parent) in forest.parent.iter().enumerate() {
        let Some(parent) = *parent else {
            continue;
        };
        let outer = frames.absolute(parent);
        let inner = frames.absolute(idx);
        if !outer.encloses(&inner, margins, CONTAINMENT_TOLERANCE) {
            return Err(LayoutError::ContainmentViolated {
                container: graph.nodes[parent].id.clone(),
                child: graph.nodes[idx].id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{EdgeIdCounter, build_graph};
    use crate::ir::{Direction, Node, NodeKind, SystemData};
    use crate::layout::geometry::box_of;
    use crate::layout::sizing::estimate_sizes;

    fn graph_from(input: &str) -> Graph {
        let data = SystemData::from_json(input).expect("fixture");
        let mut graph = build_graph(&data, &mut EdgeIdCounter::new());
        estimate_sizes(&mut graph, &LayoutConfig::default().sizing);
        graph
    }

    fn leaf(id: &str, parent: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            attributes: Vec::new(),
            parent_id: parent.map(str::to_string),
            depth: usize::from(parent.is_some()),
            kind: NodeKind::Leaf,
            width: 100.0,
            height: 50.0,
        }
    }

    fn run(graph: &Graph) -> Layout {
        HierarchicalLayout
            .compute(graph, &LayoutConfig::default())
            .expect("layout")
    }

    #[test]
    fn two_nodes_flow_left_to_right() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "a", "name": "A", "connections": ["b"] }, { "id": "b", "name": "B" }
            ] }"#,
        );
        let layout = run(&graph);
        let a = layout.node("a").expect("a");
        let b = layout.node("b").expect("b");
        assert!(a.right() < b.left());
        assert_eq!(a.y, b.y);
        assert!(!crate::layout::overlaps(&box_of(a), &box_of(b), 0.0));

        let edge = &layout.edges[0];
        assert_eq!(edge.id, "e0");
        assert_eq!(edge.points.first().copied(), Some((a.right(), a.y)));
        assert_eq!(edge.points.last().copied(), Some((b.left(), b.y)));
    }

    #[test]
    fn top_down_stacks_ranks_vertically() {
        let graph = graph_from(
            r#"{ "components": [ { "id": "a", "connections": ["b"] }, { "id": "b" } ] }"#,
        );
        let config = LayoutConfig {
            direction: Direction::TopDown,
            ..Default::default()
        };
        let layout = HierarchicalLayout.compute(&graph, &config).expect("layout");
        let a = layout.node("a").expect("a");
        let b = layout.node("b").expect("b");
        assert!(a.bottom() < b.top());
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn container_encloses_children_with_padding() {
        let graph = graph_from(
            r#"{ "components": [ { "id": "p", "name": "P", "components": [
                { "id": "c1", "name": "C1" }, { "id": "c2", "name": "C2" } ] } ] }"#,
        );
        let layout = run(&graph);
        let p = layout.node("p").expect("p");
        assert!(p.is_container);
        assert!(p.width >= 320.0);
        let pad = LayoutConfig::default().container_padding;
        for child in ["c1", "c2"] {
            let c = layout.node(child).expect("child");
            assert_eq!(c.parent_id.as_deref(), Some("p"));
            assert!(c.left() >= p.left() + pad.left - 1e-3);
            assert!(c.right() <= p.right() - pad.right + 1e-3);
            assert!(c.top() >= p.top() + pad.top - 1e-3);
            assert!(c.bottom() <= p.bottom() - pad.bottom + 1e-3);
        }
        let c1 = box_of(layout.node("c1").expect("c1"));
        let c2 = box_of(layout.node("c2").expect("c2"));
        assert!(!crate::layout::overlaps(&c1, &c2, 0.0));
    }

    #[test]
    fn three_levels_nest_and_route_across_scopes() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "outer", "components": [
                    { "id": "mid", "components": [
                        { "id": "leaf", "connections": ["other"] },
                        { "id": "leaf2" }
                    ] }
                ] },
                { "id": "other", "connections": ["leaf2"] }
            ] }"#,
        );
        let layout = run(&graph);
        let outer = box_of(layout.node("outer").expect("outer"));
        let mid = box_of(layout.node("mid").expect("mid"));
        let leaf = box_of(layout.node("leaf").expect("leaf"));
        assert!(outer.encloses(&mid, (60.0, 20.0, 20.0, 20.0), 1e-3));
        assert!(mid.encloses(&leaf, (60.0, 20.0, 20.0, 20.0), 1e-3));
        assert_eq!(layout.node("leaf").expect("leaf").depth, 2);

        // `outer` ranks before `other`, so the root scope routes both edges.
        let out_edge = layout.edge("e0").expect("e0");
        let first = out_edge.points[0];
        assert_eq!(first.0, leaf.right());
        let back_edge = layout.edge("e1").expect("e1");
        assert!(back_edge.points.len() >= 2);
        assert!(layout.width >= outer.right());
    }

    #[test]
    fn nested_edge_starts_on_container_border() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "p", "connections": ["c"], "components": [ { "id": "c" } ] }
            ] }"#,
        );
        let layout = run(&graph);
        let p = layout.node("p").expect("p");
        let c = layout.node("c").expect("c");
        let points = &layout.edges[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, p.left());
        assert_eq!(points[1].0, c.left());
    }

    #[test]
    fn dangling_edge_is_dropped() {
        let graph = graph_from(
            r#"{ "components": [ { "id": "a", "connections": ["ghost", "b"] }, { "id": "b" } ] }"#,
        );
        let layout = run(&graph);
        assert_eq!(layout.edges.len(), 1);
        assert_eq!(layout.edges[0].target, "b");
        assert_eq!(layout.nodes.len(), 2);
    }

    #[test]
    fn self_loop_and_backward_edges_are_routed() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "a", "connections": ["a", "b"] },
                { "id": "b", "connections": ["c"] },
                { "id": "c", "connections": ["a"] }
            ] }"#,
        );
        let layout = run(&graph);
        assert_eq!(layout.edges.len(), 4);
        let self_edge = &layout.edges[0];
        assert_eq!(self_edge.points.len(), 4);
        let back = layout.edges.iter().find(|e| e.source == "c").expect("c->a");
        assert!(back.points.len() >= 4);
        for edge in &layout.edges {
            for point in &edge.points {
                assert!(point.0 >= 0.0 && point.0 <= layout.width);
                assert!(point.1 >= 0.0 && point.1 <= layout.height);
            }
        }
    }

    #[test]
    fn duplicate_ids_fail() {
        let mut graph = Graph::new();
        graph.nodes.push(leaf("a", None));
        graph.nodes.push(leaf("a", None));
        let err = HierarchicalLayout
            .compute(&graph, &LayoutConfig::default())
            .expect_err("duplicate");
        assert_eq!(err, LayoutError::DuplicateNode { id: "a".into() });
    }

    #[test]
    fn parent_cycle_fails() {
        let mut graph = Graph::new();
        graph.nodes.push(leaf("a", Some("b")));
        graph.nodes.push(leaf("b", Some("a")));
        let err = HierarchicalLayout
            .compute(&graph, &LayoutConfig::default())
            .expect_err("cycle");
        assert!(matches!(err, LayoutError::ParentCycle { .. }));
    }

    #[test]
    fn unknown_parent_is_demoted_to_top_level() {
        let mut graph = Graph::new();
        graph.nodes.push(leaf("a", Some("missing")));
        let layout = run(&graph);
        let a = layout.node("a").expect("a");
        assert!(a.parent_id.is_none());
        assert_eq!(a.depth, 0);
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut graph = Graph::new();
        let mut node = leaf("a", None);
        node.height = 0.0;
        graph.nodes.push(node);
        let err = HierarchicalLayout
            .compute(&graph, &LayoutConfig::default())
            .expect_err("size");
        assert!(matches!(err, LayoutError::InvalidNodeSize { .. }));
    }

    #[test]
    fn repeated_runs_match() {
        let input = r#"{ "components": [
            { "id": "x", "connections": ["y", "z"],
              "components": [ { "id": "x1", "connections": ["z"] } ] },
            { "id": "y", "connections": ["z"] },
            { "id": "z" }
        ] }"#;
        let first = run(&graph_from(input));
        let second = run(&graph_from(input));
        assert_eq!(first, second);
    }

    #[test]
    fn shared_side_ports_are_spread() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "hub", "connections": ["a", "b"] }, { "id": "a" }, { "id": "b" }
            ] }"#,
        );
        let layout = run(&graph);
        let starts: Vec<Point> = layout.edges.iter().map(|e| e.points[0]).collect();
        assert_eq!(starts.len(), 2);
        assert_ne!(starts[0].1, starts[1].1);
    }

    #[test]
    fn skip_edge_routes_around_middle_rank() {
        let graph = graph_from(
            r#"{ "components": [
                { "id": "a", "connections": ["b", "c"] },
                { "id": "b", "connections": ["c"] },
                { "id": "c" }
            ] }"#,
        );
        let layout = run(&graph);
        let a = layout.node("a").expect("a");
        let b = box_of(layout.node("b").expect("b"));
        let c = layout.node("c").expect("c");
        let skip = layout
            .edges
            .iter()
            .find(|e| e.source == "a" && e.target == "c")
            .expect("a->c");
        for leg in skip.points.windows(2) {
            assert!(!segment_intersects_rect(leg[0], leg[1], &b), "{leg:?} crosses b");
        }
        let first = skip.points[0];
        let last = skip.points[skip.points.len() - 1];
        assert_eq!(first.0, a.right());
        assert_eq!(last.0, c.left());
        for point in &skip.points {
            assert!(point.0 >= 0.0 && point.0 <= layout.width);
            assert!(point.1 >= 0.0 && point.1 <= layout.height);
        }
    }

    #[test]
    fn container_edge_to_child_avoids_sibling() {
        let graph = graph_from(
            r#"{ "components": [ { "id": "p", "connections": ["c2"], "components": [
                { "id": "c1", "connections": ["c2"] }, { "id": "c2" } ] } ] }"#,
        );
        let layout = run(&graph);
        let p = layout.node("p").expect("p");
        let c1 = box_of(layout.node("c1").expect("c1"));
        let c2 = layout.node("c2").expect("c2");
        let edge = layout
            .edges
            .iter()
            .find(|e| e.source == "p")
            .expect("p->c2");
        for leg in edge.points.windows(2) {
            assert!(!segment_intersects_rect(leg[0], leg[1], &c1), "{leg:?} crosses c1");
        }
        assert_eq!(edge.points[0].0, p.left());
        assert_eq!(edge.points[edge.points.len() - 1].0, c2.left());
    }
}
