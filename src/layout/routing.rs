use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::debug;

use super::geometry::{Point, Rect, compress_path};
use super::geometry::{point_segment_distance, segment_intersects_rect};
use crate::config::RoutingConfig;

// ── Compass probes ──────────────────────────────────────────────────

const DIAGONAL: f32 = std::f32::consts::FRAC_1_SQRT_2;

const COMPASS: [(f32, f32); 8] = [
    (0.0, -1.0),
    (DIAGONAL, -DIAGONAL),
    (1.0, 0.0),
    (DIAGONAL, DIAGONAL),
    (0.0, 1.0),
    (-DIAGONAL, DIAGONAL),
    (-1.0, 0.0),
    (-DIAGONAL, -DIAGONAL),
];

const SAME_POINT_EPS: f32 = 1e-3;

/// Point on the border of `rect` where the ray from its center toward
/// `toward` leaves the box.
pub fn nearest_border_point(rect: &Rect, toward: Point) -> Point {
    let (cx, cy) = rect.center();
    let dx = toward.0 - cx;
    let dy = toward.1 - cy;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        return (cx, cy);
    }
    let half_w = rect.width / 2.0;
    let half_h = rect.height / 2.0;
    let mut candidates: Vec<Point> = Vec::with_capacity(4);
    if dx.abs() > f32::EPSILON {
        for side in [-half_w, half_w] {
            let t = side / dx;
            let y = cy + t * dy;
            if t > 0.0 && (y - cy).abs() <= half_h + 1e-4 {
                candidates.push((cx + side, y));
            }
        }
    }
    if dy.abs() > f32::EPSILON {
        for side in [-half_h, half_h] {
            let t = side / dy;
            let x = cx + t * dx;
            if t > 0.0 && (x - cx).abs() <= half_w + 1e-4 {
                candidates.push((x, cy + side));
            }
        }
    }
    let dist = |p: &Point| (p.0 - toward.0).powi(2) + (p.1 - toward.1).powi(2);
    candidates
        .into_iter()
        .min_by(|a, b| dist(a).partial_cmp(&dist(b)).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((cx, cy))
}

/// Routes a polyline from `source` to `target` that detours around
/// `obstacles` through compass waypoints.
///
/// Always returns at least two points. When no free probe exists the
/// remaining leg is drawn straight.
pub fn route(
    source: &Rect,
    target: &Rect,
    obstacles: &[Rect],
    config: &RoutingConfig,
) -> Vec<Point> {
    let source_center = source.center();
    let target_center = target.center();
    if (source_center.0 - target_center.0).abs() < SAME_POINT_EPS
        && (source_center.1 - target_center.1).abs() < SAME_POINT_EPS
    {
        return vec![source_center, target_center];
    }

    let start = nearest_border_point(source, target_center);
    let end = nearest_border_point(target, source_center);
    let pad = config.obstacle_padding.max(0.0);
    let inflated: Vec<Rect> = obstacles.iter().map(|rect| rect.inflate(pad)).collect();

    let mut points = vec![start];
    let mut used: Vec<Point> = Vec::new();
    // Obstacles already detoured once are tested at their raw bounds.
    let mut detoured: Vec<usize> = Vec::new();
    let mut current = start;

    while used.len() < config.max_waypoints {
        let blocker = obstacles
            .iter()
            .enumerate()
            .filter(|(idx, rect)| {
                let bounds = if detoured.contains(idx) {
                    *rect
                } else {
                    &inflated[*idx]
                };
                segment_intersects_rect(current, end, bounds)
            })
            .map(|(idx, rect)| (point_segment_distance(rect.center(), current, end), idx))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let Some((_, blocker)) = blocker else {
            break;
        };

        match probe_waypoint(&obstacles[blocker], current, end, obstacles, &used, pad) {
            Some(waypoint) => {
                points.push(waypoint);
                used.push(waypoint);
                if !detoured.contains(&blocker) {
                    detoured.push(blocker);
                }
                current = waypoint;
            }
            None => {
                debug!("no free compass probe; keeping direct leg");
                break;
            }
        }
    }

    points.push(end);
    compress_path(&points)
}

fn probe_waypoint(
    blocker: &Rect,
    from: Point,
    to: Point,
    obstacles: &[Rect],
    used: &[Point],
    pad: f32,
) -> Option<Point> {
    let (cx, cy) = blocker.center();
    let radius = blocker.width.max(blocker.height) / 2.0 + pad;
    let seg = (to.0 - from.0, to.1 - from.1);
    let seg_len = (seg.0 * seg.0 + seg.1 * seg.1).sqrt().max(f32::EPSILON);
    // Probes most perpendicular to the blocked segment come first.
    let mut ranked: Vec<(f32, usize)> = COMPASS
        .iter()
        .enumerate()
        .map(|(idx, dir)| (((dir.0 * seg.0 + dir.1 * seg.1) / seg_len).abs(), idx))
        .collect();
    ranked.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    ranked.into_iter().find_map(|(_, idx)| {
        let (dx, dy) = COMPASS[idx];
        let probe = (cx + dx * radius, cy + dy * radius);
        let blocked = obstacles.iter().any(|rect| rect.contains_point(probe));
        let repeated = used.iter().any(|p| {
            (p.0 - probe.0).abs() < SAME_POINT_EPS && (p.1 - probe.1).abs() < SAME_POINT_EPS
        });
        (!blocked && !repeated).then_some(probe)
    })
}

/// Routes between two named boxes, treating every other box as an obstacle.
///
/// Returns `None` when either endpoint has no box.
pub fn route_between(
    source_id: &str,
    target_id: &str,
    boxes: &BTreeMap<String, Rect>,
    config: &RoutingConfig,
) -> Option<Vec<Point>> {
    let source = boxes.get(source_id)?;
    let target = boxes.get(target_id)?;
    let obstacles: Vec<Rect> = boxes
        .iter()
        .filter(|(id, _)| id.as_str() != source_id && id.as_str() != target_id)
        .map(|(_, rect)| *rect)
        .collect();
    Some(route(source, target, &obstacles, config))
}

// ── Orthogonal grid search ──────────────────────────────────────────

const GRID_DIRS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
const STEP_COST: u32 = 10;
const TURN_COST: u32 = 20;

/// One orthogonal route to find between two ports inside `bounds`.
///
/// `start_dir` is the axis the route leaves `start` along, `end_dir` the
/// axis it arrives at `end` along, both as unit steps.
#[derive(Debug, Clone, Copy)]
pub(super) struct GridRequest<'a> {
    pub bounds: Rect,
    pub obstacles: &'a [Rect],
    pub start: Point,
    pub start_dir: (i32, i32),
    pub end: Point,
    pub end_dir: (i32, i32),
}

#[derive(Debug, Clone)]
struct RoutingGrid {
    min_x: f32,
    min_y: f32,
    cell_w: f32,
    cell_h: f32,
    cols: i32,
    rows: i32,
    blocked: Vec<bool>,
}

impl RoutingGrid {
    /// Grid covering `bounds` exactly; a cell is blocked when it overlaps an
    /// obstacle inflated by half a cell.
    fn new(bounds: &Rect, obstacles: &[Rect], cell: f32, max_cells: usize) -> Option<Self> {
        if !bounds.is_finite() || !cell.is_finite() || cell <= 0.0 {
            return None;
        }
        let cols = (bounds.width / cell).round().max(1.0);
        let rows = (bounds.height / cell).round().max(1.0);
        if cols * rows > max_cells as f32 {
            return None;
        }
        let (cols, rows) = (cols as i32, rows as i32);
        let mut grid = Self {
            min_x: bounds.x,
            min_y: bounds.y,
            cell_w: bounds.width / cols as f32,
            cell_h: bounds.height / rows as f32,
            cols,
            rows,
            blocked: vec![false; (cols * rows) as usize],
        };
        for obstacle in obstacles {
            let area = obstacle.inflate(cell / 2.0);
            let (x0, x1) = cell_span(area.x, area.right(), grid.min_x, grid.cell_w, cols);
            let (y0, y1) = cell_span(area.y, area.bottom(), grid.min_y, grid.cell_h, rows);
            for iy in y0..y1 {
                for ix in x0..x1 {
                    let idx = grid.index(ix, iy);
                    grid.blocked[idx] = true;
                }
            }
        }
        Some(grid)
    }

    fn index(&self, ix: i32, iy: i32) -> usize {
        (iy * self.cols + ix) as usize
    }

    fn cell_for_point(&self, point: Point) -> Option<(i32, i32)> {
        let ix = ((point.0 - self.min_x) / self.cell_w).floor() as i32;
        let iy = ((point.1 - self.min_y) / self.cell_h).floor() as i32;
        if ix < 0 || iy < 0 || ix >= self.cols || iy >= self.rows {
            return None;
        }
        Some((ix, iy))
    }

    fn cell_center(&self, ix: i32, iy: i32) -> Point {
        (
            self.min_x + (ix as f32 + 0.5) * self.cell_w,
            self.min_y + (iy as f32 + 0.5) * self.cell_h,
        )
    }
}

/// Half-open range of cells strictly overlapping `[lo, hi]` on one axis.
fn cell_span(lo: f32, hi: f32, origin: f32, size: f32, count: i32) -> (i32, i32) {
    let first = ((lo - origin) / size).floor().max(0.0) as i32;
    let last = ((hi - origin) / size).ceil().min(count as f32) as i32;
    (first.min(count), last.max(0))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridState {
    x: i32,
    y: i32,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    cost: u32,
    state: GridState,
}

impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| self.state.y.cmp(&other.state.y))
            .then_with(|| self.state.x.cmp(&other.state.x))
            .then_with(|| self.state.dir.cmp(&other.state.dir))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search for an orthogonal path from `request.start` to `request.end`
/// that keeps clear of every obstacle.
///
/// Returns `None` when the grid would be too large or when the obstacles
/// wall the end off.
pub(super) fn route_on_grid(
    request: &GridRequest<'_>,
    config: &RoutingConfig,
) -> Option<Vec<Point>> {
    let cell = config.grid_cell;
    let grid = RoutingGrid::new(&request.bounds, request.obstacles, cell, config.max_grid_cells)?;
    let (sx, sy) = request.start_dir;
    let (ex, ey) = request.end_dir;
    let half = cell / 2.0;
    let start_anchor = (request.start.0 + sx as f32 * half, request.start.1 + sy as f32 * half);
    let end_anchor = (request.end.0 - ex as f32 * half, request.end.1 - ey as f32 * half);
    let (start_ix, start_iy) = grid.cell_for_point(start_anchor)?;
    let (end_ix, end_iy) = grid.cell_for_point(end_anchor)?;

    let cols = grid.cols;
    let states = grid.blocked.len() * 4;
    let mut best_cost = vec![u32::MAX; states];
    let mut prev: Vec<Option<GridState>> = vec![None; states];
    let mut heap = BinaryHeap::new();
    let slot = |state: GridState| ((state.y * cols + state.x) as usize) * 4 + state.dir as usize;

    for dir in 0..4u8 {
        let state = GridState {
            x: start_ix,
            y: start_iy,
            dir,
        };
        best_cost[slot(state)] = 0;
        heap.push(GridEntry {
            est: 0,
            cost: 0,
            state,
        });
    }

    let mut end_state = None;
    while let Some(GridEntry { cost, state, .. }) = heap.pop() {
        if cost != best_cost[slot(state)] {
            continue;
        }
        if state.x == end_ix && state.y == end_iy {
            end_state = Some(state);
            break;
        }
        for (dir, (dx, dy)) in GRID_DIRS.iter().enumerate() {
            let nx = state.x + dx;
            let ny = state.y + dy;
            if nx < 0 || ny < 0 || nx >= cols || ny >= grid.rows {
                continue;
            }
            let open = (nx == end_ix && ny == end_iy) || (nx == start_ix && ny == start_iy);
            if !open && grid.blocked[grid.index(nx, ny)] {
                continue;
            }
            let mut next_cost = cost.saturating_add(STEP_COST);
            if state.dir != dir as u8 {
                next_cost = next_cost.saturating_add(TURN_COST);
            }
            let next = GridState {
                x: nx,
                y: ny,
                dir: dir as u8,
            };
            if next_cost >= best_cost[slot(next)] {
                continue;
            }
            best_cost[slot(next)] = next_cost;
            prev[slot(next)] = Some(state);
            let manhattan = (nx - end_ix).unsigned_abs() + (ny - end_iy).unsigned_abs();
            heap.push(GridEntry {
                est: next_cost.saturating_add(manhattan.saturating_mul(STEP_COST)),
                cost: next_cost,
                state: next,
            });
        }
    }

    let mut cursor = end_state?;
    let mut cells = vec![(cursor.x, cursor.y)];
    while let Some(before) = prev[slot(cursor)] {
        cells.push((before.x, before.y));
        cursor = before;
    }
    cells.reverse();

    let mut points = Vec::with_capacity(cells.len() + 4);
    points.push(request.start);
    let (fx, fy) = grid.cell_center(start_ix, start_iy);
    points.push(if sx != 0 { (fx, request.start.1) } else { (request.start.0, fy) });
    points.extend(cells.iter().map(|&(ix, iy)| grid.cell_center(ix, iy)));
    let (lx, ly) = grid.cell_center(end_ix, end_iy);
    points.push(if ex != 0 { (lx, request.end.1) } else { (request.end.0, ly) });
    points.push(request.end);
    Some(compress_path(&points))
}

/// Loop leaving and re-entering one box around its trailing side.
pub fn self_loop(rect: &Rect, pad: f32, horizontal: bool) -> Vec<Point> {
    let (cx, cy) = rect.center();
    if horizontal {
        let x = rect.right();
        let y1 = cy - rect.height / 4.0;
        let y2 = cy + rect.height / 4.0;
        vec![(x, y1), (x + pad, y1), (x + pad, y2), (x, y2)]
    } else {
        let y = rect.bottom();
        let x1 = cx - rect.width / 4.0;
        let x2 = cx + rect.width / 4.0;
        vec![(x1, y), (x1, y + pad), (x2, y + pad), (x2, y)]
    }
}
