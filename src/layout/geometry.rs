// Axis-aligned boxes and segment tests shared by the layout strategies,
// the connection router, and label placement.

use std::collections::BTreeMap;

use super::NodeLayout;

pub type Point = (f32, f32);

const EPS: f32 = 1e-6;

/// Axis-aligned box stored as top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn inflate(&self, pad: f32) -> Rect {
        Rect::new(
            self.x - pad,
            self.y - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }

    /// Strict interior test; points on the border are outside.
    pub fn contains_point(&self, point: Point) -> bool {
        point.0 > self.x && point.0 < self.right() && point.1 > self.y && point.1 < self.bottom()
    }

    /// True when `other` lies inside `self` with at least the given margins,
    /// within `tolerance`.
    pub fn encloses(
        &self,
        other: &Rect,
        margins: (f32, f32, f32, f32),
        tolerance: f32,
    ) -> bool {
        let (top, right, bottom, left) = margins;
        other.x + tolerance >= self.x + left
            && other.y + tolerance >= self.y + top
            && other.right() <= self.right() - right + tolerance
            && other.bottom() <= self.bottom() - bottom + tolerance
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }
}

pub fn box_of(node: &NodeLayout) -> Rect {
    Rect::from_center(node.x, node.y, node.width, node.height)
}

pub fn boxes_of(nodes: &[NodeLayout]) -> BTreeMap<String, Rect> {
    nodes
        .iter()
        .map(|node| (node.id.clone(), box_of(node)))
        .collect()
}

/// Strict intersection test with both boxes kept apart by `padding`.
///
/// Symmetric in `a` and `b`. Boxes that only touch do not overlap.
pub fn overlaps(a: &Rect, b: &Rect, padding: f32) -> bool {
    let pad = padding.max(0.0);
    a.x < b.x + b.width + pad
        && b.x < a.x + a.width + pad
        && a.y < b.y + b.height + pad
        && b.y < a.y + a.height + pad
}

pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    }
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        c.0 >= a.0.min(b.0) - EPS
            && c.0 <= a.0.max(b.0) + EPS
            && c.1 >= a.1.min(b.1) - EPS
            && c.1 <= a.1.max(b.1) + EPS
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0)
        && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0)
    {
        return true;
    }
    (o1.abs() <= EPS && on_segment(a, b, c))
        || (o2.abs() <= EPS && on_segment(a, b, d))
        || (o3.abs() <= EPS && on_segment(c, d, a))
        || (o4.abs() <= EPS && on_segment(c, d, b))
}

pub fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let min_x = a.0.min(b.0);
    let max_x = a.0.max(b.0);
    let min_y = a.1.min(b.1);
    let max_y = a.1.max(b.1);
    if max_x < rect.x || min_x > rect.right() || max_y < rect.y || min_y > rect.bottom() {
        return false;
    }
    let inside = |p: Point| {
        p.0 >= rect.x && p.0 <= rect.right() && p.1 >= rect.y && p.1 <= rect.bottom()
    };
    if inside(a) || inside(b) {
        return true;
    }
    let corners = [
        (rect.x, rect.y),
        (rect.right(), rect.y),
        (rect.right(), rect.bottom()),
        (rect.x, rect.bottom()),
    ];
    (0..4).any(|idx| segments_intersect(a, b, corners[idx], corners[(idx + 1) % 4]))
}

pub fn point_segment_distance(point: Point, a: Point, b: Point) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= EPS {
        0.0
    } else {
        (((point.0 - a.0) * dx + (point.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let px = a.0 + t * dx;
    let py = a.1 + t * dy;
    ((point.0 - px).powi(2) + (point.1 - py).powi(2)).sqrt()
}

/// Drops repeated points and interior points of straight runs.
pub fn compress_path(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let same = |a: Point, b: Point| (a.0 - b.0).abs() <= 1e-4 && (a.1 - b.1).abs() <= 1e-4;
    let mut deduped: Vec<Point> = Vec::with_capacity(points.len());
    for &point in points {
        if deduped.last().is_none_or(|&last| !same(last, point)) {
            deduped.push(point);
        }
    }
    if deduped.len() < 2 {
        return vec![points[0], points[points.len() - 1]];
    }
    let mut out: Vec<Point> = Vec::with_capacity(deduped.len());
    out.push(deduped[0]);
    for idx in 1..deduped.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = deduped[idx];
        let next = deduped[idx + 1];
        let vertical = (curr.0 - prev.0).abs() <= 1e-4 && (next.0 - curr.0).abs() <= 1e-4;
        let horizontal = (curr.1 - prev.1).abs() <= 1e-4 && (next.1 - curr.1).abs() <= 1e-4;
        if vertical || horizontal {
            continue;
        }
        out.push(curr);
    }
    out.push(deduped[deduped.len() - 1]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f32, y: f32, width: f32, height: f32) -> NodeLayout {
        NodeLayout {
            id: id.to_string(),
            name: id.to_string(),
            parent_id: None,
            depth: 0,
            x,
            y,
            width,
            height,
            is_container: false,
        }
    }

    #[test]
    fn box_of_converts_center_to_corner() {
        let rect = box_of(&node("a", 100.0, 50.0, 40.0, 20.0));
        assert_eq!(rect, Rect::new(80.0, 40.0, 40.0, 20.0));
        assert_eq!(rect.center(), (100.0, 50.0));
    }

    #[test]
    fn boxes_of_keys_by_id() {
        let boxes = boxes_of(&[node("a", 0.0, 0.0, 2.0, 2.0), node("b", 5.0, 5.0, 2.0, 2.0)]);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes["b"], Rect::new(4.0, 4.0, 2.0, 2.0));
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!overlaps(&a, &b, 0.0));
        assert!(overlaps(&a, &b, 0.5));
    }

    #[test]
    fn overlap_is_symmetric() {
        let boxes = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(5.0, 5.0, 10.0, 10.0),
            Rect::new(12.0, 0.0, 4.0, 4.0),
            Rect::new(-20.0, -20.0, 5.0, 50.0),
            Rect::new(2.0, 2.0, 1.0, 1.0),
        ];
        for a in &boxes {
            for b in &boxes {
                for pad in [0.0, 1.0, 2.5, 10.0] {
                    assert_eq!(overlaps(a, b, pad), overlaps(b, a, pad));
                }
            }
        }
    }

    #[test]
    fn negative_padding_is_clamped() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(overlaps(&a, &b, -100.0));
    }

    #[test]
    fn segment_through_rect_is_detected() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(segment_intersects_rect((0.0, 20.0), (40.0, 20.0), &rect));
        assert!(!segment_intersects_rect((0.0, 40.0), (40.0, 40.0), &rect));
    }

    #[test]
    fn encloses_respects_margins() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        let inner = Rect::new(20.0, 60.0, 60.0, 20.0);
        assert!(outer.encloses(&inner, (60.0, 20.0, 20.0, 20.0), 0.0));
        assert!(!outer.encloses(&inner, (61.0, 20.0, 20.0, 20.0), 0.0));
    }

    #[test]
    fn compress_path_drops_straight_runs() {
        let path = vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (10.0, 10.0), (10.0, 10.0)];
        assert_eq!(compress_path(&path), vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
    }

    #[test]
    fn compress_path_keeps_two_points_for_degenerate_input() {
        let path = vec![(3.0, 3.0), (3.0, 3.0), (3.0, 3.0)];
        assert_eq!(compress_path(&path), vec![(3.0, 3.0), (3.0, 3.0)]);
    }
}
