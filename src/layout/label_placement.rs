// Edge label anchors. Works on finished layouts only; pure geometry.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::Layout;
use super::geometry::{Point, Rect, box_of, overlaps};
use crate::config::LabelConfig;

/// Box a label of `text` needs, from a fixed character width.
pub fn estimate_label_size(text: &str, config: &LabelConfig) -> (f32, f32) {
    let lines: Vec<&str> = text.lines().collect();
    let longest = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    let rows = lines.len().max(1);
    (
        longest as f32 * config.char_width + config.padding_x * 2.0,
        rows as f32 * config.line_height + config.padding_y * 2.0,
    )
}

/// Finds a label center near the middle of `points` that keeps a
/// `label_w` x `label_h` box clear of every obstacle.
///
/// Candidates walk along the middle segment, forward then backward, one
/// `step` at a time. Returns `None` once `max_attempts` steps are used up.
pub fn place_label(
    points: &[Point],
    obstacles: &[Rect],
    label_w: f32,
    label_h: f32,
    config: &LabelConfig,
) -> Option<Point> {
    if points.len() < 2 {
        return None;
    }
    let mid = points.len() / 2;
    let (p1, p2) = (points[mid - 1], points[mid]);
    let anchor = ((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0);
    let dx = p2.0 - p1.0;
    let dy = p2.1 - p1.1;
    let len = (dx * dx + dy * dy).sqrt();
    let dir = if len > f32::EPSILON {
        (dx / len, dy / len)
    } else {
        (0.0, 0.0)
    };

    let clear = |center: Point| {
        let rect = Rect::from_center(center.0, center.1, label_w, label_h);
        !obstacles
            .iter()
            .any(|obstacle| overlaps(&rect, obstacle, config.padding))
    };

    for attempt in 0..config.max_attempts {
        let shift = config.step * attempt as f32;
        let forward = (anchor.0 + dir.0 * shift, anchor.1 + dir.1 * shift);
        if clear(forward) {
            return Some(forward);
        }
        if attempt == 0 {
            continue;
        }
        let backward = (anchor.0 - dir.0 * shift, anchor.1 - dir.1 * shift);
        if clear(backward) {
            return Some(backward);
        }
    }
    None
}

/// Fills `label_anchor` for every labeled edge of `layout`.
///
/// Containers enclosing either endpoint are not obstacles; the label of an
/// edge inside a container is expected to sit inside it.
pub fn resolve_label_positions(layout: &mut Layout, config: &LabelConfig) {
    let parents: HashMap<&str, &str> = layout
        .nodes
        .iter()
        .filter_map(|node| Some((node.id.as_str(), node.parent_id.as_deref()?)))
        .collect();
    let enclosing = |id: &str| {
        let mut found = HashSet::new();
        let mut cursor = parents.get(id).copied();
        while let Some(up) = cursor {
            if !found.insert(up.to_string()) {
                break;
            }
            cursor = parents.get(up).copied();
        }
        found
    };

    let mut anchors: Vec<Option<Point>> = Vec::with_capacity(layout.edges.len());
    for edge in &layout.edges {
        let Some(text) = edge.label.as_deref().filter(|t| !t.trim().is_empty()) else {
            anchors.push(None);
            continue;
        };
        let mut skip = enclosing(&edge.source);
        skip.extend(enclosing(&edge.target));
        let obstacles: Vec<Rect> = layout
            .nodes
            .iter()
            .filter(|node| !skip.contains(&node.id))
            .map(box_of)
            .collect();
        let (w, h) = estimate_label_size(text, config);
        let anchor = place_label(&edge.points, &obstacles, w, h, config);
        if anchor.is_none() {
            debug!(edge = %edge.id, "no free label position; omitting anchor");
        }
        anchors.push(anchor);
    }

    for (edge, anchor) in layout.edges.iter_mut().zip(anchors) {
        edge.label_anchor = anchor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_segment_uses_midpoint() {
        let cfg = LabelConfig::default();
        let anchor = place_label(&[(0.0, 0.0), (100.0, 0.0)], &[], 20.0, 10.0, &cfg);
        assert_eq!(anchor, Some((50.0, 0.0)));
    }

    #[test]
    fn middle_segment_of_longer_route() {
        let cfg = LabelConfig::default();
        let points = [(0.0, 0.0), (0.0, 50.0), (100.0, 50.0), (100.0, 100.0)];
        let anchor = place_label(&points, &[], 20.0, 10.0, &cfg);
        assert_eq!(anchor, Some((50.0, 50.0)));
    }

    #[test]
    fn blocked_midpoint_steps_along_segment() {
        let cfg = LabelConfig {
            padding: 0.0,
            ..Default::default()
        };
        // Blocks x in [90, 110]; a 10-wide label first clears it at x = 120.
        let block = Rect::new(90.0, -5.0, 20.0, 10.0);
        let anchor = place_label(&[(0.0, 0.0), (200.0, 0.0)], &[block], 10.0, 10.0, &cfg);
        assert_eq!(anchor, Some((120.0, 0.0)));
    }

    #[test]
    fn exhausted_probes_return_none() {
        let cfg = LabelConfig::default();
        let wall = Rect::new(-1000.0, -1000.0, 2000.0, 2000.0);
        let anchor = place_label(&[(0.0, 0.0), (100.0, 0.0)], &[wall], 20.0, 10.0, &cfg);
        assert_eq!(anchor, None);
    }

    #[test]
    fn single_point_has_no_anchor() {
        let cfg = LabelConfig::default();
        assert_eq!(place_label(&[(1.0, 1.0)], &[], 5.0, 5.0, &cfg), None);
    }

    #[test]
    fn label_size_grows_with_text() {
        let cfg = LabelConfig::default();
        let (short_w, short_h) = estimate_label_size("db", &cfg);
        let (long_w, _) = estimate_label_size("postgres-primary", &cfg);
        let (_, tall_h) = estimate_label_size("a\nb", &cfg);
        assert!(long_w > short_w);
        assert!(tall_h > short_h);
        assert_eq!(short_w, 2.0 * 7.0 + 16.0);
    }
}
