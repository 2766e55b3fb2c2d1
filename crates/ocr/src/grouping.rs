//! Horizontal banding of words once the page has been deskewed.

use crate::cluster::median_height;
use crate::config::LayoutConfig;
use crate::geometry::FittedLine;
use crate::types::{Line, Point, Word};

/// Maximum rotated-y distance from the first word of a band.
pub fn band_tolerance(words: &[Word], config: &LayoutConfig) -> f64 {
    config.post_y_tol_factor * median_height(words, config.fallback_height)
}

/// Group words into horizontal bands using their rotated centroids.
///
/// A band is anchored at its first (topmost) word; it never recenters, so a
/// slow drift in y eventually starts a new band. Words without a rotated
/// centroid are treated as already upright.
pub fn group_horizontal_lines(words: &[Word], config: &LayoutConfig) -> Vec<Line> {
    if words.is_empty() {
        return Vec::new();
    }
    let y_tol = band_tolerance(words, config);

    let mut order: Vec<usize> = (0..words.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (words[a].rotated_centroid(), words[b].rotated_centroid());
        pa.y.total_cmp(&pb.y).then(pa.x.total_cmp(&pb.x))
    });

    let mut bands: Vec<Vec<usize>> = Vec::new();
    for i in order {
        let y = words[i].rotated_centroid().y;
        match bands.last_mut() {
            Some(band) if (y - words[band[0]].rotated_centroid().y).abs() <= y_tol => band.push(i),
            _ => bands.push(vec![i]),
        }
    }

    let mut lines: Vec<Line> = bands.into_iter().map(|band| build_band(words, band)).collect();
    lines.sort_by(|a, b| a.center.y.total_cmp(&b.center.y));
    lines
}

fn build_band(words: &[Word], mut band: Vec<usize>) -> Line {
    let points: Vec<Point> = band.iter().map(|&i| words[i].rotated_centroid()).collect();
    let fit = FittedLine::fit(&points);
    band.sort_by(|&a, &b| words[a].rotated_centroid().x.total_cmp(&words[b].rotated_centroid().x));
    let members: Vec<Word> = band.into_iter().map(|i| words[i].clone()).collect();
    Line::from_ordered(members, fit, true)
}
