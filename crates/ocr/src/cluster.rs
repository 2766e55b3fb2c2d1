//! Slope-aware line clustering on the original, un-rotated word centroids.
//!
//! Greedy and order dependent: seeds are taken top to bottom, left to right,
//! and each seed's line swallows every remaining word within tolerance before
//! the next seed is chosen.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::LayoutConfig;
use crate::geometry::{upper_median, FittedLine};
use crate::types::{Line, Point, Word};

/// Median positive word height, or `fallback` when none is positive.
pub(crate) fn median_height(words: &[Word], fallback: f64) -> f64 {
    let heights: Vec<f64> = words.iter().map(|w| w.height).filter(|h| *h > 0.0).collect();
    upper_median(&heights).unwrap_or(fallback)
}

/// Order `members` along `fit`, anchored at the member with the smallest x.
pub(crate) fn order_along(
    words: &[Word],
    members: &BTreeSet<usize>,
    fit: &FittedLine,
    rotated: bool,
) -> Vec<Word> {
    let pos = |i: usize| if rotated { words[i].rotated_centroid() } else { words[i].centroid() };
    let Some(origin) = members.iter().map(|&i| pos(i)).min_by(|a, b| a.x.total_cmp(&b.x)) else {
        return Vec::new();
    };
    let mut ordered: Vec<usize> = members.iter().copied().collect();
    ordered.sort_by(|&a, &b| fit.project(origin, pos(a)).total_cmp(&fit.project(origin, pos(b))));
    ordered.into_iter().map(|i| words[i].clone()).collect()
}

fn inliers_of(
    words: &[Word],
    pool: &BTreeSet<usize>,
    fit: &FittedLine,
    tol: f64,
    into: &mut BTreeSet<usize>,
) {
    into.extend(pool.iter().copied().filter(|&k| fit.distance(words[k].centroid()) <= tol));
}

/// Group words into lines that may each carry their own tilt.
///
/// Lines come back sorted by the vertical position of their center.
pub fn cluster_tilted_lines(words: &[Word], config: &LayoutConfig) -> Vec<Line> {
    if words.is_empty() {
        return Vec::new();
    }
    let h_med = median_height(words, config.fallback_height);
    let perp_tol = config.perp_tol_factor * h_med;
    let band = config.seed_band_factor * h_med;

    let mut order: Vec<usize> = (0..words.len()).collect();
    order.sort_by(|&a, &b| {
        words[a]
            .cy
            .total_cmp(&words[b].cy)
            .then(words[a].cx.total_cmp(&words[b].cx))
    });
    let mut remaining: BTreeSet<usize> = order.iter().copied().collect();
    let mut lines = Vec::new();

    for &seed in &order {
        if !remaining.remove(&seed) {
            continue;
        }
        let sp = words[seed].centroid();

        let mut candidates: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&j| (words[j].cy - sp.y).abs() <= band)
            .collect();
        if candidates.is_empty() {
            if config.allow_singleton {
                let fit = FittedLine::horizontal_through(sp);
                let members = BTreeSet::from([seed]);
                let ordered = order_along(words, &members, &fit, false);
                lines.push(Line::from_ordered(ordered, fit, false));
            }
            continue;
        }
        let dx = |k: usize| (words[k].cx - sp.x).abs();
        candidates.sort_by(|&a, &b| dx(a).total_cmp(&dx(b)));
        candidates.truncate(config.seed_candidate_cap);

        let mut best: Option<BTreeSet<usize>> = None;
        for &j in &candidates {
            let trial = FittedLine::through(sp, words[j].centroid());
            let mut inliers = BTreeSet::from([seed, j]);
            inliers_of(words, &remaining, &trial, perp_tol, &mut inliers);
            if best.as_ref().map_or(true, |b| inliers.len() > b.len()) {
                best = Some(inliers);
            }
        }
        let Some(mut members) = best else { continue };

        let points: Vec<Point> = members.iter().map(|&i| words[i].centroid()).collect();
        let fit = FittedLine::fit(&points);
        inliers_of(words, &remaining, &fit, perp_tol, &mut members);
        for idx in &members {
            remaining.remove(idx);
        }
        lines.push(Line::from_ordered(order_along(words, &members, &fit, false), fit, false));
    }

    lines.sort_by(|a, b| a.center.y.total_cmp(&b.center.y));
    debug!(words = words.len(), lines = lines.len(), "Clustered tilted lines");
    lines
}
