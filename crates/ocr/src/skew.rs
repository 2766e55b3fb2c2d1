//! Skew estimation from raster edges and from neighbouring word pairs, and the
//! fusion of both into rotation candidates.
//!
//! Estimator angles follow image coordinates (y grows downward): a text line
//! running down to the right measures positive. That sign alone does not say
//! which way the page must turn, so both signs become candidates and the
//! preview scorer in [`crate::rotate`] settles it.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::geometry::{median, percentile};
use crate::types::Word;

/// An estimated skew angle and the number of samples backing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewEstimate {
    pub angle_deg: f64,
    pub samples: usize,
}

impl SkewEstimate {
    pub const NONE: SkewEstimate = SkewEstimate { angle_deg: 0.0, samples: 0 };
}

/// Fold a line direction into `[-45, 45)` by 90° steps.
pub fn fold_angle(mut deg: f64) -> f64 {
    while deg >= 45.0 {
        deg -= 90.0;
    }
    while deg < -45.0 {
        deg += 90.0;
    }
    deg
}

/// Hough-based estimate over the edge map of `gray`.
///
/// Every detected line's direction is folded into `[-45, 45)`, the median is
/// taken, and lines farther than `edge_window_deg` from it are dropped before
/// re-taking the median. `samples` counts the lines that survive the window.
pub fn estimate_from_edges(
    gray: &GrayImage,
    vote_threshold: u32,
    config: &LayoutConfig,
) -> SkewEstimate {
    if gray.width() < 3 || gray.height() < 3 {
        return SkewEstimate::NONE;
    }
    let blurred = gaussian_blur_f32(gray, config.blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: config.hough_suppression_radius,
        },
    );

    // `angle_in_degrees` is the angle of the line normal.
    let angles: Vec<f64> = lines
        .iter()
        .map(|l| fold_angle(l.angle_in_degrees as f64 - 90.0))
        .collect();
    let Some(first_median) = median(&angles) else {
        return SkewEstimate::NONE;
    };

    let kept: Vec<f64> = angles
        .iter()
        .copied()
        .filter(|a| (a - first_median).abs() <= config.edge_window_deg)
        .collect();
    match median(&kept) {
        Some(angle_deg) => SkewEstimate { angle_deg, samples: kept.len() },
        None => SkewEstimate { angle_deg: first_median, samples: angles.len() },
    }
}

/// Value at which cumulative weight first reaches half the total, over values
/// sorted ascending. Zero for an empty input.
pub fn weighted_median(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = sorted.iter().map(|(_, w)| w).sum::<f64>() / 2.0;
    let mut acc = 0.0;
    for (value, weight) in &sorted {
        acc += weight;
        if acc >= half {
            return *value;
        }
    }
    sorted[sorted.len() - 1].0
}

/// Keep samples within `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`; the untrimmed set is
/// returned if nothing survives.
pub fn iqr_trim(pairs: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
    let (Some(q1), Some(q3)) = (percentile(&values, 25.0), percentile(&values, 75.0)) else {
        return Vec::new();
    };
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let trimmed: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(v, _)| *v >= lo && *v <= hi)
        .collect();
    if trimmed.is_empty() {
        pairs.to_vec()
    } else {
        trimmed
    }
}

/// Estimate from each word's nearest right-hand neighbour within `pair_band_factor`
/// median heights above or below it.
pub fn estimate_from_word_pairs(words: &[Word], config: &LayoutConfig) -> SkewEstimate {
    if words.is_empty() {
        return SkewEstimate::NONE;
    }
    let widths: Vec<f64> = words.iter().map(|w| w.width).filter(|w| *w > 0.0).collect();
    let heights: Vec<f64> = words.iter().map(|w| w.height).filter(|h| *h > 0.0).collect();
    let w_med = median(&widths).unwrap_or(config.fallback_width);
    let h_med = median(&heights).unwrap_or(config.fallback_height);
    let y_band = config.pair_band_factor * h_med;
    let min_dx = config.pair_min_dx_px.max(config.pair_min_dx_factor * w_med);

    let mut order: Vec<&Word> = words.iter().collect();
    order.sort_by(|a, b| a.cy.total_cmp(&b.cy).then(a.cx.total_cmp(&b.cx)));

    let mut pairs: Vec<(f64, f64)> = Vec::new();
    for (i, wi) in order.iter().enumerate() {
        // The band reaches both ways: on a row rising to the right the
        // partner sorts before `wi`.
        let above = order[..i].iter().rev().take_while(|wj| wi.cy - wj.cy <= y_band);
        let below = order[i + 1..].iter().take_while(|wj| wj.cy - wi.cy <= y_band);
        let mut best: Option<&Word> = None;
        for wj in above.chain(below) {
            let dx = wj.cx - wi.cx;
            if dx <= 0.0 || dx < min_dx {
                continue;
            }
            if best.map_or(true, |b| dx < b.cx - wi.cx) {
                best = Some(*wj);
            }
        }
        let Some(wj) = best else { continue };
        let dx = wj.cx - wi.cx;
        let dy = wj.cy - wi.cy;
        let angle = dy.atan2(dx).to_degrees();
        if angle.abs() <= config.pair_max_abs_deg {
            pairs.push((angle, dx.max(1.0)));
        }
    }

    if pairs.is_empty() {
        return SkewEstimate::NONE;
    }
    let trimmed = iqr_trim(&pairs);
    SkewEstimate {
        angle_deg: weighted_median(&trimmed),
        samples: trimmed.len(),
    }
}

/// Turn both estimates into a deduplicated list of clamped candidate angles.
///
/// Each estimator with enough samples contributes its angle and its negation,
/// since the estimate alone does not fix the rotation direction. With no
/// qualifying estimator the only candidate is zero.
pub fn fuse_candidates(
    edges: SkewEstimate,
    pairs: SkewEstimate,
    config: &LayoutConfig,
) -> Vec<f64> {
    let mut raw = Vec::new();
    for est in [edges, pairs] {
        if est.samples >= config.min_estimator_samples {
            raw.push(est.angle_deg);
            raw.push(-est.angle_deg);
        }
    }
    if raw.is_empty() {
        warn!(
            edge_lines = edges.samples,
            pair_samples = pairs.samples,
            "No skew estimator had enough samples; assuming upright page"
        );
        raw.push(0.0);
    }

    let mut candidates: Vec<f64> = Vec::new();
    for angle in raw {
        let clamped = angle.clamp(-config.clamp_deg, config.clamp_deg);
        push_unique(&mut candidates, clamped, config.dedup_eps_deg);
    }
    debug!(?candidates, "Skew candidates");
    candidates
}

/// Append `value` unless an existing entry lies within `eps`.
pub(crate) fn push_unique(values: &mut Vec<f64>, value: f64, eps: f64) {
    if values.iter().all(|v| (v - value).abs() > eps) {
        values.push(value);
    }
}
