//! Bounds-preserving rotation of rasters and word coordinates, and the preview
//! scorer that picks the final deskew angle.
//!
//! Rotation angles use the usual raster convention: positive turns the page
//! counter-clockwise as displayed. A page skewed by `a` is deskewed by
//! rotating it by `-a`.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::config::LayoutConfig;
use crate::preprocess::downscale_for_preview;
use crate::skew::{estimate_from_edges, push_unique};
use crate::types::{Point, Word};

/// Affine rotation about the image center onto a canvas enlarged so that no
/// content is clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationTransform {
    m: [[f64; 3]; 2],
    pub width: u32,
    pub height: u32,
}

impl RotationTransform {
    pub fn keep_bounds(width: u32, height: u32, angle_deg: f64) -> Self {
        let (w, h) = (width as f64, height as f64);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let (b, a) = angle_deg.to_radians().sin_cos();
        let mut m = [
            [a, b, (1.0 - a) * cx - b * cy],
            [-b, a, b * cx + (1.0 - a) * cy],
        ];
        let new_w = ((h * b.abs() + w * a.abs()) as u32).max(1);
        let new_h = ((h * a.abs() + w * b.abs()) as u32).max(1);
        m[0][2] += new_w as f64 / 2.0 - cx;
        m[1][2] += new_h as f64 / 2.0 - cy;
        Self { m, width: new_w, height: new_h }
    }

    pub fn apply(&self, p: Point) -> Point {
        let m = &self.m;
        Point::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2],
        )
    }

    /// Map a point on the rotated canvas back onto the source image.
    pub fn invert(&self, p: Point) -> Point {
        let m = &self.m;
        let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
        let (x, y) = (p.x - m[0][2], p.y - m[1][2]);
        Point::new(
            (m[1][1] * x - m[0][1] * y) / det,
            (m[0][0] * y - m[1][0] * x) / det,
        )
    }

    fn projection(&self) -> Option<Projection> {
        let m = &self.m;
        Projection::from_matrix([
            m[0][0] as f32, m[0][1] as f32, m[0][2] as f32,
            m[1][0] as f32, m[1][1] as f32, m[1][2] as f32,
            0.0, 0.0, 1.0,
        ])
    }
}

/// Rotate `img` by `angle_deg` onto an enlarged canvas filled with `background`.
pub fn rotate_image(img: &GrayImage, angle_deg: f64, background: u8) -> GrayImage {
    let transform = RotationTransform::keep_bounds(img.width(), img.height(), angle_deg);
    let mut out = GrayImage::from_pixel(transform.width, transform.height, Luma([background]));
    match transform.projection() {
        Some(projection) => {
            warp_into(img, &projection, Interpolation::Bilinear, Luma([background]), &mut out);
            out
        }
        None => img.clone(),
    }
}

/// Attach rotated centroids to every word, using the same transform
/// [`rotate_image`] would apply to a `width` x `height` page.
pub fn transform_words(words: &[Word], width: u32, height: u32, angle_deg: f64) -> Vec<Word> {
    let transform = RotationTransform::keep_bounds(width, height, angle_deg);
    words
        .iter()
        .map(|w| w.clone().with_rotated(transform.apply(w.centroid())))
        .collect()
}

/// Residual skew left after deskewing `preview` by `deskew_angle`.
/// Pages where the edge detector finds nothing cost `no_lines_cost_deg`.
pub fn preview_cost(preview: &GrayImage, deskew_angle: f64, config: &LayoutConfig) -> f64 {
    let rotated = rotate_image(preview, deskew_angle, config.background_luma);
    let residual = estimate_from_edges(&rotated, config.preview_hough_vote_threshold, config);
    if residual.samples > 0 {
        residual.angle_deg.abs()
    } else {
        config.no_lines_cost_deg
    }
}

/// Expand each candidate into a local grid of offsets, deduplicated.
pub fn expand_grid(candidates: &[f64], config: &LayoutConfig) -> Vec<f64> {
    let mut grid = Vec::with_capacity(candidates.len() * config.grid_offsets_deg.len());
    for &angle in candidates {
        for &offset in &config.grid_offsets_deg {
            push_unique(&mut grid, angle + offset, config.dedup_eps_deg);
        }
    }
    grid
}

#[derive(Debug, Clone, PartialEq)]
pub struct AngleSelection {
    pub angle_deg: f64,
    pub cost: f64,
    /// Every grid angle with its cost, in generation order.
    pub scored: Vec<(f64, f64)>,
}

/// Score every grid angle around `candidates` on a downscaled preview and keep
/// the cheapest; ties go to the earliest generated angle.
pub fn select_angle(gray: &GrayImage, candidates: &[f64], config: &LayoutConfig) -> AngleSelection {
    let preview = downscale_for_preview(gray, config.preview_max_side);
    let scored: Vec<(f64, f64)> = expand_grid(candidates, config)
        .into_iter()
        .map(|angle| (angle, preview_cost(&preview, -angle, config)))
        .collect();

    let mut best: Option<(f64, f64)> = None;
    for &(angle, cost) in &scored {
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((angle, cost));
        }
    }
    let (angle_deg, cost) = best.unwrap_or((0.0, config.no_lines_cost_deg));
    debug!(angle_deg, cost, tried = scored.len(), "Selected deskew angle");
    AngleSelection { angle_deg, cost, scored }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn zero_angle_is_identity() {
        let t = RotationTransform::keep_bounds(640, 480, 0.0);
        assert_eq!((t.width, t.height), (640, 480));
        assert!(close(t.apply(Point::new(12.5, 300.0)), Point::new(12.5, 300.0)));
    }

    #[test]
    fn quarter_turn_swaps_canvas() {
        let t = RotationTransform::keep_bounds(400, 200, 90.0);
        // sin/cos rounding may shave a pixel off the truncated size.
        assert!((199..=200).contains(&t.width), "width {}", t.width);
        assert!((399..=400).contains(&t.height), "height {}", t.height);
    }

    #[test]
    fn canvas_grows_for_oblique_angles() {
        let t = RotationTransform::keep_bounds(1000, 800, 10.0);
        assert!(t.width > 1000 && t.height > 800);
    }

    #[test]
    fn positive_angle_lifts_right_side() {
        let t = RotationTransform::keep_bounds(200, 200, 5.0);
        let left = t.apply(Point::new(20.0, 100.0));
        let right = t.apply(Point::new(180.0, 100.0));
        assert!(right.y < left.y);
    }

    #[test]
    fn rotate_then_invert_recovers_points() {
        for angle in [-27.0, -3.5, 0.4, 12.0, 30.0] {
            let t = RotationTransform::keep_bounds(1700, 2200, angle);
            for p in [Point::new(0.0, 0.0), Point::new(850.0, 1100.0), Point::new(1699.0, 37.5)] {
                assert!(close(t.invert(t.apply(p)), p), "angle {angle} point {p:?}");
            }
        }
    }

    #[test]
    fn transform_words_sets_rotated_centroid() {
        let words = vec![Word::new("PD", 10.0, 10.0, 20.0, 10.0)];
        let out = transform_words(&words, 100, 100, 0.0);
        assert!(close(out[0].rotated.unwrap(), Point::new(20.0, 15.0)));
        assert_eq!(out[0].centroid(), words[0].centroid());
    }

    #[test]
    fn rotate_image_fills_background() {
        let img = GrayImage::from_pixel(100, 50, Luma([0u8]));
        let rotated = rotate_image(&img, 20.0, 255);
        let t = RotationTransform::keep_bounds(100, 50, 20.0);
        assert_eq!(rotated.dimensions(), (t.width, t.height));
        assert_eq!(rotated.get_pixel(0, 0)[0], 255);
        let c = rotated.get_pixel(t.width / 2, t.height / 2)[0];
        assert!(c < 16, "center pixel {c}");
    }

    #[test]
    fn grid_expands_and_dedups() {
        let config = LayoutConfig::default();
        assert_eq!(expand_grid(&[0.0], &config).len(), 7);
        // Candidates 0.2 apart share five of their grid points.
        assert_eq!(expand_grid(&[0.0, 0.2], &config).len(), 8);
        let grid = expand_grid(&[1.0], &config);
        assert!((grid[0] - 0.4).abs() < 1e-12);
        assert!((grid[6] - 1.6).abs() < 1e-12);
    }

    #[test]
    fn blank_preview_costs_the_penalty() {
        let config = LayoutConfig::default();
        let blank = GrayImage::from_pixel(200, 150, Luma([255u8]));
        assert_eq!(preview_cost(&blank, 2.0, &config), 90.0);
    }

    #[test]
    fn blank_page_keeps_first_grid_angle() {
        let config = LayoutConfig::default();
        let blank = GrayImage::from_pixel(200, 150, Luma([255u8]));
        let sel = select_angle(&blank, &[0.0], &config);
        assert!((sel.angle_deg + 0.6).abs() < 1e-12);
        assert_eq!(sel.cost, 90.0);
        assert_eq!(sel.scored.len(), 7);
    }

    #[test]
    fn upright_bars_score_near_zero() {
        let config = LayoutConfig::default();
        let mut img = GrayImage::from_pixel(700, 500, Luma([255u8]));
        for row in 0..9 {
            let bar = Rect::at(50, 30 + row * 50).of_size(600, 16);
            draw_filled_rect_mut(&mut img, bar, Luma([0u8]));
        }
        let sel = select_angle(&img, &[0.0], &config);
        assert!(sel.angle_deg.abs() <= 0.6 + 1e-9);
        assert!(sel.cost <= 1.0, "cost {}", sel.cost);
    }
}
