use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning constants for skew estimation, rotation scoring and line building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Inlier tolerance for the tilted-line clusterer, in median word heights.
    pub perp_tol_factor: f64,
    /// Vertical band searched for seed partners, in median word heights.
    pub seed_band_factor: f64,
    pub allow_singleton: bool,
    /// Horizontally-nearest band candidates tried per seed.
    pub seed_candidate_cap: usize,
    /// Band tolerance for the horizontal grouper, in median word heights.
    pub post_y_tol_factor: f64,

    pub clamp_deg: f64,
    pub min_estimator_samples: usize,
    pub dedup_eps_deg: f64,
    pub grid_offsets_deg: Vec<f64>,
    pub preview_max_side: u32,
    pub no_lines_cost_deg: f64,

    pub hough_vote_threshold: u32,
    pub preview_hough_vote_threshold: u32,
    pub hough_suppression_radius: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub blur_sigma: f32,
    pub edge_window_deg: f64,

    pub pair_band_factor: f64,
    pub pair_min_dx_factor: f64,
    pub pair_min_dx_px: f64,
    pub pair_max_abs_deg: f64,

    /// Used when no word reports a positive height / width.
    pub fallback_height: f64,
    pub fallback_width: f64,
    pub background_luma: u8,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            perp_tol_factor: 0.6,
            seed_band_factor: 3.0,
            allow_singleton: true,
            seed_candidate_cap: 10,
            post_y_tol_factor: 0.55,
            clamp_deg: 30.0,
            min_estimator_samples: 10,
            dedup_eps_deg: 0.05,
            grid_offsets_deg: vec![-0.6, -0.4, -0.2, 0.0, 0.2, 0.4, 0.6],
            preview_max_side: 1200,
            no_lines_cost_deg: 90.0,
            hough_vote_threshold: 180,
            preview_hough_vote_threshold: 140,
            hough_suppression_radius: 2,
            canny_low: 60.0,
            canny_high: 160.0,
            blur_sigma: 0.8,
            edge_window_deg: 10.0,
            pair_band_factor: 2.0,
            pair_min_dx_factor: 0.8,
            pair_min_dx_px: 4.0,
            pair_max_abs_deg: 15.0,
            fallback_height: 16.0,
            fallback_width: 10.0,
            background_luma: 255,
        }
    }
}

/// Knobs for the record extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Lines above a member header searched for the ICN.
    pub icn_lookback: usize,
    /// Markers that end the member name when it bleeds into the next field.
    pub name_stop_markers: Vec<String>,
    pub include_surface: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            icn_lookback: 5,
            name_stop_markers: ["MEMBER ID", "OTH INS CD", "PA:", "DIAG:"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include_surface: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub tolerance: Decimal,
    /// When a schedule has only age-tiered prices, require the billed amount
    /// to agree with every tier rather than any one of them.
    pub compare_single_against_both: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(5, 3),
            compare_single_against_both: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub layout: LayoutConfig,
    pub extraction: ExtractionConfig,
    pub reconcile: ReconcileConfig,
    /// Treat the page as already upright: rotated centroids equal the originals.
    pub skip_deskew: bool,
    /// Also return the full-resolution deskewed raster.
    pub render_deskewed: bool,
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.layout;
        let positive = [
            ("perp_tol_factor", l.perp_tol_factor),
            ("seed_band_factor", l.seed_band_factor),
            ("post_y_tol_factor", l.post_y_tol_factor),
            ("pair_band_factor", l.pair_band_factor),
            ("fallback_height", l.fallback_height),
            ("fallback_width", l.fallback_width),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(ConfigError::Invalid(format!("layout.{name} must be positive")));
        }
        if !(l.clamp_deg > 0.0 && l.clamp_deg <= 90.0) {
            return Err(ConfigError::Invalid("layout.clamp_deg must be in (0, 90]".into()));
        }
        if !(l.blur_sigma > 0.0) {
            return Err(ConfigError::Invalid("layout.blur_sigma must be positive".into()));
        }
        if l.seed_candidate_cap == 0 {
            return Err(ConfigError::Invalid("layout.seed_candidate_cap must be at least 1".into()));
        }
        if l.grid_offsets_deg.is_empty() {
            return Err(ConfigError::Invalid("layout.grid_offsets_deg must not be empty".into()));
        }
        if l.preview_max_side == 0 {
            return Err(ConfigError::Invalid("layout.preview_max_side must be positive".into()));
        }
        if self.reconcile.tolerance.is_sign_negative() {
            return Err(ConfigError::Invalid("reconcile.tolerance must not be negative".into()));
        }
        Ok(())
    }
}
