pub mod cluster;
pub mod config;
pub mod debug;
pub mod extract;
pub mod geometry;
pub mod grouping;
pub mod hash;
pub mod pipeline;
pub mod preprocess;
pub mod reconcile;
pub mod recognizer;
pub mod rotate;
pub mod skew;
pub mod types;

pub use cluster::cluster_tilted_lines;
pub use config::{ConfigError, ExtractionConfig, LayoutConfig, PipelineConfig, ReconcileConfig};
pub use debug::format_lines;
pub use extract::{parse_detail_line, DetailLine, RecordExtractor};
pub use geometry::FittedLine;
pub use grouping::group_horizontal_lines;
pub use hash::document_digest;
pub use pipeline::{analyze_layout, PipelineError, StatementPipeline, StatementResult};
pub use preprocess::{decode_raster, open_raster, PreprocessError};
pub use reconcile::{FeeEntry, FeeSchedule, Price, PriceCheck, ReconcileReport, Reconciler};
pub use recognizer::{OcrError, PresetRecognizer, WordRecognizer};
pub use rotate::{rotate_image, select_angle, transform_words, AngleSelection, RotationTransform};
pub use skew::{estimate_from_edges, estimate_from_word_pairs, fuse_candidates, SkewEstimate};
pub use types::{LayoutResult, Line, Point, RecognizedWord, Word};
