use std::path::{Path, PathBuf};
use std::sync::Arc;

use eobscan_core::BillingRow;
use image::GrayImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::cluster_tilted_lines;
use crate::config::PipelineConfig;
use crate::extract::RecordExtractor;
use crate::grouping::group_horizontal_lines;
use crate::hash;
use crate::preprocess;
use crate::recognizer::{OcrError, WordRecognizer};
use crate::rotate::{rotate_image, select_angle, transform_words};
use crate::skew::{estimate_from_edges, estimate_from_word_pairs, fuse_candidates, SkewEstimate};
use crate::types::{LayoutResult, Word};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] crate::preprocess::PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Worker task failed: {0}")]
    Task(String),
}

/// The result of processing one statement image.
#[derive(Debug, Serialize)]
pub struct StatementResult {
    /// SHA-256 hex digest of the original image bytes.
    pub hash_hex: String,
    pub source: Option<String>,
    pub layout: LayoutResult,
    pub rows: Vec<BillingRow>,
}

/// Estimate skew, rotate word centroids and rebuild both line sets.
///
/// With `skip_deskew` the page is taken as upright: no angle search runs and
/// rotated centroids equal the originals.
pub fn analyze_layout(gray: &GrayImage, words: Vec<Word>, config: &PipelineConfig) -> LayoutResult {
    let layout = &config.layout;
    let (angle_deg, edges, pairs, scored) = if config.skip_deskew {
        (0.0, SkewEstimate::NONE, SkewEstimate::NONE, Vec::new())
    } else {
        let edges = estimate_from_edges(gray, layout.hough_vote_threshold, layout);
        let pairs = estimate_from_word_pairs(&words, layout);
        debug!(
            edge_angle = edges.angle_deg,
            edge_lines = edges.samples,
            pair_angle = pairs.angle_deg,
            pair_samples = pairs.samples,
            "Skew estimates"
        );
        let candidates = fuse_candidates(edges, pairs, layout);
        let selection = select_angle(gray, &candidates, layout);
        (selection.angle_deg, edges, pairs, selection.scored)
    };

    let rotated = if config.skip_deskew {
        words.iter().map(|w| w.clone().with_rotated(w.centroid())).collect()
    } else {
        transform_words(&words, gray.width(), gray.height(), -angle_deg)
    };
    let pre_lines = cluster_tilted_lines(&words, layout);
    let post_lines = group_horizontal_lines(&rotated, layout);
    let deskewed = config
        .render_deskewed
        .then(|| rotate_image(gray, -angle_deg, layout.background_luma));

    LayoutResult {
        angle_deg,
        edge_lines: edges.samples,
        pair_samples: pairs.samples,
        scored,
        words: rotated,
        pre_lines,
        post_lines,
        deskewed,
    }
}

/// Orchestrates: hash → decode → recognize → deskew → line building → extract.
pub struct StatementPipeline<R: WordRecognizer> {
    recognizer: R,
    config: PipelineConfig,
}

impl<R: WordRecognizer> StatementPipeline<R> {
    pub fn new(recognizer: R, config: PipelineConfig) -> Self {
        Self { recognizer, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a file on disk. The file name becomes the row source label.
    pub async fn process_file(&self, path: &Path) -> Result<StatementResult, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        self.process_bytes(&bytes, source_label(path).as_deref())
    }

    /// Process raw image bytes. Runs to completion on the calling thread.
    pub fn process_bytes(
        &self,
        data: &[u8],
        source: Option<&str>,
    ) -> Result<StatementResult, PipelineError> {
        // 1. Hash for identification.
        let hash_hex = hash::document_digest(data);

        // 2. Decode; an unreadable raster fails the whole document.
        let gray = preprocess::decode_raster(data)?;

        // 3. Run OCR.
        let words: Vec<Word> = self
            .recognizer
            .recognize(data)?
            .iter()
            .map(Word::from_recognized)
            .collect();

        // 4. Layout.
        let layout = analyze_layout(&gray, words, &self.config);

        // 5. Extract billing rows.
        let extractor = RecordExtractor::new(self.config.extraction.clone());
        let mut rows = extractor.extract(&layout.post_lines);
        if let Some(source) = source {
            rows = rows.into_iter().map(|r| r.with_source(source)).collect();
        }

        info!(
            hash = %hash_hex,
            angle_deg = layout.angle_deg,
            words = layout.words.len(),
            lines = layout.post_lines.len(),
            rows = rows.len(),
            "Processed statement"
        );
        Ok(StatementResult {
            hash_hex,
            source: source.map(str::to_string),
            layout,
            rows,
        })
    }
}

impl<R: WordRecognizer + 'static> StatementPipeline<R> {
    /// Process several files concurrently, one blocking task per document.
    /// Results keep the order of `paths`; a failing document does not stop
    /// the others.
    pub async fn process_files(
        self: Arc<Self>,
        paths: Vec<PathBuf>,
    ) -> Vec<Result<StatementResult, PipelineError>> {
        let handles: Vec<_> = paths
            .into_iter()
            .map(|path| {
                let pipeline = Arc::clone(&self);
                tokio::spawn(async move {
                    let bytes = tokio::fs::read(&path).await?;
                    let label = source_label(&path);
                    let work = move || pipeline.process_bytes(&bytes, label.as_deref());
                    tokio::task::spawn_blocking(work)
                        .await
                        .map_err(|e| PipelineError::Task(e.to_string()))?
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::Task(e.to_string())),
            });
        }
        results
    }
}

fn source_label(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::PresetRecognizer;
    use crate::types::RecognizedWord;
    use image::{DynamicImage, ImageBuffer, Luma};
    use std::io::Cursor;

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |_, _| Luma([255u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Lay each text line out left to right, 12px per character, 40px apart.
    fn statement_words(lines: &[&str]) -> Vec<RecognizedWord> {
        let mut words = Vec::new();
        for (row, line) in lines.iter().enumerate() {
            let top = 40.0 + row as f64 * 40.0;
            let mut left = 30.0;
            for token in line.split_whitespace() {
                let width = 12.0 * token.len() as f64;
                words.push(RecognizedWord::from_rect(token, left, top, width, 20.0));
                left += width + 15.0;
            }
        }
        words
    }

    fn statement() -> PresetRecognizer {
        PresetRecognizer::new(statement_words(&[
            "123456789012",
            "MEMBER NAME: JOHN SMITH MEMBER ID: AB1234",
            "PD D2160 5 O 061524 110.00 92.00 92.00",
        ]))
    }

    #[test]
    fn upright_statement_without_deskew() {
        let config = PipelineConfig { skip_deskew: true, ..PipelineConfig::default() };
        let pipeline = StatementPipeline::new(statement(), config);
        let result = pipeline.process_bytes(&blank_png(900, 300), Some("scan.png")).unwrap();

        assert_eq!(result.hash_hex.len(), 64);
        assert_eq!(result.layout.angle_deg, 0.0);
        assert!(result.layout.scored.is_empty());
        assert_eq!(result.layout.post_lines.len(), 3);
        let clustered: usize = result.layout.pre_lines.iter().map(|l| l.word_count()).sum();
        assert_eq!(clustered, result.layout.words.len());
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.patient_name, "John Smith");
        assert_eq!(row.cdt_code, "D2160");
        assert_eq!(row.source_file.as_deref(), Some("scan.png"));
    }

    #[test]
    fn blank_page_still_extracts() {
        let pipeline = StatementPipeline::new(statement(), PipelineConfig::default());
        let result = pipeline.process_bytes(&blank_png(900, 300), None).unwrap();
        assert_eq!(result.layout.edge_lines, 0);
        assert!(result.layout.angle_deg.abs() <= 0.6 + 1e-9);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].icn, "123456789012");
        assert!(result.rows[0].source_file.is_none());
    }

    #[test]
    fn no_words_is_not_an_error() {
        let recognizer = PresetRecognizer::new(vec![]);
        let pipeline = StatementPipeline::new(recognizer, PipelineConfig::default());
        let result = pipeline.process_bytes(&blank_png(200, 100), None).unwrap();
        assert!(result.rows.is_empty());
        assert!(result.layout.post_lines.is_empty());
    }

    #[test]
    fn undecodable_image_is_fatal() {
        let pipeline = StatementPipeline::new(statement(), PipelineConfig::default());
        let err = pipeline.process_bytes(b"definitely not a png", None).unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(_)));
    }

    #[test]
    fn render_deskewed_returns_raster() {
        let config = PipelineConfig {
            render_deskewed: true,
            skip_deskew: true,
            ..PipelineConfig::default()
        };
        let pipeline = StatementPipeline::new(statement(), config);
        let result = pipeline.process_bytes(&blank_png(120, 80), None).unwrap();
        assert_eq!(result.layout.deskewed.unwrap().dimensions(), (120, 80));
    }

    #[tokio::test]
    async fn process_file_labels_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eob-0007.png");
        std::fs::write(&path, blank_png(900, 300)).unwrap();
        let config = PipelineConfig { skip_deskew: true, ..PipelineConfig::default() };
        let pipeline = StatementPipeline::new(statement(), config);

        let result = pipeline.process_file(&path).await.unwrap();
        assert_eq!(result.source.as_deref(), Some("eob-0007.png"));
        assert_eq!(result.rows[0].source_file.as_deref(), Some("eob-0007.png"));
    }

    #[tokio::test]
    async fn process_files_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("missing.png");
        let c = dir.path().join("c.png");
        std::fs::write(&a, blank_png(900, 300)).unwrap();
        std::fs::write(&c, blank_png(900, 300)).unwrap();
        let config = PipelineConfig { skip_deskew: true, ..PipelineConfig::default() };
        let pipeline = Arc::new(StatementPipeline::new(statement(), config));

        let results = pipeline.process_files(vec![a, b, c]).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().source.as_deref(), Some("a.png"));
        assert!(matches!(results[1], Err(PipelineError::Io(_))));
        assert_eq!(results[2].as_ref().unwrap().source.as_deref(), Some("c.png"));
    }
}
