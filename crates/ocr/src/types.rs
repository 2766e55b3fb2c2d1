use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::geometry::FittedLine;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A word exactly as the OCR engine reports it: text plus a quadrilateral
/// given as four `[x, y]` vertices in image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedWord {
    pub text: String,
    pub vertices: [[f64; 2]; 4],
}

impl RecognizedWord {
    /// Axis-aligned quad, handy for tests and synthetic layouts.
    pub fn from_rect(
        text: impl Into<String>,
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            text: text.into(),
            vertices: [
                [left, top],
                [left + width, top],
                [left + width, top + height],
                [left, top + height],
            ],
        }
    }
}

/// A recognized token with its axis-aligned box and centroid.
///
/// `rotated` is filled in once a deskew rotation has been applied; everything
/// else is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated: Option<Point>,
}

impl Word {
    pub fn new(text: impl Into<String>, left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            text: text.into(),
            left,
            top,
            width,
            height,
            cx: left + width / 2.0,
            cy: top + height / 2.0,
            rotated: None,
        }
    }

    /// Reduce the OCR quadrilateral to its bounding box.
    pub fn from_recognized(word: &RecognizedWord) -> Self {
        let xs = word.vertices.iter().map(|v| v[0]);
        let ys = word.vertices.iter().map(|v| v[1]);
        let left = xs.clone().fold(f64::INFINITY, f64::min);
        let right = xs.fold(f64::NEG_INFINITY, f64::max);
        let top = ys.clone().fold(f64::INFINITY, f64::min);
        let bottom = ys.fold(f64::NEG_INFINITY, f64::max);
        Self::new(word.text.clone(), left, top, right - left, bottom - top)
    }

    pub fn centroid(&self) -> Point {
        Point::new(self.cx, self.cy)
    }

    /// Rotated centroid, or the original one if no rotation was applied.
    pub fn rotated_centroid(&self) -> Point {
        self.rotated.unwrap_or_else(|| self.centroid())
    }

    pub fn with_rotated(mut self, p: Point) -> Self {
        self.rotated = Some(p);
        self
    }
}

/// Words believed to lie on one visual text line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    /// Members in reading order.
    pub words: Vec<Word>,
    pub text: String,
    pub fit: FittedLine,
    pub center: Point,
}

impl Line {
    /// Build a line from words already in reading order. `rotated` selects
    /// which centroid the center is computed from.
    pub fn from_ordered(words: Vec<Word>, fit: FittedLine, rotated: bool) -> Self {
        let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
        let n = words.len().max(1) as f64;
        let (sx, sy) = words.iter().fold((0.0, 0.0), |(sx, sy), w| {
            let p = if rotated { w.rotated_centroid() } else { w.centroid() };
            (sx + p.x, sy + p.y)
        });
        Self {
            words,
            text,
            fit,
            center: Point::new(sx / n, sy / n),
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Fitted slope (rise over run); infinite for a vertical fit.
    pub fn slope(&self) -> f64 {
        self.fit.slope()
    }
}

/// Everything the layout engine derives from one page.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutResult {
    /// Chosen skew angle in degrees; the page is deskewed by rotating `-angle_deg`.
    pub angle_deg: f64,
    /// Lines contributing to the edge-based estimate.
    pub edge_lines: usize,
    /// Word pairs surviving the outlier trim.
    pub pair_samples: usize,
    /// Grid angles tried and their preview cost, in generation order.
    pub scored: Vec<(f64, f64)>,
    /// Input words with rotated centroids filled in.
    pub words: Vec<Word>,
    /// Slope-aware lines on the original coordinates.
    pub pre_lines: Vec<Line>,
    /// Horizontal bands on the rotated coordinates.
    pub post_lines: Vec<Line>,
    #[serde(skip)]
    pub deskewed: Option<GrayImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_centroid_from_box() {
        let w = Word::new("PD", 10.0, 20.0, 30.0, 10.0);
        assert_eq!(w.centroid(), Point::new(25.0, 25.0));
        assert_eq!(w.rotated_centroid(), w.centroid());
    }

    #[test]
    fn recognized_quad_reduces_to_bounding_box() {
        let r = RecognizedWord {
            text: "D2160".into(),
            vertices: [[12.0, 8.0], [52.0, 10.0], [50.0, 24.0], [10.0, 22.0]],
        };
        let w = Word::from_recognized(&r);
        assert_eq!((w.left, w.top, w.width, w.height), (10.0, 8.0, 42.0, 16.0));
        assert_eq!(w.centroid(), Point::new(31.0, 16.0));
    }

    #[test]
    fn line_joins_text_and_averages_center() {
        let words = vec![
            Word::new("MEMBER", 0.0, 0.0, 40.0, 10.0),
            Word::new("NAME:", 50.0, 2.0, 30.0, 10.0),
        ];
        let fit = FittedLine::horizontal_through(Point::new(0.0, 5.0));
        let line = Line::from_ordered(words, fit, false);
        assert_eq!(line.text, "MEMBER NAME:");
        assert_eq!(line.word_count(), 2);
        assert_eq!(line.center, Point::new(42.5, 6.0));
        assert_eq!(line.slope(), 0.0);
    }

    #[test]
    fn word_deserializes_without_rotation() {
        let json = r#"{"text":"PD","left":0,"top":0,"width":10,"height":10,"cx":5,"cy":5}"#;
        let w: Word = serde_json::from_str(json).unwrap();
        assert!(w.rotated.is_none());
    }
}
