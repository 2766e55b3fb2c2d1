use thiserror::Error;

use crate::types::RecognizedWord;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Invalid word list: {0}")]
    InvalidWordList(#[from] serde_json::Error),
}

/// Abstraction over an OCR engine.
/// Implementations accept raw PNG/JPEG image bytes and return positioned words.
pub trait WordRecognizer: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<RecognizedWord>, OcrError>;
}

// ── Preset backend ────────────────────────────────────────────────────────────

/// Returns a fixed word list regardless of the image. Used to replay words
/// produced by an external OCR service, and in tests.
pub struct PresetRecognizer {
    pub words: Vec<RecognizedWord>,
}

impl PresetRecognizer {
    pub fn new(words: Vec<RecognizedWord>) -> Self {
        Self { words }
    }

    /// Parse a JSON array of `{ "text": ..., "vertices": [[x, y]; 4] }` objects.
    pub fn from_json(json: &str) -> Result<Self, OcrError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

impl WordRecognizer for PresetRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<RecognizedWord>, OcrError> {
        Ok(self.words.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_ignores_image_content() {
        let r = PresetRecognizer::new(vec![RecognizedWord::from_rect("PD", 0.0, 0.0, 20.0, 10.0)]);
        assert_eq!(r.recognize(b"anything").unwrap().len(), 1);
        assert_eq!(r.recognize(b"").unwrap()[0].text, "PD");
    }

    #[test]
    fn preset_from_json() {
        let json = r#"[{"text":"MEMBER","vertices":[[0,0],[40,0],[40,12],[0,12]]}]"#;
        let r = PresetRecognizer::from_json(json).unwrap();
        assert_eq!(r.words[0].vertices[2], [40.0, 12.0]);
    }

    #[test]
    fn preset_from_bad_json() {
        assert!(matches!(
            PresetRecognizer::from_json("{\"text\": 1}"),
            Err(OcrError::InvalidWordList(_))
        ));
    }
}
