use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the raw statement bytes. Identifies a document
/// across runs regardless of its file name.
pub fn document_digest(data: &[u8]) -> String {
    Sha256::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_digest() {
        assert_eq!(
            document_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_tracks_content_only() {
        assert_eq!(document_digest(b"eob page"), document_digest(b"eob page"));
        assert_ne!(document_digest(b"eob page"), document_digest(b"eob page "));
        assert_eq!(document_digest(b"x").len(), 64);
    }
}
