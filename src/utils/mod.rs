// src/utils/mod.rs

//! Utility functions and helpers.

pub mod text;

use url::Url;

/// Derive the canonical public URL for a document from its external id.
pub fn document_url(public_base: &str, external_id: i64) -> String {
    match Url::parse(public_base) {
        Ok(base) => base
            .join(&format!("doc/{external_id}/"))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}/doc/{external_id}/", public_base.trim_end_matches('/'))),
        Err(_) => format!("{}/doc/{external_id}/", public_base.trim_end_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_url() {
        assert_eq!(
            document_url("https://indiankanoon.org", 12345),
            "https://indiankanoon.org/doc/12345/"
        );
        assert_eq!(
            document_url("https://indiankanoon.org/", 12345),
            "https://indiankanoon.org/doc/12345/"
        );
    }
}
