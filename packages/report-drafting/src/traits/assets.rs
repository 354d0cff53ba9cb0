//! Access to uploaded images and documents.
//!
//! File storage belongs to the application; the pipeline only needs to
//! resolve an id to bytes plus the metadata used in citation labels.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::analysis::DocumentType;

/// An uploaded site photograph.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    /// Create an asset, guessing the MIME type from the file extension.
    pub fn new(id: impl Into<String>, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_from_filename(&filename).to_string();
        Self {
            id: id.into(),
            filename,
            mime_type,
            bytes,
        }
    }
}

/// An uploaded project document.
#[derive(Debug, Clone)]
pub struct DocumentAsset {
    pub id: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub document_date: Option<NaiveDate>,
    pub bytes: Vec<u8>,
}

impl DocumentAsset {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        doc_type: DocumentType,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            doc_type,
            document_date: None,
            bytes,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.document_date = Some(date);
        self
    }

    /// Citation label: "<Type> <filename> dated <date>".
    pub fn label(&self) -> String {
        match self.document_date {
            Some(date) => format!("{} {} dated {}", self.doc_type.title(), self.filename, date),
            None => format!("{} {}", self.doc_type.title(), self.filename),
        }
    }
}

/// Resolves asset ids to their contents.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fails with `DraftingError::AssetNotFound` for unknown ids.
    async fn image(&self, id: &str) -> Result<ImageAsset>;

    /// Fails with `DraftingError::AssetNotFound` for unknown ids.
    async fn document(&self, id: &str) -> Result<DocumentAsset>;
}

fn mime_from_filename(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_guess() {
        assert_eq!(ImageAsset::new("1", "roof.PNG", vec![]).mime_type, "image/png");
        assert_eq!(ImageAsset::new("2", "IMG_001.jpg", vec![]).mime_type, "image/jpeg");
        assert_eq!(ImageAsset::new("3", "scan", vec![]).mime_type, "image/jpeg");
    }

    #[test]
    fn test_document_label() {
        let doc = DocumentAsset::new("d1", "sor-11.pdf", DocumentType::PriorSor, vec![])
            .with_date(NaiveDate::from_ymd_opt(2026, 1, 12).unwrap());
        assert_eq!(doc.label(), "Prior SOR sor-11.pdf dated 2026-01-12");

        let undated = DocumentAsset::new("d2", "budget.pdf", DocumentType::CostReview, vec![]);
        assert_eq!(undated.label(), "Cost Review budget.pdf");
    }
}
