//! Requirements input bundle

use serde::{Deserialize, Serialize};

/// Already-extracted text of one uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingDocument {
    pub filename: String,
    pub extracted_text: String,
}

/// Raw requirements supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsBundle {
    pub primary_text: String,
    #[serde(default)]
    pub documents: Vec<SupportingDocument>,
}

impl RequirementsBundle {
    pub fn new(primary_text: impl Into<String>) -> Self {
        Self {
            primary_text: primary_text.into(),
            documents: Vec::new(),
        }
    }

    pub fn with_document(mut self, filename: impl Into<String>, extracted_text: impl Into<String>) -> Self {
        self.documents.push(SupportingDocument {
            filename: filename.into(),
            extracted_text: extracted_text.into(),
        });
        self
    }

    /// Primary text followed by every document, labelled by filename
    pub fn combined_text(&self) -> String {
        let mut text = self.primary_text.trim().to_string();
        for doc in &self.documents {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&format!("--- {} ---\n{}", doc.filename, doc.extracted_text.trim()));
        }
        text
    }

    pub fn is_empty(&self) -> bool {
        self.primary_text.trim().is_empty() && self.documents.iter().all(|d| d.extracted_text.trim().is_empty())
    }
}
