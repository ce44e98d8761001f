//! Core data models used throughout pagewise.
//!
//! These types mirror the JSON artifacts that flow through the pipeline:
//! page records from extraction, chunks, embedded chunks, index metadata,
//! and the per-query hits and answers.

use serde::{Deserialize, Serialize};

/// Kind of content a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Table,
    Image,
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkType::Text => "text",
            ChunkType::Table => "table",
            ChunkType::Image => "image",
        };
        f.write_str(s)
    }
}

/// One page as produced by the upstream PDF/OCR extraction step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_number: u32,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<ImageRecord>>,
    /// Table-like text blocks detected upstream.
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

/// An image extracted from a page, with its OCR text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default)]
    pub img_path: Option<String>,
    #[serde(default)]
    pub ocr_text: Option<String>,
}

/// A unit of document content used as the retrieval target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: ChunkType,
    /// Display text; for images this is a truncated OCR snippet.
    pub text: String,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_ocr_text: Option<String>,
}

/// A chunk paired with its embedding vector.
///
/// `embedding` is optional on input: records without one are skipped by the
/// index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk_id: usize,
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: ChunkType,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Metadata record stored alongside each index row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub chunk_id: usize,
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: ChunkType,
    /// Truncated snippet of the chunk text.
    pub text: String,
}

/// A scored retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    pub meta: IndexMeta,
}

/// Terminal output of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<Hit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChunkType::Image).unwrap();
        assert_eq!(json, "\"image\"");
        let parsed: ChunkType = serde_json::from_str("\"table\"").unwrap();
        assert_eq!(parsed, ChunkType::Table);
    }

    #[test]
    fn test_text_chunk_omits_image_fields() {
        let chunk = Chunk {
            page: 2,
            kind: ChunkType::Text,
            text: "hello".into(),
            word_count: 1,
            image_path: None,
            full_ocr_text: None,
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "text");
        assert!(value.get("image_path").is_none());
        assert!(value.get("full_ocr_text").is_none());
    }

    #[test]
    fn test_page_record_tolerates_nulls() {
        let raw = r#"{"page_number": 3, "text": null, "images": null}"#;
        let page: PageRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(page.page_number, 3);
        assert!(page.text.is_none());
        assert!(page.images.is_none());
        assert!(page.tables.is_none());
    }

    #[test]
    fn test_embedded_chunk_without_embedding() {
        let raw = r#"{"chunk_id": 4, "page": 1, "type": "text", "text": "x"}"#;
        let item: EmbeddedChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(item.chunk_id, 4);
        assert!(item.embedding.is_none());
    }
}
