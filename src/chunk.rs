//! Fixed-window word chunker.
//!
//! Splits page-level content into [`Chunk`]s:
//!
//! - page text is split on whitespace and grouped into non-overlapping
//!   windows of `chunk_size_words` tokens, in document order;
//! - each OCR'd image becomes one `image` chunk carrying a truncated display
//!   snippet and the full OCR text;
//! - each table-like block detected upstream becomes one untruncated
//!   `table` chunk.
//!
//! Windows may cut a sentence anywhere. There is no overlap and no semantic
//! boundary detection.

use std::path::Path;

use tracing::info;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkType, ImageRecord, PageRecord};

/// Split page text into word windows of at most `chunk_size_words` tokens.
pub fn chunk_text(text: &str, page: u32, chunk_size_words: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = chunk_size_words.max(1);

    words
        .chunks(size)
        .filter_map(|window| {
            let joined = window.join(" ");
            let trimmed = joined.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(Chunk {
                page,
                kind: ChunkType::Text,
                text: trimmed.to_string(),
                word_count: window.len(),
                image_path: None,
                full_ocr_text: None,
            })
        })
        .collect()
}

/// Keep a table-like block as a single chunk.
pub fn chunk_table(table_text: &str, page: u32) -> Chunk {
    Chunk {
        page,
        kind: ChunkType::Table,
        text: table_text.to_string(),
        word_count: words_count(table_text),
        image_path: None,
        full_ocr_text: None,
    }
}

/// One chunk per image; the display text is the first `snippet_chars`
/// characters of the OCR output.
pub fn chunk_images(images: &[ImageRecord], page: u32, snippet_chars: usize) -> Vec<Chunk> {
    images
        .iter()
        .map(|img| {
            let ocr = img.ocr_text.clone().unwrap_or_default();
            Chunk {
                page,
                kind: ChunkType::Image,
                text: snippet(&ocr, snippet_chars),
                word_count: words_count(&ocr),
                image_path: img.img_path.clone(),
                full_ocr_text: Some(ocr),
            }
        })
        .collect()
}

/// Chunk every page in order: text windows, then images, then tables.
pub fn chunk_pages(pages: &[PageRecord], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut all = Vec::new();
    for page in pages {
        let pno = page.page_number;
        if let Some(text) = page.text.as_deref() {
            all.extend(chunk_text(text, pno, config.chunk_size_words));
        }
        if let Some(images) = page.images.as_deref() {
            all.extend(chunk_images(images, pno, config.image_snippet_chars));
        }
        if let Some(tables) = page.tables.as_deref() {
            all.extend(
                tables
                    .iter()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| chunk_table(t, pno)),
            );
        }
    }
    all
}

/// Read `pages.json`, chunk it, and write `chunks.json`.
pub fn create_chunks_from_pages(
    pages_path: &Path,
    out_path: &Path,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let pages: Vec<PageRecord> = read_json(pages_path)?;
    let chunks = chunk_pages(&pages, config);
    write_json(out_path, &chunks)?;
    info!(
        pages = pages.len(),
        chunks = chunks.len(),
        path = %out_path.display(),
        "created chunks"
    );
    Ok(chunks)
}

/// Load a chunk artifact.
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    read_json(path)
}

pub fn words_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Like [`truncate_chars`] but marks a cut with `...`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| Error::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| Error::Artifact {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1, 300);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].word_count, 2);
        assert_eq!(chunks[0].kind, ChunkType::Text);
        assert_eq!(chunks[0].page, 1);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1, 300).is_empty());
        assert!(chunk_text("   \n\t ", 1, 300).is_empty());
    }

    #[test]
    fn test_windows_are_fixed_size_and_ordered() {
        let chunks = chunk_text(&words(7), 4, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "w0 w1 w2");
        assert_eq!(chunks[1].text, "w3 w4 w5");
        assert_eq!(chunks[2].text, "w6");
        assert_eq!(chunks[2].word_count, 1);
        assert!(chunks.iter().all(|c| c.page == 4));
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let chunks = chunk_text("alpha\n\nbeta\tgamma   delta", 1, 2);
        assert_eq!(chunks[0].text, "alpha beta");
        assert_eq!(chunks[1].text, "gamma delta");
    }

    #[test]
    fn test_image_chunk_truncates_snippet_keeps_full_text() {
        let ocr = "x".repeat(1200);
        let images = vec![ImageRecord {
            img_path: Some("ingested/images/page1_img0.png".into()),
            ocr_text: Some(ocr.clone()),
        }];
        let chunks = chunk_images(&images, 1, 1000);
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.kind, ChunkType::Image);
        assert_eq!(c.text.len(), 1003);
        assert!(c.text.ends_with("..."));
        assert_eq!(c.full_ocr_text.as_deref(), Some(ocr.as_str()));
        assert_eq!(c.word_count, 1);
        assert_eq!(
            c.image_path.as_deref(),
            Some("ingested/images/page1_img0.png")
        );
    }

    #[test]
    fn test_image_without_ocr_text() {
        let chunks = chunk_images(&[ImageRecord::default()], 2, 1000);
        assert_eq!(chunks[0].text, "");
        assert_eq!(chunks[0].word_count, 0);
    }

    #[test]
    fn test_table_chunk_is_untruncated() {
        let table = words(900);
        let c = chunk_table(&table, 5);
        assert_eq!(c.kind, ChunkType::Table);
        assert_eq!(c.text, table);
        assert_eq!(c.word_count, 900);
    }

    #[test]
    fn test_chunk_pages_order() {
        let pages = vec![
            PageRecord {
                page_number: 1,
                text: Some(words(5)),
                images: Some(vec![ImageRecord {
                    img_path: None,
                    ocr_text: Some("chart legend".into()),
                }]),
                tables: Some(vec!["a | b\n1 | 2".into(), "  ".into()]),
            },
            PageRecord {
                page_number: 2,
                text: None,
                images: None,
                tables: None,
            },
            PageRecord {
                page_number: 3,
                text: Some("closing words".into()),
                images: None,
                tables: None,
            },
        ];
        let config = ChunkingConfig {
            chunk_size_words: 3,
            image_snippet_chars: 1000,
        };
        let chunks = chunk_pages(&pages, &config);
        let kinds: Vec<(u32, ChunkType)> = chunks.iter().map(|c| (c.page, c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (1, ChunkType::Text),
                (1, ChunkType::Text),
                (1, ChunkType::Image),
                (1, ChunkType::Table),
                (3, ChunkType::Text),
            ]
        );
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(snippet("abc", 3), "abc");
        assert_eq!(snippet("abcd", 3), "abc...");
    }

    #[test]
    fn test_create_chunks_from_pages_writes_artifact() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pages_path = tmp.path().join("pages.json");
        let out_path = tmp.path().join("out").join("chunks.json");
        std::fs::write(
            &pages_path,
            r#"[{"page_number": 1, "text": "one two three", "images": []}]"#,
        )
        .unwrap();

        let chunks =
            create_chunks_from_pages(&pages_path, &out_path, &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        let reloaded = load_chunks(&out_path).unwrap();
        assert_eq!(reloaded, chunks);
    }

    #[test]
    fn test_malformed_pages_is_artifact_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pages_path = tmp.path().join("pages.json");
        std::fs::write(&pages_path, "{not json").unwrap();
        let err = create_chunks_from_pages(
            &pages_path,
            &tmp.path().join("chunks.json"),
            &ChunkingConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Artifact { .. }));
    }
}
