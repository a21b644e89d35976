//! Sentence-aware sliding-window chunker.
//!
//! Splits document text into overlapping, size-bounded segments so each
//! piece can be embedded and retrieved on its own. Sizes are measured in
//! characters (Unicode scalar values), not bytes.
//!
//! # Algorithm
//!
//! 1. If the text fits in `max_size`, return it unchanged as a single chunk.
//! 2. Take the window `[start, start + max_size)`.
//! 3. If the window ends before the text does, search backward from the
//!    window end, within the last `overlap` characters, for the nearest
//!    sentence terminator (`.` or `。`). If one is found the window ends
//!    just after it.
//! 4. Trim the window; keep it only if something is left.
//! 5. Move `start` to `end - overlap` so consecutive chunks share context.
//!    If that would not advance, move to `end` instead.
//!
//! # Example
//!
//! ```rust
//! use kb_harness_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Short text.", 1000, 200);
//! assert_eq!(chunks, vec!["Short text.".to_string()]);
//! ```

use serde_json::Value;

use crate::models::Document;

/// Characters that end a sentence for boundary snapping.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '。'];

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Split `text` into overlapping chunks of at most `max_size` characters.
///
/// # Guarantees
///
/// - Text of `max_size` characters or fewer comes back as-is, untrimmed.
/// - No returned chunk is empty.
/// - Every chunk is a trimmed substring of `text`, in text order.
/// - The loop always advances, even when `overlap >= max_size`.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + max_size).min(len);

        if end < len {
            let search_start = end.saturating_sub(overlap).max(start);
            if let Some(pos) = (search_start..end)
                .rev()
                .find(|&i| SENTENCE_TERMINATORS.contains(&chars[i]))
            {
                end = pos + 1;
            }
        }

        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Chunk every document whose content exceeds `max_size` characters.
///
/// Short documents and documents without content pass through unchanged.
/// Long documents are replaced by chunk documents with id
/// `"{document_id}_chunk_{index}"` and the parent metadata plus
/// `chunk_index`, `total_chunks`, `original_id` and `chunk_type = "text"`.
pub fn chunk_documents(docs: Vec<Document>, max_size: usize, overlap: usize) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());

    for doc in docs {
        let content = match doc.content.as_deref() {
            Some(c) if c.chars().count() > max_size => c,
            _ => {
                out.push(doc);
                continue;
            }
        };

        let pieces = chunk_text(content, max_size, overlap);
        let total = pieces.len();

        for (index, piece) in pieces.into_iter().enumerate() {
            let mut metadata = doc.metadata.clone();
            metadata.insert("chunk_index".into(), Value::from(index as u64));
            metadata.insert("total_chunks".into(), Value::from(total as u64));
            metadata.insert("original_id".into(), Value::from(doc.id.clone()));
            metadata.insert("chunk_type".into(), Value::from("text"));

            out.push(Document {
                id: format!("{}_chunk_{}", doc.id, index),
                content: Some(piece),
                metadata,
            });
        }
    }

    out
}
