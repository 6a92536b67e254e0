//! Section-aware Markdown chunker.
//!
//! Splits converted Markdown into [`ContentChunk`]s that respect a
//! configurable `max_tokens` limit. Splitting happens on paragraph
//! boundaries (`\n\n`), and every chunk carries the heading of the section
//! it fell in so a fragment stays self-describing in search results.

use uuid::Uuid;

use crate::models::ContentChunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split Markdown into chunks on paragraph boundaries, respecting
/// max_tokens. Returns at least one chunk with contiguous indices from 0.
pub fn chunk_markdown(page_id: &str, markdown: &str, max_tokens: usize) -> Vec<ContentChunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if markdown.trim().is_empty() {
        return vec![make_chunk(page_id, 0, "", None)];
    }

    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;
    let mut section: Option<String> = None;
    // Heading of the section the buffer started in.
    let mut buf_section: Option<String> = None;

    for para in markdown.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(heading) = heading_text(trimmed) {
            section = Some(heading);
        }
        if current_buf.is_empty() {
            buf_section = section.clone();
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(page_id, chunk_index, &current_buf, buf_section.clone()));
            chunk_index += 1;
            current_buf.clear();
            buf_section = section.clone();
        }

        // A single oversized paragraph is hard-split at word boundaries.
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(page_id, chunk_index, &current_buf, buf_section.clone()));
                chunk_index += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, remaining.len().min(max_chars));
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at.max(1))
                } else {
                    split_at
                };
                let piece = &remaining[..actual_split];
                chunks.push(make_chunk(page_id, chunk_index, piece.trim(), section.clone()));
                chunk_index += 1;
                remaining = &remaining[actual_split..];
            }
            buf_section = section.clone();
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(page_id, chunk_index, &current_buf, buf_section));
    }

    // At least one chunk, always.
    if chunks.is_empty() {
        chunks.push(make_chunk(page_id, 0, markdown.trim(), None));
    }

    chunks
}

/// The heading text if this paragraph opens with an ATX heading line.
fn heading_text(para: &str) -> Option<String> {
    let first = para.lines().next()?;
    let hashes = first.len() - first.trim_start_matches('#').len();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = first[hashes..].trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn make_chunk(page_id: &str, index: i64, text: &str, section: Option<String>) -> ContentChunk {
    ContentChunk {
        chunk_id: Uuid::new_v4().to_string(),
        page_id: page_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        section_heading: section,
        pending_deletion: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_markdown("p1", "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].section_heading, None);
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_markdown("p1", "", 700);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunks_carry_section_heading() {
        let markdown = "## Install\n\nRun the installer.\n\n## Configure\n\nEdit the file.";
        let chunks = chunk_markdown("p1", markdown, 8);
        assert!(chunks.len() >= 2);
        let install = chunks.iter().find(|c| c.text.contains("installer")).unwrap();
        assert_eq!(install.section_heading.as_deref(), Some("Install"));
        let configure = chunks.iter().find(|c| c.text.contains("Edit the file")).unwrap();
        assert_eq!(configure.section_heading.as_deref(), Some("Configure"));
    }

    #[test]
    fn indices_contiguous_from_zero() {
        let markdown = (0..40)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_markdown("p1", &markdown, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits() {
        let long = "word ".repeat(200);
        let chunks = chunk_markdown("p1", &long, 10);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.len() <= 40 + 5));
    }

    #[test]
    fn fresh_chunks_are_not_pending() {
        let chunks = chunk_markdown("p1", "text", 700);
        assert!(!chunks[0].pending_deletion);
    }
}
