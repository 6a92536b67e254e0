//! Cross-reference aggregation over processed content.
//!
//! Issue-tracker keys are discovered by three independent tiers, highest
//! confidence first:
//!
//! 1. structural macro references collected during markup processing,
//! 2. tracker URLs (`.../browse/KEY`) found in the final Markdown,
//! 3. bare keys (`ABC-123`) in prose, with code regions excluded.
//!
//! The tiers are merged with first-wins dedup: the first tier to discover
//! a key keeps its canonical URL. Mentions, internal links, attachments
//! and external links get the same first-wins treatment on their own keys.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::markup::ExtractionCandidates;
use crate::models::{ExtractedMetadata, IssueRef};

fn browse_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(https?://[^\s()<>"']+/browse/([A-Z][A-Z0-9]+-\d+))"#)
            .expect("static regex")
    })
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][A-Z0-9]+-\d+)\b").expect("static regex"))
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]*`").expect("static regex"))
}

/// Tier 2: tracker URLs in the rendered Markdown.
fn url_tier(markdown: &str) -> Vec<IssueRef> {
    browse_url_re()
        .captures_iter(markdown)
        .map(|cap| IssueRef {
            key: cap[2].to_string(),
            url: Some(cap[1].to_string()),
        })
        .collect()
}

/// Tier 3: bare keys in prose. Fenced blocks and inline code are blanked
/// out first so identifiers in code never register as references.
fn bare_tier(markdown: &str) -> Vec<IssueRef> {
    let prose = strip_code_regions(markdown);
    bare_key_re()
        .find_iter(&prose)
        .map(|m| IssueRef {
            key: m.as_str().to_string(),
            url: None,
        })
        .collect()
}

fn strip_code_regions(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;
    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push('\n');
            continue;
        }
        if in_fence {
            out.push('\n');
            continue;
        }
        out.push_str(&inline_code_re().replace_all(line, " "));
        out.push('\n');
    }
    out
}

/// Merge processing candidates and Markdown scans into final metadata.
pub fn aggregate(candidates: &ExtractionCandidates, markdown: &str) -> ExtractedMetadata {
    let mut issue_refs: Vec<IssueRef> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for tier in [
        candidates.issue_refs.clone(),
        url_tier(markdown),
        bare_tier(markdown),
    ] {
        for issue in tier {
            if seen.insert(issue.key.clone()) {
                issue_refs.push(issue);
            }
        }
    }

    let mut mentions = Vec::new();
    let mut seen_accounts = HashSet::new();
    for mention in &candidates.mentions {
        if seen_accounts.insert(mention.account_id.clone()) {
            mentions.push(mention.clone());
        }
    }

    let mut internal_links = Vec::new();
    let mut seen_targets = HashSet::new();
    for link in &candidates.internal_links {
        if seen_targets.insert(link.target_id.clone()) {
            internal_links.push(link.clone());
        }
    }

    let mut external_links = Vec::new();
    let mut seen_urls = HashSet::new();
    for url in &candidates.external_links {
        if seen_urls.insert(url.clone()) {
            external_links.push(url.clone());
        }
    }

    let mut attachments = Vec::new();
    let mut seen_files = HashSet::new();
    for name in &candidates.attachments {
        if seen_files.insert(name.clone()) {
            attachments.push(name.clone());
        }
    }

    ExtractedMetadata {
        issue_refs,
        mentions,
        internal_links,
        external_links,
        attachments,
        word_count: markdown.split_whitespace().count(),
        char_count: markdown.chars().count(),
    }
}
