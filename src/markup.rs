//! Storage-markup to retrieval-Markdown conversion.
//!
//! The wiki stores page bodies in an XHTML-like storage format with
//! namespaced macro elements (`ac:structured-macro`, `ac:link`, `ri:page`,
//! ...). [`process`] converts one body to Markdown in two passes over a
//! lenient node tree:
//!
//! 1. **Block-construct expansion**: a registry maps each known macro kind
//!    (code, callouts, status, expand, issue reference, attachment, media)
//!    to a handler that rewrites the macro subtree and may emit side-channel
//!    extraction candidates. Unknown macros degrade to a labeled
//!    placeholder plus best-effort text. A handler failure is caught
//!    locally, degrades that one construct, and never aborts the page.
//! 2. **Cross-reference resolution + serialization**: mentions, internal
//!    and external links, and attachments become Markdown links; tables go
//!    through [`crate::table`]; everything else serializes to Markdown.
//!
//! The parser never raises on malformed input: mismatched end tags are
//! dropped, elements left open at EOF are auto-closed and flagged, and
//! constructs inside a flagged element degrade to placeholders.
//! Whitespace inside code and preformatted regions is preserved verbatim.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::SyncError;
use crate::models::{InternalLink, IssueRef, Mention};

/// One node of the parsed storage-format tree.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Lowercase tag name, namespace prefix included (e.g. `ac:link`).
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// True when the element was still open at EOF and auto-closed.
    pub unclosed: bool,
}

impl Element {
    fn named(name: &str) -> Self {
        Element {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|n| match n {
            Node::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Value of the `ac:parameter` child with the given `ac:name`.
    pub fn param(&self, name: &str) -> Option<String> {
        self.children.iter().find_map(|n| match n {
            Node::Element(el)
                if el.name == "ac:parameter" && el.attr("ac:name") == Some(name) =>
            {
                Some(el.plain_text().trim().to_string())
            }
            _ => None,
        })
    }

    /// Concatenated descendant text with whitespace runs collapsed.
    pub fn plain_text(&self) -> String {
        collapse_ws(&self.verbatim_text())
    }

    /// Concatenated descendant text, whitespace untouched. Used for code
    /// and preformatted regions.
    pub fn verbatim_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ Lenient parser ============

/// Parse storage markup into a node tree. Never fails: parse errors skip
/// forward, stray end tags are dropped, and elements still open at EOF are
/// auto-closed with their `unclosed` flag set.
pub fn parse_markup(raw: &str) -> Vec<Node> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(raw);
    reader.config_mut().check_end_names = false;

    // Stack of open elements; index 0 is a synthetic root.
    let mut stack: Vec<Element> = vec![Element::named("#root")];
    let mut last_pos = reader.buffer_position();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let mut el = Element::named(&String::from_utf8_lossy(e.name().as_ref()).to_lowercase());
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    el.attrs.push((key, value));
                }
                stack.push(el);
            }
            Ok(Event::Empty(e)) => {
                let mut el = Element::named(&String::from_utf8_lossy(e.name().as_ref()).to_lowercase());
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    el.attrs.push((key, value));
                }
                let parent = stack.last_mut().expect("root never popped");
                parent.children.push(Node::Element(el));
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if let Some(open_at) = stack.iter().rposition(|el| el.name == name) {
                    // Close everything the stray structure left open.
                    while stack.len() > open_at {
                        let done = stack.pop().expect("open_at >= 1");
                        let parent = stack.last_mut().expect("root never popped");
                        parent.children.push(Node::Element(done));
                    }
                }
                // Unmatched end tag: drop it.
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                if !text.is_empty() {
                    let parent = stack.last_mut().expect("root never popped");
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                let parent = stack.last_mut().expect("root never popped");
                parent.children.push(Node::Text(text));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => {
                // Skip past the error if the reader advanced; otherwise
                // nothing more can be consumed.
                let pos = reader.buffer_position();
                if pos == last_pos {
                    break;
                }
            }
        }
        last_pos = reader.buffer_position();
    }

    // Auto-close whatever EOF left open, innermost first.
    while stack.len() > 1 {
        let mut done = stack.pop().expect("len > 1");
        done.unclosed = true;
        let parent = stack.last_mut().expect("root never popped");
        parent.children.push(Node::Element(done));
    }

    stack.pop().expect("root").children
}

// ============ Processor ============

/// Side-channel extraction candidates, pre-dedup. Tier-1 issue refs come
/// from structural macro references; the remaining tiers run in
/// [`crate::metadata`] over the final Markdown.
#[derive(Debug, Clone, Default)]
pub struct ExtractionCandidates {
    pub issue_refs: Vec<IssueRef>,
    pub mentions: Vec<Mention>,
    pub internal_links: Vec<InternalLink>,
    pub external_links: Vec<String>,
    pub attachments: Vec<String>,
}

/// Result of converting one page body.
#[derive(Debug, Clone)]
pub struct ProcessedContent {
    pub markdown: String,
    pub candidates: ExtractionCandidates,
    /// True when at least one construct degraded to a placeholder.
    pub degraded: bool,
}

/// Convert raw storage markup to retrieval Markdown plus candidates.
/// Pure transform, no I/O; never fails.
pub fn process(raw: &str, page_id: &str) -> ProcessedContent {
    let nodes = parse_markup(raw);

    let mut processor = Processor::default();
    let expanded = processor.expand_nodes(nodes);
    let markdown = processor.serialize(&expanded);

    if processor.degraded {
        debug!(page_id, "page degraded: one or more constructs placeholdered");
    }

    ProcessedContent {
        markdown,
        candidates: processor.candidates,
        degraded: processor.degraded,
    }
}

#[derive(Default)]
pub(crate) struct Processor {
    pub(crate) candidates: ExtractionCandidates,
    pub(crate) degraded: bool,
    /// Heading level most recently emitted; tables nest below it.
    pub(crate) ambient_level: usize,
}

/// Internal element name for pass-1 output that pass 2 must emit verbatim.
const VERBATIM: &str = "x-verbatim";

fn verbatim_block(text: String) -> Node {
    Node::Element(Element {
        name: VERBATIM.to_string(),
        attrs: Vec::new(),
        children: vec![Node::Text(text)],
        unclosed: false,
    })
}

fn paragraph(text: String) -> Node {
    Node::Element(Element {
        name: "p".to_string(),
        attrs: Vec::new(),
        children: vec![Node::Text(text)],
        unclosed: false,
    })
}

type MacroHandler =
    fn(&Element, &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError>;

/// Construct registry: macro kind → handler, one fallback for everything
/// else. Adding a construct adds one entry here.
fn registry() -> &'static HashMap<&'static str, MacroHandler> {
    static REGISTRY: OnceLock<HashMap<&'static str, MacroHandler>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, MacroHandler> = HashMap::new();
        map.insert("code", macro_code);
        map.insert("info", macro_callout);
        map.insert("note", macro_callout);
        map.insert("warning", macro_callout);
        map.insert("tip", macro_callout);
        map.insert("status", macro_status);
        map.insert("expand", macro_expand);
        map.insert("jira", macro_issue_ref);
        map.insert("view-file", macro_attachment);
        map.insert("multimedia", macro_media);
        map
    })
}

impl Processor {
    /// Pass 1: replace macro elements with their expansions, depth-first
    /// so macros nested in rich bodies expand before their parent.
    pub(crate) fn expand_nodes(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element(mut el) if el.name == "ac:structured-macro" => {
                    el.children = self.expand_nodes(el.children);
                    out.extend(self.expand_macro(&el));
                }
                Node::Element(mut el) => {
                    el.children = self.expand_nodes(el.children);
                    out.push(Node::Element(el));
                }
                text => out.push(text),
            }
        }
        out
    }

    fn expand_macro(&mut self, el: &Element) -> Vec<Node> {
        let kind = el.attr("ac:name").unwrap_or("unknown").to_string();

        let result = if el.unclosed {
            Err(SyncError::MalformedContent {
                construct: kind.clone(),
                detail: "unterminated construct".into(),
            })
        } else {
            let handler = registry().get(kind.as_str()).copied().unwrap_or(macro_unknown);
            handler(el, &mut self.candidates)
        };

        match result {
            Ok(replacement) => replacement,
            Err(err) => {
                // Local degradation: this construct becomes a placeholder,
                // the rest of the page is unaffected.
                debug!(construct = %kind, error = %err, "construct degraded to placeholder");
                self.degraded = true;
                placeholder_nodes(&kind, el)
            }
        }
    }
}

fn placeholder_nodes(kind: &str, el: &Element) -> Vec<Node> {
    let mut nodes = vec![paragraph(format!("**[unparsed {} construct]**", kind))];
    let text = el.plain_text();
    if !text.is_empty() {
        nodes.push(paragraph(text));
    }
    nodes
}

// ============ Macro handlers (pass 1) ============

fn macro_code(el: &Element, _c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let language = el.param("language").unwrap_or_default();
    let body_el = el.find_child("ac:plain-text-body").ok_or_else(|| {
        SyncError::MalformedContent {
            construct: "code".into(),
            detail: "missing plain-text body".into(),
        }
    })?;
    if body_el.unclosed {
        return Err(SyncError::MalformedContent {
            construct: "code".into(),
            detail: "unterminated body".into(),
        });
    }

    // Verbatim: code body whitespace is never touched.
    let mut body = body_el.verbatim_text();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    Ok(vec![verbatim_block(format!("```{}\n{}```", language, body))])
}

fn macro_callout(el: &Element, _c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let kind = el.attr("ac:name").unwrap_or("note");
    let mut label = String::new();
    label.push_str(&kind[..1].to_uppercase());
    label.push_str(&kind[1..]);
    if let Some(title) = el.param("title") {
        label.push_str(": ");
        label.push_str(&title);
    }

    let mut children = vec![paragraph(format!("**{}**", label))];
    if let Some(body) = el.find_child("ac:rich-text-body") {
        children.extend(body.children.clone());
    }
    Ok(vec![Node::Element(Element {
        name: "blockquote".to_string(),
        attrs: Vec::new(),
        children,
        unclosed: false,
    })])
}

fn macro_status(el: &Element, _c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let title = el.param("title").ok_or_else(|| SyncError::MalformedContent {
        construct: "status".into(),
        detail: "missing title parameter".into(),
    })?;
    Ok(vec![Node::Text(format!("`{}`", title))])
}

fn macro_expand(el: &Element, _c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let title = el.param("title").unwrap_or_else(|| "Details".to_string());
    let mut nodes = vec![paragraph(format!("**{}**", title))];
    if let Some(body) = el.find_child("ac:rich-text-body") {
        nodes.extend(body.children.clone());
    }
    Ok(nodes)
}

/// Tier-1 structural issue reference. The highest-confidence source of
/// cross-reference keys; its URL is canonical when present.
fn macro_issue_ref(el: &Element, c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let key = el.param("key").ok_or_else(|| SyncError::MalformedContent {
        construct: "jira".into(),
        detail: "missing key parameter".into(),
    })?;
    let url = el
        .param("server-url")
        .map(|base| format!("{}/browse/{}", base.trim_end_matches('/'), key));

    let rendered = match &url {
        Some(u) => format!("[{}]({})", key, u),
        None => key.clone(),
    };
    c.issue_refs.push(IssueRef { key, url });
    Ok(vec![Node::Text(rendered)])
}

fn macro_attachment(el: &Element, c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let name = el.param("name").ok_or_else(|| SyncError::MalformedContent {
        construct: "view-file".into(),
        detail: "missing name parameter".into(),
    })?;
    c.attachments.push(name.clone());
    Ok(vec![Node::Text(format!("[{}](attachment://{})", name, name))])
}

fn macro_media(el: &Element, c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    if let Some(name) = el.param("name") {
        c.attachments.push(name.clone());
        return Ok(vec![Node::Text(format!("[media: {}]", name))]);
    }
    if let Some(url) = el.param("url") {
        return Ok(vec![Node::Text(format!("[media]({})", url))]);
    }
    Err(SyncError::MalformedContent {
        construct: "multimedia".into(),
        detail: "missing name or url parameter".into(),
    })
}

fn macro_unknown(el: &Element, _c: &mut ExtractionCandidates) -> Result<Vec<Node>, SyncError> {
    let kind = el.attr("ac:name").unwrap_or("unknown");
    Ok(placeholder_nodes(kind, el))
}

// ============ Serialization (pass 2) ============

impl Processor {
    /// Pass 2: resolve cross-references and serialize to Markdown.
    pub(crate) fn serialize(&mut self, nodes: &[Node]) -> String {
        self.serialize_blocks(nodes).join("\n\n")
    }

    pub(crate) fn serialize_blocks(&mut self, nodes: &[Node]) -> Vec<String> {
        let mut blocks: Vec<String> = Vec::new();
        let mut inline = String::new();

        macro_rules! flush {
            () => {
                let text = inline.trim().to_string();
                if !text.is_empty() {
                    blocks.push(text);
                }
                inline.clear();
            };
        }

        for node in nodes {
            match node {
                Node::Text(t) => push_normalized(&mut inline, t),
                Node::Element(el) => match el.name.as_str() {
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        flush!();
                        let level = el.name[1..].parse::<usize>().unwrap_or(1);
                        self.ambient_level = level;
                        let text = self.inline_text(&el.children);
                        blocks.push(format!("{} {}", "#".repeat(level), text));
                    }
                    "p" => {
                        flush!();
                        let text = self.inline_text(&el.children);
                        if !text.is_empty() {
                            blocks.push(text);
                        }
                    }
                    "ul" => {
                        flush!();
                        let block = self.list_block(el, false, 0);
                        if !block.is_empty() {
                            blocks.push(block);
                        }
                    }
                    "ol" => {
                        flush!();
                        let block = self.list_block(el, true, 0);
                        if !block.is_empty() {
                            blocks.push(block);
                        }
                    }
                    "blockquote" => {
                        flush!();
                        let inner = self.serialize_blocks(&el.children).join("\n\n");
                        let quoted = inner
                            .lines()
                            .map(|l| format!("> {}", l))
                            .collect::<Vec<_>>()
                            .join("\n");
                        blocks.push(quoted);
                    }
                    "table" => {
                        flush!();
                        blocks.push(self.transform_table(el));
                    }
                    "pre" => {
                        flush!();
                        let mut body = el.verbatim_text();
                        if !body.ends_with('\n') {
                            body.push('\n');
                        }
                        blocks.push(format!("```\n{}```", body));
                    }
                    VERBATIM => {
                        flush!();
                        blocks.push(el.verbatim_text());
                    }
                    "hr" => {
                        flush!();
                        blocks.push("---".to_string());
                    }
                    "div" | "section" | "article" | "body" | "html" => {
                        flush!();
                        blocks.extend(self.serialize_blocks(&el.children));
                    }
                    _ => {
                        // Inline element inside block flow; already
                        // rendered, appended as-is.
                        let text = self.inline_element(el);
                        inline.push_str(&text);
                    }
                },
            }
        }

        flush!();
        blocks
    }

    /// Serialize inline content (paragraphs, headings, list items, cells).
    pub(crate) fn inline_text(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(t) => push_normalized(&mut out, t),
                Node::Element(el) => {
                    // Rendered inline output is final; collapsing it again
                    // would mangle verbatim code spans.
                    let text = self.inline_element(el);
                    out.push_str(&text);
                }
            }
        }
        out.trim().to_string()
    }

    fn inline_element(&mut self, el: &Element) -> String {
        match el.name.as_str() {
            "strong" | "b" => format!("**{}**", self.inline_text(&el.children)),
            "em" | "i" => format!("*{}*", self.inline_text(&el.children)),
            "del" | "s" => format!("~~{}~~", self.inline_text(&el.children)),
            "code" | "tt" => format!("`{}`", el.verbatim_text()),
            "br" => "\n".to_string(),
            "a" => self.resolve_anchor(el),
            "ac:link" => self.resolve_link(el),
            "ac:image" => self.resolve_image(el),
            VERBATIM => el.verbatim_text(),
            // Transparent: spans, underline, time, and anything unknown.
            _ => self.inline_text(&el.children),
        }
    }

    fn resolve_anchor(&mut self, el: &Element) -> String {
        let href = el.attr("href").unwrap_or("").to_string();
        let mut text = self.inline_text(&el.children);
        if text.is_empty() {
            text = href.clone();
        }
        if href.is_empty() {
            return text;
        }
        if href.starts_with("http://") || href.starts_with("https://") {
            self.candidates.external_links.push(href.clone());
        }
        // Non-HTTP schemes (file:// and friends) pass through untouched.
        // Output is never rendered back to an executable format, so an
        // unneutralized scheme in link position carries no reach here.
        format!("[{}]({})", text, href)
    }

    fn resolve_link(&mut self, el: &Element) -> String {
        let body_text = el
            .find_child("ac:link-body")
            .or_else(|| el.find_child("ac:plain-text-link-body"))
            .map(|b| b.plain_text())
            .filter(|t| !t.is_empty());

        if let Some(user) = el.find_child("ri:user") {
            let account_id = user.attr("ri:account-id").unwrap_or("unknown").to_string();
            let display = body_text.clone();
            let rendered = format!("@{}", display.as_deref().unwrap_or(&account_id));
            self.candidates.mentions.push(Mention {
                account_id,
                display_name: display,
            });
            return rendered;
        }

        if let Some(page) = el.find_child("ri:page") {
            let target = page
                .attr("ri:content-id")
                .or_else(|| page.attr("ri:content-title"))
                .unwrap_or("unknown")
                .to_string();
            let title = page
                .attr("ri:content-title")
                .map(str::to_string)
                .or(body_text)
                .unwrap_or_else(|| target.clone());
            self.candidates.internal_links.push(InternalLink {
                target_id: target.clone(),
                anchor_text: Some(title.clone()),
            });
            return format!("[{}](page://{})", title, target);
        }

        if let Some(attachment) = el.find_child("ri:attachment") {
            let filename = attachment.attr("ri:filename").unwrap_or("unknown").to_string();
            self.candidates.attachments.push(filename.clone());
            let text = body_text.unwrap_or_else(|| filename.clone());
            return format!("[{}](attachment://{})", text, filename);
        }

        body_text.unwrap_or_default()
    }

    fn resolve_image(&mut self, el: &Element) -> String {
        if let Some(attachment) = el.find_child("ri:attachment") {
            let filename = attachment.attr("ri:filename").unwrap_or("image").to_string();
            self.candidates.attachments.push(filename.clone());
            return format!("![{}](attachment://{})", filename, filename);
        }
        if let Some(url_el) = el.find_child("ri:url") {
            let url = url_el.attr("ri:value").unwrap_or("").to_string();
            return format!("![]({})", url);
        }
        String::new()
    }

    fn list_block(&mut self, el: &Element, ordered: bool, depth: usize) -> String {
        let indent = "  ".repeat(depth);
        let mut lines = Vec::new();
        let mut index = 0usize;

        for child in &el.children {
            let item = match child {
                Node::Element(li) if li.name == "li" => li,
                _ => continue,
            };
            index += 1;

            let (nested, inline): (Vec<&Node>, Vec<&Node>) = item
                .children
                .iter()
                .partition(|n| matches!(n, Node::Element(e) if e.name == "ul" || e.name == "ol"));

            let owned: Vec<Node> = inline.into_iter().cloned().collect();
            let text = self.inline_text(&owned);
            let marker = if ordered {
                format!("{}.", index)
            } else {
                "-".to_string()
            };
            lines.push(format!("{}{} {}", indent, marker, text));

            for sub in nested {
                if let Node::Element(sub_el) = sub {
                    let block =
                        self.list_block(sub_el, sub_el.name == "ol", depth + 1);
                    if !block.is_empty() {
                        lines.push(block);
                    }
                }
            }
        }

        lines.join("\n")
    }
}

/// Append text with whitespace runs collapsed, keeping a single joining
/// space between segments. Verbatim segments (already containing markers
/// like fences or newlines from `br`) are appended as produced.
fn push_normalized(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if text == "\n" {
        out.push('\n');
        return;
    }
    let leading_ws = text.starts_with(char::is_whitespace);
    let trailing_ws = text.ends_with(char::is_whitespace);
    let collapsed = collapse_ws(text);

    if collapsed.is_empty() {
        // Whitespace-only segment: keep one joining space.
        if !out.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        return;
    }
    if leading_ws && !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if trailing_ws {
        out.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paragraphs() {
        let out = process("<p>Hello   world.</p><p>Second    para.</p>", "p1");
        assert_eq!(out.markdown, "Hello world.\n\nSecond para.");
        assert!(!out.degraded);
    }

    #[test]
    fn headings_and_inline_markup() {
        let out = process(
            "<h2>Setup <em>guide</em></h2><p>Use <strong>cargo</strong> and <code>rustc  --version</code>.</p>",
            "p1",
        );
        assert_eq!(
            out.markdown,
            "## Setup *guide*\n\nUse **cargo** and `rustc  --version`."
        );
    }

    #[test]
    fn code_macro_preserves_whitespace() {
        let raw = concat!(
            r#"<ac:structured-macro ac:name="code">"#,
            r#"<ac:parameter ac:name="language">rust</ac:parameter>"#,
            "<ac:plain-text-body><![CDATA[fn main() {\n    println!(\"hi\");\n}]]></ac:plain-text-body>",
            "</ac:structured-macro>"
        );
        let out = process(raw, "p1");
        assert_eq!(
            out.markdown,
            "```rust\nfn main() {\n    println!(\"hi\");\n}\n```"
        );
        assert!(!out.degraded);
    }

    #[test]
    fn unterminated_code_macro_degrades_not_fails() {
        let raw = r#"<p>Before</p><ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[let x = 1;]]>"#;
        let out = process(raw, "p1");
        assert!(out.degraded);
        assert!(out.markdown.contains("Before"));
        assert!(out.markdown.contains("**[unparsed code construct]**"));
        assert!(out.markdown.contains("let x = 1;"));
    }

    #[test]
    fn callout_macro_becomes_blockquote() {
        let raw = concat!(
            r#"<ac:structured-macro ac:name="warning">"#,
            r#"<ac:rich-text-body><p>Do not reboot.</p></ac:rich-text-body>"#,
            "</ac:structured-macro>"
        );
        let out = process(raw, "p1");
        assert_eq!(out.markdown, "> **Warning**\n> \n> Do not reboot.");
    }

    #[test]
    fn status_macro_inline() {
        let raw = concat!(
            r#"<p>Release is <ac:structured-macro ac:name="status">"#,
            r#"<ac:parameter ac:name="title">On Track</ac:parameter>"#,
            r#"</ac:structured-macro> today.</p>"#
        );
        let out = process(raw, "p1");
        assert_eq!(out.markdown, "Release is `On Track` today.");
    }

    #[test]
    fn issue_macro_emits_tier1_candidate() {
        let raw = concat!(
            r#"<p>See <ac:structured-macro ac:name="jira">"#,
            r#"<ac:parameter ac:name="key">ABC-1</ac:parameter>"#,
            r#"<ac:parameter ac:name="server-url">https://issues.example.com</ac:parameter>"#,
            r#"</ac:structured-macro>.</p>"#
        );
        let out = process(raw, "p1");
        assert!(out.markdown.contains("[ABC-1](https://issues.example.com/browse/ABC-1)"));
        assert_eq!(out.candidates.issue_refs.len(), 1);
        assert_eq!(out.candidates.issue_refs[0].key, "ABC-1");
    }

    #[test]
    fn unknown_macro_placeholder_with_best_effort_text() {
        let raw = concat!(
            r#"<ac:structured-macro ac:name="gantt-chart">"#,
            r#"<ac:rich-text-body><p>Q3 plan</p></ac:rich-text-body>"#,
            "</ac:structured-macro>"
        );
        let out = process(raw, "p1");
        assert!(out.markdown.contains("**[unparsed gantt-chart construct]**"));
        assert!(out.markdown.contains("Q3 plan"));
        // Unknown-but-well-formed is the fallback path, not degradation.
        assert!(!out.degraded);
    }

    #[test]
    fn mention_and_internal_link_candidates() {
        let raw = concat!(
            r#"<p><ac:link><ri:user ri:account-id="u123"/><ac:link-body>Ada</ac:link-body></ac:link> "#,
            r#"wrote <ac:link><ri:page ri:content-id="99" ri:content-title="Runbook"/></ac:link>.</p>"#
        );
        let out = process(raw, "p1");
        assert!(out.markdown.contains("@Ada"));
        assert!(out.markdown.contains("[Runbook](page://99)"));
        assert_eq!(out.candidates.mentions[0].account_id, "u123");
        assert_eq!(out.candidates.internal_links[0].target_id, "99");
    }

    #[test]
    fn external_link_recorded() {
        let out = process(
            r#"<p><a href="https://example.com/doc">the doc</a></p>"#,
            "p1",
        );
        assert_eq!(out.markdown, "[the doc](https://example.com/doc)");
        assert_eq!(out.candidates.external_links, vec!["https://example.com/doc"]);
    }

    #[test]
    fn attachment_link_candidate() {
        let raw = r#"<p><ac:link><ri:attachment ri:filename="specs.pdf"/></ac:link></p>"#;
        let out = process(raw, "p1");
        assert!(out.markdown.contains("[specs.pdf](attachment://specs.pdf)"));
        assert_eq!(out.candidates.attachments, vec!["specs.pdf"]);
    }

    #[test]
    fn lists_nested() {
        let raw = "<ul><li>alpha</li><li>beta<ul><li>nested</li></ul></li></ul>";
        let out = process(raw, "p1");
        assert_eq!(out.markdown, "- alpha\n- beta\n  - nested");
    }

    #[test]
    fn mismatched_end_tags_do_not_raise() {
        let out = process("<p>one</em></p><p>two</p>", "p1");
        assert!(out.markdown.contains("one"));
        assert!(out.markdown.contains("two"));
    }

    #[test]
    fn empty_input_is_empty_markdown() {
        let out = process("", "p1");
        assert_eq!(out.markdown, "");
    }
}
