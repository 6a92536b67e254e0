//! Table flattening for retrieval.
//!
//! Markdown tables chunk badly: a row split from its header loses all
//! meaning. Instead each table becomes a heading-structured outline: every
//! data row a heading one level below the ambient document level, every
//! column within it a sub-heading another level down (capped at h6), so
//! any chunk boundary still leaves self-describing text. A leading HTML
//! comment carries machine-readable shape data for downstream tooling.
//!
//! Spanned cells (`rowspan`/`colspan`) are expanded into every slot they
//! cover so no row or column comes up empty; exactly one covered slot is
//! flagged primary for provenance. Multi-row headers are joined per column
//! with `" / "`.

use crate::markup::{Element, Node, Processor};

/// Spans beyond this are treated as authoring mistakes and clamped.
const MAX_SPAN: usize = 50;

#[derive(Debug, Clone)]
pub struct Slot {
    pub content: Vec<Node>,
    pub header: bool,
    /// True for the top-left slot of a span; false for covered copies.
    pub primary: bool,
}

#[derive(Debug)]
pub struct TableGrid {
    pub rows: usize,
    pub cols: usize,
    /// Number of source cells spanning more than one slot.
    pub span_count: usize,
    /// Leading rows consisting entirely of header cells.
    pub header_rows: usize,
    /// True when every data row starts with a header cell.
    pub has_header_column: bool,
    pub cells: Vec<Vec<Option<Slot>>>,
}

impl TableGrid {
    pub fn purpose(&self) -> &'static str {
        match (self.header_rows > 0, self.has_header_column) {
            (true, true) => "matrix",
            (true, false) | (false, true) => "data",
            (false, false) => "layout",
        }
    }

    pub fn complexity(&self) -> &'static str {
        if self.has_nested_blocks() {
            "nested"
        } else if self.span_count > 0 {
            "spanned"
        } else {
            "simple"
        }
    }

    fn has_nested_blocks(&self) -> bool {
        self.cells.iter().flatten().flatten().any(|slot| {
            slot.primary
                && slot.content.iter().any(|n| {
                    matches!(n, Node::Element(el)
                        if matches!(el.name.as_str(), "table" | "ul" | "ol" | "pre" | "x-verbatim" | "blockquote"))
                })
        })
    }
}

fn span_attr(el: &Element, name: &str) -> usize {
    el.attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

fn collect_rows<'a>(table: &'a Element, out: &mut Vec<&'a Element>) {
    for child in &table.children {
        if let Node::Element(el) = child {
            match el.name.as_str() {
                "tr" => out.push(el),
                "thead" | "tbody" | "tfoot" => collect_rows(el, out),
                _ => {}
            }
        }
    }
}

/// Build the fully-expanded occupancy grid for a `<table>` element.
pub fn build_grid(table: &Element) -> TableGrid {
    let mut rows: Vec<&Element> = Vec::new();
    collect_rows(table, &mut rows);

    let mut grid: Vec<Vec<Option<Slot>>> = Vec::new();
    let mut span_count = 0usize;

    for (r, row) in rows.iter().enumerate() {
        if grid.len() <= r {
            grid.resize_with(r + 1, Vec::new);
        }
        let mut c = 0usize;
        for child in &row.children {
            let cell = match child {
                Node::Element(el) if el.name == "th" || el.name == "td" => el,
                _ => continue,
            };
            // Skip slots already claimed by a rowspan from above.
            while matches!(grid[r].get(c), Some(Some(_))) {
                c += 1;
            }
            let rowspan = span_attr(cell, "rowspan");
            let colspan = span_attr(cell, "colspan");
            if rowspan > 1 || colspan > 1 {
                span_count += 1;
            }

            for dr in 0..rowspan {
                let rr = r + dr;
                if grid.len() <= rr {
                    grid.resize_with(rr + 1, Vec::new);
                }
                for dc in 0..colspan {
                    let cc = c + dc;
                    if grid[rr].len() <= cc {
                        grid[rr].resize_with(cc + 1, || None);
                    }
                    // Identical content in every covered slot; only the
                    // top-left copy is primary.
                    grid[rr][cc] = Some(Slot {
                        content: cell.children.clone(),
                        header: cell.name == "th",
                        primary: dr == 0 && dc == 0,
                    });
                }
            }
            c += colspan;
        }
    }

    let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize_with(cols, || None);
    }

    let header_rows = grid
        .iter()
        .take_while(|row| {
            let filled: Vec<_> = row.iter().flatten().collect();
            !filled.is_empty() && filled.iter().all(|s| s.header)
        })
        .count();
    // Keep at least one data row; an all-header table still renders.
    let header_rows = header_rows.min(grid.len().saturating_sub(1));

    let data_rows = &grid[header_rows..];
    let has_header_column = !data_rows.is_empty()
        && data_rows
            .iter()
            .all(|row| matches!(row.first(), Some(Some(slot)) if slot.header));

    TableGrid {
        rows: grid.len(),
        cols,
        span_count,
        header_rows,
        has_header_column,
        cells: grid,
    }
}

impl Processor {
    /// Flatten one table into an annotated heading outline at the current
    /// ambient heading level.
    pub(crate) fn transform_table(&mut self, table: &Element) -> String {
        let grid = build_grid(table);
        if grid.rows == 0 || grid.cols == 0 {
            return "<!-- table: 0x0, spans: 0, purpose: layout, complexity: simple -->".to_string();
        }

        let ambient = self.ambient_level;
        let row_level = (ambient + 1).clamp(1, 6);
        let col_level = (ambient + 2).clamp(1, 6);

        let mut out = vec![format!(
            "<!-- table: {}x{}, spans: {}, purpose: {}, complexity: {} -->",
            grid.rows,
            grid.cols,
            grid.span_count,
            grid.purpose(),
            grid.complexity()
        )];

        // Column labels: header rows joined top-down per column.
        let labels: Vec<String> = (0..grid.cols)
            .map(|c| {
                let parts: Vec<String> = grid.cells[..grid.header_rows]
                    .iter()
                    .filter_map(|row| row[c].as_ref())
                    .map(|slot| self.inline_text(&slot.content))
                    .filter(|t| !t.is_empty())
                    .collect();
                if parts.is_empty() {
                    format!("Column {}", c + 1)
                } else {
                    parts.join(" / ")
                }
            })
            .collect();

        for (n, row) in grid.cells[grid.header_rows..].iter().enumerate() {
            let (label, first_col) = if grid.has_header_column {
                let text = row[0]
                    .as_ref()
                    .map(|s| self.inline_text(&s.content))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| format!("Row {}", n + 1));
                (text, 1)
            } else {
                (format!("Row {}", n + 1), 0)
            };
            out.push(format!("{} {}", "#".repeat(row_level), label));

            for c in first_col..grid.cols {
                let slot = match &row[c] {
                    Some(slot) => slot,
                    None => continue,
                };
                let body = self.serialize_blocks(&slot.content).join("\n\n");
                if body.is_empty() {
                    continue;
                }
                out.push(format!("{} {}", "#".repeat(col_level), labels[c]));
                out.push(body);
            }
        }

        // Headings inside cells must not shift the document's level.
        self.ambient_level = ambient;
        out.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse_markup, process};

    fn table_el(raw: &str) -> Element {
        let nodes = parse_markup(raw);
        for node in nodes {
            if let Node::Element(el) = node {
                if el.name == "table" {
                    return el;
                }
            }
        }
        panic!("no table in input");
    }

    #[test]
    fn grid_shape_and_headers() {
        let el = table_el(
            "<table><tr><th>Name</th><th>Role</th></tr>\
             <tr><td>Ada</td><td>Engineer</td></tr></table>",
        );
        let grid = build_grid(&el);
        assert_eq!((grid.rows, grid.cols), (2, 2));
        assert_eq!(grid.header_rows, 1);
        assert_eq!(grid.span_count, 0);
        assert_eq!(grid.purpose(), "data");
        assert_eq!(grid.complexity(), "simple");
    }

    #[test]
    fn rowspan_expands_with_single_primary() {
        let el = table_el(
            "<table><tr><td rowspan=\"2\">shared</td><td>a</td></tr>\
             <tr><td>b</td></tr></table>",
        );
        let grid = build_grid(&el);
        assert_eq!(grid.span_count, 1);

        let top = grid.cells[0][0].as_ref().unwrap();
        let bottom = grid.cells[1][0].as_ref().unwrap();
        assert!(top.primary);
        assert!(!bottom.primary);
        // Both covered slots carry identical content.
        let mut p = Processor::default();
        assert_eq!(p.inline_text(&top.content), "shared");
        assert_eq!(p.inline_text(&bottom.content), "shared");
    }

    #[test]
    fn multi_row_headers_join_with_slash() {
        let raw = "<h2>Env</h2><table>\
            <tr><th>Region</th><th>Quota</th></tr>\
            <tr><th>id</th><th>limit</th></tr>\
            <tr><td>us-east</td><td>40</td></tr></table>";
        let out = process(raw, "p1");
        assert!(out.markdown.contains("#### Region / id"));
        assert!(out.markdown.contains("#### Quota / limit"));
    }

    #[test]
    fn annotation_reports_shape_and_spans() {
        let raw = "<table><tr><th>K</th><th>V</th></tr>\
            <tr><td colspan=\"2\">wide</td></tr></table>";
        let out = process(raw, "p1");
        assert!(out
            .markdown
            .contains("<!-- table: 2x2, spans: 1, purpose: data, complexity: spanned -->"));
        // Covered slots both render the spanned content.
        assert_eq!(out.markdown.matches("wide").count(), 2);
    }

    #[test]
    fn heading_levels_follow_ambient_and_cap_at_h6() {
        let raw = "<h5>Deep</h5><table><tr><th>A</th></tr><tr><td>x</td></tr></table>";
        let out = process(raw, "p1");
        // ambient 5 -> rows h6, columns capped at h6.
        assert!(out.markdown.contains("\n\n###### Row 1"));
        assert!(out.markdown.contains("###### A\n\nx"));
    }

    #[test]
    fn header_column_labels_rows() {
        let raw = "<table>\
            <tr><th>Service</th><td>api</td></tr>\
            <tr><th>Owner</th><td>platform</td></tr></table>";
        let out = process(raw, "p1");
        assert!(out.markdown.contains("# Service"));
        assert!(out.markdown.contains("# Owner"));
        let el = table_el(raw);
        assert_eq!(build_grid(&el).purpose(), "data");
    }

    #[test]
    fn layout_table_without_headers() {
        let el = table_el("<table><tr><td>a</td><td>b</td></tr></table>");
        let grid = build_grid(&el);
        assert_eq!(grid.purpose(), "layout");
        assert_eq!(grid.header_rows, 0);
    }

    #[test]
    fn absurd_span_is_clamped() {
        let el = table_el("<table><tr><td colspan=\"100000\">x</td></tr></table>");
        let grid = build_grid(&el);
        assert_eq!(grid.cols, MAX_SPAN);
    }
}
