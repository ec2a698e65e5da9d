use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::KnowledgeGraph;
use crate::layout::{Layout, LayoutConfig, layout};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write graph document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub title: String,
    pub background: String,
    pub font_color: String,
    pub node_color: String,
    pub edge_color: String,
    pub node_radius: f64,
    pub font_size: f64,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            title: "Knowledge Graph".to_string(),
            background: "#222222".to_string(),
            font_color: "white".to_string(),
            node_color: "#97c2fc".to_string(),
            edge_color: "#848484".to_string(),
            node_radius: 10.0,
            font_size: 12.0,
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Offset of the k-th edge between the same pair of nodes: 0, +d, -d, +2d, -2d, ...
fn bend(k: usize) -> f64 {
    const SPACING: f64 = 28.0;
    if k == 0 {
        return 0.0;
    }
    let step = k.div_ceil(2) as f64 * SPACING;
    if k % 2 == 1 { step } else { -step }
}

/// Self-contained HTML page with the graph drawn as inline SVG.
pub fn render_html(graph: &KnowledgeGraph, layout: &Layout, style: &RenderStyle) -> String {
    let r = style.node_radius;
    let mut svg = String::new();

    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="100%" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="{fs}">
<defs><marker id="arrow" viewBox="0 0 10 10" refX="{rx}" refY="5" markerWidth="10" markerHeight="10" markerUnits="userSpaceOnUse" orient="auto-start-reverse"><path d="M 0 0 L 10 5 L 0 10 z" fill="{ec}"/></marker></defs>
<rect width="100%" height="100%" fill="{bg}"/>
<g class="edges" fill="none" stroke="{ec}" stroke-width="1.5">
"#,
        w = layout.width,
        h = layout.height,
        fs = style.font_size,
        rx = 10.0 + r,
        ec = style.edge_color,
        bg = style.background,
    );

    let mut labels = String::new();
    let mut seen_pairs: HashMap<(usize, usize), usize> = HashMap::new();

    for (source, target, label) in graph.indexed_edges() {
        let (x1, y1) = layout.positions[source];
        let (x2, y2) = layout.positions[target];
        let label = escape_html(label);

        let (path, lx, ly) = if source == target {
            let k = seen_pairs.entry((source, source)).or_insert(0);
            let lift = 40.0 + *k as f64 * 18.0;
            *k += 1;
            (
                format!(
                    "M {:.1} {:.1} C {:.1} {:.1} {:.1} {:.1} {:.1} {:.1}",
                    x1 - r * 0.5,
                    y1 - r,
                    x1 - lift,
                    y1 - lift * 1.5,
                    x1 + lift,
                    y1 - lift * 1.5,
                    x1 + r * 0.5,
                    y1 - r
                ),
                x1,
                y1 - lift * 1.15,
            )
        } else {
            // Parallel edges in either direction share one counter so they fan out.
            let key = (source.min(target), source.max(target));
            let k = seen_pairs.entry(key).or_insert(0);
            let mut offset = bend(*k);
            *k += 1;
            if source > target {
                offset = -offset;
            }

            let (dx, dy) = (x2 - x1, y2 - y1);
            let len = (dx * dx + dy * dy).sqrt().max(f64::EPSILON);
            let (nx, ny) = (-dy / len, dx / len);
            let (mx, my) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
            let (qx, qy) = (mx + nx * offset * 2.0, my + ny * offset * 2.0);
            (
                format!("M {x1:.1} {y1:.1} Q {qx:.1} {qy:.1} {x2:.1} {y2:.1}"),
                0.25 * x1 + 0.5 * qx + 0.25 * x2,
                0.25 * y1 + 0.5 * qy + 0.25 * y2,
            )
        };

        let _ = writeln!(
            svg,
            r#"<path d="{path}" marker-end="url(#arrow)"><title>{label}</title></path>"#
        );
        let _ = writeln!(
            labels,
            r#"<text x="{lx:.1}" y="{ly:.1}" text-anchor="middle">{label}</text>"#
        );
    }

    let _ = writeln!(svg, "</g>");
    let _ = writeln!(
        svg,
        r#"<g class="edge-labels" fill="{}" fill-opacity="0.75">"#,
        style.font_color
    );
    svg.push_str(&labels);
    let _ = writeln!(svg, "</g>");

    let _ = writeln!(
        svg,
        r##"<g class="nodes" fill="{}" stroke="#2b7ce9" stroke-width="1.5">"##,
        style.node_color
    );
    for (name, &(x, y)) in graph.nodes().zip(layout.positions.iter()) {
        let _ = writeln!(
            svg,
            r#"<circle cx="{x:.1}" cy="{y:.1}" r="{r}"><title>{}</title></circle>"#,
            escape_html(name)
        );
    }
    let _ = writeln!(svg, "</g>");

    let _ = writeln!(svg, r#"<g class="node-labels" fill="{}">"#, style.font_color);
    for (name, &(x, y)) in graph.nodes().zip(layout.positions.iter()) {
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            x,
            y + r + style.font_size + 2.0,
            escape_html(name)
        );
    }
    let _ = writeln!(svg, "</g>\n</svg>");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
html, body {{ margin: 0; background: {bg}; color: {fg}; font-family: sans-serif; }}
.summary {{ padding: 6px 10px; font-size: 13px; opacity: 0.8; }}
</style>
</head>
<body>
<div class="summary">{nodes} nodes, {edges} edges</div>
{svg}</body>
</html>
"#,
        title = escape_html(&style.title),
        bg = style.background,
        fg = style.font_color,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
    )
}

/// Lays out, renders, and writes graph documents.
#[derive(Debug, Clone, Default)]
pub struct GraphRenderer {
    layout: LayoutConfig,
    style: RenderStyle,
}

impl GraphRenderer {
    pub fn new(layout: LayoutConfig, style: RenderStyle) -> Self {
        Self { layout, style }
    }

    pub fn render(&self, graph: &KnowledgeGraph) -> String {
        let positions = layout(graph, &self.layout);
        render_html(graph, &positions, &self.style)
    }

    /// Render `graph` and replace the document at `path`.
    ///
    /// The page is written to a temporary file in the same directory and renamed
    /// over `path`, so readers see either the old or the new document in full.
    pub fn render_to(&self, graph: &KnowledgeGraph, path: &Path) -> Result<(), RenderError> {
        let html = self.render(graph);
        write_atomically(path, html.as_bytes())?;

        tracing::info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Rendered graph document"
        );
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    let io_err = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    // Dropping the temp file on the error path removes it.
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
