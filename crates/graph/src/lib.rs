pub mod builder;
pub mod layout;
pub mod render;

pub use builder::{BuildReport, EdgeView, KnowledgeGraph, build_graph, build_report};
pub use layout::{Layout, LayoutConfig, layout};
pub use render::{GraphRenderer, RenderError, RenderStyle, escape_html, render_html};
