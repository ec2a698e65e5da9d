//! Server-rendered pages for the two-step flow.

use graph::escape_html;
use uuid::Uuid;

use crate::pipeline::GraphOutcome;
use crate::session::SessionContext;

pub const UPLOAD_TITLE: &str = "Packet Graph - Graph Packet Captures";
pub const GRAPH_TITLE: &str = "Knowledge Graph from Packet Capture";
pub const UPLOAD_SUCCESS: &str = "PCAP file uploaded and converted to JSON.";

const STYLE: &str = "body{font-family:sans-serif;max-width:900px;margin:2rem auto;padding:0 1rem;color:#262730}\
.ok{background:#e8f5e9;border-left:4px solid #2e7d32;padding:.75rem}\
.err{background:#fdecea;border-left:4px solid #c62828;padding:.75rem}\
button{padding:.5rem 1rem;font-size:1rem}\
iframe{border:0}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// `accept` lists the configured capture extensions.
pub fn upload_page(extensions: &[String]) -> String {
    let accept = extensions
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");

    page(
        UPLOAD_TITLE,
        &format!(
            "<form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
             <label for=\"capture\">Choose a PCAP file</label>\n\
             <input id=\"capture\" type=\"file\" name=\"capture\" accept=\"{accept}\" required>\n\
             <button type=\"submit\">Upload</button>\n</form>",
            accept = escape_html(&accept),
        ),
    )
}

pub fn uploaded_page(session: &SessionContext) -> String {
    let name = session
        .capture_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    page(
        UPLOAD_TITLE,
        &format!(
            "<p class=\"ok\">{UPLOAD_SUCCESS}</p>\n\
             <p>Capture: <code>{name}</code></p>\n\
             <form action=\"/sessions/{id}/graph\" method=\"post\">\n\
             <button type=\"submit\">Proceed to Graph</button>\n</form>",
            name = escape_html(&name),
            id = session.id(),
        ),
    )
}

pub fn graph_page(session_id: Uuid, outcome: &GraphOutcome) -> String {
    let mut body = format!(
        "<p>{nodes} nodes, {edges} edges</p>\n\
         <iframe src=\"/graph.html?session={session_id}\" width=\"820\" height=\"620\" \
         title=\"{title}\"></iframe>\n",
        nodes = outcome.nodes,
        edges = outcome.edges,
        title = escape_html(GRAPH_TITLE),
    );

    if !outcome.skipped.is_empty() {
        body.push_str(&format!(
            "<details>\n<summary>{} malformed triples skipped</summary>\n<ul>\n",
            outcome.skipped.len()
        ));
        for skipped in &outcome.skipped {
            body.push_str(&format!("<li>{}</li>\n", escape_html(&skipped.to_string())));
        }
        body.push_str("</ul>\n</details>\n");
    }

    body.push_str("<p><a href=\"/\">Upload another capture</a></p>");
    page(GRAPH_TITLE, &body)
}

pub fn error_page(message: &str, hint: &str) -> String {
    page(
        "Something went wrong",
        &format!(
            "<p class=\"err\">{message}</p>\n<p>{hint}</p>\n<p><a href=\"/\">Back to upload</a></p>",
            message = escape_html(message),
            hint = escape_html(hint),
        ),
    )
}
