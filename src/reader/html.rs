//! HTML output for aligned documents.
//!
//! Sentence spans become `<span class="sentence" data-sentence="N">`; the
//! highlighted one also carries the `highlighted` class. A page script turns
//! clicks on `[data-sentence]` into `play_from(N)`.

use std::fmt::Write;

use super::aligner::{HighlightedDocument, Rendered, SentenceSpan};
use super::markdown::NodeKind;

impl HighlightedDocument {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.nodes, &mut out);
        out
    }
}

fn write_nodes(nodes: &[Rendered], out: &mut String) {
    for node in nodes {
        match node {
            Rendered::Text(text) => escape_into(text, out),
            Rendered::Html(html) => out.push_str(html),
            Rendered::Sentence(span) => write_span(span, out),
            Rendered::Element { kind, children } => write_element(kind, children, out),
        }
    }
}

fn write_span(span: &SentenceSpan, out: &mut String) {
    let class = if span.highlighted {
        "sentence highlighted"
    } else {
        "sentence"
    };
    let _ = write!(out, "<span class=\"{class}\" data-sentence=\"{}\">", span.index);
    escape_into(&span.text, out);
    out.push_str("</span>");
}

fn write_element(kind: &NodeKind, children: &[Rendered], out: &mut String) {
    match kind {
        NodeKind::LineBreak => {
            out.push_str("<br />\n");
            return;
        }
        NodeKind::Rule => {
            out.push_str("<hr />\n");
            return;
        }
        NodeKind::Image { src, title } => {
            out.push_str("<img src=\"");
            escape_into(src, out);
            out.push_str("\" alt=\"");
            escape_into(&plain_text(children), out);
            out.push('"');
            if !title.is_empty() {
                out.push_str(" title=\"");
                escape_into(title, out);
                out.push('"');
            }
            out.push_str(" />");
            return;
        }
        _ => {}
    }

    let (open, close) = tags(kind);
    out.push_str(&open);
    write_nodes(children, out);
    out.push_str(&close);
}

fn tags(kind: &NodeKind) -> (String, String) {
    match kind {
        NodeKind::Heading(level) => (format!("<h{level}>"), format!("</h{level}>\n")),
        NodeKind::Paragraph => ("<p>".into(), "</p>\n".into()),
        NodeKind::BlockQuote => ("<blockquote>\n".into(), "</blockquote>\n".into()),
        NodeKind::List { start: None } => ("<ul>\n".into(), "</ul>\n".into()),
        NodeKind::List { start: Some(1) } => ("<ol>\n".into(), "</ol>\n".into()),
        NodeKind::List { start: Some(n) } => (format!("<ol start=\"{n}\">\n"), "</ol>\n".into()),
        NodeKind::ListItem => ("<li>".into(), "</li>\n".into()),
        NodeKind::Container => ("<div>".into(), "</div>\n".into()),
        NodeKind::CodeBlock { lang: Some(lang) } => {
            let mut open = String::from("<pre><code class=\"language-");
            escape_into(lang, &mut open);
            open.push_str("\">");
            (open, "</code></pre>\n".into())
        }
        NodeKind::CodeBlock { lang: None } => ("<pre><code>".into(), "</code></pre>\n".into()),
        NodeKind::HtmlBlock => (String::new(), String::new()),
        NodeKind::Emphasis => ("<em>".into(), "</em>".into()),
        NodeKind::Strong => ("<strong>".into(), "</strong>".into()),
        NodeKind::Strikethrough => ("<del>".into(), "</del>".into()),
        NodeKind::Code => ("<code>".into(), "</code>".into()),
        NodeKind::Link { href, title } => {
            let mut open = String::from("<a href=\"");
            escape_into(href, &mut open);
            open.push('"');
            if !title.is_empty() {
                open.push_str(" title=\"");
                escape_into(title, &mut open);
                open.push('"');
            }
            open.push('>');
            (open, "</a>".into())
        }
        // Void elements are written directly.
        NodeKind::LineBreak | NodeKind::Rule | NodeKind::Image { .. } => (String::new(), String::new()),
    }
}

fn plain_text(nodes: &[Rendered]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Rendered::Text(text) => out.push_str(text),
            Rendered::Sentence(span) => out.push_str(&span.text),
            Rendered::Element { children, .. } => out.push_str(&plain_text(children)),
            Rendered::Html(_) => {}
        }
    }
    out
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
