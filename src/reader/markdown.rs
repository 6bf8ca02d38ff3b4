//! Markdown → typed document tree.
//!
//! pulldown-cmark produces a flat event stream; this folds it into nested
//! `Node`s so the aligner can walk blocks and their inline content.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Heading(u8),
    Paragraph,
    BlockQuote,
    List { start: Option<u64> },
    ListItem,
    /// Any other block wrapper (footnote definitions, tables, ...).
    Container,
    CodeBlock { lang: Option<String> },
    HtmlBlock,
    Rule,
    Emphasis,
    Strong,
    Strikethrough,
    Link { href: String, title: String },
    Image { src: String, title: String },
    Code,
    LineBreak,
}

impl NodeKind {
    /// Block-level nodes whose inline content is split into sentences.
    pub fn holds_sentences(&self) -> bool {
        matches!(
            self,
            Self::Heading(_) | Self::Paragraph | Self::BlockQuote | Self::ListItem | Self::Container
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Self::Emphasis
                | Self::Strong
                | Self::Strikethrough
                | Self::Link { .. }
                | Self::Image { .. }
                | Self::Code
                | Self::LineBreak
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element { kind: NodeKind, children: Vec<Node> },
    Text(String),
    /// Raw HTML, passed through untouched.
    Html(String),
}

impl Node {
    pub fn is_inline(&self) -> bool {
        match self {
            Self::Text(_) | Self::Html(_) => true,
            Self::Element { kind, .. } => kind.is_inline(),
        }
    }

    fn element(kind: NodeKind) -> Self {
        Self::Element {
            kind,
            children: Vec::new(),
        }
    }
}

fn kind_for(tag: Tag<'_>) -> NodeKind {
    match tag {
        Tag::Heading { level, .. } => NodeKind::Heading(level as u8),
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::List(start) => NodeKind::List { start },
        Tag::Item => NodeKind::ListItem,
        Tag::CodeBlock(CodeBlockKind::Fenced(lang)) if !lang.is_empty() => NodeKind::CodeBlock {
            lang: Some(lang.to_string()),
        },
        Tag::CodeBlock(_) => NodeKind::CodeBlock { lang: None },
        Tag::HtmlBlock => NodeKind::HtmlBlock,
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Link { dest_url, title, .. } => NodeKind::Link {
            href: dest_url.to_string(),
            title: title.to_string(),
        },
        Tag::Image { dest_url, title, .. } => NodeKind::Image {
            src: dest_url.to_string(),
            title: title.to_string(),
        },
        _ => NodeKind::Container,
    }
}

/// Append a child, merging adjacent text so one source run is one node.
fn push_child(children: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node {
        if let Some(Node::Text(prev)) = children.last_mut() {
            prev.push_str(text);
            return;
        }
    }
    children.push(node);
}

/// Parse markdown into a list of top-level block nodes.
pub fn to_tree(markdown: &str) -> Vec<Node> {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH);

    // Open elements; the bottom frame is the document root.
    let mut stack: Vec<(Option<NodeKind>, Vec<Node>)> = vec![(None, Vec::new())];

    for event in parser {
        match event {
            Event::Start(tag) => stack.push((Some(kind_for(tag)), Vec::new())),
            Event::End(_) => {
                if stack.len() < 2 {
                    continue;
                }
                let Some((Some(kind), children)) = stack.pop() else {
                    continue;
                };
                if let Some((_, parent)) = stack.last_mut() {
                    parent.push(Node::Element { kind, children });
                }
            }
            event => {
                let node = match event {
                    Event::Text(text) => Node::Text(text.to_string()),
                    Event::Code(code) => Node::Element {
                        kind: NodeKind::Code,
                        children: vec![Node::Text(code.to_string())],
                    },
                    Event::Html(html) | Event::InlineHtml(html) => Node::Html(html.to_string()),
                    Event::SoftBreak => Node::Text("\n".into()),
                    Event::HardBreak => Node::element(NodeKind::LineBreak),
                    Event::Rule => Node::element(NodeKind::Rule),
                    _ => continue,
                };
                if let Some((_, children)) = stack.last_mut() {
                    push_child(children, node);
                }
            }
        }
    }

    // Unbalanced streams should not happen, but fold anything left open.
    while stack.len() > 1 {
        if let Some((Some(kind), children)) = stack.pop() {
            if let Some((_, parent)) = stack.last_mut() {
                parent.push(Node::Element { kind, children });
            }
        }
    }

    stack.pop().map(|(_, nodes)| nodes).unwrap_or_default()
}

/// Concatenate the text under `nodes`, ignoring markup.
///
/// Image alt text is not part of the readable text; a hard line break reads
/// as a newline.
pub fn flatten(nodes: &[Node]) -> String {
    let mut out = String::new();
    flatten_into(nodes, &mut out);
    out
}

fn flatten_into(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Html(_) => {}
            Node::Element { kind: NodeKind::Image { .. }, .. } => {}
            Node::Element { kind: NodeKind::LineBreak, .. } => out.push('\n'),
            Node::Element { children, .. } => flatten_into(children, out),
        }
    }
}

/// Flatten markdown into one plain-text string for a speech-only consumer.
///
/// Block texts are joined with ". " so that headings and list items without
/// terminal punctuation still end a sentence.
pub fn plain_text_for_speech(markdown: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_block_texts(&to_tree(markdown), &mut parts);

    let joined = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(". ");

    collapse_double_periods(&joined)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_block_texts(nodes: &[Node], parts: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Element { kind, children } if kind.holds_sentences() => {
                parts.push(String::new());
                for child in children {
                    if child.is_inline() {
                        let text = flatten(std::slice::from_ref(child));
                        if let Some(last) = parts.last_mut() {
                            last.push_str(&text);
                        }
                    } else {
                        collect_block_texts(std::slice::from_ref(child), parts);
                        parts.push(String::new());
                    }
                }
            }
            Node::Element {
                kind: NodeKind::CodeBlock { .. } | NodeKind::HtmlBlock,
                ..
            } => {}
            Node::Element { children, .. } => collect_block_texts(children, parts),
            Node::Text(_) | Node::Html(_) => {}
        }
    }
}

/// "Koniec.. Dalej" → "Koniec. Dalej": a period followed only by whitespace
/// and another period becomes a single period.
fn collapse_double_periods(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c != '.' {
            continue;
        }
        let mut lookahead = chars.clone();
        let mut skipped = 0;
        while lookahead.peek().is_some_and(|w| w.is_whitespace()) {
            lookahead.next();
            skipped += 1;
        }
        if lookahead.peek() == Some(&'.') {
            for _ in 0..=skipped {
                chars.next();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.into())
    }

    #[test]
    fn heading_and_paragraph() {
        let tree = to_tree("# Tytuł\n\nTo jest akapit. Ma dwa zdania.");
        assert_eq!(
            tree,
            vec![
                Node::Element {
                    kind: NodeKind::Heading(1),
                    children: vec![text("Tytuł")],
                },
                Node::Element {
                    kind: NodeKind::Paragraph,
                    children: vec![text("To jest akapit. Ma dwa zdania.")],
                },
            ]
        );
    }

    #[test]
    fn inline_formatting_nests() {
        let tree = to_tree("Zobacz **stary *rynek*** i [mapę](https://example.com).");
        let Node::Element { kind, children } = &tree[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(*kind, NodeKind::Paragraph);
        assert_eq!(children[0], text("Zobacz "));
        assert!(matches!(&children[1], Node::Element { kind: NodeKind::Strong, .. }));
        assert!(matches!(
            &children[3],
            Node::Element { kind: NodeKind::Link { href, .. }, .. } if href == "https://example.com"
        ));
        assert_eq!(flatten(&tree), "Zobacz stary rynek i mapę.");
    }

    #[test]
    fn lists_and_quotes() {
        let tree = to_tree("- jeden\n- dwa\n\n> cytat");
        assert!(matches!(&tree[0], Node::Element { kind: NodeKind::List { start: None }, children } if children.len() == 2));
        assert!(matches!(&tree[1], Node::Element { kind: NodeKind::BlockQuote, .. }));
    }

    #[test]
    fn soft_break_becomes_newline_text() {
        let tree = to_tree("linia pierwsza\nlinia druga");
        assert_eq!(flatten(&tree), "linia pierwsza\nlinia druga");
    }

    #[test]
    fn image_alt_is_not_readable_text() {
        let tree = to_tree("Przed ![alt zamku](zamek.png) po.");
        assert_eq!(flatten(&tree), "Przed  po.");
    }

    #[test]
    fn plain_text_joins_blocks_with_periods() {
        let md = "# Tytuł\n\nTo jest akapit. Ma dwa zdania.\n\n- punkt\n- drugi punkt.";
        assert_eq!(
            plain_text_for_speech(md),
            "Tytuł. To jest akapit. Ma dwa zdania. punkt. drugi punkt."
        );
    }

    #[test]
    fn plain_text_skips_empty_blocks_and_code() {
        let md = "#\n\nTekst.\n\n```\nlet x = 1;\n```\n";
        assert_eq!(plain_text_for_speech(md), "Tekst.");
    }

    #[test]
    fn double_periods_collapse() {
        assert_eq!(collapse_double_periods("a.. b. . c"), "a. b. c");
        assert_eq!(collapse_double_periods("3.5 km"), "3.5 km");
    }
}
