//! Re-attach global sentence identity to rendered markdown.
//!
//! The tree is walked in document order. Every run of inline content inside a
//! sentence-holding block (heading, paragraph, list item, blockquote,
//! container) is one block: its flattened text is segmented, and each text
//! node is matched piecewise against the block's sentences. Matched pieces
//! become clickable spans tagged with a global index. A block reserves
//! `max(1, sentences)` indices so empty blocks still take a slot.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::markdown::{flatten, to_tree, Node, NodeKind};
use super::matcher::match_prefix;
use super::segmenter::{segment, Sentence};

/// Part of a sentence as it appears inside one rendered text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSpan {
    pub index: usize,
    pub text: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Element {
        kind: NodeKind,
        children: Vec<Rendered>,
    },
    /// Text that belongs to no sentence.
    Text(String),
    Sentence(SentenceSpan),
    Html(String),
}

/// One speakable sentence, keyed by its global index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    pub index: usize,
    pub text: String,
}

/// Sentences in reading order with the global indices the renderer uses.
///
/// Slots reserved by empty blocks have no entry, so narration never targets
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NarrationScript {
    pub entries: Vec<ScriptEntry>,
    /// Number of global indices allocated, including reserved empty slots.
    pub slots: usize,
}

impl NarrationScript {
    pub fn from_markdown(markdown: &str) -> Self {
        align(markdown, None).script
    }

    /// Plain text has no blocks: every sentence is its own slot.
    pub fn from_plain_text(text: &str) -> Self {
        let entries: Vec<ScriptEntry> = segment(text)
            .into_iter()
            .map(|s| ScriptEntry {
                index: s.index,
                text: s.text,
            })
            .collect();
        Self {
            slots: entries.len(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the first entry at or after global index `index`.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.entries.iter().position(|e| e.index >= index)
    }
}

pub type SentenceClick = Arc<dyn Fn(usize) + Send + Sync>;

/// Rendered markdown with highlightable sentence spans.
pub struct HighlightedDocument {
    pub nodes: Vec<Rendered>,
    pub script: NarrationScript,
    pub highlighted: Option<usize>,
    on_sentence_click: Option<SentenceClick>,
}

impl fmt::Debug for HighlightedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightedDocument")
            .field("nodes", &self.nodes)
            .field("script", &self.script)
            .field("highlighted", &self.highlighted)
            .finish_non_exhaustive()
    }
}

impl HighlightedDocument {
    /// All sentence spans in document order.
    pub fn spans(&self) -> Vec<&SentenceSpan> {
        fn walk<'a>(nodes: &'a [Rendered], out: &mut Vec<&'a SentenceSpan>) {
            for node in nodes {
                match node {
                    Rendered::Sentence(span) => out.push(span),
                    Rendered::Element { children, .. } => walk(children, out),
                    Rendered::Text(_) | Rendered::Html(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, &mut out);
        out
    }

    /// Rendered text of global index `index`.
    ///
    /// Spans are joined together with the plain whitespace and line breaks
    /// rendered between them.
    pub fn sentence_text(&self, index: usize) -> String {
        struct Collector {
            index: usize,
            out: String,
            gap: String,
            inside: bool,
        }

        fn walk(nodes: &[Rendered], c: &mut Collector) {
            for node in nodes {
                match node {
                    Rendered::Sentence(span) if span.index == c.index => {
                        if c.inside {
                            c.out.push_str(&c.gap);
                        }
                        c.out.push_str(&span.text);
                        c.gap.clear();
                        c.inside = true;
                    }
                    Rendered::Sentence(_) => {
                        c.inside = false;
                        c.gap.clear();
                    }
                    Rendered::Text(text) if c.inside => c.gap.push_str(text),
                    Rendered::Element {
                        kind: NodeKind::LineBreak,
                        ..
                    } if c.inside => c.gap.push('\n'),
                    Rendered::Element { children, .. } => walk(children, c),
                    Rendered::Text(_) | Rendered::Html(_) => {}
                }
            }
        }

        let mut collector = Collector {
            index,
            out: String::new(),
            gap: String::new(),
            inside: false,
        };
        walk(&self.nodes, &mut collector);
        collector.out
    }

    /// Forward a click on `span` to the click handler.
    pub fn click(&self, span: &SentenceSpan) {
        if let Some(handler) = &self.on_sentence_click {
            handler(span.index);
        }
    }
}

/// Render markdown with sentence spans, highlighting `highlighted`.
pub fn render_highlighted(
    markdown: &str,
    highlighted: Option<usize>,
    on_sentence_click: SentenceClick,
) -> HighlightedDocument {
    HighlightedDocument {
        on_sentence_click: Some(on_sentence_click),
        ..align(markdown, highlighted)
    }
}

/// Render markdown with sentence spans and no click handler.
pub fn align(markdown: &str, highlighted: Option<usize>) -> HighlightedDocument {
    let tree = to_tree(markdown);
    let mut state = AlignState {
        next_index: 0,
        highlighted,
        script: Vec::new(),
    };
    let nodes = render_children(&tree, false, &mut state);
    debug!(
        slots = state.next_index,
        sentences = state.script.len(),
        "aligned markdown"
    );

    HighlightedDocument {
        nodes,
        script: NarrationScript {
            entries: state.script,
            slots: state.next_index,
        },
        highlighted,
        on_sentence_click: None,
    }
}

/// Accumulator threaded through the traversal.
struct AlignState {
    /// Cumulative `max(1, n)` over all closed blocks.
    next_index: usize,
    highlighted: Option<usize>,
    script: Vec<ScriptEntry>,
}

impl AlignState {
    fn open_block(&mut self, text: &str) -> BlockCursor {
        let sentences = segment(text.trim());
        let base = self.next_index;
        self.script.extend(sentences.iter().map(|s| ScriptEntry {
            index: base + s.index,
            text: s.text.clone(),
        }));
        BlockCursor {
            base,
            sentences,
            current: 0,
            consumed: 0,
        }
    }

    fn close_block(&mut self, cursor: BlockCursor) {
        self.next_index += cursor.sentences.len().max(1);
    }
}

/// Matching position inside one block's sentences.
struct BlockCursor {
    base: usize,
    sentences: Vec<Sentence>,
    current: usize,
    /// Bytes of the current sentence already matched.
    consumed: usize,
}

fn render_children(children: &[Node], holds_sentences: bool, state: &mut AlignState) -> Vec<Rendered> {
    let mut out = Vec::with_capacity(children.len());

    if !holds_sentences {
        for child in children {
            out.push(render_plain(child, state));
        }
        return out;
    }

    if children.is_empty() {
        let cursor = state.open_block("");
        state.close_block(cursor);
        return out;
    }

    let mut i = 0;
    while i < children.len() {
        if !children[i].is_inline() {
            out.push(render_plain(&children[i], state));
            i += 1;
            continue;
        }

        let run_end = children[i..]
            .iter()
            .position(|n| !n.is_inline())
            .map_or(children.len(), |p| i + p);
        let run = &children[i..run_end];

        let mut cursor = state.open_block(&flatten(run));
        for node in run {
            render_inline(node, &mut cursor, state.highlighted, &mut out);
        }
        state.close_block(cursor);
        i = run_end;
    }

    out
}

/// Render a node outside any sentence run.
fn render_plain(node: &Node, state: &mut AlignState) -> Rendered {
    match node {
        Node::Text(text) => Rendered::Text(text.clone()),
        Node::Html(html) => Rendered::Html(html.clone()),
        Node::Element { kind, children } => {
            // Code blocks and raw HTML are shown but never read.
            let holds = kind.holds_sentences();
            let children = match kind {
                NodeKind::CodeBlock { .. } | NodeKind::HtmlBlock => {
                    children.iter().map(plain_copy).collect()
                }
                _ => render_children(children, holds, state),
            };
            Rendered::Element {
                kind: kind.clone(),
                children,
            }
        }
    }
}

fn plain_copy(node: &Node) -> Rendered {
    match node {
        Node::Text(text) => Rendered::Text(text.clone()),
        Node::Html(html) => Rendered::Html(html.clone()),
        Node::Element { kind, children } => Rendered::Element {
            kind: kind.clone(),
            children: children.iter().map(plain_copy).collect(),
        },
    }
}

fn render_inline(node: &Node, cursor: &mut BlockCursor, highlighted: Option<usize>, out: &mut Vec<Rendered>) {
    match node {
        Node::Text(text) => align_text(text, cursor, highlighted, out),
        Node::Html(html) => out.push(Rendered::Html(html.clone())),
        Node::Element {
            kind: kind @ NodeKind::Image { .. },
            children,
        } => out.push(Rendered::Element {
            kind: kind.clone(),
            children: children.iter().map(plain_copy).collect(),
        }),
        Node::Element { kind, children } => {
            let mut rendered = Vec::with_capacity(children.len());
            for child in children {
                render_inline(child, cursor, highlighted, &mut rendered);
            }
            out.push(Rendered::Element {
                kind: kind.clone(),
                children: rendered,
            });
        }
    }
}

/// Split one text node into sentence spans and leftover plain text.
///
/// Whitespace between sentences stays plain; whitespace inside a sentence
/// joins its span so the highlight is continuous.
fn align_text(text: &str, cursor: &mut BlockCursor, highlighted: Option<usize>, out: &mut Vec<Rendered>) {
    let mut rest = text;

    while !rest.is_empty() && cursor.current < cursor.sentences.len() {
        let sentence = cursor.sentences[cursor.current].text.as_str();

        if cursor.consumed == 0 {
            let ws_len = rest.len() - rest.trim_start().len();
            if ws_len > 0 {
                push_plain(out, &rest[..ws_len]);
                rest = &rest[ws_len..];
                continue;
            }
        }

        let (text_len, sentence_len) = match_prefix(rest, &sentence[cursor.consumed..]);
        if rest[..text_len].trim().is_empty() {
            // Render and segmentation disagree here; emit what was skipped
            // (or one char) as plain text and retry.
            let skip = if text_len > 0 {
                text_len
            } else {
                rest.chars().next().map_or(rest.len(), char::len_utf8)
            };
            push_plain(out, &rest[..skip]);
            rest = &rest[skip..];
            continue;
        }

        let index = cursor.base + cursor.current;
        out.push(Rendered::Sentence(SentenceSpan {
            index,
            text: rest[..text_len].to_string(),
            highlighted: highlighted == Some(index),
        }));
        rest = &rest[text_len..];
        cursor.consumed += sentence_len;

        if sentence[cursor.consumed..].trim().is_empty() {
            cursor.current += 1;
            cursor.consumed = 0;
        }
    }

    if !rest.is_empty() {
        push_plain(out, rest);
    }
}

fn push_plain(out: &mut Vec<Rendered>, text: &str) {
    if let Some(Rendered::Text(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(Rendered::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::reader::matcher::normalize_whitespace;

    fn indices(doc: &HighlightedDocument) -> Vec<usize> {
        let mut seen: Vec<usize> = doc.spans().iter().map(|s| s.index).collect();
        seen.dedup();
        seen
    }

    #[test]
    fn heading_then_two_sentence_paragraph() {
        let doc = align("# Tytuł\n\nTo jest akapit. Ma dwa zdania.", None);
        assert_eq!(doc.script.slots, 3);
        assert_eq!(doc.sentence_text(1), "To jest akapit.");
        assert_eq!(doc.sentence_text(2), "Ma dwa zdania.");
        let Rendered::Element { kind, children } = &doc.nodes[1] else {
            panic!("expected paragraph");
        };
        assert_eq!(*kind, NodeKind::Paragraph);
        assert!(children
            .iter()
            .all(|c| !matches!(c, Rendered::Sentence(s) if s.index == 0)));
    }

    #[test]
    fn empty_heading_reserves_a_slot_without_spans() {
        let doc = align("#\n\nPierwsze. Drugie.", None);
        assert_eq!(doc.script.slots, 3);
        assert_eq!(indices(&doc), vec![1, 2]);
        let script: Vec<usize> = doc.script.entries.iter().map(|e| e.index).collect();
        assert_eq!(script, vec![1, 2]);
        assert_eq!(doc.script.position_of(0), Some(0));
    }

    #[test]
    fn sentence_spanning_formatting_nodes() {
        let doc = align("To jest **bardzo ważne** zdanie. A to *drugie*.", None);
        assert_eq!(doc.sentence_text(0), "To jest bardzo ważne zdanie.");
        assert_eq!(doc.sentence_text(1), "A to drugie.");
        let zero_spans = doc.spans().iter().filter(|s| s.index == 0).count();
        assert_eq!(zero_spans, 3);
    }

    #[test]
    fn highlight_marks_only_requested_index() {
        let doc = align("Jeden. Dwa. Trzy.", Some(1));
        for span in doc.spans() {
            assert_eq!(span.highlighted, span.index == 1);
        }
        assert!(doc.spans().iter().any(|s| s.highlighted));
    }

    #[test]
    fn nested_blocks_keep_reading_order() {
        let md = "> Cytat pierwszy. Cytat drugi.\n\n- Punkt A\n  - Podpunkt B.\n- Punkt C.\n\nKoniec.";
        let doc = align(md, None);
        let script: Vec<(usize, &str)> = doc
            .script
            .entries
            .iter()
            .map(|e| (e.index, e.text.as_str()))
            .collect();
        assert_eq!(
            script,
            vec![
                (0, "Cytat pierwszy."),
                (1, "Cytat drugi."),
                (2, "Punkt A"),
                (3, "Podpunkt B."),
                (4, "Punkt C."),
                (5, "Koniec."),
            ]
        );
        for entry in &doc.script.entries {
            assert_eq!(
                normalize_whitespace(&doc.sentence_text(entry.index)),
                normalize_whitespace(&entry.text)
            );
        }
    }

    #[test]
    fn soft_breaks_inside_sentence_match() {
        let doc = align("Zamek stoi\nnad rzeką. Ma\n  wieżę.", None);
        assert_eq!(normalize_whitespace(&doc.sentence_text(0)), "Zamek stoi nad rzeką.");
        assert_eq!(normalize_whitespace(&doc.sentence_text(1)), "Ma wieżę.");
    }

    #[test]
    fn code_blocks_are_not_aligned() {
        let doc = align("Przed.\n\n```\nfn main() {}\n```\n\nPo.", None);
        assert_eq!(doc.script.slots, 2);
        assert_eq!(doc.sentence_text(1), "Po.");
        assert!(doc.spans().iter().all(|s| !s.text.contains("main")));
    }

    #[test]
    fn slot_count_is_sum_of_block_floors() {
        let md = "# A\n\n##\n\nB. C. D.\n\n- e\n- f. g.\n\n> \n";
        let doc = align(md, None);
        // A=1, empty h2=1, paragraph=3, e=1, f/g=2, empty quote=1
        assert_eq!(doc.script.slots, 9);
        assert_eq!(doc.script.len(), 7);
    }

    #[test]
    fn alignment_invariant_over_sample_documents() {
        let docs = [
            "# Wawel\n\nZamek stoi nad rzeką. Zbudowano go w XIV wieku!\n\n## Zwiedzanie\n\nBilety: 30 zł; ulgowe 20 zł.",
            "Akapit z [linkiem](https://example.com) w środku. I `kodem` też.\n\n1. Pierwszy krok.\n2. Drugi *krok*.",
            "> **Uwaga:** wejście od strony rzeki.\n> Zamknięte w poniedziałki.",
            "Linia z twardym  \nłamaniem. Kolejne zdanie!",
        ];
        for md in docs {
            let doc = align(md, None);
            assert!(doc.script.slots >= doc.script.len());
            let mut last = None;
            for entry in &doc.script.entries {
                assert!(last.map_or(true, |l| entry.index > l), "order in {md:?}");
                last = Some(entry.index);
                assert_eq!(
                    normalize_whitespace(&doc.sentence_text(entry.index)),
                    normalize_whitespace(&entry.text),
                    "sentence {} in {md:?}",
                    entry.index
                );
            }
        }
    }

    #[test]
    fn click_forwards_global_index() {
        let clicked = Arc::new(Mutex::new(Vec::new()));
        let sink = clicked.clone();
        let doc = render_highlighted(
            "# Tytuł\n\nTo jest akapit. Ma dwa zdania.",
            None,
            Arc::new(move |i| sink.lock().unwrap().push(i)),
        );
        let spans = doc.spans();
        let last = spans.last().unwrap();
        doc.click(last);
        doc.click(spans[0]);
        assert_eq!(*clicked.lock().unwrap(), vec![2, 0]);
    }

    #[test]
    fn divergent_text_falls_back_to_plain() {
        let mut cursor = BlockCursor {
            base: 4,
            sentences: segment("Zupełnie inne zdanie."),
            current: 0,
            consumed: 0,
        };
        let mut out = Vec::new();
        align_text("Xyz", &mut cursor, None, &mut out);
        assert_eq!(out, vec![Rendered::Text("Xyz".into())]);
        assert_eq!(cursor.current, 0);
    }

    #[test]
    fn plain_text_script_uses_segment_indices() {
        let script = NarrationScript::from_plain_text("Jeden. Dwa!");
        assert_eq!(script.slots, 2);
        assert_eq!(script.entries[1].index, 1);
        assert_eq!(script.entries[1].text, "Dwa!");
    }
}
