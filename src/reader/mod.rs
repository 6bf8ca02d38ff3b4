//! Reader: sentence segmentation and markdown sentence alignment.
//!
//! Components:
//! - `segmenter`: punctuation-based sentence splitting with offsets
//! - `matcher`: whitespace-insensitive prefix matching
//! - `markdown`: pulldown-cmark events folded into a node tree
//! - `aligner`: global sentence indices attached to rendered markdown
//! - `html`: HTML output with clickable sentence spans

pub mod aligner;
pub mod html;
pub mod markdown;
pub mod matcher;
pub mod segmenter;

pub use aligner::{align, render_highlighted, HighlightedDocument, NarrationScript, ScriptEntry, SentenceSpan};
pub use markdown::plain_text_for_speech;
pub use segmenter::{segment, Sentence};
