//! Splitting input text into paragraphs (the unit of work) and hashing them.
//!
//! A paragraph here is one sentence: text up to a sentence delimiter or a line
//! break. Leading spaces/tabs of a line become the first sentence's indent,
//! and the run of line breaks after a sentence becomes its separator, so the
//! original layout can be rebuilt from the stored pieces.

use sha2::{Digest, Sha256};

use crate::model::ParagraphMeta;

/// One unit of work cut out of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitParagraph {
    pub text: String,
    pub indent: String,
    pub separator: String,
}

impl SplitParagraph {
    pub fn meta(&self) -> ParagraphMeta {
        ParagraphMeta {
            indent: self.indent.clone(),
            separator: self.separator.clone(),
            content_hash: content_hash(&self.text),
            planned_segments: None,
        }
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '!' | '?' | ';' | '；')
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

/// Splits `text` into sentence units.
///
/// An ASCII `.` ends a sentence only when followed by whitespace or the end
/// of input, so decimals and abbreviations like `3.5` stay whole.
pub fn split_paragraphs(text: &str) -> Vec<SplitParagraph> {
    let mut out: Vec<SplitParagraph> = Vec::new();
    let mut sentence = String::new();
    let mut indent = String::new();
    let mut at_line_start = true;
    let mut chars = text.chars().peekable();

    fn push(out: &mut Vec<SplitParagraph>, sentence: &str, indent: &str) -> bool {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            return false;
        }
        out.push(SplitParagraph {
            text: trimmed.to_string(),
            indent: indent.to_string(),
            separator: String::new(),
        });
        true
    }

    while let Some(c) = chars.next() {
        if at_line_start {
            if c == ' ' || c == '\t' {
                indent.push(c);
                continue;
            }
            if is_line_break(c) {
                if let Some(last) = out.last_mut() {
                    last.separator.push(c);
                }
                indent.clear();
                continue;
            }
            at_line_start = false;
        }

        if is_line_break(c) {
            push(&mut out, &sentence, &indent);
            if let Some(last) = out.last_mut() {
                last.separator.push(c);
            }
            sentence.clear();
            indent.clear();
            at_line_start = true;
            continue;
        }

        sentence.push(c);
        let ends = is_delimiter(c)
            || (c == '.' && chars.peek().map_or(true, |next| next.is_whitespace()));
        if ends && push(&mut out, &sentence, &indent) {
            sentence.clear();
            indent.clear();
        }
    }

    push(&mut out, &sentence, &indent);
    out
}

/// Hex SHA-256 of a unit's text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
