//! Entity recognition tuned to the Québec mining regulatory lexicon.
//!
//! Recognition runs in two layers: a fixed [`DomainRuler`] whose matches always win, followed
//! by a generic [`EntityRecognizer`] (a remote model server or the built-in lexical rules).
//! The [`Annotator`] merges both layers and buckets spans by category.

pub mod annotate;
pub mod recognizer;
pub mod ruler;
pub mod tokenizer;

pub use annotate::{Annotator, EntityBuckets, MAX_ANALYZED_CHARS};
pub use recognizer::{
    EntityRecognizer, LexicalRecognizer, RecognizerError, RemoteRecognizer, build_recognizer,
};
pub use ruler::DomainRuler;

/// Category assigned to a recognized span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityLabel {
    /// Place name.
    Loc,
    /// Organisation.
    Org,
    /// Date expression.
    Date,
    /// Regulatory permit or authorisation.
    Permit,
    /// Environmental impact vocabulary.
    Impact,
    /// Any other label emitted by a generic model; never bucketed.
    Other(String),
}

impl EntityLabel {
    /// Parse a model label such as `LOC`, `GPE`, or `ORG`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "LOC" => Self::Loc,
            "ORG" => Self::Org,
            "DATE" => Self::Date,
            "PERMIT" => Self::Permit,
            "IMPACT" => Self::Impact,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Recognized span; offsets are byte positions into the analysed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    /// Surface text exactly as it appears in the document.
    pub text: String,
    /// Assigned category.
    pub label: EntityLabel,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl EntitySpan {
    /// Build a span covering `text[start..end]`.
    pub fn from_range(text: &str, start: usize, end: usize, label: EntityLabel) -> Self {
        Self {
            text: text[start..end].to_string(),
            label,
            start,
            end,
        }
    }

    /// Whether two spans share at least one byte.
    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}
