//! Merge domain and generic spans, then bucket them by category.

use crate::nlp::recognizer::{EntityRecognizer, RecognizerError};
use crate::nlp::ruler::DomainRuler;
use crate::nlp::{EntityLabel, EntitySpan};
use std::sync::Arc;

/// Text beyond this many characters is not analysed for entities.
pub const MAX_ANALYZED_CHARS: usize = 100_000;

/// Unique entity strings per category, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityBuckets {
    /// Organisations (`ORG`).
    pub entities: Vec<String>,
    /// Place names (`LOC`).
    pub locations: Vec<String>,
    /// Date expressions (`DATE`).
    pub dates: Vec<String>,
    /// Permits (`PERMIT`).
    pub permits: Vec<String>,
    /// Environmental impacts (`IMPACT`).
    pub impacts: Vec<String>,
}

impl EntityBuckets {
    /// Append `text` to the bucket for `label` unless that exact string is already there.
    pub fn push(&mut self, label: &EntityLabel, text: &str) {
        let bucket = match label {
            EntityLabel::Loc => &mut self.locations,
            EntityLabel::Org => &mut self.entities,
            EntityLabel::Date => &mut self.dates,
            EntityLabel::Permit => &mut self.permits,
            EntityLabel::Impact => &mut self.impacts,
            EntityLabel::Other(_) => return,
        };
        if !bucket.iter().any(|existing| existing == text) {
            bucket.push(text.to_string());
        }
    }

    /// Bucket spans in the order given.
    pub fn from_spans<'a>(spans: impl IntoIterator<Item = &'a EntitySpan>) -> Self {
        let mut buckets = Self::default();
        for span in spans {
            buckets.push(&span.label, &span.text);
        }
        buckets
    }
}

/// Return at most the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

/// Runs the domain rules ahead of a generic recognizer.
pub struct Annotator {
    ruler: DomainRuler,
    recognizer: Arc<dyn EntityRecognizer>,
}

impl Annotator {
    /// Combine a rule set with a generic recognizer.
    pub fn new(ruler: DomainRuler, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self { ruler, recognizer }
    }

    /// Recognize spans in the analysed prefix of `text`, domain matches taking precedence.
    pub async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, RecognizerError> {
        let analysed = truncate_chars(text, MAX_ANALYZED_CHARS);
        let domain = self.ruler.find(analysed);
        let generic = self.recognizer.recognize(analysed).await?;

        let generic_count = generic.len();
        let domain_count = domain.len();
        let kept: Vec<EntitySpan> = generic
            .into_iter()
            .filter(|span| !spans_overlap_any(span, &domain))
            .collect();
        let mut spans = domain;
        spans.extend(kept);
        spans.sort_by_key(|span| (span.start, span.end));

        tracing::debug!(
            analysed_chars = analysed.chars().count(),
            domain = domain_count,
            generic = generic_count,
            kept = spans.len(),
            "Entity recognition completed"
        );
        Ok(spans)
    }

    /// Recognize and bucket entities.
    pub async fn annotate(&self, text: &str) -> Result<EntityBuckets, RecognizerError> {
        let spans = self.recognize(text).await?;
        Ok(EntityBuckets::from_spans(&spans))
    }
}

fn spans_overlap_any(span: &EntitySpan, others: &[EntitySpan]) -> bool {
    others.iter().any(|other| other.overlaps(span))
}
