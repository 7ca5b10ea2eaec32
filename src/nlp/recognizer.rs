//! Generic entity recognizers layered behind the domain rules.
//!
//! [`RemoteRecognizer`] talks to a spaCy-style model server; [`LexicalRecognizer`] is a
//! deterministic fallback built from French date, organisation, and locative patterns so the
//! service stays usable without a model deployment.

use crate::config::Config;
use crate::google::format_endpoint;
use crate::nlp::{EntityLabel, EntitySpan};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by entity recognizers.
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The model server could not be reached.
    #[error("NER request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The model server returned an error status.
    #[error("NER service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the model server.
        status: StatusCode,
        /// Response body for diagnostics.
        body: String,
    },
}

/// Interface implemented by generic (non-domain) recognizers.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    /// Return recognized spans; offsets must be byte positions into `text`.
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, RecognizerError>;
}

/// Build the recognizer selected by configuration.
pub fn build_recognizer(config: &Config) -> Arc<dyn EntityRecognizer> {
    match config.ner_service_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "Using remote NER model");
            Arc::new(RemoteRecognizer::new(url.to_string()))
        }
        None => {
            tracing::info!("NER_SERVICE_URL not set; using lexical recognizer");
            Arc::new(LexicalRecognizer::new())
        }
    }
}

#[derive(Serialize)]
struct NerRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct NerResponse {
    #[serde(default)]
    entities: Vec<NerEntity>,
}

#[derive(Deserialize)]
struct NerEntity {
    text: String,
    label: String,
    /// Character offset of the first character.
    start: usize,
    /// Character offset one past the last character.
    end: usize,
}

/// Client for a model server exposing `POST /ner`.
pub struct RemoteRecognizer {
    http: Client,
    base_url: String,
}

impl RemoteRecognizer {
    /// Create a client targeting `base_url`.
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("mining-analysis/ner")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, base_url }
    }
}

/// Byte offset of every character boundary, including the end of the text.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect()
}

#[async_trait]
impl EntityRecognizer for RemoteRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, RecognizerError> {
        let response = self
            .http
            .post(format_endpoint(&self.base_url, "ner"))
            .json(&NerRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecognizerError::UnexpectedStatus { status, body });
        }

        let payload: NerResponse = response.json().await?;
        let boundaries = char_boundaries(text);
        let spans: Vec<EntitySpan> = payload
            .entities
            .into_iter()
            .filter_map(|entity| {
                let start = *boundaries.get(entity.start)?;
                let end = *boundaries.get(entity.end)?;
                if start >= end {
                    tracing::debug!(text = %entity.text, "Dropping span with empty range");
                    return None;
                }
                Some(EntitySpan {
                    text: entity.text,
                    label: EntityLabel::from_tag(&entity.label),
                    start,
                    end,
                })
            })
            .collect();
        tracing::debug!(spans = spans.len(), "Remote NER completed");
        Ok(spans)
    }
}

const MONTHS: &str = "janvier|février|fevrier|mars|avril|mai|juin|juillet|août|aout|septembre|octobre|novembre|décembre|decembre";
const CAPITALIZED: &str = r"\p{Lu}[\p{L}\p{N}'’-]*";

/// Pattern-based recognizer for French regulatory documents.
pub struct LexicalRecognizer {
    rules: Vec<(EntityLabel, Regex, usize)>,
}

impl Default for LexicalRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalRecognizer {
    /// Compile the built-in rule set.
    pub fn new() -> Self {
        let textual_date = format!(r"(?i)\b(?:(?:1er|[0-3]?\d)\s+)?(?:{MONTHS})\s+\d{{4}}\b");
        let numeric_date = r"\b[0-3]?\d/[01]?\d/\d{4}\b|\b\d{4}-[01]\d-[0-3]\d\b".to_string();
        let acronym = r"\b\p{Lu}{3,}\b".to_string();
        let named_org = format!(
            r"\b(?:Ministère|Société|Mines|Corporation|Commission|Bureau|Conseil|Agence|Gouvernement)(?:\s+(?:de\s+la\s+|de\s+l['’]|d['’]|du\s+|des\s+|de\s+|et\s+)?{CAPITALIZED})+"
        );
        let prepositional_place = format!(
            r"\b(?:à|au|aux|en|près\s+de|région\s+de|municipalité\s+de|ville\s+de)\s+({CAPITALIZED}(?:\s(?:de\s|du\s|des\s)?{CAPITALIZED})*)"
        );
        let water_body = format!(r"\b(?:[Ll]ac|[Rr]ivière)\s+{CAPITALIZED}");

        let compiled = [
            (EntityLabel::Date, textual_date, 0),
            (EntityLabel::Date, numeric_date, 0),
            (EntityLabel::Org, named_org, 0),
            (EntityLabel::Org, acronym, 0),
            (EntityLabel::Loc, water_body, 0),
            (EntityLabel::Loc, prepositional_place, 1),
        ]
        .into_iter()
        .filter_map(|(label, pattern, group)| match Regex::new(&pattern) {
            Ok(regex) => Some((label, regex, group)),
            Err(err) => {
                tracing::error!(error = %err, ?label, "Skipping invalid lexical rule");
                None
            }
        })
        .collect();

        Self { rules: compiled }
    }

    /// Run every rule and keep the longest non-overlapping spans, earlier rules winning ties.
    pub fn find(&self, text: &str) -> Vec<EntitySpan> {
        let mut candidates = Vec::new();
        for (priority, (label, regex, group)) in self.rules.iter().enumerate() {
            for captures in regex.captures_iter(text) {
                if let Some(matched) = captures.get(*group) {
                    candidates.push((matched.start(), matched.end(), priority, label.clone()));
                }
            }
        }

        candidates.sort_by_key(|(start, end, priority, _)| (*start, Reverse(*end), *priority));

        let mut accepted: Vec<EntitySpan> = Vec::new();
        for (start, end, _, label) in candidates {
            let span = EntitySpan::from_range(text, start, end, label);
            if accepted.iter().all(|existing| !existing.overlaps(&span)) {
                accepted.push(span);
            }
        }
        accepted.sort_by_key(|span| span.start);
        accepted
    }
}

#[async_trait]
impl EntityRecognizer for LexicalRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, RecognizerError> {
        Ok(self.find(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn labelled(text: &str) -> Vec<(String, EntityLabel)> {
        LexicalRecognizer::new()
            .find(text)
            .into_iter()
            .map(|span| (span.text, span.label))
            .collect()
    }

    #[test]
    fn recognizes_french_dates() {
        let found = labelled("Déposé le 12 mars 2024, révisé le 2024-06-01 et le 3/7/2024.");
        assert_eq!(
            found,
            vec![
                ("12 mars 2024".to_string(), EntityLabel::Date),
                ("2024-06-01".to_string(), EntityLabel::Date),
                ("3/7/2024".to_string(), EntityLabel::Date),
            ]
        );
    }

    #[test]
    fn recognizes_places_after_prepositions() {
        let found = labelled("Le site situé près de Rouyn-Noranda et au lac Fortune.");
        assert_eq!(
            found,
            vec![
                ("Rouyn-Noranda".to_string(), EntityLabel::Loc),
                ("lac Fortune".to_string(), EntityLabel::Loc),
            ]
        );
    }

    #[test]
    fn recognizes_named_organisations() {
        let found = labelled("Avis du Ministère de l'Environnement transmis à Mines Agnico Eagle.");
        assert!(found.contains(&(
            "Ministère de l'Environnement".to_string(),
            EntityLabel::Org
        )));
        assert!(
            found
                .iter()
                .any(|(text, label)| text == "Mines Agnico Eagle" && *label == EntityLabel::Org)
        );
    }

    #[test]
    fn uppercase_acronyms_are_organisations() {
        let found = labelled("Une étude de la SOQUEM en 2023.");
        assert_eq!(found, vec![("SOQUEM".to_string(), EntityLabel::Org)]);
    }

    #[tokio::test]
    async fn remote_offsets_are_converted_to_bytes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/ner").json_body(json!({ "text": "À Malartic." }));
                then.status(200).json_body(json!({
                    "entities": [
                        { "text": "Malartic", "label": "LOC", "start": 2, "end": 10 }
                    ]
                }));
            })
            .await;

        let recognizer = RemoteRecognizer::new(server.base_url());
        let text = "À Malartic.";
        let spans = recognizer.recognize(text).await.expect("spans");

        mock.assert();
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].start..spans[0].end], "Malartic");
        assert_eq!(spans[0].label, EntityLabel::Loc);
    }

    #[tokio::test]
    async fn remote_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ner");
                then.status(503).body("model loading");
            })
            .await;

        let err = RemoteRecognizer::new(server.base_url())
            .recognize("texte")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::UnexpectedStatus { .. }));
    }
}
