//! Fixed token patterns for regulatory vocabulary.

use crate::nlp::tokenizer::{Token, normalize, tokenize};
use crate::nlp::{EntityLabel, EntitySpan};

/// How a single pattern element compares against a token.
#[derive(Debug, Clone, Copy)]
enum TokenMatch {
    /// Case-insensitive comparison against a lowercase literal.
    Lower(&'static str),
    /// Exact, case-sensitive comparison.
    Exact(&'static str),
}

impl TokenMatch {
    fn matches(self, token: &Token<'_>) -> bool {
        match self {
            Self::Lower(expected) => normalize(token.text) == expected,
            Self::Exact(expected) => token.text == expected,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenPattern {
    label: EntityLabel,
    tokens: Vec<TokenMatch>,
}

impl TokenPattern {
    fn new(label: EntityLabel, tokens: Vec<TokenMatch>) -> Self {
        Self { label, tokens }
    }

    fn matches_at(&self, tokens: &[Token<'_>], index: usize) -> bool {
        tokens.len() >= index + self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(&tokens[index..])
                .all(|(pattern, token)| pattern.matches(token))
    }
}

/// Domain rule set applied ahead of the generic recognizer.
#[derive(Debug, Clone)]
pub struct DomainRuler {
    patterns: Vec<TokenPattern>,
}

impl Default for DomainRuler {
    fn default() -> Self {
        Self::quebec_mining()
    }
}

impl DomainRuler {
    /// Permits, oversight bodies, and environmental impact terms used in Québec mining files.
    pub fn quebec_mining() -> Self {
        use TokenMatch::{Exact, Lower};
        let patterns = vec![
            TokenPattern::new(
                EntityLabel::Permit,
                vec![Lower("certificat"), Lower("d'autorisation")],
            ),
            TokenPattern::new(
                EntityLabel::Permit,
                vec![Lower("permis"), Lower("d'intervention")],
            ),
            TokenPattern::new(EntityLabel::Org, vec![Exact("MRNF")]),
            TokenPattern::new(EntityLabel::Org, vec![Exact("MELCCFP")]),
            TokenPattern::new(EntityLabel::Org, vec![Exact("BAPE")]),
            TokenPattern::new(EntityLabel::Impact, vec![Lower("faune")]),
            TokenPattern::new(EntityLabel::Impact, vec![Lower("flore")]),
            TokenPattern::new(EntityLabel::Impact, vec![Lower("milieu"), Lower("humide")]),
            TokenPattern::new(EntityLabel::Impact, vec![Lower("cours"), Lower("d'eau")]),
        ];
        Self { patterns }
    }

    /// Find non-overlapping matches in text order, preferring the longest pattern at each token.
    pub fn find(&self, text: &str) -> Vec<EntitySpan> {
        let tokens = tokenize(text);
        let mut spans = Vec::new();
        let mut index = 0;

        while index < tokens.len() {
            let best = self
                .patterns
                .iter()
                .filter(|pattern| pattern.matches_at(&tokens, index))
                .max_by_key(|pattern| pattern.tokens.len());

            match best {
                Some(pattern) => {
                    let last = index + pattern.tokens.len() - 1;
                    spans.push(EntitySpan::from_range(
                        text,
                        tokens[index].start,
                        tokens[last].end,
                        pattern.label.clone(),
                    ));
                    index = last + 1;
                }
                None => index += 1,
            }
        }

        spans
    }
}
