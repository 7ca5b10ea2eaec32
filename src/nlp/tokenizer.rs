//! Word tokenizer used by the domain rules.
//!
//! A token is a run of letters or digits. Apostrophes (`'`, `’`) and hyphens stay inside a
//! token when both neighbours are alphanumeric, so `d'autorisation` and `Rouyn-Noranda` are
//! single tokens.

/// Token with byte offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token text.
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

fn is_joiner(ch: char) -> bool {
    matches!(ch, '\'' | '’' | '-')
}

/// Split `text` into word tokens.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (index, &(offset, ch)) in chars.iter().enumerate() {
        let joins = is_joiner(ch)
            && start.is_some()
            && chars
                .get(index + 1)
                .is_some_and(|(_, next)| next.is_alphanumeric());

        if ch.is_alphanumeric() || joins {
            start.get_or_insert(offset);
        } else if let Some(begin) = start.take() {
            tokens.push(Token {
                text: &text[begin..offset],
                start: begin,
                end: offset,
            });
        }
    }

    if let Some(begin) = start {
        tokens.push(Token {
            text: &text[begin..],
            start: begin,
            end: text.len(),
        });
    }

    tokens
}

/// Lowercase a token and fold the typographic apostrophe to ASCII.
pub fn normalize(token: &str) -> String {
    token.to_lowercase().replace('’', "'")
}
