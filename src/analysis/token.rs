//! Token types for text analysis.
//!
//! A [`Token`] is the unit that flows through the analysis pipeline. It keeps
//! its position and byte offsets in the (lowercased) utterance so that filters
//! can be inspected in tests and debug logs.
//!
//! # Examples
//!
//! ```
//! use intent_chat::analysis::token::Token;
//!
//! let token = Token::with_offsets("website", 3, 14, 21);
//! assert_eq!(token.text, "website");
//! assert_eq!(token.position, 3);
//! assert_eq!(token.end_offset, 21);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A token represents a single unit of text after tokenization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The text content of the token
    pub text: String,

    /// The position of the token in the original token stream (0-based)
    pub position: usize,

    /// The byte offset where this token starts in the original text
    pub start_offset: usize,

    /// The byte offset where this token ends in the original text
    pub end_offset: usize,
}

impl Token {
    /// Create a new token without offsets.
    pub fn new<S: Into<String>>(text: S, position: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a new token with byte offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }

    /// Clone this token with updated text.
    pub fn with_text<S: Into<String>>(&self, text: S) -> Self {
        let mut token = self.clone();
        token.text = text.into();
        token
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// A stream of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let token = Token::new("hello", 0);
        assert_eq!(token.text, "hello");
        assert_eq!(token.position, 0);
        assert_eq!(token.start_offset, 0);
    }

    #[test]
    fn test_token_rewrite() {
        let token = Token::with_offsets("Hello", 1, 4, 9);

        let rewritten = token.with_text("hello");
        assert_eq!(rewritten.text, "hello");
        assert_eq!(rewritten.start_offset, 4);
        assert_eq!(rewritten.position, 1);
        assert_eq!(rewritten.to_string(), "hello");
    }
}
