//! Text analysis for intent classification.
//!
//! Utterances pass through a small analysis pipeline before they reach the
//! vocabulary: a tokenizer splits the lowercased text into alphabetic runs and
//! a chain of filters drops stop words and anything that is not purely
//! alphabetic.
//!
//! # Pipeline
//!
//! 1. Lowercase the whole utterance
//! 2. [`RegexTokenizer`](tokenizer::regex::RegexTokenizer) over `\p{Alphabetic}+`
//! 3. [`StopFilter`](token_filter::stop::StopFilter) with the English stop word list
//! 4. [`AlphabeticFilter`](token_filter::alphabetic::AlphabeticFilter)
//!
//! Training and inference both go through [`normalizer::normalize`], so the two
//! sides can never drift apart.
//!
//! # Examples
//!
//! ```
//! use intent_chat::analysis::normalizer::normalize;
//!
//! let tokens = normalize("What's the price of a website?");
//! assert_eq!(tokens, vec!["price", "website"]);
//! ```

pub mod analyzer;
pub mod normalizer;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

pub use analyzer::{Analyzer, EnglishAnalyzer, PipelineAnalyzer};
pub use normalizer::{Normalizer, normalize, normalize_to_string};
pub use token::{Token, TokenStream};
