//! Online side: inference engine, conversation history and the service facade.

pub mod engine;
pub mod exchange;
pub mod history;
pub mod service;

pub use engine::{InferenceEngine, LoadedInfo};
pub use exchange::{ChatExchange, EMPTY_INTENT, ERROR_INTENT, ExchangeKind};
pub use history::ConversationHistory;
pub use service::{
    ChatReply, ChatRequest, ChatService, HistoryEntry, HistoryRequest, ModelStatus,
    RetrainRequest, RetrainResponse,
};
