//! Document stores for conversations and the token/cost ledger.

pub mod conversation_store;
pub mod ledger_store;

pub use conversation_store::{ConversationStore, JsonConversationStore, MemoryConversationStore};
pub use ledger_store::{JsonlLedgerStore, LedgerStore, MemoryLedgerStore};
