// Message relay module
//
// Clients post messages addressed to a recipient and recipients poll for
// them. The store persists every mailbox as one JSON document, rewritten
// atomically on each mutation.

pub mod error;
pub mod message;
pub mod storage;
pub mod store;
pub mod http;
pub mod cli;
pub mod commands;

pub use error::{StoreError, StoreResult};
pub use message::{Mailbox, Message, Store};
pub use storage::{JsonFileBackend, MemoryBackend, StoreBackend};
pub use store::MessageStore;
pub use cli::{MsgRelayCli, MsgRelayCommand, RelayConfig};
pub use commands::execute_command;
