pub mod completion;
pub mod config;
pub mod manager;
pub mod registry;
pub mod state;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use completion::{ChatTurn, CompletionClient, CompletionError, FailureKind};
pub use config::Config;
pub use manager::{CredentialState, PendingTurn, SessionManager, SubmitError};
pub use registry::SessionRegistry;
pub use state::{Message, Role, Session, SessionMap};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore, StoreError};
