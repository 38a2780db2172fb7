// Messaging core of the GigConnect marketplace client
pub mod api;
pub mod config;
pub mod error;
pub mod messaging;
pub mod models;
pub mod transport;

// Re-export main types for convenience
pub use error::MessagingError;
pub use messaging::{MessagingClient, Session, SessionUpdate};
pub use models::*;
