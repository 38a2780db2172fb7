// Messaging state of a signed-in user: conversations, history, composer,
// presence and typing, driven by one session task

pub mod client;
pub mod composer;
pub mod conversations;
pub mod history;
pub mod notifications;
pub mod presence;
pub mod session;
pub mod typing;

pub use client::{Backend, LiveBackend, MessagingClient, MockBackend};
pub use composer::Composer;
pub use conversations::ConversationStore;
pub use history::MessageHistory;
pub use notifications::{Notification, NotificationKind, Notifications};
pub use presence::PresenceTracker;
pub use session::{Session, SessionConfig, SessionUpdate};
pub use typing::TypingCoordinator;
