//! Repository layer for data access

pub mod messages;
pub mod recurring;
pub mod users;

// Re-export concrete repository implementations with simple names
pub use messages::DbMessageRepository;
pub use recurring::DbRecurringMailRepository;
pub use users::{DbCredentialRepository, DbSessionRepository};

// Re-export repository traits
pub use messages::MessageRepository;
pub use recurring::RecurringMailRepository;
pub use users::{CredentialRepository, SessionRepository};
