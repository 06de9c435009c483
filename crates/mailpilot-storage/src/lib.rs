//! Mailpilot Storage - PostgreSQL persistence for messages, recurring
//! mails, and identity records

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
