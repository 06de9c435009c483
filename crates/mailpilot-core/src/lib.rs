//! Mailpilot Core - Mail orchestration and recurrence engine
//!
//! This crate decides whether composed mail is sent immediately or
//! deferred, runs the due-scheduled and due-recurring polling sweeps,
//! computes next-run instants across timezones, and drives per-message
//! status transitions.

pub mod delivery;
pub mod engine;
pub mod recurrence;
pub mod sweeper;
pub mod tracking;

pub use delivery::{DeliveryVendor, GmailSmtpVendor, OutboundEmail, SendCredentials};
pub use engine::{ComposeRequest, EngineConfig, MailEngine};
pub use sweeper::SweepDriver;
