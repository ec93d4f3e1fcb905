//! Application layer orchestrating the command lifecycle.
//!
//! [`engine::VendEngine`] is the single entry point for purchase creation,
//! dispatch polling, acknowledgment processing, payment confirmation and the
//! stale-command sweep. It owns the storage ports and relies on their
//! transactional guarantees for all concurrency control.

pub mod engine;
