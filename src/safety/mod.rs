//! The file-safety engine.
//!
//! - **[`engine`]**: versioned backups with an index, retention and restore
//! - **[`conflict`]**: what to do when a target already holds other content
//! - **[`permissions`]**: glob-driven mode resolution and application
//! - **[`orchestrator`]**: the operations callers actually use
//!
//! The remaining modules are building blocks shared by the above.
pub mod atomic;
pub mod checksum;
pub mod conflict;
pub mod engine;
pub mod guard;
pub mod index;
pub mod lock;
pub mod naming;
pub mod orchestrator;
pub mod permissions;
