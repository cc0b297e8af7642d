// ============================================
// File: crates/burrow-common/src/lib.rs
// ============================================
//! # Burrow Common
//!
//! ## Creation Reason
//! Foundation crate shared by every other burrow crate: packet and
//! transport-kind definitions plus the base error type.
//!
//! ## Main Functionality
//! - [`types`]: `Packet`, size limits, default port, `TransportKind`
//! - [`error`]: `CommonError` and the common `Result` alias
//!
//! ## Design Philosophy
//! - Keep this crate dependency-light; it sits below everything else
//! - No I/O, no async, no crypto here
//!
//! ## Last Modified
//! v0.1.0 - Initial crate layout

pub mod error;
pub mod types;

pub use error::{CommonError, Result};
pub use types::{Packet, TransportKind, DEFAULT_PORT, MAX_PACKET};
