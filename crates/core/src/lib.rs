//! # Orbit Core
//!
//! Core types shared by all Orbit crates.
//!
//! ## Key Components
//!
//! - **Identifiers**: [`ConnectionId`], [`JobId`]
//! - **Params**: the [`Params`] map handed to actions and tasks, plus the
//!   reserved keys the processor reads (`action`, `apiVersion`)
//! - **Priorities**: [`Priority`] and [`DEFAULT_PRIORITY`], plus a stable
//!   ordering helper used by every lifecycle phase and listener chain
//! - **Services**: a type-keyed map of shared objects handed to action and
//!   task bodies
//!
//! ## Usage
//!
//! ```rust
//! use orbit_core::{ConnectionId, Params, DEFAULT_PRIORITY};
//!
//! let id = ConnectionId::v4();
//! assert!(!id.is_nil());
//!
//! let mut params = Params::new();
//! params.insert("action".into(), "status".into());
//! assert_eq!(orbit_core::params::action_name(&params), Some("status"));
//! assert_eq!(DEFAULT_PRIORITY, 100);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod id;
pub mod params;
pub mod priority;
pub mod services;

pub use id::{ConnectionId, JobId};
pub use params::Params;
pub use priority::{DEFAULT_PRIORITY, Priority, sort_by_priority};
pub use services::Services;
