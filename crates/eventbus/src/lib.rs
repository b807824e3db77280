//! # Orbit Event Bus
//!
//! Named events with listener chains. Firing an event runs its listeners in
//! ascending priority order, threading a JSON payload through them:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use orbit_eventbus::{EventBus, listener_fn};
//! use serde_json::{Value, json};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new();
//! bus.listener(
//!     "user:created",
//!     Arc::new(listener_fn("tag", |_, mut payload: Value| async move {
//!         payload["tagged"] = json!(true);
//!         Ok(payload)
//!     })),
//!     None,
//! )
//! .unwrap();
//!
//! let out = bus.fire("user:created", json!({"id": 1})).await.unwrap();
//! assert_eq!(out, json!({"id": 1, "tagged": true}));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod bus;
mod error;
mod listener;

pub use bus::EventBus;
pub use error::{EventError, ListenerFailure, ListenerResult};
pub use listener::{EventListener, FnListener, Subscription, listener_fn};
