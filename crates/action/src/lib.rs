//! # Orbit Action
//!
//! Actions are named, versioned request handlers. This crate holds:
//!
//! - [`ActionRegistry`]: definitions by name and version, plus
//!   [`ActionGroup`] patches applied when an action is resolved
//! - [`MiddlewareRegistry`]: hooks run before and after action bodies
//! - [`ActionProcessor`]: the per-call pipeline transports hand a
//!   [`Connection`] to
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use orbit_action::{
//!     ActionDefinition, ActionProcessor, ActionRegistry, Connection, InputSpec,
//!     MiddlewareRegistry, ProcessorOptions,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let actions = Arc::new(ActionRegistry::new());
//! actions
//!     .register(
//!         ActionDefinition::builder("greet")
//!             .input("name", InputSpec::required())
//!             .run(|params, _ctx| async move {
//!                 Ok(json!(format!("hello {}", params["name"].as_str().unwrap_or_default())))
//!             })
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let processor = ActionProcessor::new(
//!     actions,
//!     Arc::new(MiddlewareRegistry::new()),
//!     ProcessorOptions::default(),
//! );
//! let mut params = serde_json::Map::new();
//! params.insert("action".into(), json!("greet"));
//! params.insert("name".into(), json!("orbit"));
//!
//! let complete = processor.process(Connection::internal().with_params(params)).await;
//! assert_eq!(complete.response.value(), Some(&json!("hello orbit")));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod connection;
mod context;
mod definition;
mod error;
mod group;
mod input;
mod middleware;
mod processor;
mod registry;
mod response;

pub use connection::{
    Connection, ConnectionDetails, ConnectionTransport, INTERNAL_CONNECTION, NoopTransport,
};
pub use context::ActionContext;
pub use definition::{ActionBuilder, ActionDefinition, ActionHandler, FnHandler, handler_fn};
pub use error::{ActionFailure, FieldErrors, RegistryError};
pub use group::{ActionGroup, PatchOp, PatchValue};
pub use input::{
    DefaultValue, InputFormat, InputSpec, InputValidator, Inputs, MissingPolicy, NamedRule,
    Verdict, prepare_params, scrub_params,
};
pub use middleware::{ActionMiddleware, MiddlewareRegistry};
pub use orbit_core::Services;
pub use processor::{ActionProcessor, ProcessorOptions};
pub use registry::ActionRegistry;
pub use response::{ActionComplete, ActionResponse, ErrorCode, ResponseError};
