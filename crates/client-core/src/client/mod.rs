//! Client facade, registry and event routing
//!
//! - [`manager`] - the [`CallClient`] facade and [`ClientContext`]
//! - [`registry`] - session id to session mapping
//! - [`router`] - inbound event routing and callback invocation
//! - [`builder`] / [`config`] - construction and settings

pub mod builder;
pub mod config;
pub mod manager;
pub mod registry;
pub mod router;


pub use builder::CallClientBuilder;
pub use config::ClientConfig;
pub use manager::{CallClient, ClientContext};
pub use registry::SessionRegistry;
pub use router::EventRouter;
