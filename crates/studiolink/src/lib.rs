//! studiolink binding engine.
//!
//! Keeps control surface buttons in sync with a remote production studio:
//! compiles the studio's request catalog into bindings, holds a
//! self-healing WebSocket connection, correlates requests with replies and
//! routes push notifications to the controls that track them.
//!
//! The main entry point is [`Engine`]; the `studiolink` binary wraps it in
//! a headless CLI.

pub mod activation;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod quiescence;
pub mod registry;
pub mod router;
pub mod state;
pub mod surface;

pub use config::EngineConfig;
pub use connection::{ConnectionEvent, ConnectionState, ConnectionSupervisor, Endpoint, Transport};
pub use correlator::RequestCorrelator;
pub use engine::Engine;
pub use error::{ActivationError, ConnectionError, EngineError, RequestError, TransportError};
pub use protocol::{Inbound, Notification, Request, Response};
pub use quiescence::QuiescenceCoordinator;
pub use registry::SubscriptionRegistry;
pub use router::NotificationRouter;
pub use state::{BindingStateStore, CachedValue, InstanceOptions, SubscribeOutcome, ValueFetch};
pub use surface::{ControlSurface, LoggingSurface};
