//! Broker gateway over the asynchronous TWS socket API.
//!
//! The socket protocol is stream-oriented: typed requests go out, typed
//! callbacks come back, correlated by caller-assigned request ids or by
//! terminal "end of batch" markers. [`gateway::SocketGateway`] presents that
//! as the synchronous [`riskguard_core::BrokerGateway`] interface by
//! registering in-flight requests as futures in a callback registry that a
//! background dispatcher resolves.
//!
//! The wire codec itself is an external collaborator behind
//! [`transport::TwsTransport`].

pub mod api;
pub mod gateway;
pub mod registry;
pub mod transport;

pub use api::{TwsEvent, TwsRequest};
pub use gateway::{SocketConfig, SocketGateway};
pub use transport::{MockTransport, TwsTransport};
