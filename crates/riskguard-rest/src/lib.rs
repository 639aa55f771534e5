//! Broker gateway over the IB Client Portal REST API.
//!
//! The Client Portal is stateful: account-scoped reads require an account
//! switch first, and the orders endpoint serves stale data unless a
//! refresh-triggering call precedes the read. Both quirks live in
//! [`RestGateway`]; the raw endpoints live in [`client::PortalClient`].

pub mod client;
pub mod dto;
pub mod gateway;

pub use client::PortalClient;
pub use gateway::RestGateway;
