//! Application wiring: configuration, logging, and the risk service façade
//! exposed to the external API layer.

pub mod config;
pub mod csv;
pub mod error;
pub mod logging;
pub mod service;

pub use config::{AppConfig, BackendKind, RestConfig, RiskConfig, TelemetryConfig, TwsConfig};
pub use error::{AppError, AppResult};
pub use service::{socket_service, RiskService};
