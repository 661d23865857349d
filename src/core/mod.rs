pub mod config;
pub mod error;
pub mod types;

pub use config::PortalConfig;
pub use error::{PortalError, PortalResult};
