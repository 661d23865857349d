pub mod browser;
pub mod core;
pub mod portal;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{PortalConfig, PortalError, PortalResult};

pub use browser::{BrowserSession, SessionError};
pub use portal::{collect_notifications, process_notifications, NotificationProcessor};
