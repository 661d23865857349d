pub mod chromium;
pub mod launcher;
pub mod session;

pub use chromium::ChromiumSession;
pub use launcher::{BrowserHandle, LaunchOptions};
pub use session::{
    BrowserSession, InterceptedBody, InterceptedResponse, Key, ResponseInterceptor, SessionError,
};
