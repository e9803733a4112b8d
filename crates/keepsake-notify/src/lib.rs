pub mod dispatcher;
pub mod error;
pub mod http;
pub mod log_only;
pub mod rate_limit;

pub use dispatcher::{from_config, Dispatcher};
pub use error::NotifyError;
pub use http::HttpDispatcher;
pub use log_only::LogDispatcher;
pub use rate_limit::RateLimited;
