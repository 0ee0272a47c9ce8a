pub mod error;
pub mod error_log;

pub use error::RelayError;
pub use error_log::ErrorLog;
