pub mod error;
pub mod retry;
pub mod source;
pub mod r#static;

pub use error::CollectorError;
pub use retry::{fetch_logs_with_retry, fetch_resources_with_retry, CancelFlag};
pub use source::{LogCollector, ResourceCollector, SourceId};
pub use r#static::{StaticLogCollector, StaticResourceCollector};
