pub mod envelope;
pub mod http_executor;

pub use http_executor::HttpExecutor;
