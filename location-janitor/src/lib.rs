pub mod app_context;
pub mod http;
pub mod janitor;
pub mod metrics_constants;
