pub mod api;
pub mod capture;
pub mod config;
pub mod prometheus;
pub mod router;
