pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod labels;
pub mod model_service;
pub mod ort_service;
pub mod preprocess;
pub mod registry;
pub mod routes;
pub mod server;
pub mod telemetry;

pub use app::start_app;
