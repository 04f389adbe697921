pub mod app;
pub mod config;
pub mod dish_parser;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod image_io;
pub mod llm;
pub mod logging;
pub mod models;
pub mod naming;
pub mod pipeline;
pub mod routes;

pub use app::build_app;
