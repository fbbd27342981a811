pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod oauth;
pub mod routes;
pub mod server;
pub mod storage;
pub mod summarization;
pub mod test_utils;

pub use config::Config;
pub use server::Server;
