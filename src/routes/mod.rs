pub mod accounts;
pub mod ai;
pub mod auth;
pub mod callbacks;
pub mod health;

pub use accounts::create_account_routes;
pub use ai::create_ai_routes;
pub use auth::{create_auth_routes, create_protected_auth_routes};
pub use callbacks::create_callback_routes;
pub use health::create_health_routes;
