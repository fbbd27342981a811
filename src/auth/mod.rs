pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{AuthClaims, JwtService, JwtServiceImpl, parse_algorithm};
pub use middleware::{CurrentUser, jwt_auth_middleware};
pub use password::{hash_password, verify_password};
