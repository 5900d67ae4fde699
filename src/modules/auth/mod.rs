pub mod controller;
pub mod crud;
pub mod extractor;
pub mod interface;
pub mod lockout;
pub mod memory;
pub mod model;
pub mod reset;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sessions;

pub use extractor::CurrentUser;
pub use interface::AuthError;
pub use routes::{auth_routes, user_routes};
pub use service::Authenticator;
