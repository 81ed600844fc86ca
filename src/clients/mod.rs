pub mod attempt_client;
pub mod auth_client;

pub use attempt_client::{AttemptBackend, AttemptClient};
pub use auth_client::{AuthClient, LoginResponse};
