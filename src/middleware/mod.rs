pub mod auth;

pub use auth::{auth_layer, CurrentAdmin};
