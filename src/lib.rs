//! Bookshop - university bookshop catalog and inventory service
//!
//! Admins and sub-admins maintain the book catalog (covers, prices, stock)
//! grouped by faculty, department, level, semester and academic session.
//! The catalog is browsable without an account and printable as grouped
//! reports.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod email;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod images;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
