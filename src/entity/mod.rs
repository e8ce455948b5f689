//! Entity module - SeaORM entity definitions

pub mod admin;
pub mod book;
pub mod catalog_enums;
pub mod department;
pub mod faculty;
pub mod system_settings;

pub use catalog_enums::{Level, Semester};
