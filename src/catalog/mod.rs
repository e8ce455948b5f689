//! Catalog query engine
//!
//! Turns validated filters into database queries, shapes the results for the
//! list, report and print endpoints, and keeps the facet dropdown payload
//! cached.

pub mod filter;
#[cfg(test)]
pub mod fixtures;
pub mod model;
pub mod options;
pub mod query;
pub mod report;
pub mod search;

pub use filter::{BookFilter, BookSearchQuery, PageRequest};
pub use model::{BookResponse, DepartmentSummary, FacultySummary};
pub use options::FilterOptions;
pub use query::{BookPage, DepartmentBookList, Pagination};
pub use report::{DepartmentGroup, FacultyGroup, LevelGroup};
