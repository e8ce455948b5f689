//! Query-string filter bag and its validated form

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Level, Semester};
use crate::error::AppError;
use crate::validation::{self, non_empty, Errors};

pub const MAX_SEARCH_LEN: usize = 100;
pub const MAX_LIMIT: u64 = 100;
pub const DEFAULT_LIMIT: u64 = 20;
/// Highest page whose offset still fits a signed 64-bit OFFSET at `MAX_LIMIT`
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_LIMIT;

/// Raw `GET /api/books` query parameters. Unknown keys are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSearchQuery {
    pub search: Option<String>,
    pub course_code: Option<String>,
    pub department_id: Option<String>,
    pub faculty_id: Option<String>,
    pub level: Option<String>,
    pub semester: Option<String>,
    pub session: Option<String>,
    pub has_manual: Option<String>,
    pub in_stock: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Validated catalog filter; `None` means "do not constrain".
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<Semester>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_manual: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_LIMIT)
    }
}

impl BookSearchQuery {
    /// Validate every field, reporting all failures at once.
    pub fn validate(&self, default_limit: u64) -> Result<(BookFilter, PageRequest), AppError> {
        let mut errors = Errors::new();
        let mut filter = BookFilter::default();

        if let Some(search) = non_empty(self.search.as_deref()) {
            if search.chars().count() > MAX_SEARCH_LEN {
                errors.push("search", "Search query too long");
            } else {
                filter.search = Some(search.to_string());
            }
        }

        filter.course_code = non_empty(self.course_code.as_deref()).map(str::to_uppercase);

        if let Some(raw) = non_empty(self.department_id.as_deref()) {
            filter.department_id =
                errors.check("departmentId", validation::parse_uuid(raw, "department ID"));
        }
        if let Some(raw) = non_empty(self.faculty_id.as_deref()) {
            filter.faculty_id = errors.check("facultyId", validation::parse_uuid(raw, "faculty ID"));
        }
        if let Some(raw) = non_empty(self.level.as_deref()) {
            filter.level = errors.check("level", raw.parse::<Level>());
        }
        if let Some(raw) = non_empty(self.semester.as_deref()) {
            filter.semester = errors.check("semester", raw.parse::<Semester>());
        }
        if let Some(raw) = non_empty(self.session.as_deref()) {
            filter.session = errors.check("session", validation::parse_session(raw));
        }

        filter.has_manual = non_empty(self.has_manual.as_deref()).map(validation::parse_flag);
        filter.in_stock = non_empty(self.in_stock.as_deref()).map(validation::parse_flag);

        let page = match non_empty(self.page.as_deref()) {
            Some(raw) => errors.check("page", validation::parse_bounded_int(raw, 1, MAX_PAGE, "Page")),
            None => Some(1),
        };
        let limit = match non_empty(self.limit.as_deref()) {
            Some(raw) => errors.check(
                "limit",
                validation::parse_bounded_int(raw, 1, MAX_LIMIT, "Limit"),
            ),
            None => Some(default_limit),
        };

        errors.into_result()?;
        Ok((filter, PageRequest::new(page.unwrap_or(1), limit.unwrap_or(default_limit))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BookSearchQuery {
        let encoded = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.replace(' ', "+").replace('/', "%2F")))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/api/books?{}", encoded).parse().unwrap();
        axum::extract::Query::<BookSearchQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn empty_query_constrains_nothing() {
        let (filter, page) = BookSearchQuery::default().validate(DEFAULT_LIMIT).unwrap();
        assert_eq!(filter, BookFilter::default());
        assert_eq!(page, PageRequest { page: 1, limit: 20 });
    }

    #[test]
    fn empty_strings_are_absent() {
        let q = query(&[("departmentId", ""), ("search", "  "), ("hasManual", ""), ("level", "")]);
        let (filter, _) = q.validate(DEFAULT_LIMIT).unwrap();
        assert_eq!(filter, BookFilter::default());
    }

    #[test]
    fn typed_fields_parse() {
        let id = Uuid::new_v4();
        let q = query(&[
            ("facultyId", &id.to_string()),
            ("level", "200L"),
            ("semester", "Second Semester"),
            ("session", "2024/2025"),
            ("courseCode", " csc 101 "),
            ("inStock", "true"),
            ("hasManual", "no"),
            ("page", "3"),
            ("limit", "50"),
            ("unknown", "ignored"),
        ]);
        let (filter, page) = q.validate(DEFAULT_LIMIT).unwrap();
        assert_eq!(filter.faculty_id, Some(id));
        assert_eq!(filter.level, Some(Level::L200));
        assert_eq!(filter.semester, Some(Semester::Second));
        assert_eq!(filter.session.as_deref(), Some("2024/2025"));
        assert_eq!(filter.course_code.as_deref(), Some("CSC 101"));
        assert_eq!(filter.in_stock, Some(true));
        assert_eq!(filter.has_manual, Some(false));
        assert_eq!(page, PageRequest { page: 3, limit: 50 });
        assert_eq!(page.offset(), 100);
    }

    #[test]
    fn invalid_fields_are_all_reported() {
        let q = query(&[
            ("departmentId", "not-a-uuid"),
            ("level", "600L"),
            ("session", "2024-2025"),
            ("page", "0"),
            ("limit", "101"),
        ]);
        match q.validate(DEFAULT_LIMIT) {
            Err(AppError::Validation(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["departmentId", "level", "session", "page", "limit"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn huge_page_is_a_validation_error() {
        for raw in ["18446744073709551615", "99999999999999999999999"] {
            let q = query(&[("page", raw)]);
            match q.validate(DEFAULT_LIMIT) {
                Err(AppError::Validation(fields)) => assert_eq!(fields[0].field, "page"),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn last_allowed_page_offset_fits_postgres() {
        let q = query(&[("page", &MAX_PAGE.to_string()), ("limit", "100")]);
        let (_, page) = q.validate(DEFAULT_LIMIT).unwrap();
        assert!(page.offset() <= i64::MAX as u64);
        assert_eq!(PageRequest::new(u64::MAX, MAX_LIMIT).page, MAX_PAGE);
    }

    #[test]
    fn search_length_is_capped() {
        let long = "a".repeat(MAX_SEARCH_LEN + 1);
        let q = BookSearchQuery {
            search: Some(long),
            ..Default::default()
        };
        assert!(matches!(q.validate(DEFAULT_LIMIT), Err(AppError::Validation(_))));
    }

    #[test]
    fn call_site_picks_default_limit() {
        let (_, page) = BookSearchQuery::default().validate(30).unwrap();
        assert_eq!(page.limit, 30);
    }

    #[test]
    fn canonical_form_skips_absent_fields() {
        let filter = BookFilter {
            level: Some(Level::L100),
            in_stock: Some(false),
            ..Default::default()
        };
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"level":"100L","inStock":false}"#);
    }
}
