use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{book, department, faculty, Level, Semester};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultySummary {
    pub id: Uuid,
    pub name: String,
}

impl From<&faculty::Model> for FacultySummary {
    fn from(model: &faculty::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub id: Uuid,
    pub name: String,
    pub faculty_id: Uuid,
}

impl From<&department::Model> for DepartmentSummary {
    fn from(model: &department::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            faculty_id: model.faculty_id,
        }
    }
}

/// Book as returned by the API, with its faculty and department attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub course_code: String,
    pub faculty_id: Uuid,
    pub department_id: Option<Uuid>,
    pub level: Level,
    pub semester: Semester,
    pub session: String,
    pub front_cover: String,
    pub back_cover: Option<String>,
    pub manual_front_cover: Option<String>,
    pub has_manual: bool,
    pub manual_price: Option<f64>,
    pub course_lecturer: Option<String>,
    pub quantity: i32,
    pub in_stock: bool,
    pub faculty: Option<FacultySummary>,
    pub department: Option<DepartmentSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookResponse {
    pub fn new(
        book: book::Model,
        faculty: Option<FacultySummary>,
        department: Option<DepartmentSummary>,
    ) -> Self {
        Self {
            in_stock: book.in_stock(),
            id: book.id,
            title: book.title,
            description: book.description,
            price: book.price,
            course_code: book.course_code,
            faculty_id: book.faculty_id,
            department_id: book.department_id,
            level: book.level,
            semester: book.semester,
            session: book.session,
            front_cover: book.front_cover,
            back_cover: book.back_cover,
            manual_front_cover: book.manual_front_cover,
            has_manual: book.has_manual,
            manual_price: book.manual_price,
            course_lecturer: book.course_lecturer,
            quantity: book.quantity,
            faculty,
            department,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}
