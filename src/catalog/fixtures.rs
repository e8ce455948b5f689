//! Row builders for catalog tests

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::entity::{book, department, faculty, Level, Semester};

pub fn faculty(name: &str) -> faculty::Model {
    let at = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
    faculty::Model {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: at,
        updated_at: at,
    }
}

pub fn department(name: &str, faculty_id: Uuid) -> department::Model {
    let at = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
    department::Model {
        id: Uuid::new_v4(),
        name: name.to_string(),
        faculty_id,
        created_at: at,
        updated_at: at,
    }
}

pub fn book(title: &str, faculty_id: Uuid, department_id: Option<Uuid>, level: Level) -> book::Model {
    let at = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();
    book::Model {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        price: 2500.0,
        course_code: "CSC 101".to_string(),
        faculty_id,
        department_id,
        level,
        semester: Semester::First,
        session: "2024/2025".to_string(),
        front_cover: format!("https://img.example.com/books/{}.jpg", title.len()),
        back_cover: None,
        manual_front_cover: None,
        has_manual: false,
        manual_price: None,
        course_lecturer: None,
        quantity: 5,
        created_at: at,
        updated_at: at,
    }
}
