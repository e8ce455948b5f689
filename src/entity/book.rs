//! Book entity - books table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub use super::catalog_enums::{Level, Semester};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "String(Some(200))")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Double")]
    pub price: f64,

    /// Stored uppercased, e.g. "CSC 101"
    #[sea_orm(column_type = "String(Some(20))", indexed)]
    pub course_code: String,

    #[sea_orm(indexed)]
    pub faculty_id: Uuid,

    #[sea_orm(nullable, indexed)]
    pub department_id: Option<Uuid>,

    pub level: Level,

    pub semester: Semester,

    /// Academic session, "YYYY/YYYY"
    #[sea_orm(column_type = "String(Some(9))", indexed)]
    pub session: String,

    #[sea_orm(column_type = "Text")]
    pub front_cover: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub back_cover: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub manual_front_cover: Option<String>,

    pub has_manual: bool,

    #[sea_orm(column_type = "Double", nullable)]
    pub manual_price: Option<f64>,

    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub course_lecturer: Option<String>,

    /// Units on hand; zero means out of stock
    pub quantity: i32,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::faculty::Entity",
        from = "Column::FacultyId",
        to = "super::faculty::Column::Id",
        on_delete = "Restrict"
    )]
    Faculty,
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id",
        on_delete = "SetNull"
    )]
    Department,
}

impl Related<super::faculty::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Faculty.def()
    }
}

impl Related<super::department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Department.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
