//! SystemSettings entity - single-row table holding the active session and semester

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::catalog_enums::Semester;

pub const DEFAULT_SESSION: &str = "2024/2025";
pub const DEFAULT_SEMESTER: Semester = Semester::First;
/// Primary key of the settings row
pub const SETTINGS_ID: Uuid = Uuid::nil();

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_settings")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "String(Some(9))")]
    pub current_session: String,

    pub current_semester: Semester,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
