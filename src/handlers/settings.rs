//! System settings handlers
//!
//! A single row holds the current session and semester; it is created with
//! defaults the first time anything reads it.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, EntityTrait, Insert, Set};
use serde::Deserialize;

use crate::entity::system_settings::{self, DEFAULT_SEMESTER, DEFAULT_SESSION, SETTINGS_ID};
use crate::entity::Semester;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentAdmin;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validation::{self, Errors};

/// Default row under the fixed key; a concurrent first read loses the insert
/// race quietly.
fn default_settings_insert() -> Insert<system_settings::ActiveModel> {
    system_settings::Entity::insert(system_settings::ActiveModel {
        id: Set(SETTINGS_ID),
        current_session: Set(DEFAULT_SESSION.to_string()),
        current_semester: Set(DEFAULT_SEMESTER),
        updated_at: Set(Utc::now()),
    })
    .on_conflict(
        OnConflict::column(system_settings::Column::Id)
            .do_nothing()
            .to_owned(),
    )
}

/// Read the settings row, creating it with defaults when missing.
pub async fn current_settings<C: ConnectionTrait>(db: &C) -> Result<system_settings::Model, DbErr> {
    if let Some(settings) = system_settings::Entity::find().one(db).await? {
        return Ok(settings);
    }

    let inserted = default_settings_insert().exec_without_returning(db).await?;
    if inserted > 0 {
        tracing::info!(
            "Created default system settings ({}, {})",
            DEFAULT_SESSION,
            DEFAULT_SEMESTER
        );
    }

    system_settings::Entity::find_by_id(SETTINGS_ID)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("system settings".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub current_session: Option<String>,
    pub current_semester: Option<String>,
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<system_settings::Model>>> {
    let settings = current_settings(state.db.as_ref()).await?;
    Ok(Json(ApiResponse::ok("System settings retrieved", settings)))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    payload: Result<Json<UpdateSettingsRequest>, axum::extract::rejection::JsonRejection>,
) -> AppResult<Json<ApiResponse<system_settings::Model>>> {
    current.require_admin()?;
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let session = match req.current_session.as_deref() {
        Some(raw) => errors.check("currentSession", validation::parse_session(raw)),
        None => {
            errors.push("currentSession", "Current session is required");
            None
        }
    };
    let semester = match req.current_semester.as_deref() {
        Some(raw) => errors.check("currentSemester", raw.trim().parse::<Semester>()),
        None => {
            errors.push("currentSemester", "Current semester is required");
            None
        }
    };
    errors.into_result()?;
    let (Some(session), Some(semester)) = (session, semester) else {
        return Err(AppError::BadRequest("Invalid settings".to_string()));
    };

    let existing = current_settings(state.db.as_ref()).await?;
    let mut active: system_settings::ActiveModel = existing.into();
    active.current_session = Set(session);
    active.current_semester = Set(semester);
    active.updated_at = Set(Utc::now());
    let settings = active.update(state.db.as_ref()).await?;

    // Reports resolved against the old defaults are stale now.
    state.cache.invalidate_reports().await;

    tracing::info!(
        "{} set current period to {} {}",
        current.username,
        settings.current_session,
        settings.current_semester
    );
    Ok(Json(ApiResponse::ok("System settings updated", settings)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, MockDatabase, MockExecResult, QueryTrait};
    use uuid::Uuid;

    #[test]
    fn default_row_ignores_a_concurrent_insert() {
        let sql = default_settings_insert().build(DbBackend::Postgres).to_string();
        assert!(sql.contains(&format!("'{}'", SETTINGS_ID)), "{}", sql);
        assert!(sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#), "{}", sql);
    }

    #[tokio::test]
    async fn missing_row_is_created_with_defaults() {
        let created = system_settings::Model {
            id: SETTINGS_ID,
            current_session: DEFAULT_SESSION.to_string(),
            current_semester: DEFAULT_SEMESTER,
            updated_at: Utc::now(),
        };
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<system_settings::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([[created.clone()]])
            .into_connection();

        let settings = current_settings(&db).await.unwrap();
        assert_eq!(settings.id, SETTINGS_ID);
        assert_eq!(settings.current_session, "2024/2025");
        assert_eq!(settings.current_semester, Semester::First);
    }

    #[tokio::test]
    async fn losing_the_insert_race_reads_the_winner() {
        let winner = system_settings::Model {
            id: SETTINGS_ID,
            current_session: "2025/2026".to_string(),
            current_semester: Semester::Second,
            updated_at: Utc::now(),
        };
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<system_settings::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([[winner.clone()]])
            .into_connection();

        assert_eq!(current_settings(&db).await.unwrap(), winner);
    }

    #[tokio::test]
    async fn existing_row_is_returned() {
        let row = system_settings::Model {
            id: Uuid::new_v4(),
            current_session: "2025/2026".to_string(),
            current_semester: Semester::Second,
            updated_at: Utc::now(),
        };
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[row.clone()]])
            .into_connection();

        assert_eq!(current_settings(&db).await.unwrap(), row);
    }
}
