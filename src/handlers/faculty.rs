//! Faculty and department handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, LoaderTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::entity::{department, faculty};
use crate::error::{conflict_on_unique, AppError, AppResult, OptionExt};
use crate::middleware::CurrentAdmin;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validation::{self, Errors};

/// Faculty with its departments, both ordered by name
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyWithDepartments {
    #[serde(flatten)]
    pub faculty: faculty::Model,
    pub departments: Vec<department::Model>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFacultyRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepartmentRequest {
    pub name: Option<String>,
    pub faculty_id: Option<String>,
}

fn blocked_by_books(err: DbErr, msg: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => AppError::BadRequest(msg.to_string()),
        _ => AppError::Database(err),
    }
}

/// GET /api/faculties
pub async fn list_faculties(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<FacultyWithDepartments>>>> {
    let faculties = faculty::Entity::find()
        .order_by_asc(faculty::Column::Name)
        .all(state.db.as_ref())
        .await?;
    let departments = faculties
        .load_many(
            department::Entity::find().order_by_asc(department::Column::Name),
            state.db.as_ref(),
        )
        .await?;

    let data = faculties
        .into_iter()
        .zip(departments)
        .map(|(faculty, departments)| FacultyWithDepartments { faculty, departments })
        .collect();

    Ok(Json(ApiResponse::ok("Faculties retrieved", data)))
}

/// POST /api/faculties
pub async fn create_faculty(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    payload: Result<Json<CreateFacultyRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<faculty::Model>>)> {
    current.require_admin()?;
    let Json(req) = payload?;

    let name = validation::clean_text(req.name.as_deref().unwrap_or_default(), 1, 128, "Faculty name")
        .map_err(|msg| AppError::validation("name", msg))?;

    let existing = faculty::Entity::find()
        .filter(faculty::Column::Name.eq(name.as_str()))
        .one(state.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Faculty already exists".to_string()));
    }

    let now = Utc::now();
    let created = faculty::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(state.db.as_ref())
    .await
    .map_err(|e| conflict_on_unique(e, "Faculty already exists"))?;

    state.cache.invalidate_filter_options().await;
    tracing::info!("{} created faculty {}", current.username, created.name);

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Faculty created", created))))
}

/// DELETE /api/faculties/:id
pub async fn delete_faculty(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    current.require_admin()?;
    let id = parse_id(&id, "faculty ID")?;

    let faculty = faculty::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Faculty not found")?;

    faculty::Entity::delete_by_id(faculty.id)
        .exec(state.db.as_ref())
        .await
        .map_err(|e| blocked_by_books(e, "Faculty still has books; delete or move them first"))?;

    state.cache.invalidate_filter_options().await;
    tracing::info!("{} deleted faculty {}", current.username, faculty.name);

    Ok(Json(ApiResponse::message("Faculty deleted successfully")))
}

/// POST /api/faculties/departments
pub async fn create_department(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    payload: Result<Json<CreateDepartmentRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<department::Model>>)> {
    current.require_admin()?;
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let name = errors.check(
        "name",
        validation::clean_text(req.name.as_deref().unwrap_or_default(), 1, 128, "Department name"),
    );
    let faculty_id = match validation::non_empty(req.faculty_id.as_deref()) {
        Some(raw) => errors.check("facultyId", validation::parse_uuid(raw, "faculty ID")),
        None => {
            errors.push("facultyId", "Faculty ID is required");
            None
        }
    };
    errors.into_result()?;
    let (Some(name), Some(faculty_id)) = (name, faculty_id) else {
        return Err(AppError::BadRequest("Department name and faculty ID are required".to_string()));
    };

    faculty::Entity::find_by_id(faculty_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Faculty not found")?;

    let existing = department::Entity::find()
        .filter(department::Column::Name.eq(name.as_str()))
        .filter(department::Column::FacultyId.eq(faculty_id))
        .one(state.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "Department already exists in this faculty".to_string(),
        ));
    }

    let now = Utc::now();
    let created = department::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        faculty_id: Set(faculty_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(state.db.as_ref())
    .await
    .map_err(|e| conflict_on_unique(e, "Department already exists in this faculty"))?;

    state.cache.invalidate_filter_options().await;
    tracing::info!("{} created department {}", current.username, created.name);

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Department created", created))))
}

/// DELETE /api/faculties/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    current.require_admin()?;
    let id = parse_id(&id, "department ID")?;

    let department = department::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Department not found")?;

    department::Entity::delete_by_id(department.id)
        .exec(state.db.as_ref())
        .await?;

    // Books keep their faculty; their department reference is cleared by the FK.
    state.cache.invalidate_books().await;
    tracing::info!("{} deleted department {}", current.username, department.name);

    Ok(Json(ApiResponse::message("Department deleted successfully")))
}
