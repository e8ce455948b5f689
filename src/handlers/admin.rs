//! Admin surface: dashboard, password change and sub-admin accounts

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::auth;
use crate::email;
use crate::entity::admin::{self, AdminProfile, AdminRole};
use crate::entity::book;
use crate::error::{conflict_on_unique, AppError, AppResult, OptionExt};
use crate::middleware::CurrentAdmin;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validation::{self, Errors};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_books: u64,
    pub total_sub_admins: u64,
    pub in_stock_books: u64,
    pub out_of_stock_books: u64,
}

/// GET /api/admin/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    current.require_staff()?;

    let (total_books, total_sub_admins, in_stock_books, out_of_stock_books) = futures::try_join!(
        book::Entity::find().count(state.db.as_ref()),
        admin::Entity::find()
            .filter(admin::Column::Role.eq(AdminRole::SubAdmin))
            .count(state.db.as_ref()),
        book::Entity::find()
            .filter(book::Column::Quantity.gt(0))
            .count(state.db.as_ref()),
        book::Entity::find()
            .filter(book::Column::Quantity.lte(0))
            .count(state.db.as_ref()),
    )?;

    Ok(Json(ApiResponse::ok(
        "Dashboard statistics retrieved successfully",
        DashboardStats {
            total_books,
            total_sub_admins,
            in_stock_books,
            out_of_stock_books,
        },
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// PUT /api/admin/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let current_password = req.current_password.as_deref().unwrap_or_default();
    if current_password.is_empty() {
        errors.push("currentPassword", "Current password is required");
    }
    let new_password = req.new_password.as_deref().unwrap_or_default();
    errors.check("newPassword", validation::check_password_policy(new_password));
    errors.into_result()?;

    let account = admin::Entity::find_by_id(current.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Admin not found")?;

    if !auth::verify_password(current_password, &account.password) {
        return Err(AppError::BadRequest("Current password is incorrect".to_string()));
    }

    let mut active: admin::ActiveModel = account.into();
    active.password = Set(auth::hash_password(new_password)?);
    active.updated_at = Set(Utc::now());
    active.update(state.db.as_ref()).await?;

    tracing::info!("{} changed their password", current.username);
    Ok(Json(ApiResponse::message("Password changed successfully")))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubAdminRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSubAdmin {
    pub sub_admin: AdminProfile,
    /// Shown once so the admin can pass it on if the email never arrives
    pub temporary_password: String,
}

/// POST /api/admin/sub-admins
pub async fn create_sub_admin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    payload: Result<Json<CreateSubAdminRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreatedSubAdmin>>)> {
    current.require_admin()?;
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let username = errors.check(
        "username",
        validation::parse_username(req.username.as_deref().unwrap_or_default()),
    );
    let email = errors.check(
        "email",
        validation::parse_email(req.email.as_deref().unwrap_or_default()),
    );
    errors.into_result()?;
    let (Some(username), Some(email)) = (username, email) else {
        return Err(AppError::BadRequest("Username and email are required".to_string()));
    };

    let existing = admin::Entity::find()
        .filter(
            Condition::any()
                .add(admin::Column::Username.eq(username.as_str()))
                .add(admin::Column::Email.eq(email.as_str())),
        )
        .one(state.db.as_ref())
        .await?;
    if let Some(existing) = existing {
        let msg = if existing.username == username {
            "Username already exists"
        } else {
            "Email already exists"
        };
        return Err(AppError::Conflict(msg.to_string()));
    }

    let temporary_password = auth::temporary_password();
    let now = Utc::now();
    let created = admin::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username),
        email: Set(email),
        password: Set(auth::hash_password(&temporary_password)?),
        role: Set(AdminRole::SubAdmin),
        reset_token: Set(None),
        reset_token_expiry: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(state.db.as_ref())
    .await
    .map_err(|e| conflict_on_unique(e, "Username or email already exists"))?;

    email::send_in_background(
        state.mailer.clone(),
        email::sub_admin_welcome(&created.email, &created.username, &temporary_password),
    );
    tracing::info!("{} created sub-admin {}", current.username, created.username);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Sub-admin created successfully",
            CreatedSubAdmin {
                sub_admin: AdminProfile::from(created),
                temporary_password,
            },
        )),
    ))
}

/// GET /api/admin/sub-admins
pub async fn list_sub_admins(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
) -> AppResult<Json<ApiResponse<Vec<AdminProfile>>>> {
    current.require_admin()?;

    let sub_admins = admin::Entity::find()
        .filter(admin::Column::Role.eq(AdminRole::SubAdmin))
        .order_by_desc(admin::Column::CreatedAt)
        .all(state.db.as_ref())
        .await?
        .into_iter()
        .map(AdminProfile::from)
        .collect();

    Ok(Json(ApiResponse::ok("Sub-admins retrieved successfully", sub_admins)))
}

/// GET /api/admin/sub-admins/:id
pub async fn get_sub_admin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<AdminProfile>>> {
    current.require_admin()?;
    let id = parse_id(&id, "sub-admin ID")?;

    let account = admin::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .filter(|a| a.role == AdminRole::SubAdmin)
        .ok_or_not_found("Sub-admin not found")?;

    Ok(Json(ApiResponse::ok("Sub-admin retrieved successfully", AdminProfile::from(account))))
}

/// DELETE /api/admin/sub-admins/:id
pub async fn delete_sub_admin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    current.require_admin()?;
    let id = parse_id(&id, "sub-admin ID")?;

    let account = admin::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Sub-admin not found")?;
    if account.role != AdminRole::SubAdmin {
        return Err(AppError::BadRequest("Cannot delete admin account".to_string()));
    }

    admin::Entity::delete_by_id(account.id).exec(state.db.as_ref()).await?;

    tracing::info!("{} deleted sub-admin {}", current.username, account.username);
    Ok(Json(ApiResponse::message("Sub-admin deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sea_orm::{DbBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn count_row(n: i64) -> Vec<BTreeMap<&'static str, Value>> {
        vec![BTreeMap::from([("num_items", Value::BigInt(Some(n)))])]
    }

    fn admin_user() -> CurrentAdmin {
        CurrentAdmin {
            id: Uuid::new_v4(),
            username: "root".to_string(),
            email: "root@uni.edu".to_string(),
            role: AdminRole::Admin,
        }
    }

    fn stored(role: AdminRole) -> admin::Model {
        admin::Model {
            id: Uuid::new_v4(),
            username: "clerk".to_string(),
            email: "clerk@uni.edu".to_string(),
            password: "$2b$04$invalidhashinvalidhashinvalidhashinvalidhashinv".to_string(),
            role,
            reset_token: None,
            reset_token_expiry: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dashboard_counts_are_fanned_out() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([count_row(12), count_row(3), count_row(9), count_row(3)])
            .into_connection();
        let state = AppState::new(db, Config::default());

        let Json(body) = dashboard_stats(State(state), Extension(admin_user()))
            .await
            .unwrap();

        let stats = body.data.unwrap();
        assert_eq!(stats.total_books, 12);
        assert_eq!(stats.in_stock_books + stats.out_of_stock_books, stats.total_books);
    }

    #[tokio::test]
    async fn sub_admin_cannot_manage_accounts() {
        let db = MockDatabase::new(DbBackend::Postgres).into_connection();
        let state = AppState::new(db, Config::default());
        let clerk = CurrentAdmin {
            role: AdminRole::SubAdmin,
            ..admin_user()
        };

        let err = list_sub_admins(State(state), Extension(clerk)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_account_is_not_a_sub_admin() {
        let target = stored(AdminRole::Admin);
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[target.clone()]])
            .append_query_results([[target.clone()]])
            .into_connection();
        let state = AppState::new(db, Config::default());

        let err = get_sub_admin(
            State(state.clone()),
            Extension(admin_user()),
            Path(target.id.to_string()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = delete_sub_admin(State(state), Extension(admin_user()), Path(target.id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Cannot delete admin account"));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[stored(AdminRole::SubAdmin)]])
            .into_connection();
        let state = AppState::new(db, Config::default());

        let err = create_sub_admin(
            State(state),
            Extension(admin_user()),
            Ok(Json(CreateSubAdminRequest {
                username: Some("clerk".to_string()),
                email: Some("Other@Uni.edu".to_string()),
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "Username already exists"));
    }
}
