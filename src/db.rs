use chrono::Utc;
use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, Schema, Set, Statement,
};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::auth;
use crate::config::{BootstrapAdmin, DatabaseConfig};
use crate::entity::admin::{self, AdminRole};
use crate::entity::{book, department, faculty, system_settings};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Create missing tables and indexes
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // Referenced tables before the tables pointing at them
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(faculty::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(admin::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(system_settings::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(book::Entity)).await?;

    for stmt in schema.create_index_from_entity(book::Entity) {
        create_index_if_not_exists(db, backend, stmt).await?;
    }
    create_index_if_not_exists(db, backend, department_name_index()).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Department names repeat across faculties, never within one.
fn department_name_index() -> IndexCreateStatement {
    Index::create()
        .name("idx_departments_name_faculty")
        .table(department::Entity)
        .col(department::Column::Name)
        .col(department::Column::FacultyId)
        .unique()
        .to_owned()
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

async fn create_index_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

/// Create the configured admin account when no admin exists yet.
///
/// Returns whether an account was created.
pub async fn ensure_bootstrap_admin<C: ConnectionTrait>(
    db: &C,
    bootstrap: Option<&BootstrapAdmin>,
) -> anyhow::Result<bool> {
    let Some(bootstrap) = bootstrap else {
        return Ok(false);
    };

    let admins = admin::Entity::find()
        .filter(admin::Column::Role.eq(AdminRole::Admin))
        .count(db)
        .await?;
    if admins > 0 {
        return Ok(false);
    }

    let now = Utc::now();
    let created = admin::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(bootstrap.username.clone()),
        email: Set(bootstrap.email.to_lowercase()),
        password: Set(auth::hash_password(&bootstrap.password)?),
        role: Set(AdminRole::Admin),
        reset_token: Set(None),
        reset_token_expiry: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    info!("Created bootstrap admin '{}'", created.username);
    Ok(true)
}
