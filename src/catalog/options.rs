//! Facet values for the catalog dropdowns

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};

use super::model::{DepartmentSummary, FacultySummary};
use crate::cache::{CatalogCache, FILTER_OPTIONS_KEY};
use crate::entity::{book, department, faculty, Level, Semester};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub departments: Vec<DepartmentSummary>,
    pub faculties: Vec<FacultySummary>,
    pub levels: Vec<Level>,
    pub semesters: Vec<Semester>,
    pub sessions: Vec<String>,
}

/// Read the five facet lists straight from the database.
pub async fn load_filter_options<C: ConnectionTrait>(db: &C) -> Result<FilterOptions, DbErr> {
    let departments = department::Entity::find()
        .order_by_asc(department::Column::Name)
        .all(db);
    let faculties = faculty::Entity::find().order_by_asc(faculty::Column::Name).all(db);
    let levels = book::Entity::find()
        .select_only()
        .column(book::Column::Level)
        .distinct()
        .into_tuple::<Level>()
        .all(db);
    let semesters = book::Entity::find()
        .select_only()
        .column(book::Column::Semester)
        .distinct()
        .into_tuple::<Semester>()
        .all(db);
    let sessions = book::Entity::find()
        .select_only()
        .column(book::Column::Session)
        .distinct()
        .into_tuple::<String>()
        .all(db);

    let (departments, faculties, mut levels, mut semesters, mut sessions) =
        futures::try_join!(departments, faculties, levels, semesters, sessions)?;

    levels.sort();
    semesters.sort();
    sessions.sort_by(|a, b| b.cmp(a));

    Ok(FilterOptions {
        departments: departments.iter().map(DepartmentSummary::from).collect(),
        faculties: faculties.iter().map(FacultySummary::from).collect(),
        levels,
        semesters,
        sessions,
    })
}

/// Cached under [`FILTER_OPTIONS_KEY`].
pub async fn filter_options<C: ConnectionTrait>(
    db: &C,
    cache: &CatalogCache,
) -> Result<FilterOptions, DbErr> {
    if let Some(hit) = cache.get_json::<FilterOptions>(FILTER_OPTIONS_KEY).await {
        return Ok(hit);
    }

    let seen = cache.generation();
    let options = load_filter_options(db).await?;
    cache
        .put_json_since(FILTER_OPTIONS_KEY, &options, cache.filter_options_ttl(), seen)
        .await;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use sea_orm::{DbBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn single(column: &'static str, value: Value) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([(column, value)])
    }

    #[tokio::test]
    async fn miss_loads_sorted_facets() {
        let science = fixtures::faculty("Science");
        let physics = fixtures::department("Physics", science.id);

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[physics.clone()]])
            .append_query_results([[science.clone()]])
            .append_query_results([vec![
                single("level", Value::from("300L")),
                single("level", Value::from("100L")),
            ]])
            .append_query_results([vec![single("semester", Value::from("First Semester"))]])
            .append_query_results([vec![
                single("session", Value::from("2023/2024")),
                single("session", Value::from("2024/2025")),
            ]])
            .into_connection();

        let options = load_filter_options(&db).await.unwrap();
        assert_eq!(options.departments[0].faculty_id, science.id);
        assert_eq!(options.faculties[0].name, "Science");
        assert_eq!(options.levels, vec![Level::L100, Level::L300]);
        assert_eq!(options.semesters, vec![Semester::First]);
        assert_eq!(options.sessions, vec!["2024/2025", "2023/2024"]);
    }

    #[tokio::test]
    async fn hit_is_served_until_invalidated() {
        let cache = CatalogCache::in_memory(&Default::default());
        let cached = FilterOptions {
            departments: Vec::new(),
            faculties: Vec::new(),
            levels: vec![Level::L200],
            semesters: vec![Semester::Second],
            sessions: vec!["2024/2025".to_string()],
        };
        cache
            .put_json(FILTER_OPTIONS_KEY, &cached, cache.filter_options_ttl())
            .await;

        let db = MockDatabase::new(DbBackend::Postgres).into_connection();
        assert_eq!(filter_options(&db, &cache).await.unwrap(), cached);

        // After a write the next read must go to the database.
        cache.invalidate_books().await;
        assert!(filter_options(&db, &cache).await.is_err());
    }
}
