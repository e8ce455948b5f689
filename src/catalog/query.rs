//! Predicate construction and paginated extraction over the books table

use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::filter::{BookFilter, PageRequest};
use super::model::{BookResponse, DepartmentSummary, FacultySummary};
use super::report::title_order;
use super::search::SearchTerms;
use crate::cache::CatalogCache;
use crate::entity::{book, department, faculty, Semester};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: PageRequest, total: u64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: total.div_ceil(page.limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    pub books: Vec<BookResponse>,
    pub pagination: Pagination,
}

/// In-stock books of one department, as printed for students
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentBookList {
    pub books: Vec<BookResponse>,
    pub total_price: f64,
    pub count: usize,
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `lower(column) LIKE '%needle%'`
fn contains_ci(column: book::Column, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape('\\'))
}

fn search_condition(terms: &SearchTerms) -> Condition {
    let mut any = Condition::any()
        .add(contains_ci(book::Column::Title, &terms.trimmed))
        .add(contains_ci(book::Column::CourseCode, &terms.trimmed));
    for variant in &terms.course_code_variants {
        any = any.add(contains_ci(book::Column::CourseCode, variant));
    }
    any
}

/// Absent filters add no predicate.
pub fn build_condition(filter: &BookFilter) -> Condition {
    let mut cond = Condition::all();

    if let Some(code) = &filter.course_code {
        cond = cond.add(book::Column::CourseCode.eq(code.as_str()));
    }
    if let Some(id) = filter.department_id {
        cond = cond.add(book::Column::DepartmentId.eq(id));
    }
    if let Some(id) = filter.faculty_id {
        cond = cond.add(book::Column::FacultyId.eq(id));
    }
    if let Some(level) = filter.level {
        cond = cond.add(book::Column::Level.eq(level));
    }
    if let Some(semester) = filter.semester {
        cond = cond.add(book::Column::Semester.eq(semester));
    }
    if let Some(session) = &filter.session {
        cond = cond.add(book::Column::Session.eq(session.as_str()));
    }
    if let Some(has_manual) = filter.has_manual {
        cond = cond.add(book::Column::HasManual.eq(has_manual));
    }
    match filter.in_stock {
        Some(true) => cond = cond.add(book::Column::Quantity.gt(0)),
        Some(false) => cond = cond.add(book::Column::Quantity.lte(0)),
        None => {}
    }
    if let Some(terms) = filter.search.as_deref().and_then(SearchTerms::new) {
        cond = cond.add(search_condition(&terms));
    }

    cond
}

/// Attach faculty and department summaries with one lookup per table.
pub async fn with_summaries<C: ConnectionTrait>(
    db: &C,
    books: Vec<book::Model>,
) -> Result<Vec<BookResponse>, DbErr> {
    if books.is_empty() {
        return Ok(Vec::new());
    }

    let faculty_ids: HashSet<Uuid> = books.iter().map(|b| b.faculty_id).collect();
    let department_ids: HashSet<Uuid> = books.iter().filter_map(|b| b.department_id).collect();

    let faculties: HashMap<Uuid, FacultySummary> = faculty::Entity::find()
        .filter(faculty::Column::Id.is_in(faculty_ids))
        .all(db)
        .await?
        .iter()
        .map(|f| (f.id, FacultySummary::from(f)))
        .collect();

    let departments: HashMap<Uuid, DepartmentSummary> = if department_ids.is_empty() {
        HashMap::new()
    } else {
        department::Entity::find()
            .filter(department::Column::Id.is_in(department_ids))
            .all(db)
            .await?
            .iter()
            .map(|d| (d.id, DepartmentSummary::from(d)))
            .collect()
    };

    Ok(books
        .into_iter()
        .map(|b| {
            let faculty = faculties.get(&b.faculty_id).cloned();
            let department = b.department_id.and_then(|id| departments.get(&id).cloned());
            BookResponse::new(b, faculty, department)
        })
        .collect())
}

/// Newest first, with the id as tiebreaker so consecutive pages tile the result set.
fn page_select(filter: &BookFilter, page: PageRequest) -> Select<book::Entity> {
    book::Entity::find()
        .filter(build_condition(filter))
        .order_by_desc(book::Column::CreatedAt)
        .order_by_desc(book::Column::Id)
        .offset(page.offset())
        .limit(page.limit)
}

/// One page of matching books, newest first, plus the total match count.
pub async fn list_books<C: ConnectionTrait>(
    db: &C,
    filter: &BookFilter,
    page: PageRequest,
) -> Result<BookPage, DbErr> {
    let rows = page_select(filter, page).all(db);
    let count = book::Entity::find().filter(build_condition(filter)).count(db);

    let (rows, total) = futures::try_join!(rows, count)?;
    let books = with_summaries(db, rows).await?;

    Ok(BookPage {
        books,
        pagination: Pagination::new(page, total),
    })
}

/// `list_books` behind the `books:list:` cache namespace.
pub async fn list_books_cached<C: ConnectionTrait>(
    db: &C,
    cache: &CatalogCache,
    filter: &BookFilter,
    page: PageRequest,
) -> Result<BookPage, DbErr> {
    let key = serde_json::to_string(&(filter, page))
        .ok()
        .map(|canonical| CatalogCache::list_key(&canonical));

    if let Some(key) = &key {
        if let Some(hit) = cache.get_json::<BookPage>(key).await {
            return Ok(hit);
        }
    }

    let seen = cache.generation();
    let result = list_books(db, filter, page).await?;
    if let Some(key) = &key {
        cache.put_json_since(key, &result, cache.books_ttl(), seen).await;
    }
    Ok(result)
}

pub async fn find_book<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<BookResponse>, DbErr> {
    match book::Entity::find_by_id(id).one(db).await? {
        Some(model) => Ok(with_summaries(db, vec![model]).await?.pop()),
        None => Ok(None),
    }
}

/// Every book of a session and semester, ordered by title.
pub async fn report_books<C: ConnectionTrait>(
    db: &C,
    session: &str,
    semester: Semester,
) -> Result<Vec<book::Model>, DbErr> {
    let mut books = book::Entity::find()
        .filter(book::Column::Session.eq(session))
        .filter(book::Column::Semester.eq(semester))
        .order_by_asc(book::Column::Title)
        .all(db)
        .await?;
    books.sort_by(|a, b| title_order(&a.title, &b.title));
    Ok(books)
}

/// `report_books` behind the `books:report:` cache namespace.
pub async fn report_books_cached<C: ConnectionTrait>(
    db: &C,
    cache: &CatalogCache,
    session: &str,
    semester: Semester,
) -> Result<Vec<book::Model>, DbErr> {
    let key = CatalogCache::report_key(session, semester.as_str());
    if let Some(hit) = cache.get_json::<Vec<book::Model>>(&key).await {
        return Ok(hit);
    }

    let seen = cache.generation();
    let books = report_books(db, session, semester).await?;
    cache.put_json_since(&key, &books, cache.books_ttl(), seen).await;
    Ok(books)
}

/// In-stock books matching `filter`, ordered by title, with their summed price.
pub async fn department_book_list<C: ConnectionTrait>(
    db: &C,
    filter: &BookFilter,
) -> Result<DepartmentBookList, DbErr> {
    let filter = BookFilter {
        in_stock: Some(true),
        ..filter.clone()
    };

    let mut rows = book::Entity::find()
        .filter(build_condition(&filter))
        .order_by_asc(book::Column::Title)
        .all(db)
        .await?;
    rows.sort_by(|a, b| title_order(&a.title, &b.title));

    let total_price = rows.iter().map(|b| b.price).sum();
    let books = with_summaries(db, rows).await?;

    Ok(DepartmentBookList {
        count: books.len(),
        books,
        total_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::entity::Level;
    use sea_orm::{DbBackend, MockDatabase, QueryTrait, Value};
    use std::collections::BTreeMap;

    fn sql(filter: &BookFilter) -> String {
        book::Entity::find()
            .filter(build_condition(filter))
            .build(DbBackend::Postgres)
            .to_string()
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("num_items", Value::BigInt(Some(n)))])
    }

    #[test]
    fn empty_filter_adds_no_predicate() {
        assert!(sql(&BookFilter::default()).ends_with("WHERE TRUE"));
    }

    #[test]
    fn scalar_filters_become_equalities() {
        let faculty_id = Uuid::new_v4();
        let rendered = sql(&BookFilter {
            faculty_id: Some(faculty_id),
            level: Some(Level::L300),
            session: Some("2024/2025".to_string()),
            has_manual: Some(true),
            ..Default::default()
        });
        assert!(rendered.contains(&format!("\"faculty_id\" = '{}'", faculty_id)));
        assert!(rendered.contains("\"level\" = '300L'"));
        assert!(rendered.contains("\"session\" = '2024/2025'"));
        assert!(rendered.contains("\"has_manual\" = TRUE"));
        assert!(!rendered.contains("\"department_id\" ="));
    }

    #[test]
    fn stock_flag_partitions_on_quantity() {
        let in_stock = sql(&BookFilter {
            in_stock: Some(true),
            ..Default::default()
        });
        let out_of_stock = sql(&BookFilter {
            in_stock: Some(false),
            ..Default::default()
        });
        assert!(in_stock.contains("\"quantity\" > 0"));
        assert!(out_of_stock.contains("\"quantity\" <= 0"));
    }

    #[test]
    fn search_expands_into_or_set() {
        let rendered = sql(&BookFilter {
            search: Some("CSC101".to_string()),
            level: Some(Level::L100),
            ..Default::default()
        });
        assert!(rendered.contains("LOWER(\"title\") LIKE '%csc101%'"));
        assert!(rendered.contains("LOWER(\"course_code\") LIKE '%csc 101%'"));
        assert!(rendered.contains(" OR "));
        assert!(rendered.contains("\"level\" = '100L'"));
    }

    #[test]
    fn compact_and_spaced_course_codes_find_each_other() {
        let compact = sql(&BookFilter {
            search: Some("MTH201".to_string()),
            ..Default::default()
        });
        assert!(compact.contains("LOWER(\"course_code\") LIKE '%mth201%'"));
        assert!(compact.contains("LOWER(\"course_code\") LIKE '%mth 201%'"));

        let spaced = sql(&BookFilter {
            search: Some("csc 101".to_string()),
            ..Default::default()
        });
        assert!(spaced.contains("LOWER(\"title\") LIKE '%csc 101%'"));
        assert!(spaced.contains("LOWER(\"course_code\") LIKE '%csc 101%'"));
        assert!(spaced.contains("LOWER(\"course_code\") LIKE '%csc101%'"));
    }

    #[test]
    fn like_wildcards_in_input_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn consecutive_pages_tile_the_result_set() {
        let total = 47;
        let limit = 20;
        let pages = Pagination::new(PageRequest::new(1, limit), total).total_pages;

        let mut next_offset = 0;
        for n in 1..=pages {
            let rendered = page_select(&BookFilter::default(), PageRequest::new(n, limit))
                .build(DbBackend::Postgres)
                .to_string();
            assert!(rendered.contains(r#"ORDER BY "books"."created_at" DESC, "books"."id" DESC"#));
            assert!(
                rendered.ends_with(&format!("LIMIT {} OFFSET {}", limit, next_offset)),
                "{}",
                rendered
            );
            next_offset += limit;
        }
        assert!(next_offset >= total && next_offset - limit < total);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(PageRequest::new(3, 20), 47);
        assert_eq!(p.total_pages, 3);
        assert_eq!(Pagination::new(PageRequest::new(1, 20), 0).total_pages, 0);
        assert_eq!(Pagination::new(PageRequest::new(1, 20), 40).total_pages, 2);
    }

    #[tokio::test]
    async fn last_page_of_forty_seven() {
        let science = fixtures::faculty("Science");
        let page: Vec<book::Model> = (0..7)
            .map(|i| fixtures::book(&format!("Book {}", i), science.id, None, Level::L100))
            .collect();

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([page.clone()])
            .append_query_results([[count_row(47)]])
            .append_query_results([[science.clone()]])
            .into_connection();

        let result = list_books(&db, &BookFilter::default(), PageRequest::new(3, 20))
            .await
            .unwrap();

        assert_eq!(result.books.len(), 7);
        assert_eq!(
            result.pagination,
            Pagination {
                page: 3,
                limit: 20,
                total: 47,
                total_pages: 3
            }
        );
        assert!(result.books.iter().all(|b| b.faculty.as_ref().map(|f| f.name.as_str()) == Some("Science")));
        assert!(result.books.iter().all(|b| b.department.is_none() && b.in_stock));
    }

    #[tokio::test]
    async fn department_list_sums_prices() {
        let science = fixtures::faculty("Science");
        let cs = fixtures::department("Computer Science", science.id);
        let mut a = fixtures::book("algorithms", science.id, Some(cs.id), Level::L200);
        a.price = 1200.0;
        let mut b = fixtures::book("Databases", science.id, Some(cs.id), Level::L200);
        b.price = 800.5;

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![b.clone(), a.clone()]])
            .append_query_results([[science.clone()]])
            .append_query_results([[cs.clone()]])
            .into_connection();

        let filter = BookFilter {
            department_id: Some(cs.id),
            ..Default::default()
        };
        let list = department_book_list(&db, &filter).await.unwrap();

        assert_eq!(list.count, 2);
        assert_eq!(list.total_price, 2000.5);
        assert_eq!(list.books[0].title, "algorithms");
        assert_eq!(list.books[1].department.as_ref().unwrap().name, "Computer Science");
    }

    #[tokio::test]
    async fn cached_report_skips_database() {
        let cache = CatalogCache::in_memory(&Default::default());
        let science = fixtures::faculty("Science");
        let books = vec![fixtures::book("Optics", science.id, None, Level::L300)];
        cache
            .put_json(
                &CatalogCache::report_key("2024/2025", "First Semester"),
                &books,
                cache.books_ttl(),
            )
            .await;

        // No query results queued: any database access would fail.
        let db = MockDatabase::new(DbBackend::Postgres).into_connection();
        let hit = report_books_cached(&db, &cache, "2024/2025", Semester::First)
            .await
            .unwrap();
        assert_eq!(hit, books);

        cache.invalidate_books().await;
        assert!(report_books_cached(&db, &cache, "2024/2025", Semester::First)
            .await
            .is_err());
    }
}
