//! Book catalog handlers
//!
//! Reads are public and go through the catalog cache. Writes take a multipart
//! form, upload covers to the image store, then touch the database, then
//! invalidate every cached book extraction before responding.

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::parse_id;
use super::settings::current_settings;
use crate::catalog::filter::DEFAULT_LIMIT;
use crate::catalog::{
    self, query, report, BookFilter, BookPage, BookResponse, BookSearchQuery, DepartmentBookList,
    DepartmentSummary, FacultyGroup, FilterOptions,
};
use crate::entity::{book, department, faculty, Level, Semester};
use crate::error::{AppError, AppResult, OptionExt};
use crate::images::{ImageError, ImageFile, ImageStore, StoredImage, BOOKS_FOLDER, MANUALS_FOLDER};
use crate::middleware::CurrentAdmin;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validation::{self, non_empty, Errors};

const FRONT_COVER: &str = "frontCover";
const BACK_COVER: &str = "backCover";
const MANUAL_FRONT_COVER: &str = "manualFrontCover";

/// Text fields and files of a book form
#[derive(Debug, Default)]
pub struct BookForm {
    fields: HashMap<String, String>,
    files: HashMap<String, ImageFile>,
}

impl BookForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn take_file(&mut self, name: &str) -> Option<ImageFile> {
        self.files.remove(name)
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the allowed size".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart form: {}", err.body_text()))
    }
}

/// Drain a multipart body; file parts without content are ignored.
pub async fn read_form(mut multipart: Multipart) -> AppResult<BookForm> {
    let mut form = BookForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.is_empty() {
                    continue;
                }
                form.files.insert(
                    name,
                    ImageFile {
                        file_name,
                        content_type,
                        bytes,
                    },
                );
            }
            None => {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

/// Parsed book fields; `None` means the field was not submitted.
///
/// The nested options distinguish "clear" (`Some(None)`) from "keep".
#[derive(Debug, Default, PartialEq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
    pub course_code: Option<String>,
    pub faculty_id: Option<Uuid>,
    pub department_id: Option<Option<Uuid>>,
    pub level: Option<Level>,
    pub semester: Option<Semester>,
    pub session: Option<String>,
    pub course_lecturer: Option<Option<String>>,
    pub has_manual: Option<bool>,
    pub manual_price: Option<f64>,
    pub quantity: Option<i32>,
}

fn optional_text(raw: &str, max: usize, label: &str) -> Result<Option<String>, String> {
    validation::clean_text(raw, 0, max, label).map(|v| if v.is_empty() { None } else { Some(v) })
}

impl BookPatch {
    /// Validate every submitted field.
    pub fn parse(form: &BookForm, errors: &mut Errors) -> Self {
        let mut patch = BookPatch::default();

        if let Some(raw) = form.field("title") {
            patch.title = errors.check("title", validation::clean_text(raw, 1, 200, "Book title"));
        }
        if let Some(raw) = form.field("description") {
            patch.description = errors.check("description", optional_text(raw, 1000, "Description"));
        }
        if let Some(raw) = form.field("price") {
            patch.price = errors.check("price", validation::parse_price(raw));
        }
        if let Some(raw) = form.field("courseCode") {
            patch.course_code = errors
                .check("courseCode", validation::clean_text(raw, 1, 20, "Course code"))
                .map(|code| code.to_uppercase());
        }
        if let Some(raw) = form.field("facultyId") {
            patch.faculty_id = errors.check("facultyId", validation::parse_uuid(raw, "Faculty ID"));
        }
        if let Some(raw) = form.field("departmentId") {
            patch.department_id = match non_empty(Some(raw)) {
                Some(raw) => errors
                    .check("departmentId", validation::parse_uuid(raw, "Department ID"))
                    .map(Some),
                None => Some(None),
            };
        }
        if let Some(raw) = form.field("level") {
            patch.level = errors.check("level", raw.trim().parse::<Level>());
        }
        if let Some(raw) = form.field("semester") {
            patch.semester = errors.check("semester", raw.trim().parse::<Semester>());
        }
        if let Some(raw) = form.field("session") {
            patch.session = errors.check("session", validation::parse_session(raw));
        }
        if let Some(raw) = form.field("courseLecturer") {
            patch.course_lecturer =
                errors.check("courseLecturer", optional_text(raw, 128, "Course lecturer"));
        }
        if let Some(raw) = form.field("hasManual") {
            patch.has_manual = Some(validation::parse_flag(raw));
        }
        if let Some(raw) = non_empty(form.field("manualPrice")) {
            patch.manual_price = errors.check("manualPrice", validation::parse_price(raw));
        }
        if let Some(raw) = non_empty(form.field("quantity")) {
            patch.quantity = errors.check("quantity", validation::parse_quantity(raw));
        }

        patch
    }
}

fn check_image(file: &ImageFile, field: &str, max_size: usize, errors: &mut Errors) {
    match file.validate(max_size) {
        Ok(_) => {}
        Err(ImageError::TooLarge(limit)) => errors.push(
            field,
            format!("Image must not exceed {} MB", limit / (1024 * 1024)),
        ),
        Err(_) => errors.push(field, "Only image files (jpeg, png, webp, gif) are allowed"),
    }
}

async fn upload_optional(
    store: &Arc<dyn ImageStore>,
    folder: &str,
    file: Option<ImageFile>,
) -> AppResult<Option<StoredImage>> {
    match file {
        Some(file) => Ok(Some(store.upload(folder, file).await?)),
        None => Ok(None),
    }
}

/// The faculty must exist; a department, when given, must exist within it.
async fn check_references(
    state: &AppState,
    faculty_id: Uuid,
    department_id: Option<Uuid>,
) -> AppResult<()> {
    faculty::Entity::find_by_id(faculty_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Faculty not found")?;

    if let Some(department_id) = department_id {
        let department = department::Entity::find_by_id(department_id)
            .one(state.db.as_ref())
            .await?
            .ok_or_not_found("Department not found")?;
        if department.faculty_id != faculty_id {
            return Err(AppError::validation(
                "departmentId",
                "Department does not belong to the selected faculty",
            ));
        }
    }
    Ok(())
}

async fn respond_with_book(state: &AppState, model: book::Model) -> AppResult<BookResponse> {
    query::with_summaries(state.db.as_ref(), vec![model])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("book vanished while loading summaries".to_string()))
}

/// GET /api/books
pub async fn list_books(
    State(state): State<AppState>,
    params: Result<Query<BookSearchQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<BookPage>>> {
    let Query(params) = params?;
    let (filter, page) = params.validate(DEFAULT_LIMIT)?;

    let result = query::list_books_cached(state.db.as_ref(), &state.cache, &filter, page).await?;
    Ok(Json(ApiResponse::ok("Books retrieved successfully", result)))
}

/// GET /api/books/:id
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<BookResponse>>> {
    let id = parse_id(&id, "book ID")?;
    let book = query::find_book(state.db.as_ref(), id)
        .await?
        .ok_or_not_found("Book not found")?;
    Ok(Json(ApiResponse::ok("Book retrieved successfully", book)))
}

/// GET /api/books/filters/options
pub async fn filter_options(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<FilterOptions>>> {
    let options = catalog::options::filter_options(state.db.as_ref(), &state.cache).await?;
    Ok(Json(ApiResponse::ok("Filter options retrieved successfully", options)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub session: Option<String>,
    pub semester: Option<String>,
}

impl PeriodQuery {
    fn parse(&self, errors: &mut Errors) -> (Option<String>, Option<Semester>) {
        let session = non_empty(self.session.as_deref())
            .and_then(|raw| errors.check("session", validation::parse_session(raw)));
        let semester = non_empty(self.semester.as_deref())
            .and_then(|raw| errors.check("semester", raw.parse::<Semester>()));
        (session, semester)
    }
}

/// Fill an omitted session or semester from the system settings.
async fn resolve_period(
    state: &AppState,
    session: Option<String>,
    semester: Option<Semester>,
) -> AppResult<(String, Semester)> {
    if let (Some(session), Some(semester)) = (&session, semester) {
        return Ok((session.clone(), semester));
    }
    let settings = current_settings(state.db.as_ref()).await?;
    Ok((
        session.unwrap_or(settings.current_session),
        semester.unwrap_or(settings.current_semester),
    ))
}

#[derive(Debug, Serialize)]
pub struct ReportBooks {
    pub books: Vec<BookResponse>,
}

/// GET /api/books/report
pub async fn report_books(
    State(state): State<AppState>,
    params: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<ReportBooks>>> {
    let Query(params) = params?;
    let mut errors = Errors::new();
    let (session, semester) = params.parse(&mut errors);
    errors.into_result()?;

    let (session, semester) = resolve_period(&state, session, semester).await?;
    let books = query::report_books_cached(state.db.as_ref(), &state.cache, &session, semester).await?;
    let books = query::with_summaries(state.db.as_ref(), books).await?;

    Ok(Json(ApiResponse::ok("Report books retrieved successfully", ReportBooks { books })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedReport {
    pub session: String,
    pub semester: Semester,
    pub total_books: usize,
    pub faculties: Vec<FacultyGroup>,
}

/// GET /api/books/report/grouped
pub async fn grouped_report(
    State(state): State<AppState>,
    params: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<GroupedReport>>> {
    let Query(params) = params?;
    let mut errors = Errors::new();
    let (session, semester) = params.parse(&mut errors);
    errors.into_result()?;

    let (session, semester) = resolve_period(&state, session, semester).await?;
    let (books, faculties, departments) = futures::try_join!(
        query::report_books_cached(state.db.as_ref(), &state.cache, &session, semester),
        faculty::Entity::find().all(state.db.as_ref()),
        department::Entity::find().all(state.db.as_ref()),
    )?;

    let faculties = report::group_report(books, &faculties, &departments);
    let report = GroupedReport {
        total_books: report::leaf_count(&faculties),
        session,
        semester,
        faculties,
    };
    Ok(Json(ApiResponse::ok("Report generated successfully", report)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintListQuery {
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub level: Option<String>,
    pub session: Option<String>,
    pub semester: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintList {
    pub department: DepartmentSummary,
    pub level: Level,
    pub session: String,
    pub semester: Semester,
    #[serde(flatten)]
    pub list: DepartmentBookList,
}

/// GET /api/books/print-list
pub async fn print_list(
    State(state): State<AppState>,
    params: Result<Query<PrintListQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<PrintList>>> {
    let Query(params) = params?;
    let mut errors = Errors::new();

    let faculty_id = non_empty(params.faculty_id.as_deref())
        .and_then(|raw| errors.check("facultyId", validation::parse_uuid(raw, "faculty ID")));
    let department_id = match non_empty(params.department_id.as_deref()) {
        Some(raw) => errors.check("departmentId", validation::parse_uuid(raw, "department ID")),
        None => {
            errors.push("departmentId", "Department is required");
            None
        }
    };
    let level = match non_empty(params.level.as_deref()) {
        Some(raw) => errors.check("level", raw.parse::<Level>()),
        None => {
            errors.push("level", "Level is required");
            None
        }
    };
    let (session, semester) = PeriodQuery {
        session: params.session.clone(),
        semester: params.semester.clone(),
    }
    .parse(&mut errors);
    errors.into_result()?;
    let (Some(department_id), Some(level)) = (department_id, level) else {
        return Err(AppError::BadRequest("Department and level are required".to_string()));
    };

    let department = department::Entity::find_by_id(department_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Department not found")?;
    let (session, semester) = resolve_period(&state, session, semester).await?;

    let filter = BookFilter {
        faculty_id,
        department_id: Some(department.id),
        level: Some(level),
        session: Some(session.clone()),
        semester: Some(semester),
        ..Default::default()
    };
    let list = query::department_book_list(state.db.as_ref(), &filter).await?;

    Ok(Json(ApiResponse::ok(
        "Book list retrieved successfully",
        PrintList {
            department: DepartmentSummary::from(&department),
            level,
            session,
            semester,
            list,
        },
    )))
}

/// POST /api/books
pub async fn create_book(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookResponse>>)> {
    current.require_staff()?;
    let mut form = read_form(multipart.map_err(|e| AppError::BadRequest(e.body_text()))?).await?;

    let mut errors = Errors::new();
    for (field, label) in [
        ("title", "Book title is required"),
        ("price", "Price is required"),
        ("courseCode", "Course code is required"),
        ("facultyId", "Faculty ID is required"),
        ("level", "Level is required"),
        ("semester", "Semester is required"),
        ("session", "Session is required"),
    ] {
        if !form.has(field) {
            errors.push(field, label);
        }
    }
    let patch = BookPatch::parse(&form, &mut errors);
    let has_manual = patch.has_manual.unwrap_or(false);

    let max_size = state.config.max_upload_size;
    let front_cover = form.take_file(FRONT_COVER);
    let back_cover = form.take_file(BACK_COVER);
    let manual_cover = form.take_file(MANUAL_FRONT_COVER).filter(|_| has_manual);

    match &front_cover {
        Some(file) => check_image(file, FRONT_COVER, max_size, &mut errors),
        None => errors.push(FRONT_COVER, "Front cover is required"),
    }
    if let Some(file) = &back_cover {
        check_image(file, BACK_COVER, max_size, &mut errors);
    }
    if has_manual {
        match &manual_cover {
            Some(file) => check_image(file, MANUAL_FRONT_COVER, max_size, &mut errors),
            None => errors.push(
                MANUAL_FRONT_COVER,
                "Manual front cover is required when hasManual is true",
            ),
        }
        if patch.manual_price.is_none() {
            errors.push("manualPrice", "Manual price is required when hasManual is true");
        }
    }
    errors.into_result()?;

    let (
        Some(title),
        Some(price),
        Some(course_code),
        Some(faculty_id),
        Some(level),
        Some(semester),
        Some(session),
        Some(front_cover),
    ) = (
        patch.title,
        patch.price,
        patch.course_code,
        patch.faculty_id,
        patch.level,
        patch.semester,
        patch.session,
        front_cover,
    )
    else {
        return Err(AppError::BadRequest("Missing required book fields".to_string()));
    };
    let department_id = patch.department_id.flatten();

    check_references(&state, faculty_id, department_id).await?;

    let (front, back, manual) = futures::try_join!(
        async { Ok::<_, AppError>(state.images.upload(BOOKS_FOLDER, front_cover).await?) },
        upload_optional(&state.images, BOOKS_FOLDER, back_cover),
        upload_optional(&state.images, MANUALS_FOLDER, manual_cover),
    )?;

    let now = Utc::now();
    let created = book::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(title),
        description: Set(patch.description.flatten()),
        price: Set(price),
        course_code: Set(course_code),
        faculty_id: Set(faculty_id),
        department_id: Set(department_id),
        level: Set(level),
        semester: Set(semester),
        session: Set(session),
        front_cover: Set(front.url),
        back_cover: Set(back.map(|img| img.url)),
        manual_front_cover: Set(manual.map(|img| img.url)),
        has_manual: Set(has_manual),
        manual_price: Set(if has_manual { patch.manual_price } else { None }),
        course_lecturer: Set(patch.course_lecturer.flatten()),
        quantity: Set(patch.quantity.unwrap_or(0)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(state.db.as_ref())
    .await?;

    state.cache.invalidate_books().await;
    tracing::info!("{} created book {} ({})", current.username, created.title, created.id);

    let book = respond_with_book(&state, created).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Book created successfully", book)),
    ))
}

/// PUT /api/books/:id
pub async fn update_book(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ApiResponse<BookResponse>>> {
    current.require_staff()?;
    let id = parse_id(&id, "book ID")?;
    let existing = book::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Book not found")?;

    let mut form = read_form(multipart.map_err(|e| AppError::BadRequest(e.body_text()))?).await?;
    let mut errors = Errors::new();
    let patch = BookPatch::parse(&form, &mut errors);

    let max_size = state.config.max_upload_size;
    let front_cover = form.take_file(FRONT_COVER);
    let back_cover = form.take_file(BACK_COVER);
    let manual_cover = form.take_file(MANUAL_FRONT_COVER);
    for (field, file) in [
        (FRONT_COVER, &front_cover),
        (BACK_COVER, &back_cover),
        (MANUAL_FRONT_COVER, &manual_cover),
    ] {
        if let Some(file) = file {
            check_image(file, field, max_size, &mut errors);
        }
    }

    let has_manual = patch.has_manual.unwrap_or(existing.has_manual);
    let manual_price = if has_manual {
        patch.manual_price.or(existing.manual_price)
    } else {
        None
    };
    if has_manual {
        if manual_cover.is_none() && existing.manual_front_cover.is_none() {
            errors.push(
                MANUAL_FRONT_COVER,
                "Manual front cover is required when hasManual is true",
            );
        }
        if manual_price.is_none() {
            errors.push("manualPrice", "Manual price is required when hasManual is true");
        }
    }
    errors.into_result()?;

    let faculty_id = patch.faculty_id.unwrap_or(existing.faculty_id);
    let department_id = match patch.department_id {
        Some(department_id) => department_id,
        None => existing.department_id,
    };
    if patch.faculty_id.is_some() || patch.department_id.is_some() {
        check_references(&state, faculty_id, department_id).await?;
    }

    let (front, back, manual) = futures::try_join!(
        upload_optional(&state.images, BOOKS_FOLDER, front_cover),
        upload_optional(&state.images, BOOKS_FOLDER, back_cover),
        upload_optional(&state.images, MANUALS_FOLDER, manual_cover),
    )?;

    // Images replaced by this update, removed once the row points elsewhere.
    let mut replaced = Vec::new();
    let mut active: book::ActiveModel = existing.clone().into();

    if let Some(title) = patch.title {
        active.title = Set(title);
    }
    if let Some(description) = patch.description {
        active.description = Set(description);
    }
    if let Some(price) = patch.price {
        active.price = Set(price);
    }
    if let Some(course_code) = patch.course_code {
        active.course_code = Set(course_code);
    }
    active.faculty_id = Set(faculty_id);
    active.department_id = Set(department_id);
    if let Some(level) = patch.level {
        active.level = Set(level);
    }
    if let Some(semester) = patch.semester {
        active.semester = Set(semester);
    }
    if let Some(session) = patch.session {
        active.session = Set(session);
    }
    if let Some(course_lecturer) = patch.course_lecturer {
        active.course_lecturer = Set(course_lecturer);
    }
    if let Some(quantity) = patch.quantity {
        active.quantity = Set(quantity);
    }
    active.has_manual = Set(has_manual);
    active.manual_price = Set(manual_price);
    if let Some(front) = front {
        replaced.push(existing.front_cover.clone());
        active.front_cover = Set(front.url);
    }
    if let Some(back) = back {
        replaced.extend(existing.back_cover.clone());
        active.back_cover = Set(Some(back.url));
    }
    if let Some(manual) = manual {
        replaced.extend(existing.manual_front_cover.clone());
        active.manual_front_cover = Set(Some(manual.url));
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(state.db.as_ref()).await?;

    for url in &replaced {
        state.images.delete_url(url).await;
    }
    state.cache.invalidate_books().await;
    tracing::info!("{} updated book {} ({})", current.username, updated.title, updated.id);

    let book = respond_with_book(&state, updated).await?;
    Ok(Json(ApiResponse::ok("Book updated successfully", book)))
}

/// DELETE /api/books/:id
pub async fn delete_book(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    current.require_staff()?;
    let id = parse_id(&id, "book ID")?;
    let existing = book::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("Book not found")?;

    let urls = std::iter::once(existing.front_cover.clone())
        .chain(existing.back_cover.clone())
        .chain(existing.manual_front_cover.clone());
    for url in urls {
        state.images.delete_url(&url).await;
    }

    book::Entity::delete_by_id(existing.id).exec(state.db.as_ref()).await?;

    state.cache.invalidate_books().await;
    tracing::info!("{} deleted book {} ({})", current.username, existing.title, existing.id);

    Ok(Json(ApiResponse::message("Book deleted successfully")))
}
