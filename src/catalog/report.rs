//! Faculty -> Department -> Level grouping of a report extraction

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::model::{BookResponse, DepartmentSummary, FacultySummary};
use crate::entity::{book, department, faculty, Level};

pub const UNKNOWN_DEPARTMENT: &str = "Unknown Department";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelGroup {
    pub level: Level,
    pub books: Vec<BookResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentGroup {
    /// `None` for books without a (known) department
    pub id: Option<Uuid>,
    pub name: String,
    pub levels: Vec<LevelGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacultyGroup {
    pub id: Uuid,
    pub name: String,
    pub departments: Vec<DepartmentGroup>,
}

/// Case-insensitive title order, raw title as the tie-breaker.
pub fn title_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn name_order(a: &str, b: &str) -> Ordering {
    title_order(a, b)
}

type LevelBuckets = BTreeMap<Level, Vec<BookResponse>>;

/// Group a flat report extraction.
///
/// Books whose faculty is not in `faculties` are dropped; books whose
/// department is missing or unknown land under [`UNKNOWN_DEPARTMENT`].
/// Every other book appears exactly once.
pub fn group_report(
    books: Vec<book::Model>,
    faculties: &[faculty::Model],
    departments: &[department::Model],
) -> Vec<FacultyGroup> {
    let faculty_by_id: HashMap<Uuid, &faculty::Model> = faculties.iter().map(|f| (f.id, f)).collect();
    let department_by_id: HashMap<Uuid, &department::Model> =
        departments.iter().map(|d| (d.id, d)).collect();

    let mut buckets: HashMap<Uuid, HashMap<Option<Uuid>, LevelBuckets>> = HashMap::new();

    for book in books {
        let Some(faculty) = faculty_by_id.get(&book.faculty_id) else {
            tracing::debug!("Report skips book {} with unknown faculty {}", book.id, book.faculty_id);
            continue;
        };

        let department = book.department_id.and_then(|id| department_by_id.get(&id).copied());
        let level = book.level;
        let response = BookResponse::new(
            book,
            Some(FacultySummary::from(*faculty)),
            department.map(DepartmentSummary::from),
        );

        buckets
            .entry(faculty.id)
            .or_default()
            .entry(department.map(|d| d.id))
            .or_default()
            .entry(level)
            .or_default()
            .push(response);
    }

    let mut groups: Vec<FacultyGroup> = buckets
        .into_iter()
        .filter_map(|(faculty_id, by_department)| {
            let faculty = faculty_by_id.get(&faculty_id)?;

            let mut departments: Vec<DepartmentGroup> = by_department
                .into_iter()
                .map(|(department_id, by_level)| DepartmentGroup {
                    id: department_id,
                    name: department_id
                        .and_then(|id| department_by_id.get(&id))
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| UNKNOWN_DEPARTMENT.to_string()),
                    levels: by_level
                        .into_iter()
                        .map(|(level, mut books)| {
                            books.sort_by(|a, b| title_order(&a.title, &b.title));
                            LevelGroup { level, books }
                        })
                        .collect(),
                })
                .collect();
            departments.sort_by(|a, b| name_order(&a.name, &b.name));

            Some(FacultyGroup {
                id: faculty.id,
                name: faculty.name.clone(),
                departments,
            })
        })
        .collect();

    groups.sort_by(|a, b| name_order(&a.name, &b.name));
    groups
}

/// Number of books across every leaf of the tree.
pub fn leaf_count(groups: &[FacultyGroup]) -> usize {
    groups
        .iter()
        .flat_map(|f| &f.departments)
        .flat_map(|d| &d.levels)
        .map(|l| l.books.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use std::collections::HashSet;

    #[test]
    fn builds_sorted_tree() {
        let science = fixtures::faculty("Science");
        let arts = fixtures::faculty("Arts");
        let physics = fixtures::department("Physics", science.id);
        let chemistry = fixtures::department("Chemistry", science.id);
        let history = fixtures::department("History", arts.id);

        let books = vec![
            fixtures::book("quantum", science.id, Some(physics.id), Level::L300),
            fixtures::book("Mechanics", science.id, Some(physics.id), Level::L100),
            fixtures::book("Acids", science.id, Some(chemistry.id), Level::L200),
            fixtures::book("Empires", arts.id, Some(history.id), Level::L100),
            fixtures::book("Kinematics", science.id, Some(physics.id), Level::L100),
        ];

        let tree = group_report(
            books,
            &[science.clone(), arts.clone()],
            &[physics.clone(), chemistry.clone(), history.clone()],
        );

        let faculty_names: Vec<_> = tree.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(faculty_names, vec!["Arts", "Science"]);

        let science_group = &tree[1];
        let dept_names: Vec<_> = science_group.departments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dept_names, vec!["Chemistry", "Physics"]);

        let physics_group = &science_group.departments[1];
        let levels: Vec<_> = physics_group.levels.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![Level::L100, Level::L300]);

        let titles: Vec<_> = physics_group.levels[0].books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Kinematics", "Mechanics"]);
    }

    #[test]
    fn missing_and_dangling_departments_share_one_bucket() {
        let science = fixtures::faculty("Science");
        let books = vec![
            fixtures::book("Loose", science.id, None, Level::L100),
            fixtures::book("Orphan", science.id, Some(Uuid::new_v4()), Level::L100),
            fixtures::book("Stray", Uuid::new_v4(), None, Level::L100),
        ];

        let tree = group_report(books, &[science.clone()], &[]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].departments.len(), 1);
        assert_eq!(tree[0].departments[0].name, UNKNOWN_DEPARTMENT);
        assert_eq!(tree[0].departments[0].id, None);
        let titles: Vec<_> = tree[0].departments[0].levels[0]
            .books
            .iter()
            .map(|b| b.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Loose", "Orphan"]);
        assert_eq!(leaf_count(&tree), 2);
    }

    #[test]
    fn leaves_are_exactly_the_known_faculty_books() {
        let science = fixtures::faculty("Science");
        let physics = fixtures::department("Physics", science.id);
        let books: Vec<_> = Level::ALL
            .iter()
            .enumerate()
            .flat_map(|(i, level)| {
                [
                    fixtures::book(&format!("P{}", i), science.id, Some(physics.id), *level),
                    fixtures::book(&format!("U{}", i), science.id, None, *level),
                ]
            })
            .collect();
        let expected: HashSet<Uuid> = books.iter().map(|b| b.id).collect();

        let tree = group_report(books, &[science], &[physics]);
        let leaves: Vec<Uuid> = tree
            .iter()
            .flat_map(|f| &f.departments)
            .flat_map(|d| &d.levels)
            .flat_map(|l| &l.books)
            .map(|b| b.id)
            .collect();

        assert_eq!(leaves.len(), expected.len());
        assert_eq!(leaves.into_iter().collect::<HashSet<_>>(), expected);
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        let science = fixtures::faculty("Science");
        assert!(group_report(Vec::new(), &[science], &[]).is_empty());
    }
}
