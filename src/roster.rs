// Input loader: reads the grades CSV into memory and validates it before
// any request is made.

use crate::error::LoadError;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const USER_ID: &str = "user_id";
pub const GRADES: &str = "Grades";
pub const COMMENTS: &str = "Comments";
pub const STUDENT: &str = "Student";
pub const POST: &str = "post";
pub const FILE_PATH: &str = "file_path";

/// Columns every grades file must carry, in the order they are reported.
pub const REQUIRED_COLUMNS: [&str; 3] = [COMMENTS, GRADES, USER_ID];

/// Canvas user id. Kept as text; it only ever goes into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFlag {
    Yes,
    No,
}

impl PostFlag {
    /// Exactly `Y` or `y` posts; any other non-empty value, padding
    /// included, holds the row back. Empty cells have no flag at all.
    pub fn parse(raw: &str) -> Option<PostFlag> {
        if raw.is_empty() {
            None
        } else if raw.eq_ignore_ascii_case("y") {
            Some(PostFlag::Yes)
        } else {
            Some(PostFlag::No)
        }
    }
}

/// One student's line from the grades file.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    /// 0-based position among the data rows.
    pub index: usize,
    pub student: Option<String>,
    pub user_id: UserId,
    /// Points, letter grade or "excused"; sent verbatim.
    pub grade: String,
    pub comment: String,
    pub post_flag: Option<PostFlag>,
    pub file_path: Option<PathBuf>,
}

impl GradeRow {
    pub fn display_name(&self) -> &str {
        self.student.as_deref().unwrap_or("<unnamed>")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    rows: Vec<GradeRow>,
}

impl Roster {
    pub fn new(rows: Vec<GradeRow>) -> Self {
        Roster { rows }
    }

    pub fn rows(&self) -> &[GradeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column positions resolved from the header row.
struct Columns {
    user_id: usize,
    grades: usize,
    comments: usize,
    student: Option<usize>,
    post: Option<usize>,
    file_path: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, LoadError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| find(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        // Presence of all three was checked above.
        Ok(Columns {
            user_id: find(USER_ID).unwrap_or_default(),
            grades: find(GRADES).unwrap_or_default(),
            comments: find(COMMENTS).unwrap_or_default(),
            student: find(STUDENT),
            post: find(POST),
            file_path: find(FILE_PATH),
        })
    }
}

fn cell(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|v| !v.is_empty())
}

fn optional_cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| cell(record, i))
}

/// Read and validate the grades file at `path`.
pub fn load(path: &Path) -> Result<Roster, LoadError> {
    if !path.exists() {
        error!(path = %path.display(), "CSV file not found");
        return Err(LoadError::FileMissing(path.to_path_buf()));
    }
    let file = std::fs::File::open(path).map_err(|e| open_error(path, e))?;
    let roster = load_from_reader(file)?;
    info!(path = %path.display(), rows = roster.len(), "loaded grades file");
    Ok(roster)
}

fn open_error(path: &Path, source: std::io::Error) -> LoadError {
    if source.kind() == std::io::ErrorKind::NotFound {
        LoadError::FileMissing(path.to_path_buf())
    } else {
        LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parse and validate grades CSV from any reader.
pub fn load_from_reader<R: Read>(reader: R) -> Result<Roster, LoadError> {
    // Cells are trimmed in `cell`; the post flag is read untrimmed.
    let mut reader = ReaderBuilder::new()
        .trim(Trim::None)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns = match Columns::from_headers(&headers) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };
    info!("CSV file contains the required columns");

    let mut rows = Vec::new();
    let mut missing_ids = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let Some(user_id) = cell(&record, columns.user_id) else {
            missing_ids.push(index);
            continue;
        };
        rows.push(GradeRow {
            index,
            student: optional_cell(&record, columns.student).map(str::to_string),
            user_id: UserId::new(user_id),
            grade: cell(&record, columns.grades).unwrap_or_default().to_string(),
            comment: cell(&record, columns.comments).unwrap_or_default().to_string(),
            post_flag: columns
                .post
                .and_then(|i| record.get(i))
                .and_then(PostFlag::parse),
            file_path: optional_cell(&record, columns.file_path).map(PathBuf::from),
        });
    }

    if !missing_ids.is_empty() {
        let err = LoadError::MissingUserIds(missing_ids);
        error!("{err}");
        return Err(err);
    }

    Ok(Roster::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(csv: &str) -> Result<Roster, LoadError> {
        load_from_reader(csv.as_bytes())
    }

    #[test]
    fn reads_all_columns() {
        let roster = load_str(
            "Student,user_id,Grades,Comments,post,file_path\n\
             Alice,555,95,Good job,Y,\n\
             Bob,556,Excused,,n,feedback/bob.pdf\n",
        )
        .unwrap();

        assert_eq!(roster.len(), 2);
        let alice = &roster.rows()[0];
        assert_eq!(alice.index, 0);
        assert_eq!(alice.student.as_deref(), Some("Alice"));
        assert_eq!(alice.user_id, UserId::new("555"));
        assert_eq!(alice.grade, "95");
        assert_eq!(alice.comment, "Good job");
        assert_eq!(alice.post_flag, Some(PostFlag::Yes));
        assert_eq!(alice.file_path, None);

        let bob = &roster.rows()[1];
        assert_eq!(bob.comment, "");
        assert_eq!(bob.post_flag, Some(PostFlag::No));
        assert_eq!(bob.file_path, Some(PathBuf::from("feedback/bob.pdf")));
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let roster = load_str("user_id,Grades,Comments\n1,A,\n").unwrap();
        let row = &roster.rows()[0];
        assert_eq!(row.student, None);
        assert_eq!(row.post_flag, None);
        assert_eq!(row.file_path, None);
        assert_eq!(row.display_name(), "<unnamed>");
    }

    #[test]
    fn names_every_missing_column() {
        let err = load_str("Student,user_id\nAlice,1\n").unwrap_err();
        match err {
            LoadError::MissingColumns(cols) => assert_eq!(cols, vec!["Comments", "Grades"]),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = load_str("Student,Grades,Comments\nAlice,1,ok\n").unwrap_err();
        assert!(matches!(err, LoadError::MissingColumns(ref c) if c == &["user_id"]));
    }

    #[test]
    fn column_names_are_case_sensitive() {
        let err = load_str("user_id,grades,Comments\n1,2,3\n").unwrap_err();
        assert!(matches!(err, LoadError::MissingColumns(ref c) if c == &["Grades"]));
    }

    #[test]
    fn lists_rows_without_user_id() {
        let err = load_str(
            "Student,user_id,Grades,Comments\n\
             A,1,90,\n\
             B,,80,\n\
             C,3,70,\n\
             D,  ,60,\n",
        )
        .unwrap_err();
        assert!(err.is_schema_error());
        assert!(matches!(err, LoadError::MissingUserIds(ref rows) if rows == &vec![1, 3]));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Path::new("definitely/not/here/Grades.csv")).unwrap_err();
        assert!(matches!(err, LoadError::FileMissing(_)));
        assert!(!err.is_schema_error());
    }

    #[test]
    fn padded_post_flags_hold_the_row_back() {
        let roster = load_str(
            "user_id,Grades,Comments,post
             1,90,ok, Y
             2,80,ok,  
             3,70,ok,Y
             4,60,ok,
",
        )
        .unwrap();
        let flags: Vec<_> = roster.rows().iter().map(|r| r.post_flag).collect();
        assert_eq!(
            flags,
            vec![Some(PostFlag::No), Some(PostFlag::No), Some(PostFlag::Yes), None]
        );
    }

    #[test]
    fn other_values_are_still_trimmed() {
        let roster = load_str(" user_id , Grades ,Comments
 7 , 88 , fine 
").unwrap();
        let row = &roster.rows()[0];
        assert_eq!(row.user_id, UserId::new("7"));
        assert_eq!(row.grade, "88");
        assert_eq!(row.comment, "fine");
    }

    #[test]
    fn open_failures_other_than_not_found_are_io_errors() {
        let path = Path::new("Grades.csv");
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(open_error(path, denied), LoadError::Io { .. }));
        let gone = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(open_error(path, gone), LoadError::FileMissing(_)));
    }

    #[test]
    fn post_flag_parsing() {
        assert_eq!(PostFlag::parse("Y"), Some(PostFlag::Yes));
        assert_eq!(PostFlag::parse("y"), Some(PostFlag::Yes));
        assert_eq!(PostFlag::parse(" y "), Some(PostFlag::No));
        assert_eq!(PostFlag::parse("  "), Some(PostFlag::No));
        assert_eq!(PostFlag::parse("N"), Some(PostFlag::No));
        assert_eq!(PostFlag::parse("yes"), Some(PostFlag::No));
        assert_eq!(PostFlag::parse(""), None);
    }
}
