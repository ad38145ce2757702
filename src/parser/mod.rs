use crate::error::{IngestError, ParseError};
use crate::models::{ResultRow, SkippedRow};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Header names (lowercase, alphanumerics only) that identify a student.
const IDENTITY_HEADERS: &[&str] = &[
    "roll",
    "rollno",
    "rollnumber",
    "rollnum",
    "studentid",
    "admissionno",
    "enrollmentno",
    "enrollmentnumber",
];

/// Where result data comes from: a file on disk or text pasted into the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabularSource {
    File(PathBuf),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// 1-based line number in the source text.
    pub line: usize,
    pub row: ResultRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub records: Vec<ParsedRecord>,
}

/// Rows split by whether they carry a student identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedRows {
    pub identity_column: Option<String>,
    pub rows: Vec<ResultRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Read `source` and parse it into header-keyed rows
pub fn parse_tabular_input(source: &TabularSource) -> Result<ParsedTable, IngestError> {
    match source {
        TabularSource::File(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(parse_tabular_text(&text)?)
        }
        TabularSource::Text(text) => Ok(parse_tabular_text(text)?),
    }
}

/// Parse CSV or TSV text whose first non-empty row is the header.
///
/// Rows shorter than the header get `None` for the missing cells. Rows longer
/// than the header are an error unless the extra cells are blank.
pub fn parse_tabular_text(text: &str) -> Result<ParsedTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let delimiter = detect_delimiter(text);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut records = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed {
            line: e.position().map_or(0, |p| p.line() as usize),
            message: e.to_string(),
        })?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map_or(0, |p| p.line() as usize);
        match &headers {
            None => headers = Some(read_header(&record)?),
            Some(header) => records.push(ParsedRecord {
                line,
                row: build_row(header, &record, line)?,
            }),
        }
    }

    let headers = headers.ok_or(ParseError::MissingHeader)?;
    if records.is_empty() {
        return Err(ParseError::NoDataRows);
    }

    debug!(
        delimiter = %(delimiter as char).escape_default(),
        columns = headers.len(),
        rows = records.len(),
        "parsed tabular input"
    );

    Ok(ParsedTable { headers, records })
}

/// Spreadsheet clipboards are tab separated, exported files comma separated.
/// The header line decides.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let tabs = header.matches('\t').count();
    let commas = header.matches(',').count();

    if tabs > 0 && tabs >= commas {
        b'\t'
    } else {
        b','
    }
}

fn read_header(record: &StringRecord) -> Result<Vec<String>, ParseError> {
    let cells: Vec<&str> = record.iter().collect();
    // Trailing blank cells are spreadsheet padding, not columns
    let width = cells
        .iter()
        .rposition(|cell| !cell.is_empty())
        .map_or(0, |i| i + 1);

    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(width);

    for (index, cell) in cells[..width].iter().enumerate() {
        if cell.is_empty() {
            return Err(ParseError::BlankHeader { column: index + 1 });
        }
        if !seen.insert(cell.to_lowercase()) {
            return Err(ParseError::DuplicateHeader(cell.to_string()));
        }
        headers.push(cell.to_string());
    }

    Ok(headers)
}

fn build_row(headers: &[String], record: &StringRecord, line: usize) -> Result<ResultRow, ParseError> {
    if record.iter().skip(headers.len()).any(|cell| !cell.is_empty()) {
        return Err(ParseError::ExtraCells {
            line,
            expected: headers.len(),
            found: record.len(),
        });
    }

    let mut row = ResultRow::default();
    for (index, header) in headers.iter().enumerate() {
        let value = record
            .get(index)
            .filter(|cell| !cell.is_empty())
            .map(str::to_string);
        row.insert(header.clone(), value);
    }
    Ok(row)
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// The first header that names a roll number or student ID.
pub fn identity_column(headers: &[String]) -> Option<&str> {
    headers
        .iter()
        .find(|h| IDENTITY_HEADERS.contains(&normalize_header(h).as_str()))
        .map(String::as_str)
}

impl ParsedTable {
    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.records.iter().map(|r| &r.row)
    }

    /// Drop rows that cannot be matched to a student.
    pub fn split_identified(self) -> IdentifiedRows {
        let identity = identity_column(&self.headers).map(str::to_string);
        let mut rows = Vec::new();
        let mut skipped = Vec::new();

        for record in self.records {
            match &identity {
                Some(column) if record.row.get(column).is_some() => rows.push(record.row),
                Some(column) => skipped.push(SkippedRow {
                    line: record.line,
                    reason: format!("missing {}", column),
                }),
                None => skipped.push(SkippedRow {
                    line: record.line,
                    reason: "no roll number or student ID column".to_string(),
                }),
            }
        }

        IdentifiedRows {
            identity_column: identity,
            rows,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pasted_csv() {
        let text = "Roll,Name,Score\n101,Asha Verma,87\n102,Kabir Rao,64\n";

        let table = parse_tabular_text(text).unwrap();
        assert_eq!(table.headers, vec!["Roll", "Name", "Score"]);
        assert_eq!(table.records.len(), 2);

        let first = &table.records[0].row;
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["Roll", "Name", "Score"]);
        assert_eq!(first.get("Roll"), Some("101"));
        assert_eq!(first.get("Name"), Some("Asha Verma"));
        assert_eq!(first.get("Score"), Some("87"));
        assert_eq!(table.records[1].row.get("Name"), Some("Kabir Rao"));
        assert_eq!(table.records[1].line, 3);
    }

    #[test]
    fn test_parse_spreadsheet_paste_with_tabs() {
        let text = "Roll No\tName\tPhysics, Q1\n\n101\tAsha\t4\n\t\t\n102\tKabir\t3\n";

        let table = parse_tabular_text(text).unwrap();
        assert_eq!(table.headers, vec!["Roll No", "Name", "Physics, Q1"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1].row.get("Physics, Q1"), Some("3"));
    }

    #[test]
    fn test_missing_trailing_cells_become_none() {
        let text = "Roll,Name,Score\n101,Asha\n";

        let table = parse_tabular_text(text).unwrap();
        let row = &table.records[0].row;
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("Score"), None);
    }

    #[test]
    fn test_extra_cells_are_rejected() {
        let text = "Roll,Score\n101,87,oops\n";
        assert_eq!(
            parse_tabular_text(text),
            Err(ParseError::ExtraCells {
                line: 2,
                expected: 2,
                found: 3
            })
        );

        // Blank padding past the header is fine
        assert!(parse_tabular_text("Roll,Score\n101,87,,\n").is_ok());
    }

    #[test]
    fn test_empty_and_headerless_input() {
        assert_eq!(parse_tabular_text(""), Err(ParseError::Empty));
        assert_eq!(parse_tabular_text("  \n\n \t\n"), Err(ParseError::Empty));
        assert_eq!(parse_tabular_text(",,\n,,\n"), Err(ParseError::MissingHeader));
        assert_eq!(parse_tabular_text("Roll,Score\n"), Err(ParseError::NoDataRows));
    }

    #[test]
    fn test_bad_headers() {
        assert_eq!(
            parse_tabular_text("Roll,,Score\n1,2,3\n"),
            Err(ParseError::BlankHeader { column: 2 })
        );
        assert_eq!(
            parse_tabular_text("Roll,Score,score\n1,2,3\n"),
            Err(ParseError::DuplicateHeader("score".to_string()))
        );
    }

    #[test]
    fn test_byte_order_mark_is_stripped() {
        let table = parse_tabular_text("\u{feff}Roll,Score\n1,2\n").unwrap();
        assert_eq!(table.headers[0], "Roll");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(detect_delimiter("\n\nname\tscore, total\n"), b'\t');
        assert_eq!(detect_delimiter("single"), b',');
    }

    #[test]
    fn test_split_identified_skips_rows_without_roll() {
        let text = "Name,Roll No.,Score\nAsha,101,87\nKabir,,64\nMeera,103,\n";

        let identified = parse_tabular_text(text).unwrap().split_identified();
        assert_eq!(identified.identity_column.as_deref(), Some("Roll No."));
        assert_eq!(identified.rows.len(), 2);
        assert_eq!(
            identified.skipped,
            vec![SkippedRow {
                line: 3,
                reason: "missing Roll No.".to_string()
            }]
        );
    }

    #[test]
    fn test_split_identified_without_identity_column() {
        let text = "Name,Score\nAsha,87\n";

        let identified = parse_tabular_text(text).unwrap().split_identified();
        assert_eq!(identified.identity_column, None);
        assert!(identified.rows.is_empty());
        assert_eq!(identified.skipped.len(), 1);
    }

    #[test]
    fn test_parse_from_file() {
        let path = std::env::temp_dir().join("academy_desk_parser_test.csv");
        std::fs::write(&path, "student_id,score\nS1,10\n").unwrap();

        let table = parse_tabular_input(&TabularSource::File(path.clone())).unwrap();
        assert_eq!(table.rows().count(), 1);

        std::fs::remove_file(path).ok();

        let missing = parse_tabular_input(&TabularSource::File("/nonexistent/results.csv".into()));
        assert!(matches!(missing, Err(IngestError::Io { .. })));
    }
}
