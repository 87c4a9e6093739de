use indexmap::IndexMap;
use log::{debug, info};
use thiserror::Error;

use crate::cut_scores::CutScoreTable;
use crate::models::{Domain, Record, SubjectArea};

pub const HEADER_STUDENT_ID: &str = "Student ID";
pub const HEADER_STUDENT_NAME: &str = "Student Name";
pub const HEADER_GRADE: &str = "Grade";
pub const HEADER_ELL: &str = "ELL";
pub const HEADER_SPECIAL_ED: &str = "Special Ed";
pub const HEADER_SCALE_SCORE: &str = "Scale Score";
pub const HEADER_PERFORMANCE: &str = "Performance";
pub const HEADER_ETHNICITY: &str = "Ethnicity";
pub const HEADER_GENDER: &str = "Gender";

pub const REQUIRED_HEADERS: [&str; 9] = [
    HEADER_STUDENT_ID,
    HEADER_STUDENT_NAME,
    HEADER_GRADE,
    HEADER_ELL,
    HEADER_SPECIAL_ED,
    HEADER_SCALE_SCORE,
    HEADER_PERFORMANCE,
    HEADER_ETHNICITY,
    HEADER_GENDER,
];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("CSV file has no header row")]
    MissingHeaderRow,
    #[error("CSV file is missing the common required header: '{0}'")]
    MissingHeader(&'static str),
    #[error("Error accessing data at record {row}: missing value for '{header}'")]
    MissingField { row: usize, header: &'static str },
    #[error("Error parsing numeric value at record {row}: {message}")]
    NumericFormat { row: usize, message: String },
    #[error("Error reading CSV at record {row}: {source}")]
    Csv { row: usize, source: csv::Error },
}

impl IngestError {
    /// Structural problems with the header or a row's shape.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, IngestError::NumericFormat { .. })
    }
}

/// Which domains' subject columns the header carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLayout {
    Ela,
    Math,
    Both,
    Unknown,
}

/// Header analysis: column positions plus the subject columns to unpivot.
#[derive(Debug)]
struct HeaderMap {
    positions: IndexMap<String, usize>,
    subjects: Vec<(SubjectArea, usize)>,
}

impl HeaderMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, IngestError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(IngestError::MissingHeaderRow);
        }

        let mut positions = IndexMap::new();
        for (index, header) in headers.iter().enumerate() {
            positions.entry(header.trim().to_string()).or_insert(index);
        }
        debug!("CSV headers found: {:?}", positions.keys().collect::<Vec<_>>());

        for required in REQUIRED_HEADERS {
            if !positions.contains_key(required) {
                return Err(IngestError::MissingHeader(required));
            }
        }

        let subjects = SubjectArea::ALL
            .iter()
            .filter_map(|subject| positions.get(subject.column()).map(|&i| (*subject, i)))
            .collect();

        Ok(Self {
            positions,
            subjects,
        })
    }

    fn layout(&self) -> DetectedLayout {
        let has = |domain: Domain| self.subjects.iter().any(|(s, _)| s.domain() == domain);
        match (has(Domain::Ela), has(Domain::Math)) {
            (true, true) => DetectedLayout::Both,
            (true, false) => DetectedLayout::Ela,
            (false, true) => DetectedLayout::Math,
            (false, false) => DetectedLayout::Unknown,
        }
    }

    fn field<'r>(
        &self,
        row: &'r csv::StringRecord,
        row_number: usize,
        header: &'static str,
    ) -> Result<&'r str, IngestError> {
        self.positions
            .get(header)
            .and_then(|&index| row.get(index))
            .ok_or(IngestError::MissingField {
                row: row_number,
                header,
            })
    }
}

/// Parses an assessment CSV and unpivots it into one record per
/// (student, subject column). Any bad row aborts the whole batch.
pub fn ingest(
    bytes: &[u8],
    year: i32,
    cut_scores: &CutScoreTable,
) -> Result<Vec<Record>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = csv_reader
        .headers()
        .map_err(|source| IngestError::Csv { row: 0, source })?
        .clone();
    let header_map = HeaderMap::from_headers(&headers)?;
    info!("Detected CSV data type: {:?}", header_map.layout());

    let mut records = Vec::new();
    for (index, result) in csv_reader.records().enumerate() {
        let row_number = index + 1;
        let row = result.map_err(|source| IngestError::Csv {
            row: row_number,
            source,
        })?;
        unpivot_row(&header_map, &row, row_number, year, cut_scores, &mut records)?;
    }

    info!(
        "Successfully parsed {} unpivoted student-subject records from CSV.",
        records.len()
    );
    Ok(records)
}

fn unpivot_row(
    header_map: &HeaderMap,
    row: &csv::StringRecord,
    row_number: usize,
    year: i32,
    cut_scores: &CutScoreTable,
    out: &mut Vec<Record>,
) -> Result<(), IngestError> {
    let field = |header: &'static str| header_map.field(row, row_number, header);

    let student_id = field(HEADER_STUDENT_ID)?.to_string();
    let student_name = format_student_name(field(HEADER_STUDENT_NAME)?);
    let grade_level = field(HEADER_GRADE)?.to_string();
    let ell = parse_flag(field(HEADER_ELL)?);
    let special_ed = parse_flag(field(HEADER_SPECIAL_ED)?);
    let raw_score = field(HEADER_SCALE_SCORE)?;
    let scale_score: f64 = raw_score
        .parse()
        .map_err(|err| IngestError::NumericFormat {
            row: row_number,
            message: format!("invalid scale score '{raw_score}': {err}"),
        })?;
    if !scale_score.is_finite() {
        return Err(IngestError::NumericFormat {
            row: row_number,
            message: format!("scale score '{raw_score}' is not a finite number"),
        });
    }
    let overall_performance = field(HEADER_PERFORMANCE)?.to_string();
    let ethnicity = field(HEADER_ETHNICITY)?.to_string();
    let gender = field(HEADER_GENDER)?.to_string();

    let ela_proficiency = cut_scores.classify(Domain::Ela, &grade_level, scale_score);
    let math_proficiency = cut_scores.classify(Domain::Math, &grade_level, scale_score);

    debug!("Parsed record {row_number}: {student_name} ({student_id})");

    let base = Record {
        student_id,
        student_name,
        year,
        grade_level,
        ethnicity,
        gender,
        special_ed,
        ell,
        scale_score,
        overall_performance,
        ela_proficiency,
        math_proficiency,
        ela_passing: ela_proficiency.is_passing(),
        math_passing: math_proficiency.is_passing(),
        subject_area: None,
        subject_performance_level: None,
    };

    if header_map.subjects.is_empty() {
        out.push(base);
        return Ok(());
    }

    for &(subject, index) in &header_map.subjects {
        out.push(Record {
            subject_area: Some(subject),
            subject_performance_level: row.get(index).map(str::to_string),
            ..base.clone()
        });
    }
    Ok(())
}

/// "Doe, Jane" becomes "Jane Doe"; anything without a comma is only trimmed.
pub fn format_student_name(raw: &str) -> String {
    match raw.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim())
            .trim()
            .to_string(),
        None => raw.trim().to_string(),
    }
}

/// "yes", "true" and "1" (any case) are true; everything else is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "yes" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, ProficiencyBand};

    const COMMON: &str =
        "Student ID,Student Name,Grade,ELL,Special Ed,Scale Score,Performance,Ethnicity,Gender";

    fn run(csv: &str) -> Result<Vec<Record>, IngestError> {
        ingest(csv.as_bytes(), 2023, &CutScoreTable::rise())
    }

    #[test]
    fn unpivots_each_row_per_subject_column() {
        let csv = format!(
            "{COMMON},Language Performance,Reading Literature Performance\n\
             1,\"Doe, Jane\",3,Yes,No,350,Proficient,Hispanic,F,Near,Above\n\
             2,Sam Roe,04,no,TRUE,300,Below,White,M,Below,Near\n"
        );
        let records = run(&csv).expect("records");
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].subject_area, Some(SubjectArea::Language));
        assert_eq!(records[0].subject_performance_level.as_deref(), Some("Near"));
        assert_eq!(records[1].subject_area, Some(SubjectArea::ReadingLiterature));
        assert_eq!(records[1].subject_performance_level.as_deref(), Some("Above"));

        let jane = &records[0];
        assert_eq!(jane.student_name, "Jane Doe");
        assert_eq!(jane.year, 2023);
        assert!(jane.ell);
        assert!(!jane.special_ed);
        assert_eq!(
            jane.ela_proficiency,
            Classification::Band(ProficiencyBand::Proficient)
        );
        assert!(jane.ela_passing);

        let sam = &records[2];
        assert!(!sam.ell);
        assert!(sam.special_ed);
        assert_eq!(
            sam.ela_proficiency,
            Classification::Band(ProficiencyBand::BelowProficient)
        );
    }

    #[test]
    fn common_fields_match_across_a_students_rows() {
        let csv = format!(
            "{COMMON},Functions Performance,Language Performance,Geometry / The Number System Performance\n\
             7,\"Lee, Avery\",5,1,0,420,Proficient,Asian,F,A,B,C\n"
        );
        let records = run(&csv).expect("records");
        assert_eq!(records.len(), 3);
        let subjects: Vec<_> = records.iter().filter_map(|r| r.subject_area).collect();
        assert_eq!(
            subjects,
            vec![
                SubjectArea::Language,
                SubjectArea::Functions,
                SubjectArea::GeometryNumberSystem
            ]
        );
        for record in &records {
            let mut same = record.clone();
            same.subject_area = records[0].subject_area;
            same.subject_performance_level = records[0].subject_performance_level.clone();
            assert_eq!(same, records[0]);
        }
    }

    #[test]
    fn without_subject_columns_one_record_per_row() {
        let csv = format!(
            "{COMMON}\n\
             1,Jane Doe,3,No,No,310,Approaching,White,F\n\
             2,Sam Roe,9,No,No,500,Proficient,White,M\n"
        );
        let records = run(&csv).expect("records");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.subject_area.is_none()));
        assert!(records.iter().all(|r| r.subject_performance_level.is_none()));
        assert_eq!(
            records[1].ela_proficiency,
            Classification::GradeNotSupported(Domain::Ela)
        );
        assert!(!records[1].ela_passing);
    }

    #[test]
    fn short_row_yields_missing_subject_level() {
        let csv = format!(
            "{COMMON},Language Performance,Functions Performance\n\
             1,Jane Doe,3,No,No,310,Approaching,White,F,Near\n"
        );
        let records = run(&csv).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject_performance_level.as_deref(), Some("Near"));
        assert_eq!(records[1].subject_performance_level, None);
    }

    #[test]
    fn missing_required_header_is_named() {
        let csv = "Student ID,Student Name,Grade,ELL,Special Ed,Scale Score,Performance,Ethnicity\n";
        let err = run(csv).unwrap_err();
        assert!(matches!(err, IngestError::MissingHeader(HEADER_GENDER)));
        assert!(err.to_string().contains("'Gender'"));
        assert!(err.is_format_error());
    }

    #[test]
    fn empty_input_has_no_header_row() {
        let err = run("").unwrap_err();
        assert!(matches!(err, IngestError::MissingHeaderRow));
    }

    #[test]
    fn bad_score_reports_row_number() {
        let csv = format!(
            "{COMMON}\n\
             1,Jane Doe,3,No,No,310,Approaching,White,F\n\
             2,Sam Roe,3,No,No,abc,Approaching,White,M\n"
        );
        let err = run(&csv).unwrap_err();
        match &err {
            IngestError::NumericFormat { row, message } => {
                assert_eq!(*row, 2);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_format_error());
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        for score in ["NaN", "inf", "-Infinity"] {
            let csv = format!(
                "{COMMON}\n\
                 1,Jane Doe,3,No,No,350,Proficient,White,F\n\
                 2,Sam Roe,3,No,No,{score},Proficient,White,M\n"
            );
            let err = run(&csv).unwrap_err();
            match &err {
                IngestError::NumericFormat { row, message } => {
                    assert_eq!(*row, 2);
                    assert!(message.contains(score), "{message}");
                }
                other => panic!("unexpected error for {score}: {other}"),
            }
        }
    }

    #[test]
    fn blank_lines_and_padded_headers_are_tolerated() {
        let csv = " Student ID , Student Name ,Grade, ELL ,Special Ed,Scale Score,Performance,Ethnicity, Gender , Language Performance \n\
                   \n\
                   1,\"Doe, Jane\",3,Yes,No, 350 ,Proficient,White,F, Near \n\
                   \n\
                   \n\
                   2,Sam Roe,3,No,No,300,Approaching,White,M,Below\n";
        let records = run(csv).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].student_name, "Jane Doe");
        assert_eq!(records[0].scale_score, 350.0);
        assert_eq!(records[0].subject_area, Some(SubjectArea::Language));
        assert_eq!(records[0].subject_performance_level.as_deref(), Some("Near"));
        assert_eq!(records[1].student_id, "2");
    }

    #[test]
    fn invalid_utf8_row_is_a_format_error() {
        let mut bytes = format!("{COMMON}\n1,").into_bytes();
        bytes.extend_from_slice(b"Jane \xff Doe,3,No,No,350,Proficient,White,F\n");
        let err = ingest(&bytes, 2023, &CutScoreTable::rise()).unwrap_err();
        assert!(err.is_format_error());
        assert!(matches!(err, IngestError::Csv { row: 1, .. }));
    }

    #[test]
    fn truncated_row_missing_required_cell_fails() {
        let csv = format!("{COMMON}\n1,Jane Doe,3,No\n");
        let err = run(&csv).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingField {
                row: 1,
                header: HEADER_SPECIAL_ED
            }
        ));
    }

    #[test]
    fn header_only_file_yields_no_records() {
        let records = run(&format!("{COMMON},Language Performance\n")).expect("records");
        assert!(records.is_empty());
    }

    #[test]
    fn name_reformatting() {
        assert_eq!(format_student_name("Doe, Jane"), "Jane Doe");
        assert_eq!(format_student_name("  Jane Doe "), "Jane Doe");
        assert_eq!(format_student_name("Doe,"), "Doe");
    }

    #[test]
    fn flags_accept_yes_true_one() {
        for raw in ["yes", "YES", "True", "1"] {
            assert!(parse_flag(raw), "{raw}");
        }
        for raw in ["no", "0", "", "y"] {
            assert!(!parse_flag(raw), "{raw}");
        }
    }
}
