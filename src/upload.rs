use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{self, Distribution, GroupAverages, RowView, StudentView};
use crate::cut_scores::CutScoreTable;
use crate::ingest::{self, IngestError};
use crate::models::{Demographic, Domain, Record};

pub const MIN_YEAR: i32 = 1901;
pub const MAX_YEAR: i32 = 2100;

pub const NO_RECORDS_MESSAGE: &str = "CSV file is empty or contains no data records after header.";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please select a CSV file to upload.")]
    EmptyFile,
    #[error("Please provide a valid year (e.g., 2023); got {0}.")]
    InvalidYear(i32),
    #[error("Error in CSV data or format: {0}")]
    Ingest(#[from] IngestError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    Analysis(Box<AnalysisResponse>),
    Empty { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub subject_performance_level_distribution_by_year: Distribution,
    pub rise_ela_proficiency_distribution_by_grade_by_year: Distribution,
    pub math_proficiency_distribution_by_grade_by_year: Distribution,
    pub average_overall_scale_score_by_year: IndexMap<i32, f64>,
    pub average_overall_scale_score_of_students_in_subject_area_groups_by_year: GroupAverages,
    pub average_overall_scale_score_by_special_ed_and_subject_area_by_year:
        IndexMap<String, GroupAverages>,
    pub ela_passing_student_count_by_year: IndexMap<i32, u64>,
    pub math_passing_student_count_by_year: IndexMap<i32, u64>,
    pub overall_ela_pass_rate_by_year: IndexMap<i32, f64>,
    pub overall_math_pass_rate_by_year: IndexMap<i32, f64>,
    pub average_overall_scale_score_by_ethnicity_by_year: GroupAverages,
    pub average_overall_scale_score_by_gender_by_year: GroupAverages,
    pub average_overall_scale_score_by_grade_level_by_year: GroupAverages,
    pub average_overall_scale_score_by_overall_performance_csv_by_year: GroupAverages,
    pub average_overall_scale_score_by_rise_ela_proficiency_by_year: GroupAverages,
    pub average_overall_scale_score_by_math_proficiency_by_year: GroupAverages,
    pub average_overall_scale_score_by_ell_by_year: GroupAverages,
    pub average_overall_scale_score_by_special_ed_by_year: GroupAverages,
    pub total_unpivoted_records_processed: usize,
    pub total_students: usize,
    pub file_name: String,
    pub dataset_year: i32,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResponse {
    pub fn build(records: &[Record], file_name: &str, year: i32) -> Self {
        let rows = RowView::new(records);
        let students = StudentView::new(records);
        let by = |demographic| analysis::average_scale_score_by_demographic(&students, demographic);

        Self {
            subject_performance_level_distribution_by_year:
                analysis::subject_performance_distribution(&rows),
            rise_ela_proficiency_distribution_by_grade_by_year:
                analysis::proficiency_distribution_by_grade(&students, Domain::Ela),
            math_proficiency_distribution_by_grade_by_year:
                analysis::proficiency_distribution_by_grade(&students, Domain::Math),
            average_overall_scale_score_by_year: analysis::average_scale_score_by_year(&students),
            average_overall_scale_score_of_students_in_subject_area_groups_by_year:
                analysis::average_scale_score_by_subject_area(&rows),
            average_overall_scale_score_by_special_ed_and_subject_area_by_year:
                analysis::average_scale_score_by_special_ed_and_subject_area(&rows),
            ela_passing_student_count_by_year: analysis::passing_count_by_year(
                &students,
                Domain::Ela,
            ),
            math_passing_student_count_by_year: analysis::passing_count_by_year(
                &students,
                Domain::Math,
            ),
            overall_ela_pass_rate_by_year: analysis::pass_rate_by_year(&students, Domain::Ela),
            overall_math_pass_rate_by_year: analysis::pass_rate_by_year(&students, Domain::Math),
            average_overall_scale_score_by_ethnicity_by_year: by(Demographic::Ethnicity),
            average_overall_scale_score_by_gender_by_year: by(Demographic::Gender),
            average_overall_scale_score_by_grade_level_by_year: by(Demographic::GradeLevel),
            average_overall_scale_score_by_overall_performance_csv_by_year: by(
                Demographic::OverallPerformance,
            ),
            average_overall_scale_score_by_rise_ela_proficiency_by_year: by(
                Demographic::ElaProficiency,
            ),
            average_overall_scale_score_by_math_proficiency_by_year: by(
                Demographic::MathProficiency,
            ),
            average_overall_scale_score_by_ell_by_year: by(Demographic::Ell),
            average_overall_scale_score_by_special_ed_by_year: by(Demographic::SpecialEd),
            total_unpivoted_records_processed: rows.len(),
            total_students: students.len(),
            file_name: file_name.to_string(),
            dataset_year: year,
            generated_at: Utc::now(),
        }
    }

    /// Averages for one demographic dimension, for report rendering.
    pub fn demographic_averages(&self, demographic: Demographic) -> &GroupAverages {
        match demographic {
            Demographic::Ethnicity => &self.average_overall_scale_score_by_ethnicity_by_year,
            Demographic::Gender => &self.average_overall_scale_score_by_gender_by_year,
            Demographic::GradeLevel => &self.average_overall_scale_score_by_grade_level_by_year,
            Demographic::OverallPerformance => {
                &self.average_overall_scale_score_by_overall_performance_csv_by_year
            }
            Demographic::ElaProficiency => {
                &self.average_overall_scale_score_by_rise_ela_proficiency_by_year
            }
            Demographic::MathProficiency => {
                &self.average_overall_scale_score_by_math_proficiency_by_year
            }
            Demographic::Ell => &self.average_overall_scale_score_by_ell_by_year,
            Demographic::SpecialEd => &self.average_overall_scale_score_by_special_ed_by_year,
        }
    }
}

pub fn validate_upload(bytes: &[u8], year: i32) -> Result<(), UploadError> {
    if bytes.is_empty() {
        warn!("Upload attempt with an empty file.");
        return Err(UploadError::EmptyFile);
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        warn!("Invalid year provided: {year}");
        return Err(UploadError::InvalidYear(year));
    }
    Ok(())
}

/// Validates an uploaded CSV, ingests it and runs every aggregation.
pub fn analyze_upload(
    file_name: &str,
    bytes: &[u8],
    year: i32,
    cut_scores: &CutScoreTable,
) -> Result<UploadOutcome, UploadError> {
    info!("Received file upload request: {file_name} for year: {year}");
    validate_upload(bytes, year)?;

    let records = ingest::ingest(bytes, year, cut_scores).map_err(|err| {
        if err.is_format_error() {
            warn!("Malformed CSV file: {err}");
        } else {
            warn!("Bad numeric value in CSV file: {err}");
        }
        UploadError::from(err)
    })?;

    if records.is_empty() {
        info!("CSV file was parsed but contained no data records.");
        return Ok(UploadOutcome::Empty {
            message: NO_RECORDS_MESSAGE.to_string(),
        });
    }

    let response = AnalysisResponse::build(&records, file_name, year);
    info!("Analysis complete. Sending results for year {year}");
    Ok(UploadOutcome::Analysis(Box::new(response)))
}
