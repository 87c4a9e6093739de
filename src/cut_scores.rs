use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Classification, Domain, ProficiencyBand};

/// RISE lower bounds of the Approaching, Proficient and Highly Proficient bands.
const RISE_ELA_CUTS: [(&str, [i64; 3]); 6] = [
    ("3", [291, 334, 406]),
    ("4", [323, 378, 442]),
    ("5", [361, 410, 465]),
    ("6", [394, 434, 493]),
    ("7", [404, 450, 514]),
    ("8", [416, 471, 533]),
];

const RISE_MATH_CUTS: [(&str, [i64; 3]); 6] = [
    ("3", [297, 317, 337]),
    ("4", [326, 349, 376]),
    ("5", [360, 384, 416]),
    ("6", [397, 432, 464]),
    ("7", [415, 450, 499]),
    ("8", [447, 499, 554]),
];

#[derive(Debug, Error)]
pub enum CutScoreError {
    #[error("could not read cut-score file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid cut-score JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{domain} grade {grade} has no bands")]
    EmptyGrade { domain: &'static str, grade: String },
    #[error("{domain} grade {grade}: band {band} has lower bound above upper bound")]
    InvertedRange {
        domain: &'static str,
        grade: String,
        band: &'static str,
    },
}

/// One inclusive score range. `None` bounds are open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CutBand {
    pub band: ProficiencyBand,
    #[serde(default)]
    pub low: Option<i64>,
    #[serde(default)]
    pub high: Option<i64>,
}

impl CutBand {
    pub fn contains(&self, score: f64) -> bool {
        self.low.map_or(true, |low| score >= low as f64)
            && self.high.map_or(true, |high| score <= high as f64)
    }
}

/// Grade-specific proficiency bands per domain. Built once and shared by
/// reference; lookups never mutate it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CutScoreTable {
    #[serde(default)]
    ela: HashMap<String, Vec<CutBand>>,
    #[serde(default)]
    math: HashMap<String, Vec<CutBand>>,
}

impl CutScoreTable {
    /// Utah RISE cut scores for grades 3 through 8.
    pub fn rise() -> Self {
        Self {
            ela: build_grades(&RISE_ELA_CUTS),
            math: build_grades(&RISE_MATH_CUTS),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CutScoreError> {
        let table: CutScoreTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, CutScoreError> {
        let json = std::fs::read_to_string(path).map_err(|source| CutScoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<(), CutScoreError> {
        for domain in [Domain::Ela, Domain::Math] {
            for (grade, bands) in self.grades(domain) {
                if bands.is_empty() {
                    return Err(CutScoreError::EmptyGrade {
                        domain: domain.label(),
                        grade: grade.clone(),
                    });
                }
                for cut in bands {
                    if let (Some(low), Some(high)) = (cut.low, cut.high) {
                        if low > high {
                            return Err(CutScoreError::InvertedRange {
                                domain: domain.label(),
                                grade: grade.clone(),
                                band: cut.band.label(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn grades(&self, domain: Domain) -> &HashMap<String, Vec<CutBand>> {
        match domain {
            Domain::Ela => &self.ela,
            Domain::Math => &self.math,
        }
    }

    /// Bands for a grade, after leading zeros are stripped from the grade.
    pub fn bands(&self, domain: Domain, grade: &str) -> Option<&[CutBand]> {
        self.grades(domain)
            .get(normalize_grade(grade))
            .map(Vec::as_slice)
    }

    pub fn classify(&self, domain: Domain, grade: &str, score: f64) -> Classification {
        let Some(bands) = self.bands(domain, grade) else {
            return Classification::GradeNotSupported(domain);
        };

        bands
            .iter()
            .find(|cut| cut.contains(score))
            .map(|cut| Classification::Band(cut.band))
            .unwrap_or(Classification::ScoreOutOfRange(domain))
    }
}

fn build_grades(cuts: &[(&str, [i64; 3])]) -> HashMap<String, Vec<CutBand>> {
    cuts.iter()
        .map(|(grade, [approaching, proficient, highly])| {
            let bands = vec![
                CutBand {
                    band: ProficiencyBand::BelowProficient,
                    low: None,
                    high: Some(approaching - 1),
                },
                CutBand {
                    band: ProficiencyBand::ApproachingProficient,
                    low: Some(*approaching),
                    high: Some(proficient - 1),
                },
                CutBand {
                    band: ProficiencyBand::Proficient,
                    low: Some(*proficient),
                    high: Some(highly - 1),
                },
                CutBand {
                    band: ProficiencyBand::HighlyProficient,
                    low: Some(*highly),
                    high: None,
                },
            ];
            (grade.to_string(), bands)
        })
        .collect()
}

/// Strips leading zeros, keeping a lone "0".
pub fn normalize_grade(grade: &str) -> &str {
    let trimmed = grade.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        &trimmed[trimmed.len() - 1..]
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(b: ProficiencyBand) -> Classification {
        Classification::Band(b)
    }

    #[test]
    fn grade_three_ela_boundaries() {
        let table = CutScoreTable::rise();
        assert_eq!(
            table.classify(Domain::Ela, "3", 290.0),
            band(ProficiencyBand::BelowProficient)
        );
        assert_eq!(
            table.classify(Domain::Ela, "3", 291.0),
            band(ProficiencyBand::ApproachingProficient)
        );
        assert_eq!(
            table.classify(Domain::Ela, "3", 334.0),
            band(ProficiencyBand::Proficient)
        );
        assert_eq!(
            table.classify(Domain::Ela, "3", 406.0),
            band(ProficiencyBand::HighlyProficient)
        );
    }

    #[test]
    fn math_uses_its_own_table() {
        let table = CutScoreTable::rise();
        assert_eq!(
            table.classify(Domain::Math, "8", 553.0),
            band(ProficiencyBand::Proficient)
        );
        assert_eq!(
            table.classify(Domain::Math, "8", 554.0),
            band(ProficiencyBand::HighlyProficient)
        );
        assert_eq!(
            table.classify(Domain::Ela, "8", 553.0),
            band(ProficiencyBand::HighlyProficient)
        );
    }

    #[test]
    fn unsupported_grade_is_not_applicable() {
        let table = CutScoreTable::rise();
        assert_eq!(
            table.classify(Domain::Ela, "9", 500.0),
            Classification::GradeNotSupported(Domain::Ela)
        );
        assert_eq!(
            table.classify(Domain::Math, "K", 500.0),
            Classification::GradeNotSupported(Domain::Math)
        );
    }

    #[test]
    fn leading_zeros_are_ignored() {
        let table = CutScoreTable::rise();
        assert_eq!(
            table.classify(Domain::Ela, "03", 300.0),
            table.classify(Domain::Ela, "3", 300.0)
        );
        assert_eq!(normalize_grade("007"), "7");
        assert_eq!(normalize_grade("000"), "0");
        assert_eq!(normalize_grade(""), "");
    }

    #[test]
    fn fractional_score_between_integer_bounds_is_out_of_range() {
        let table = CutScoreTable::rise();
        assert_eq!(
            table.classify(Domain::Ela, "3", 290.5),
            Classification::ScoreOutOfRange(Domain::Ela)
        );
    }

    #[test]
    fn json_override_replaces_builtin_bands() {
        let json = r#"{
            "ela": {
                "3": [
                    { "band": "Below Proficient", "high": 99 },
                    { "band": "Proficient", "low": 100 }
                ]
            }
        }"#;
        let table = CutScoreTable::from_json_str(json).expect("table");
        assert_eq!(
            table.classify(Domain::Ela, "3", 100.0),
            band(ProficiencyBand::Proficient)
        );
        assert_eq!(
            table.classify(Domain::Math, "3", 100.0),
            Classification::GradeNotSupported(Domain::Math)
        );
    }

    #[test]
    fn json_with_inverted_range_is_rejected() {
        let json = r#"{ "math": { "4": [ { "band": "Proficient", "low": 10, "high": 5 } ] } }"#;
        let err = CutScoreTable::from_json_str(json).unwrap_err();
        assert!(matches!(err, CutScoreError::InvertedRange { .. }));
    }

    #[test]
    fn load_reads_table_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cuts.json");
        std::fs::write(&path, r#"{ "math": { "5": [ { "band": "Highly Proficient" } ] } }"#)
            .expect("write");
        let table = CutScoreTable::load(&path).expect("load");
        assert_eq!(
            table.classify(Domain::Math, "05", -1.0),
            band(ProficiencyBand::HighlyProficient)
        );
    }
}
