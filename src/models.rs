use std::fmt;

use serde::Deserialize;

/// Assessment domain a cut-score table and a subject column belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Ela,
    Math,
}

impl Domain {
    pub fn label(self) -> &'static str {
        match self {
            Domain::Ela => "ELA",
            Domain::Math => "Math",
        }
    }
}

/// Proficiency bands, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum ProficiencyBand {
    #[serde(rename = "Below Proficient")]
    BelowProficient,
    #[serde(rename = "Approaching Proficient")]
    ApproachingProficient,
    #[serde(rename = "Proficient")]
    Proficient,
    #[serde(rename = "Highly Proficient")]
    HighlyProficient,
}

impl ProficiencyBand {
    pub fn label(self) -> &'static str {
        match self {
            ProficiencyBand::BelowProficient => "Below Proficient",
            ProficiencyBand::ApproachingProficient => "Approaching Proficient",
            ProficiencyBand::Proficient => "Proficient",
            ProficiencyBand::HighlyProficient => "Highly Proficient",
        }
    }

    pub fn is_passing(self) -> bool {
        is_passing_label(self.label())
    }
}

/// A band name passes iff it is "Proficient" or "Highly Proficient", ignoring case.
pub fn is_passing_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("Proficient") || label.eq_ignore_ascii_case("Highly Proficient")
}

/// Result of a cut-score lookup. The two sentinel variants are data,
/// not failures: they mark students outside the assessed population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Band(ProficiencyBand),
    GradeNotSupported(Domain),
    ScoreOutOfRange(Domain),
}

impl Classification {
    pub fn is_assessed(self) -> bool {
        matches!(self, Classification::Band(_))
    }

    pub fn is_passing(self) -> bool {
        match self {
            Classification::Band(band) => band.is_passing(),
            _ => false,
        }
    }

    pub fn label(self) -> String {
        match self {
            Classification::Band(band) => band.label().to_string(),
            Classification::GradeNotSupported(Domain::Ela) => {
                "N/A (Grade not in ELA 3-8)".to_string()
            }
            Classification::GradeNotSupported(Domain::Math) => {
                "N/A (Math Grade not in 3-8)".to_string()
            }
            Classification::ScoreOutOfRange(domain) => {
                format!("N/A (Score out of {} range)", domain.label())
            }
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Subject-area performance columns, in canonical unpivot order:
/// ELA columns first, then Math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectArea {
    Language,
    ListeningComprehension,
    ReadingInformationalText,
    ReadingLiterature,
    ExpressionsAndEquations,
    Functions,
    GeometryNumberSystem,
    StatisticsAndProbability,
}

impl SubjectArea {
    pub const ALL: [SubjectArea; 8] = [
        SubjectArea::Language,
        SubjectArea::ListeningComprehension,
        SubjectArea::ReadingInformationalText,
        SubjectArea::ReadingLiterature,
        SubjectArea::ExpressionsAndEquations,
        SubjectArea::Functions,
        SubjectArea::GeometryNumberSystem,
        SubjectArea::StatisticsAndProbability,
    ];

    /// Exact header text of the column.
    pub fn column(self) -> &'static str {
        match self {
            SubjectArea::Language => "Language Performance",
            SubjectArea::ListeningComprehension => "Listening Comprehension Performance",
            SubjectArea::ReadingInformationalText => "Reading Informational Text Performance",
            SubjectArea::ReadingLiterature => "Reading Literature Performance",
            SubjectArea::ExpressionsAndEquations => "Expressions and Equations Performance",
            SubjectArea::Functions => "Functions Performance",
            SubjectArea::GeometryNumberSystem => "Geometry / The Number System Performance",
            SubjectArea::StatisticsAndProbability => "Statistics and Probability Performance",
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            SubjectArea::Language
            | SubjectArea::ListeningComprehension
            | SubjectArea::ReadingInformationalText
            | SubjectArea::ReadingLiterature => Domain::Ela,
            _ => Domain::Math,
        }
    }
}

/// One unpivoted (student, subject-area) row of an assessment file.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub student_id: String,
    pub student_name: String,
    pub year: i32,
    pub grade_level: String,
    pub ethnicity: String,
    pub gender: String,
    pub special_ed: bool,
    pub ell: bool,
    pub scale_score: f64,
    pub overall_performance: String,
    pub ela_proficiency: Classification,
    pub math_proficiency: Classification,
    pub ela_passing: bool,
    pub math_passing: bool,
    pub subject_area: Option<SubjectArea>,
    pub subject_performance_level: Option<String>,
}

impl Record {
    pub fn proficiency(&self, domain: Domain) -> Classification {
        match domain {
            Domain::Ela => self.ela_proficiency,
            Domain::Math => self.math_proficiency,
        }
    }

    pub fn passing(&self, domain: Domain) -> bool {
        match domain {
            Domain::Ela => self.ela_passing,
            Domain::Math => self.math_passing,
        }
    }
}

/// Student attributes an average can be broken down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demographic {
    Ethnicity,
    Gender,
    GradeLevel,
    OverallPerformance,
    ElaProficiency,
    MathProficiency,
    Ell,
    SpecialEd,
}

type Accessor = fn(&Record) -> Option<String>;

const DEMOGRAPHIC_ACCESSORS: [(Demographic, Accessor); 8] = [
    (Demographic::Ethnicity, ethnicity_of),
    (Demographic::Gender, gender_of),
    (Demographic::GradeLevel, grade_level_of),
    (Demographic::OverallPerformance, overall_performance_of),
    (Demographic::ElaProficiency, ela_proficiency_of),
    (Demographic::MathProficiency, math_proficiency_of),
    (Demographic::Ell, ell_of),
    (Demographic::SpecialEd, special_ed_of),
];

fn ethnicity_of(record: &Record) -> Option<String> {
    non_blank(&record.ethnicity)
}

fn gender_of(record: &Record) -> Option<String> {
    non_blank(&record.gender)
}

fn grade_level_of(record: &Record) -> Option<String> {
    non_blank(&record.grade_level)
}

fn overall_performance_of(record: &Record) -> Option<String> {
    non_blank(&record.overall_performance)
}

fn ela_proficiency_of(record: &Record) -> Option<String> {
    Some(record.ela_proficiency.label())
}

fn math_proficiency_of(record: &Record) -> Option<String> {
    Some(record.math_proficiency.label())
}

fn ell_of(record: &Record) -> Option<String> {
    Some(yes_no(record.ell).to_string())
}

fn special_ed_of(record: &Record) -> Option<String> {
    Some(yes_no(record.special_ed).to_string())
}

impl Demographic {
    pub const ALL: [Demographic; 8] = [
        Demographic::Ethnicity,
        Demographic::Gender,
        Demographic::GradeLevel,
        Demographic::OverallPerformance,
        Demographic::ElaProficiency,
        Demographic::MathProficiency,
        Demographic::Ell,
        Demographic::SpecialEd,
    ];

    fn accessor(self) -> Accessor {
        DEMOGRAPHIC_ACCESSORS[self as usize].1
    }

    /// Group label of a record for this dimension; missing values become "Unknown".
    pub fn value_of(self, record: &Record) -> String {
        (self.accessor())(record).unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn title(self) -> &'static str {
        match self {
            Demographic::Ethnicity => "Ethnicity",
            Demographic::Gender => "Gender",
            Demographic::GradeLevel => "Grade Level",
            Demographic::OverallPerformance => "Overall Performance",
            Demographic::ElaProficiency => "ELA Proficiency",
            Demographic::MathProficiency => "Math Proficiency",
            Demographic::Ell => "ELL",
            Demographic::SpecialEd => "Special Ed",
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
