use indexmap::IndexMap;

use crate::models::{Demographic, Domain, Record};

/// year -> first dimension -> second dimension -> count
pub type Distribution = IndexMap<i32, IndexMap<String, IndexMap<String, u64>>>;
/// year -> group -> rounded average
pub type GroupAverages = IndexMap<i32, IndexMap<String, f64>>;

/// Every unpivoted record: one entry per (student, year, subject).
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    rows: &'a [Record],
}

impl<'a> RowView<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        Self { rows: records }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + 'a {
        let rows = self.rows;
        rows.iter()
    }
}

/// One representative record per (student, year); the first one seen wins.
#[derive(Debug, Clone)]
pub struct StudentView<'a> {
    students: Vec<&'a Record>,
}

impl<'a> StudentView<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        let mut unique: IndexMap<(&'a str, i32), &'a Record> = IndexMap::new();
        for record in records {
            unique
                .entry((record.student_id.as_str(), record.year))
                .or_insert(record);
        }
        Self {
            students: unique.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.students.iter().copied()
    }
}

/// Half-up rounding to two decimals: `floor(100x + 0.5) / 100`.
pub fn round_to_cents(value: f64) -> f64 {
    ((value * 100.0) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn rounded(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            round_to_cents(self.sum / self.count as f64)
        }
    }
}

fn count_nested<'r, I, F, S>(records: I, first: F, second: S) -> Distribution
where
    I: IntoIterator<Item = &'r Record>,
    F: Fn(&Record) -> Option<String>,
    S: Fn(&Record) -> Option<String>,
{
    let mut distribution = Distribution::new();
    for record in records {
        let (Some(outer), Some(inner)) = (first(record), second(record)) else {
            continue;
        };
        *distribution
            .entry(record.year)
            .or_default()
            .entry(outer)
            .or_default()
            .entry(inner)
            .or_insert(0) += 1;
    }
    distribution
}

/// Count of each subject performance level, per subject area and year.
pub fn subject_performance_distribution(rows: &RowView<'_>) -> Distribution {
    if rows.is_empty() {
        return Distribution::new();
    }
    count_nested(
        rows.iter(),
        |r| r.subject_area.map(|s| s.column().to_string()),
        |r| r.subject_performance_level.clone(),
    )
}

/// Count of students in each proficiency band, per grade and year.
pub fn proficiency_distribution_by_grade(
    students: &StudentView<'_>,
    domain: Domain,
) -> Distribution {
    count_nested(
        students.iter(),
        |r| Some(r.grade_level.clone()),
        |r| Some(r.proficiency(domain).label()),
    )
}

pub fn average_scale_score_by_year(students: &StudentView<'_>) -> IndexMap<i32, f64> {
    if students.is_empty() {
        return IndexMap::new();
    }
    let mut means: IndexMap<i32, Mean> = IndexMap::new();
    for record in students.iter() {
        means.entry(record.year).or_default().push(record.scale_score);
    }
    means
        .into_iter()
        .map(|(year, mean)| (year, mean.rounded()))
        .collect()
}

/// Per-student scale scores grouped by year and subject area. Each student
/// counts once per group even if the file repeats them.
fn subject_group_scores<'a, I>(rows: I) -> IndexMap<i32, IndexMap<String, IndexMap<&'a str, f64>>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut groups: IndexMap<i32, IndexMap<String, IndexMap<&'a str, f64>>> = IndexMap::new();
    for record in rows {
        let Some(subject) = record.subject_area else {
            continue;
        };
        groups
            .entry(record.year)
            .or_default()
            .entry(subject.column().to_string())
            .or_default()
            .entry(record.student_id.as_str())
            .or_insert(record.scale_score);
    }
    groups
}

fn average_groups(
    groups: IndexMap<i32, IndexMap<String, IndexMap<&str, f64>>>,
) -> GroupAverages {
    groups
        .into_iter()
        .map(|(year, subjects)| {
            let averages = subjects
                .into_iter()
                .map(|(subject, scores)| {
                    let mut mean = Mean::default();
                    scores.values().for_each(|score| mean.push(*score));
                    (subject, mean.rounded())
                })
                .collect();
            (year, averages)
        })
        .collect()
}

/// Average overall scale score of the students carrying each subject area.
pub fn average_scale_score_by_subject_area(rows: &RowView<'_>) -> GroupAverages {
    average_groups(subject_group_scores(rows.iter()))
}

/// special-ed flag ("true"/"false") -> year -> subject area -> average.
pub fn average_scale_score_by_special_ed_and_subject_area(
    rows: &RowView<'_>,
) -> IndexMap<String, GroupAverages> {
    let mut partitions: IndexMap<bool, Vec<&Record>> = IndexMap::new();
    for record in rows.iter().filter(|r| r.subject_area.is_some()) {
        partitions.entry(record.special_ed).or_default().push(record);
    }
    partitions
        .into_iter()
        .map(|(special_ed, records)| {
            (
                special_ed.to_string(),
                average_groups(subject_group_scores(records)),
            )
        })
        .collect()
}

/// Students whose band in `domain` passes, per year. Years with none report 0.
pub fn passing_count_by_year(students: &StudentView<'_>, domain: Domain) -> IndexMap<i32, u64> {
    let mut counts: IndexMap<i32, u64> = IndexMap::new();
    for record in students.iter() {
        let count = counts.entry(record.year).or_insert(0);
        if record.passing(domain) {
            *count += 1;
        }
    }
    counts
}

/// Percentage of assessed students who pass, per year. Students with a
/// not-applicable classification are left out of the denominator; a year
/// with nobody assessed reports 0.0.
pub fn pass_rate_by_year(students: &StudentView<'_>, domain: Domain) -> IndexMap<i32, f64> {
    let mut tallies: IndexMap<i32, (u64, u64)> = IndexMap::new();
    for record in students.iter() {
        let (assessed, passing) = tallies.entry(record.year).or_insert((0, 0));
        if record.proficiency(domain).is_assessed() {
            *assessed += 1;
            if record.passing(domain) {
                *passing += 1;
            }
        }
    }
    tallies
        .into_iter()
        .map(|(year, (assessed, passing))| {
            let rate = if assessed == 0 {
                0.0
            } else {
                round_to_cents(passing as f64 / assessed as f64 * 100.0)
            };
            (year, rate)
        })
        .collect()
}

pub fn average_scale_score_by_demographic(
    students: &StudentView<'_>,
    demographic: Demographic,
) -> GroupAverages {
    let mut means: IndexMap<i32, IndexMap<String, Mean>> = IndexMap::new();
    for record in students.iter() {
        means
            .entry(record.year)
            .or_default()
            .entry(demographic.value_of(record))
            .or_default()
            .push(record.scale_score);
    }
    means
        .into_iter()
        .map(|(year, groups)| {
            let averages = groups
                .into_iter()
                .map(|(group, mean)| (group, mean.rounded()))
                .collect();
            (year, averages)
        })
        .collect()
}
