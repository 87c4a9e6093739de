use std::fmt::Write;

use indexmap::IndexMap;

use crate::analysis::Distribution;
use crate::models::{Demographic, Domain};
use crate::upload::AnalysisResponse;

fn write_distribution(output: &mut String, distribution: &Distribution, empty: &str) {
    if distribution.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }

    for (year, groups) in distribution {
        for (group, counts) in groups {
            let total: u64 = counts.values().sum();
            let breakdown: Vec<String> = counts
                .iter()
                .map(|(label, count)| format!("{label} {count}"))
                .collect();
            let _ = writeln!(
                output,
                "- {year} / {group}: {} ({total} total)",
                breakdown.join(", ")
            );
        }
    }
}

fn write_yearly(output: &mut String, values: &IndexMap<i32, f64>) {
    for (year, value) in values {
        let _ = writeln!(output, "- {year}: {value:.2}");
    }
}

fn pass_rates(
    response: &AnalysisResponse,
    domain: Domain,
) -> (&IndexMap<i32, f64>, &IndexMap<i32, u64>) {
    match domain {
        Domain::Ela => (
            &response.overall_ela_pass_rate_by_year,
            &response.ela_passing_student_count_by_year,
        ),
        Domain::Math => (
            &response.overall_math_pass_rate_by_year,
            &response.math_passing_student_count_by_year,
        ),
    }
}

pub fn build_report(response: &AnalysisResponse) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Assessment Report");
    let _ = writeln!(
        output,
        "Generated for {} (year {}) at {}",
        response.file_name,
        response.dataset_year,
        response.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(
        output,
        "{} students across {} unpivoted records.",
        response.total_students, response.total_unpivoted_records_processed
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Scale Score");
    write_yearly(&mut output, &response.average_overall_scale_score_by_year);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pass Rates");
    for domain in [Domain::Ela, Domain::Math] {
        let (rates, counts) = pass_rates(response, domain);
        for (year, rate) in rates {
            let passing = counts.get(year).copied().unwrap_or(0);
            let _ = writeln!(
                output,
                "- {} {year}: {rate:.2}% ({passing} passing)",
                domain.label()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## ELA Proficiency by Grade");
    write_distribution(
        &mut output,
        &response.rise_ela_proficiency_distribution_by_grade_by_year,
        "No students classified.",
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Math Proficiency by Grade");
    write_distribution(
        &mut output,
        &response.math_proficiency_distribution_by_grade_by_year,
        "No students classified.",
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Area Performance");
    write_distribution(
        &mut output,
        &response.subject_performance_level_distribution_by_year,
        "No subject-area performance columns in this file.",
    );

    let subject_averages =
        &response.average_overall_scale_score_of_students_in_subject_area_groups_by_year;
    for (year, subjects) in subject_averages {
        for (subject, average) in subjects {
            let _ = writeln!(
                output,
                "- {year} / {subject}: average scale score {average:.2}"
            );
        }
    }

    for demographic in Demographic::ALL {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Average Scale Score by {}", demographic.title());
        for (year, groups) in response.demographic_averages(demographic) {
            for (group, average) in groups {
                let _ = writeln!(output, "- {year} / {group}: {average:.2}");
            }
        }
    }

    output
}
