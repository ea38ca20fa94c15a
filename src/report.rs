use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::batch::BatchSummary;
use crate::models::ProgressionSummaryRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub label: String,
    pub count: usize,
}

fn count_by<F>(rows: &[ProgressionSummaryRow], key: F) -> Vec<StatusCount>
where
    F: Fn(&ProgressionSummaryRow) -> &str,
{
    let mut map: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *map.entry(key(row)).or_insert(0) += 1;
    }

    let mut counts: Vec<StatusCount> = map
        .into_iter()
        .map(|(label, count)| StatusCount {
            label: label.to_string(),
            count,
        })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    counts
}

pub fn summarize_by_status(rows: &[ProgressionSummaryRow]) -> Vec<StatusCount> {
    count_by(rows, |row| row.current_status.as_str())
}

pub fn summarize_by_entry(rows: &[ProgressionSummaryRow]) -> Vec<StatusCount> {
    count_by(rows, |row| row.entry_program_type.as_str())
}

fn display_name(row: &ProgressionSummaryRow) -> String {
    row.full_name
        .clone()
        .unwrap_or_else(|| row.student_id.to_string())
}

pub fn build_report(generated_on: NaiveDate, rows: &[ProgressionSummaryRow]) -> String {
    let statuses = summarize_by_status(rows);
    let entries = summarize_by_entry(rows);

    let mut output = String::new();

    let _ = writeln!(output, "# Academic Progression Report");
    let _ = writeln!(
        output,
        "Generated on {} for {} students",
        generated_on,
        rows.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Status Mix");

    if statuses.is_empty() {
        let _ = writeln!(output, "No progressions have been built yet.");
    } else {
        for status in statuses.iter() {
            let _ = writeln!(output, "- {}: {} students", status.label, status.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Entry Programs");

    if entries.is_empty() {
        let _ = writeln!(output, "No progressions have been built yet.");
    } else {
        for entry in entries.iter() {
            let _ = writeln!(output, "- {}: {} students", entry.label, entry.count);
        }
    }

    let mut review: Vec<&ProgressionSummaryRow> = rows
        .iter()
        .filter(|row| row.journeys_requiring_review > 0)
        .collect();
    review.sort_by(|a, b| {
        b.journeys_requiring_review
            .cmp(&a.journeys_requiring_review)
            .then_with(|| display_name(a).cmp(&display_name(b)))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Manual Review Queue");

    if review.is_empty() {
        let _ = writeln!(output, "No journeys need review.");
    } else {
        for row in review.iter().take(25) {
            let _ = writeln!(
                output,
                "- {} ({}) {} journeys flagged over {} terms, major {}",
                display_name(row),
                row.current_status,
                row.journeys_requiring_review,
                row.total_terms,
                row.ba_major.as_deref().unwrap_or("undetermined")
            );
        }
    }

    output
}

pub fn format_batch_summary(summary: &BatchSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Rebuilt {} students ({} without enrollments, {} failed, {} skipped).",
        summary.built,
        summary.insufficient_data.len(),
        summary.failed.len(),
        summary.skipped
    );
    for (student_id, reason) in summary.failed.iter().take(10) {
        let _ = writeln!(output, "- {student_id}: {reason}");
    }
    if summary.failed.len() > 10 {
        let _ = writeln!(output, "- ... {} more", summary.failed.len() - 10);
    }

    output
}
