//! Digest construction: the bounded text handed to the completion service.

use crate::config::SummaryMode;
use crate::models::{Report, TableRow, MAX_TABLE_ROWS};

/// Order reports for the digest and the table.
///
/// Plain mode keeps store order (newest first). Ranked mode puts the most
/// flagged reports first; the sort is stable so ties stay newest first.
pub fn rank_reports(reports: &[Report], mode: SummaryMode) -> Vec<&Report> {
    let mut ranked: Vec<&Report> = reports.iter().collect();
    if mode == SummaryMode::Ranked {
        ranked.sort_by(|a, b| b.flag_count.cmp(&a.flag_count));
    }
    ranked
}

/// `index. [category] description (status) location`, on one line.
pub fn digest_line(index: usize, report: &Report) -> String {
    let description = report.description.replace(['\r', '\n'], " ");
    format!(
        "{index}. [{}] {} ({}) {}",
        report.category_label(),
        description.trim(),
        report.status_label(),
        report.location_label(),
    )
}

/// One line per report, cut to `max_chars` characters.
pub fn build_digest(reports: &[&Report], max_chars: usize) -> String {
    let joined = reports
        .iter()
        .enumerate()
        .map(|(i, r)| digest_line(i + 1, r))
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&joined, max_chars)
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Table rows for the first `MAX_TABLE_ROWS` ranked reports.
pub fn build_table(reports: &[&Report]) -> Vec<TableRow> {
    reports
        .iter()
        .take(MAX_TABLE_ROWS)
        .enumerate()
        .map(|(i, r)| TableRow::from_report(i + 1, r))
        .collect()
}
