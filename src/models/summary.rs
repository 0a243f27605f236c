use serde::{Deserialize, Serialize};

use super::report::Report;

/// Maximum rows carried into the report table.
pub const MAX_TABLE_ROWS: usize = 10;

/// One row of the "Recent Reports Overview" table. Fields are already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// 1-based position in the ranked report list.
    pub id: usize,
    pub category: String,
    pub status: String,
    pub location: String,
}

impl TableRow {
    pub fn from_report(sequence: usize, report: &Report) -> Self {
        Self {
            id: sequence,
            category: report.category_label().to_string(),
            status: report.status_label().to_string(),
            location: report.location_label().to_string(),
        }
    }
}

/// Output of one summarization pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub table_data: Vec<TableRow>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub public_abstract: Option<String>,
    /// True when the completion service failed and placeholder text was used.
    #[serde(default)]
    pub degraded: bool,
}

impl SummaryResult {
    pub fn empty(period_label: &str) -> Self {
        Self {
            summary: format!("No reports found in the {period_label}."),
            table_data: Vec::new(),
            public_abstract: None,
            degraded: false,
        }
    }
}
