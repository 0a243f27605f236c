use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category shown when a report was submitted without one.
pub const DEFAULT_CATEGORY: &str = "General Issue";
/// Status shown when a report has never been triaged.
pub const DEFAULT_STATUS: &str = "Pending";
/// Location shown when a report carries no address.
pub const MISSING_LOCATION: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One citizen-submitted civic-issue record, read-only to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub description: String,
    pub category: Option<String>,
    pub status: Option<String>,
    pub location: Option<Location>,
    pub flag_count: u32,
    /// Submitter identity -> current flag state.
    pub flags: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub image_url: Option<String>,
}

impl Report {
    /// Minimal report, used by sources that only know id, text and time.
    pub fn new(id: impl Into<String>, description: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category: None,
            status: None,
            location: None,
            flag_count: 0,
            flags: BTreeMap::new(),
            created_at,
            user_id: None,
            image_url: None,
        }
    }

    pub fn category_label(&self) -> &str {
        non_blank(self.category.as_deref()).unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn status_label(&self) -> &str {
        non_blank(self.status.as_deref()).unwrap_or(DEFAULT_STATUS)
    }

    pub fn location_label(&self) -> &str {
        let address = self.location.as_ref().and_then(|l| l.address.as_deref());
        non_blank(address).unwrap_or(MISSING_LOCATION)
    }

    /// Identities whose flag is currently raised.
    pub fn active_flaggers(&self) -> usize {
        self.flags.values().filter(|&&flagged| flagged).count()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
