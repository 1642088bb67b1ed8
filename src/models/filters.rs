use chrono::NaiveDate;
use serde::Deserialize;

/// Document search criteria. Every `None` imposes no constraint.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DocumentFilter {
    pub query: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppointmentFilter {
    pub query: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
