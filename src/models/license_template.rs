use serde::{Deserialize, Serialize};

/// Seller override for one license type. `None` caps mean unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseTemplate {
    pub id: String,
    pub seller_id: String,
    /// Canonical license kind (`basic`, `premium`, ...).
    pub license_type: String,
    pub max_streams: Option<i64>,
    pub max_copies: Option<i64>,
    pub max_videos: Option<i64>,
    pub max_radio_stations: Option<i64>,
    pub custom_text: Option<String>,
    pub include_standard_clauses: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLicenseTemplate {
    pub license_type: String,
    pub max_streams: Option<i64>,
    pub max_copies: Option<i64>,
    pub max_videos: Option<i64>,
    pub max_radio_stations: Option<i64>,
    pub custom_text: Option<String>,
    pub include_standard_clauses: bool,
}
