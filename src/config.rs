/// Settings fixed for the lifetime of a timeline session.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Statuses per REFRESH / APPEND page.
    pub page_size: usize,
    /// Statuses per gap-fill request.
    pub gap_fill_limit: usize,
    pub always_show_sensitive_media: bool,
    pub always_open_spoilers: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            page_size: 30,
            gap_fill_limit: 20,
            always_show_sensitive_media: false,
            always_open_spoilers: false,
        }
    }
}
