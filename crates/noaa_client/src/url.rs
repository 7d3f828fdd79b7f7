//! Source URL templates.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// A URL pattern with `{base}`, `{date}` (YYYYMMDD), `{year}`, `{month}`,
/// `{day}`, `{cycle}` (HH), `{fh2}` and `{fh3}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    base: String,
    template: String,
}

impl UrlTemplate {
    pub fn new(base: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            template: template.into(),
        }
    }

    pub fn render(&self, cycle_time: DateTime<Utc>, forecast_hour: u32) -> String {
        self.template
            .replace("{base}", &self.base)
            .replace("{date}", &cycle_time.format("%Y%m%d").to_string())
            .replace("{year}", &format!("{:04}", cycle_time.year()))
            .replace("{month}", &format!("{:02}", cycle_time.month()))
            .replace("{day}", &format!("{:02}", cycle_time.day()))
            .replace("{cycle}", &format!("{:02}", cycle_time.hour()))
            .replace("{fh2}", &format!("{:02}", forecast_hour))
            .replace("{fh3}", &format!("{:03}", forecast_hour))
    }
}
