use crate::error::ReportError;
use crate::types::Color;
use chrono::{DateTime, NaiveDate};
use pagewright_catalog::{MetricValue, RankedEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_AGENCY_NAME: &str = "Your Agency";
pub const DEFAULT_BRAND_COLOR: &str = "#2563EB";
pub const INVALID_DATE: &str = "Invalid Date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Executive,
    Standard,
    Custom,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Executive => "executive",
            ReportType::Standard => "standard",
            ReportType::Custom => "custom",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportType::Executive => "Executive Summary Report",
            ReportType::Standard => "Performance Report",
            ReportType::Custom => "Custom Analytics Report",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start_label(&self) -> String {
        format_date(&self.start)
    }

    pub fn end_label(&self) -> String {
        format_date(&self.end)
    }

    pub fn label(&self) -> String {
        format!("{} - {}", self.start_label(), self.end_label())
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.date_naive());
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

pub fn format_date(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) => date.format("%B %-d, %Y").to_string(),
        None => INVALID_DATE.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branding {
    pub agency_name: Option<String>,
    pub logo_ref: Option<String>,
    pub primary_color: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Branding {
    pub fn agency_name(&self) -> &str {
        non_blank(&self.agency_name).unwrap_or(DEFAULT_AGENCY_NAME)
    }

    pub fn primary_color(&self) -> Color {
        non_blank(&self.primary_color)
            .and_then(Color::from_hex)
            .or_else(|| Color::from_hex(DEFAULT_BRAND_COLOR))
            .unwrap_or(Color::BLACK)
    }

    pub fn logo_ref(&self) -> Option<&str> {
        non_blank(&self.logo_ref)
    }

    /// Website, email and phone joined with separators; empty entries are skipped.
    pub fn contact_line(&self) -> String {
        [&self.website, &self.email, &self.phone]
            .into_iter()
            .filter_map(non_blank)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Insight,
    Recommendation,
    MetricOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub title: String,
    pub content: String,
    pub kind: FieldKind,
}

impl CustomField {
    pub fn new(kind: FieldKind, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryStat {
    pub query: String,
    pub clicks: f64,
    pub impressions: f64,
}

/// Core site-analytics snapshot. Every report requires one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrimaryMetrics {
    pub users: Option<f64>,
    pub sessions: Option<f64>,
    pub bounce_rate: Option<f64>,
    pub conversions: Option<f64>,
    pub page_views: Option<f64>,
    pub new_users: Option<f64>,
    pub avg_session_duration: Option<f64>,
    pub top_queries: Vec<QueryStat>,
}

impl PrimaryMetrics {
    /// Present fields keyed by catalog id.
    pub fn entries(&self) -> Vec<(&'static str, MetricValue)> {
        let numbers = [
            ("users", self.users),
            ("sessions", self.sessions),
            ("bounceRate", self.bounce_rate),
            ("conversions", self.conversions),
            ("pageViews", self.page_views),
            ("newUsers", self.new_users),
            ("avgSessionDuration", self.avg_session_duration),
        ];
        let mut out: Vec<(&'static str, MetricValue)> = numbers
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, MetricValue::Number(v))))
            .collect();
        if !self.top_queries.is_empty() {
            let mut ranked: Vec<RankedEntry> = self
                .top_queries
                .iter()
                .filter(|q| !q.query.trim().is_empty())
                .map(|q| RankedEntry::new(q.query.trim(), q.clicks))
                .collect();
            ranked.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
            out.push(("topQueries", MetricValue::Ranked(ranked)));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub client_name: String,
    pub date_range: DateRange,
    pub report_type: ReportType,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default)]
    pub selected_metric_keys: Vec<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub primary_metrics: Option<PrimaryMetrics>,
    /// Legacy metric object; values are converted leniently during normalization.
    #[serde(default)]
    pub extended_metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub generated_on: Option<String>,
}

impl ReportRequest {
    pub fn new(
        client_name: impl Into<String>,
        date_range: DateRange,
        report_type: ReportType,
        primary_metrics: PrimaryMetrics,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            date_range,
            report_type,
            branding: Branding::default(),
            selected_metric_keys: Vec::new(),
            custom_fields: Vec::new(),
            primary_metrics: Some(primary_metrics),
            extended_metrics: BTreeMap::new(),
            generated_on: None,
        }
    }

    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = branding;
        self
    }

    pub fn with_selected_metrics<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_metric_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_custom_field(mut self, field: CustomField) -> Self {
        self.custom_fields.push(field);
        self
    }

    pub fn with_extended_metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extended_metrics.insert(key.into(), value);
        self
    }

    pub fn with_generated_on(mut self, date: impl Into<String>) -> Self {
        self.generated_on = Some(date.into());
        self
    }

    /// Parses a camelCase JSON request, rejecting it when the primary source is missing
    /// or not an object.
    pub fn from_json(raw: &str) -> Result<Self, ReportError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| ReportError::InvalidShape(format!("request is not valid JSON: {err}")))?;
        let Some(object) = value.as_object() else {
            return Err(ReportError::InvalidShape(
                "request must be a JSON object".to_string(),
            ));
        };
        match object.get("primaryMetrics") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(ReportError::InvalidShape(
                    "primaryMetrics must be an object".to_string(),
                ));
            }
            None => {
                return Err(ReportError::InvalidShape(
                    "primaryMetrics is required".to_string(),
                ));
            }
        }
        serde_json::from_value(value).map_err(|err| ReportError::InvalidShape(err.to_string()))
    }

    pub fn validate(&self, max_metrics: usize) -> Result<(), ReportError> {
        if self.primary_metrics.is_none() {
            return Err(ReportError::InvalidShape(
                "primary metric source is required".to_string(),
            ));
        }
        if self.selected_metric_keys.len() > max_metrics {
            return Err(ReportError::TooManyMetrics {
                count: self.selected_metric_keys.len(),
                max: max_metrics,
            });
        }
        Ok(())
    }

    /// Date printed in the footer stamp; falls back to the end of the reporting window.
    pub fn generated_label(&self) -> String {
        match self.generated_on.as_deref() {
            Some(raw) => format_date(raw),
            None => self.date_range.end_label(),
        }
    }

    pub fn fields_of(&self, kind: FieldKind) -> impl Iterator<Item = &CustomField> {
        self.custom_fields.iter().filter(move |field| field.kind == kind)
    }
}
