use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const CATALOG_ID: &str = "pagewright.metric_catalog";
pub const CATALOG_VERSION: &str = "1";

/// Upper bound on metrics a caller may select for a custom report.
pub const MAX_METRICS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub label: String,
    pub value: f64,
}

impl RankedEntry {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Ranked(Vec<RankedEntry>),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    // Non-finite numbers, blank text and empty rankings count as "no data".
    pub fn is_present(&self) -> bool {
        match self {
            MetricValue::Number(value) => value.is_finite(),
            MetricValue::Text(text) => !text.trim().is_empty(),
            MetricValue::Ranked(entries) => !entries.is_empty(),
        }
    }
}

/// Flat key -> value view over every metric source of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricLookup {
    values: BTreeMap<String, MetricValue>,
}

impl MetricLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any earlier value. Absent values are ignored
    /// so a lower-precedence source is never shadowed by an empty one.
    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        if value.is_present() {
            self.values.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetricValue::as_number)
    }

    pub fn number_or_default(&self, key: &str) -> f64 {
        self.number(key).unwrap_or(0.0)
    }

    pub fn ranked(&self, key: &str) -> Option<&[RankedEntry]> {
        match self.get(key)? {
            MetricValue::Ranked(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricCategory {
    Audience,
    Behavior,
    Conversion,
    TrafficSource,
    Device,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Audience => "audience",
            MetricCategory::Behavior => "behavior",
            MetricCategory::Conversion => "conversion",
            MetricCategory::TrafficSource => "traffic_source",
            MetricCategory::Device => "device",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Count,
    Percent,
    Duration,
    Currency,
    Decimal,
    Ranked,
}

impl ValueFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueFormat::Count => "count",
            ValueFormat::Percent => "percent",
            ValueFormat::Duration => "duration",
            ValueFormat::Currency => "currency",
            ValueFormat::Decimal => "decimal",
            ValueFormat::Ranked => "ranked",
        }
    }

    pub fn apply(&self, value: &MetricValue) -> String {
        match value {
            MetricValue::Text(text) => text.trim().to_string(),
            MetricValue::Ranked(entries) => format_ranked(entries),
            MetricValue::Number(number) => match self {
                ValueFormat::Count | ValueFormat::Ranked => format_count(*number),
                ValueFormat::Percent => format_percent(*number),
                ValueFormat::Duration => format_duration(*number),
                ValueFormat::Currency => format_currency(*number),
                ValueFormat::Decimal => format!("{:.2}", number),
            },
        }
    }
}

pub type DeriveFn = fn(&MetricLookup) -> Option<MetricValue>;

#[derive(Debug, Clone, Copy)]
pub enum Extractor {
    /// Read the field named after the metric id.
    Field,
    /// Read the field, falling back to a value derived from other fields.
    FieldOr(DeriveFn),
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub category: MetricCategory,
    pub description: &'static str,
    pub extractor: Extractor,
    pub format: ValueFormat,
}

impl MetricDefinition {
    pub fn extract(&self, lookup: &MetricLookup) -> Option<MetricValue> {
        let direct = lookup.get(self.id).filter(|value| value.is_present()).cloned();
        match self.extractor {
            Extractor::Field => direct,
            Extractor::FieldOr(derive) => direct.or_else(|| derive(lookup)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetric {
    pub id: String,
    pub title: String,
    pub formatted_value: String,
    pub description: String,
    pub has_data: bool,
}

const fn field(
    id: &'static str,
    title: &'static str,
    category: MetricCategory,
    format: ValueFormat,
    description: &'static str,
) -> MetricDefinition {
    MetricDefinition {
        id,
        title,
        category,
        description,
        extractor: Extractor::Field,
        format,
    }
}

const fn derived(
    id: &'static str,
    title: &'static str,
    category: MetricCategory,
    format: ValueFormat,
    description: &'static str,
    derive: DeriveFn,
) -> MetricDefinition {
    MetricDefinition {
        id,
        title,
        category,
        description,
        extractor: Extractor::FieldOr(derive),
        format,
    }
}

fn derive_returning_users(lookup: &MetricLookup) -> Option<MetricValue> {
    let users = lookup.number("users")?;
    let new_users = lookup.number("newUsers")?;
    if new_users > users {
        return None;
    }
    Some(MetricValue::Number(users - new_users))
}

fn derive_pages_per_session(lookup: &MetricLookup) -> Option<MetricValue> {
    let page_views = lookup.number("pageViews")?;
    let sessions = lookup.number("sessions").filter(|v| *v > 0.0)?;
    Some(MetricValue::Number(page_views / sessions))
}

fn derive_engagement_rate(lookup: &MetricLookup) -> Option<MetricValue> {
    let bounce = lookup.number("bounceRate")?;
    Some(MetricValue::Number((100.0 - bounce).clamp(0.0, 100.0)))
}

fn derive_conversion_rate(lookup: &MetricLookup) -> Option<MetricValue> {
    let conversions = lookup.number("conversions")?;
    let sessions = lookup.number("sessions").filter(|v| *v > 0.0)?;
    Some(MetricValue::Number(conversions / sessions * 100.0))
}

use MetricCategory::{Audience, Behavior, Conversion, Device, TrafficSource};

pub static METRIC_CATALOG: [MetricDefinition; 24] = [
    field(
        "users",
        "Total Users",
        Audience,
        ValueFormat::Count,
        "Unique visitors during the reporting period",
    ),
    field(
        "newUsers",
        "New Users",
        Audience,
        ValueFormat::Count,
        "First-time visitors to the site",
    ),
    derived(
        "returningUsers",
        "Returning Users",
        Audience,
        ValueFormat::Count,
        "Visitors who came back after an earlier visit",
        derive_returning_users,
    ),
    field(
        "sessions",
        "Sessions",
        Audience,
        ValueFormat::Count,
        "Total visits started on the site",
    ),
    field(
        "pageViews",
        "Page Views",
        Behavior,
        ValueFormat::Count,
        "Total pages viewed across all sessions",
    ),
    derived(
        "pagesPerSession",
        "Pages per Session",
        Behavior,
        ValueFormat::Decimal,
        "Average pages viewed in a single session",
        derive_pages_per_session,
    ),
    field(
        "avgSessionDuration",
        "Avg. Session Duration",
        Behavior,
        ValueFormat::Duration,
        "Average time visitors spend per session",
    ),
    field(
        "bounceRate",
        "Bounce Rate",
        Behavior,
        ValueFormat::Percent,
        "Share of sessions that left after one page",
    ),
    derived(
        "engagementRate",
        "Engagement Rate",
        Behavior,
        ValueFormat::Percent,
        "Share of sessions with meaningful interaction",
        derive_engagement_rate,
    ),
    field(
        "topPages",
        "Top Page",
        Behavior,
        ValueFormat::Ranked,
        "Most visited page by views",
    ),
    field(
        "conversions",
        "Conversions",
        Conversion,
        ValueFormat::Count,
        "Completed conversion events",
    ),
    derived(
        "conversionRate",
        "Conversion Rate",
        Conversion,
        ValueFormat::Percent,
        "Conversions as a share of sessions",
        derive_conversion_rate,
    ),
    field(
        "goalCompletions",
        "Goal Completions",
        Conversion,
        ValueFormat::Count,
        "Configured goals reached by visitors",
    ),
    field(
        "revenue",
        "Revenue",
        Conversion,
        ValueFormat::Currency,
        "Revenue attributed to the site",
    ),
    field(
        "transactions",
        "Transactions",
        Conversion,
        ValueFormat::Count,
        "Completed purchases",
    ),
    field(
        "organicTraffic",
        "Organic Traffic",
        TrafficSource,
        ValueFormat::Count,
        "Sessions arriving from unpaid search",
    ),
    field(
        "directTraffic",
        "Direct Traffic",
        TrafficSource,
        ValueFormat::Count,
        "Sessions with no referring source",
    ),
    field(
        "referralTraffic",
        "Referral Traffic",
        TrafficSource,
        ValueFormat::Count,
        "Sessions arriving from links on other sites",
    ),
    field(
        "socialTraffic",
        "Social Traffic",
        TrafficSource,
        ValueFormat::Count,
        "Sessions arriving from social networks",
    ),
    field(
        "paidTraffic",
        "Paid Traffic",
        TrafficSource,
        ValueFormat::Count,
        "Sessions arriving from paid campaigns",
    ),
    field(
        "topQueries",
        "Top Search Query",
        TrafficSource,
        ValueFormat::Ranked,
        "Search query driving the most clicks",
    ),
    field(
        "desktopUsers",
        "Desktop Users",
        Device,
        ValueFormat::Count,
        "Visitors on desktop computers",
    ),
    field(
        "mobileUsers",
        "Mobile Users",
        Device,
        ValueFormat::Count,
        "Visitors on phones",
    ),
    field(
        "tabletUsers",
        "Tablet Users",
        Device,
        ValueFormat::Count,
        "Visitors on tablets",
    ),
];

pub fn definition(metric_id: &str) -> Option<&'static MetricDefinition> {
    METRIC_CATALOG.iter().find(|def| def.id == metric_id)
}

/// Matches a catalog entry by id or display title, ignoring ASCII case.
pub fn definition_by_id_or_title(raw: &str) -> Option<&'static MetricDefinition> {
    let needle = raw.trim();
    if needle.is_empty() {
        return None;
    }
    METRIC_CATALOG.iter().find(|def| {
        def.id.eq_ignore_ascii_case(needle) || def.title.eq_ignore_ascii_case(needle)
    })
}

pub fn resolve(metric_id: &str, lookup: &MetricLookup) -> Option<ResolvedMetric> {
    let def = definition(metric_id)?;
    let value = def.extract(lookup)?;
    Some(ResolvedMetric {
        id: def.id.to_string(),
        title: def.title.to_string(),
        formatted_value: def.format.apply(&value),
        description: def.description.to_string(),
        has_data: true,
    })
}

pub fn resolve_all<'a, I>(metric_ids: I, lookup: &MetricLookup) -> Vec<ResolvedMetric>
where
    I: IntoIterator<Item = &'a str>,
{
    metric_ids
        .into_iter()
        .filter_map(|id| resolve(id, lookup))
        .collect()
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (len - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_count(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{}", group_thousands(rounded.abs() as u64))
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${}.{:02}", group_thousands(cents / 100), cents % 100)
}

fn format_ranked(entries: &[RankedEntry]) -> String {
    match entries.first() {
        Some(top) => format!("{} ({})", top.label.trim(), format_count(top.value)),
        None => String::new(),
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static CATALOG_FINGERPRINT: OnceLock<String> = OnceLock::new();

pub fn catalog_fingerprint_sha256() -> String {
    CATALOG_FINGERPRINT
        .get_or_init(|| {
            let mut text = format!("{CATALOG_ID}\n{CATALOG_VERSION}\n");
            for def in &METRIC_CATALOG {
                text.push_str(def.id);
                text.push('\t');
                text.push_str(def.title);
                text.push('\t');
                text.push_str(def.category.as_str());
                text.push('\t');
                text.push_str(def.format.as_str());
                text.push('\n');
            }
            hex_sha256(text.as_bytes())
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn lookup_with(pairs: &[(&str, f64)]) -> MetricLookup {
        let mut lookup = MetricLookup::new();
        for (key, value) in pairs {
            lookup.insert(*key, MetricValue::Number(*value));
        }
        lookup
    }

    #[test]
    fn catalog_ids_are_unique() {
        let ids: BTreeSet<&str> = METRIC_CATALOG.iter().map(|def| def.id).collect();
        assert_eq!(ids.len(), METRIC_CATALOG.len());
        assert_eq!(METRIC_CATALOG.len(), 24);
    }

    #[test]
    fn every_category_is_represented() {
        for category in [Audience, Behavior, Conversion, TrafficSource, Device] {
            assert!(METRIC_CATALOG.iter().any(|def| def.category == category));
        }
    }

    #[test]
    fn resolve_formats_present_values() {
        let lookup = lookup_with(&[("users", 500.0), ("bounceRate", 45.2), ("conversions", 10.0)]);
        assert_eq!(resolve("users", &lookup).unwrap().formatted_value, "500");
        assert_eq!(resolve("bounceRate", &lookup).unwrap().formatted_value, "45.20%");
        assert_eq!(resolve("conversions", &lookup).unwrap().formatted_value, "10");
        assert!(resolve("users", &lookup).unwrap().has_data);
    }

    #[test]
    fn resolve_returns_none_for_missing_data_and_unknown_keys() {
        let lookup = lookup_with(&[("users", 500.0)]);
        assert!(resolve("sessions", &lookup).is_none());
        assert!(resolve("unknownKey", &lookup).is_none());
        let resolved = resolve_all(["users", "unknownKey"], &lookup);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn non_finite_numbers_are_absent() {
        let lookup = lookup_with(&[("users", f64::NAN)]);
        assert!(lookup.is_empty());
        assert!(resolve("users", &lookup).is_none());
    }

    #[test]
    fn derived_metrics_fill_gaps() {
        let lookup = lookup_with(&[
            ("users", 1200.0),
            ("newUsers", 900.0),
            ("sessions", 400.0),
            ("pageViews", 1000.0),
            ("conversions", 10.0),
            ("bounceRate", 35.0),
        ]);
        assert_eq!(resolve("returningUsers", &lookup).unwrap().formatted_value, "300");
        assert_eq!(resolve("pagesPerSession", &lookup).unwrap().formatted_value, "2.50");
        assert_eq!(resolve("conversionRate", &lookup).unwrap().formatted_value, "2.50%");
        assert_eq!(resolve("engagementRate", &lookup).unwrap().formatted_value, "65.00%");
    }

    #[test]
    fn explicit_values_win_over_derivation() {
        let lookup = lookup_with(&[("conversions", 10.0), ("sessions", 100.0), ("conversionRate", 4.0)]);
        assert_eq!(resolve("conversionRate", &lookup).unwrap().formatted_value, "4.00%");
    }

    #[test]
    fn derivation_skips_zero_divisors() {
        let lookup = lookup_with(&[("conversions", 10.0), ("sessions", 0.0)]);
        assert!(resolve("conversionRate", &lookup).is_none());
    }

    #[test]
    fn number_formatters() {
        assert_eq!(format_count(1234567.0), "1,234,567");
        assert_eq!(format_count(999.4), "999");
        assert_eq!(format_count(-1500.0), "-1,500");
        assert_eq!(format_percent(3.0), "3.00%");
        assert_eq!(format_duration(125.0), "2m 05s");
        assert_eq!(format_duration(42.0), "42s");
        assert_eq!(format_duration(3725.0), "1h 02m 05s");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(-2.0), "-$2.00");
    }

    #[test]
    fn ranked_values_show_top_entry() {
        let mut lookup = MetricLookup::new();
        lookup.insert(
            "topQueries",
            MetricValue::Ranked(vec![
                RankedEntry::new("seo tools", 1200.0),
                RankedEntry::new("rank tracker", 80.0),
            ]),
        );
        assert_eq!(
            resolve("topQueries", &lookup).unwrap().formatted_value,
            "seo tools (1,200)"
        );
        lookup.insert("topPages", MetricValue::Ranked(Vec::new()));
        assert!(resolve("topPages", &lookup).is_none());
    }

    #[test]
    fn text_values_pass_through() {
        let mut lookup = MetricLookup::new();
        lookup.insert("revenue", MetricValue::Text(" pending audit ".to_string()));
        assert_eq!(resolve("revenue", &lookup).unwrap().formatted_value, "pending audit");
    }

    #[test]
    fn id_or_title_matching_ignores_case() {
        assert_eq!(definition_by_id_or_title("BOUNCERATE").map(|d| d.id), Some("bounceRate"));
        assert_eq!(definition_by_id_or_title("total users").map(|d| d.id), Some("users"));
        assert!(definition_by_id_or_title("  ").is_none());
    }

    #[test]
    fn metric_values_deserialize_untagged() {
        let value: MetricValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(value, MetricValue::Number(12.5));
        let value: MetricValue = serde_json::from_str("\"n/a\"").unwrap();
        assert_eq!(value, MetricValue::Text("n/a".to_string()));
        let value: MetricValue =
            serde_json::from_str(r#"[{"label":"/pricing","value":42}]"#).unwrap();
        assert_eq!(value, MetricValue::Ranked(vec![RankedEntry::new("/pricing", 42.0)]));
    }

    #[test]
    fn catalog_fingerprint_is_stable_and_nonempty() {
        let a = catalog_fingerprint_sha256();
        let b = catalog_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
