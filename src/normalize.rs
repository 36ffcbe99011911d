use crate::request::{FieldKind, ReportRequest};
use pagewright_catalog::{MetricLookup, MetricValue, RankedEntry, definition_by_id_or_title};
use serde_json::Value;

/// Builds the single lookup every catalog extractor reads.
///
/// Precedence, highest first: metric-override custom fields, the primary source, the
/// extended (legacy) object. Lower sources are inserted first and overwritten.
pub fn normalize(request: &ReportRequest) -> MetricLookup {
    let mut lookup = MetricLookup::new();

    for (key, raw) in &request.extended_metrics {
        if let Some(value) = metric_value_from_json(raw) {
            lookup.insert(canonical_key(key), value);
        }
    }

    if let Some(primary) = &request.primary_metrics {
        for (key, value) in primary.entries() {
            lookup.insert(key, value);
        }
    }

    for field in request.fields_of(FieldKind::MetricOverride) {
        let key = match definition_by_id_or_title(&field.title) {
            Some(def) => def.id.to_string(),
            None => canonical_key(field.title.trim()),
        };
        if key.is_empty() {
            continue;
        }
        lookup.insert(key, parse_scalar(&field.content));
    }

    lookup
}

/// `bounce_rate` / `Bounce-Rate` -> `bounceRate`; already camelCase keys pass through.
pub fn canonical_key(raw: &str) -> String {
    if !raw.contains(['_', '-', ' ']) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut upper_next = false;
    for ch in raw.chars() {
        if matches!(ch, '_' | '-' | ' ') {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// "1,200", "72.5%" and "$900" read as numbers; anything else stays text.
fn parse_scalar(content: &str) -> MetricValue {
    let trimmed = content.trim();
    let numeric: String = trimmed
        .chars()
        .filter(|ch| !matches!(ch, ',' | '%' | '$'))
        .collect();
    match numeric.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => MetricValue::Number(value),
        _ => MetricValue::Text(trimmed.to_string()),
    }
}

/// Converts one legacy JSON field. Numbers, numeric strings, text and ranked arrays are
/// accepted; anything else is treated as absent.
pub fn metric_value_from_json(raw: &Value) -> Option<MetricValue> {
    match raw {
        Value::Number(number) => number.as_f64().map(MetricValue::Number),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(parse_scalar(trimmed))
        }
        Value::Array(items) => {
            let entries: Vec<RankedEntry> = items.iter().filter_map(ranked_entry_from_json).collect();
            if entries.is_empty() {
                None
            } else {
                Some(MetricValue::Ranked(entries))
            }
        }
        _ => None,
    }
}

fn ranked_entry_from_json(raw: &Value) -> Option<RankedEntry> {
    let object = raw.as_object()?;
    let label = ["label", "query", "page", "name", "path"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))?;
    let value = ["value", "clicks", "views", "pageViews", "sessions", "count"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_f64))
        .unwrap_or(0.0);
    Some(RankedEntry::new(label, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CustomField, DateRange, PrimaryMetrics, ReportType};
    use pagewright_catalog::resolve;
    use serde_json::json;

    fn request(primary: PrimaryMetrics) -> ReportRequest {
        ReportRequest::new(
            "Acme",
            DateRange::new("2024-01-01", "2024-01-31"),
            ReportType::Standard,
            primary,
        )
    }

    #[test]
    fn primary_source_beats_legacy_object() {
        let req = request(PrimaryMetrics {
            users: Some(500.0),
            ..PrimaryMetrics::default()
        })
        .with_extended_metric("users", json!(9999))
        .with_extended_metric("revenue", json!(1500.25));
        let lookup = normalize(&req);
        assert_eq!(lookup.number("users"), Some(500.0));
        assert_eq!(lookup.number("revenue"), Some(1500.25));
    }

    #[test]
    fn overrides_beat_everything() {
        let req = request(PrimaryMetrics {
            bounce_rate: Some(45.2),
            ..PrimaryMetrics::default()
        })
        .with_extended_metric("bounceRate", json!(80))
        .with_custom_field(CustomField::new(FieldKind::MetricOverride, "Bounce Rate", "38.5%"))
        .with_custom_field(CustomField::new(FieldKind::MetricOverride, "revenue", "$12,000"));
        let lookup = normalize(&req);
        assert_eq!(lookup.number("bounceRate"), Some(38.5));
        assert_eq!(lookup.number("revenue"), Some(12000.0));
    }

    #[test]
    fn textual_overrides_are_kept_verbatim() {
        let req = request(PrimaryMetrics::default()).with_custom_field(CustomField::new(
            FieldKind::MetricOverride,
            "goalCompletions",
            "Tracking starts in May",
        ));
        let lookup = normalize(&req);
        assert_eq!(
            resolve("goalCompletions", &lookup).map(|m| m.formatted_value),
            Some("Tracking starts in May".to_string())
        );
    }

    #[test]
    fn legacy_keys_are_canonicalised() {
        let req = request(PrimaryMetrics::default())
            .with_extended_metric("organic_traffic", json!(1200))
            .with_extended_metric("mobile-users", json!(300))
            .with_extended_metric("top_pages", json!([{"page": "/pricing", "views": 88}]))
            .with_extended_metric("broken", json!({"nested": true}))
            .with_extended_metric("nothing", json!(null));
        let lookup = normalize(&req);
        assert_eq!(lookup.number("organicTraffic"), Some(1200.0));
        assert_eq!(lookup.number("mobileUsers"), Some(300.0));
        assert_eq!(
            resolve("topPages", &lookup).map(|m| m.formatted_value),
            Some("/pricing (88)".to_string())
        );
        assert!(!lookup.contains("broken"));
        assert!(!lookup.contains("nothing"));
    }

    #[test]
    fn legacy_numeric_strings_are_coerced_like_overrides() {
        let req = request(PrimaryMetrics::default())
            .with_extended_metric("bounce_rate", json!("72.5%"))
            .with_extended_metric("organic_traffic", json!("1,200"))
            .with_extended_metric("revenue", json!(" $900 "))
            .with_extended_metric("goal_completions", json!("pending"));
        let lookup = normalize(&req);
        assert_eq!(lookup.number("bounceRate"), Some(72.5));
        assert_eq!(lookup.number("organicTraffic"), Some(1200.0));
        assert_eq!(lookup.number("revenue"), Some(900.0));
        assert_eq!(
            lookup.get("goalCompletions"),
            Some(&MetricValue::Text("pending".to_string()))
        );
        assert_eq!(
            resolve("bounceRate", &lookup).map(|m| m.formatted_value),
            Some("72.50%".to_string())
        );
    }

    #[test]
    fn canonical_key_cases() {
        assert_eq!(canonical_key("bounce_rate"), "bounceRate");
        assert_eq!(canonical_key("Avg Session Duration"), "avgSessionDuration");
        assert_eq!(canonical_key("pageViews"), "pageViews");
        assert_eq!(canonical_key("_users"), "users");
    }

    #[test]
    fn missing_fields_stay_absent_but_default_to_zero_for_narratives() {
        let lookup = normalize(&request(PrimaryMetrics::default()));
        assert!(lookup.is_empty());
        assert_eq!(lookup.number_or_default("users"), 0.0);
    }
}
