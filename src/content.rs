use crate::request::{FieldKind, ReportRequest, ReportType};
use pagewright_catalog::{MetricLookup, format_count, format_percent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTone {
    Neutral,
    Positive,
    Warning,
}

impl BlockTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTone::Neutral => "neutral",
            BlockTone::Positive => "positive",
            BlockTone::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub title: String,
    pub body: String,
    pub tone: BlockTone,
}

impl Block {
    pub fn new(title: impl Into<String>, body: impl Into<String>, tone: BlockTone) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceBucket {
    Excellent,
    Good,
    NeedsImprovement,
}

impl BounceBucket {
    pub fn from_rate(rate: f64) -> Self {
        if rate < 40.0 {
            BounceBucket::Excellent
        } else if rate < 60.0 {
            BounceBucket::Good
        } else {
            BounceBucket::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BounceBucket::Excellent => "excellent",
            BounceBucket::Good => "good",
            BounceBucket::NeedsImprovement => "needs improvement",
        }
    }
}

/// Bounce rate above which the bounce-specific recommendation replaces general monitoring.
pub const BOUNCE_ALERT_THRESHOLD: f64 = 60.0;

pub fn synthesized_insight_count(report_type: ReportType) -> usize {
    match report_type {
        ReportType::Executive => 2,
        ReportType::Standard | ReportType::Custom => 3,
    }
}

// Fields with neither a title nor a body are skipped.
fn verbatim(request: &ReportRequest, kind: FieldKind) -> Vec<Block> {
    request
        .fields_of(kind)
        .map(|field| (field.title.trim(), field.content.trim()))
        .filter(|(title, body)| !title.is_empty() || !body.is_empty())
        .map(|(title, body)| Block::new(title, body, BlockTone::Neutral))
        .collect()
}

pub fn insights(request: &ReportRequest, lookup: &MetricLookup) -> Vec<Block> {
    let supplied = verbatim(request, FieldKind::Insight);
    if !supplied.is_empty() {
        return supplied;
    }
    let mut blocks = vec![
        traffic_insight(request, lookup),
        bounce_insight(lookup),
        conversion_insight(lookup),
    ];
    blocks.truncate(synthesized_insight_count(request.report_type));
    blocks
}

pub fn recommendations(request: &ReportRequest, lookup: &MetricLookup) -> Vec<Block> {
    let supplied = verbatim(request, FieldKind::Recommendation);
    if !supplied.is_empty() {
        return supplied;
    }
    let bounce = lookup.number_or_default("bounceRate");
    let conditional = if bounce > BOUNCE_ALERT_THRESHOLD {
        Block::new(
            "Reduce Bounce Rate",
            format!(
                "With a bounce rate of {}, review landing page relevance, load speed and calls \
                 to action so visitors find a clear next step.",
                format_percent(bounce)
            ),
            BlockTone::Warning,
        )
    } else {
        Block::new(
            "Establish Regular Monitoring",
            "Review these metrics every month so shifts in traffic, engagement and conversions \
             are caught early and acted on.",
            BlockTone::Neutral,
        )
    };
    vec![
        Block::new(
            "Improve Conversion Tracking",
            "Audit goal and event configuration so every key action (form submissions, calls, \
             purchases) is recorded and attributed to its source.",
            BlockTone::Neutral,
        ),
        Block::new(
            "Optimize the Conversion Funnel",
            "Map the path from landing page to conversion, remove friction at each step and \
             test clearer offers on the highest-traffic pages.",
            BlockTone::Neutral,
        ),
        conditional,
    ]
}

fn traffic_insight(request: &ReportRequest, lookup: &MetricLookup) -> Block {
    let users = lookup.number_or_default("users");
    let sessions = lookup.number_or_default("sessions");
    let per_user = if users > 0.0 { sessions / users } else { 0.0 };
    Block::new(
        "Traffic Overview",
        format!(
            "{} attracted {} users across {} sessions between {} and {}, averaging {:.2} \
             sessions per user.",
            client_label(request),
            format_count(users),
            format_count(sessions),
            request.date_range.start_label(),
            request.date_range.end_label(),
            per_user
        ),
        if users > 0.0 {
            BlockTone::Positive
        } else {
            BlockTone::Neutral
        },
    )
}

fn bounce_insight(lookup: &MetricLookup) -> Block {
    let rate = lookup.number_or_default("bounceRate");
    let bucket = BounceBucket::from_rate(rate);
    let body = match bucket {
        BounceBucket::Excellent => format!(
            "A bounce rate of {} is excellent: visitors are engaging well beyond their \
             landing page.",
            format_percent(rate)
        ),
        BounceBucket::Good => format!(
            "A bounce rate of {} is good, with room to improve engagement on key landing \
             pages.",
            format_percent(rate)
        ),
        BounceBucket::NeedsImprovement => format!(
            "A bounce rate of {} needs improvement; many visitors leave after viewing a \
             single page.",
            format_percent(rate)
        ),
    };
    let tone = match bucket {
        BounceBucket::Excellent | BounceBucket::Good => BlockTone::Positive,
        BounceBucket::NeedsImprovement => BlockTone::Warning,
    };
    Block::new("Engagement Quality", body, tone)
}

fn conversion_insight(lookup: &MetricLookup) -> Block {
    let conversions = lookup.number_or_default("conversions");
    if conversions > 0.0 {
        let sessions = lookup.number_or_default("sessions");
        let rate = if sessions > 0.0 {
            format!(", a {} conversion rate", format_percent(conversions / sessions * 100.0))
        } else {
            String::new()
        };
        Block::new(
            "Conversion Success",
            format!(
                "The site recorded {} conversions{}, showing that visitors are completing \
                 the actions that matter.",
                format_count(conversions),
                rate
            ),
            BlockTone::Positive,
        )
    } else {
        Block::new(
            "Conversion Tracking",
            "No conversions were recorded this period, which suggests conversion tracking \
             is not yet effective. Verify goals and events before drawing conclusions.",
            BlockTone::Warning,
        )
    }
}

fn client_label(request: &ReportRequest) -> &str {
    let name = request.client_name.trim();
    if name.is_empty() { "The site" } else { name }
}

/// Opening paragraph of the executive summary page.
pub fn summary_narrative(request: &ReportRequest, lookup: &MetricLookup) -> String {
    let bounce = lookup.number_or_default("bounceRate");
    format!(
        "This report summarizes website performance for {} from {} to {}. The site welcomed \
         {} users over {} sessions with a {} bounce rate ({}) and recorded {} conversions.",
        client_label(request),
        request.date_range.start_label(),
        request.date_range.end_label(),
        format_count(lookup.number_or_default("users")),
        format_count(lookup.number_or_default("sessions")),
        format_percent(bounce),
        BounceBucket::from_rate(bounce).label(),
        format_count(lookup.number_or_default("conversions"))
    )
}
