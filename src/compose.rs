//! Turns a request into pages: one plan function per report tier decides the sections,
//! then a page writer replays layout plans onto a canvas and the footer pass stamps the
//! result.

use crate::canvas::{Canvas, Document, Paint, TextAlign, TextStyle};
use crate::content::{self, Block, BlockTone};
use crate::debug::DebugLogger;
use crate::error::ReportError;
use crate::footer::{self, FooterSpec};
use crate::layout::{self, GridGeometry, PlacementStep, StackItem, StackPlacement, StackStep};
use crate::normalize::normalize;
use crate::request::{ReportRequest, ReportType};
use crate::text::{truncate_with_ellipsis, wrap_lines};
use crate::types::{Color, Margins, Point, Pt, Rect, Size};
use pagewright_catalog::{MAX_METRICS, MetricLookup, ResolvedMetric, catalog_fingerprint_sha256, resolve};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const META_SECTION: &str = "report.section";
pub const META_GRID_COLUMNS: &str = "report.grid.columns";
pub const META_CARD: &str = "report.card";
pub const META_BLOCK: &str = "report.block";
pub const META_CONTINUED: &str = "report.continued";
pub const META_REPORT_TYPE: &str = "report.type";
pub const META_CATALOG: &str = "report.catalog";

pub const SUMMARY_METRIC_KEYS: [&str; 4] = ["users", "bounceRate", "sessions", "conversions"];

pub const STANDARD_METRIC_KEYS: [&str; 10] = [
    "users",
    "sessions",
    "pageViews",
    "bounceRate",
    "avgSessionDuration",
    "conversions",
    "conversionRate",
    "newUsers",
    "organicTraffic",
    "topQueries",
];

/// Space between the top margin and the first content row on a section page.
pub const HEADER_HEIGHT: f32 = 60.0;

const BLOCK_GAP: i32 = 12;
const BLOCK_INSET: i32 = 18;
const BLOCK_LINE_HEIGHT: i32 = 14;
// Title band plus top and bottom padding around the body lines.
const BLOCK_CHROME: i32 = 48;
const KEY_METRICS_GAP: f32 = 18.0;
const KEY_METRICS_HEADING: f32 = 26.0;
const NARRATIVE_LINE_HEIGHT: i32 = 16;

fn pt(value: f32) -> Pt {
    Pt::from_f32(value)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageSection {
    Cover,
    ExecutiveSummary {
        narrative: String,
        metrics: Vec<ResolvedMetric>,
    },
    MetricsGrid(Vec<ResolvedMetric>),
    Insights(Vec<Block>),
    Recommendations(Vec<Block>),
}

impl PageSection {
    pub fn key(&self) -> &'static str {
        match self {
            PageSection::Cover => "cover",
            PageSection::ExecutiveSummary { .. } => "executive_summary",
            PageSection::MetricsGrid(_) => "metrics",
            PageSection::Insights(_) => "insights",
            PageSection::Recommendations(_) => "recommendations",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PageSection::Cover => "",
            PageSection::ExecutiveSummary { .. } => "Executive Summary",
            PageSection::MetricsGrid(_) => "Performance Metrics",
            PageSection::Insights(_) => "Key Insights",
            PageSection::Recommendations(_) => "Recommendations",
        }
    }

    fn item_count(&self) -> usize {
        match self {
            PageSection::Cover => 0,
            PageSection::ExecutiveSummary { metrics, .. } => metrics.len(),
            PageSection::MetricsGrid(metrics) => metrics.len(),
            PageSection::Insights(blocks) | PageSection::Recommendations(blocks) => blocks.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub page_size: Size,
    pub margins: Margins,
    pub card_height: Pt,
    pub card_gap: Pt,
    pub max_metrics: usize,
    pub standard_metric_keys: Vec<String>,
    pub summary_metric_keys: Vec<String>,
    pub footer: FooterSpec,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(50.0),
            card_height: Pt::from_i32(80),
            card_gap: Pt::from_i32(15),
            max_metrics: MAX_METRICS,
            standard_metric_keys: STANDARD_METRIC_KEYS.iter().map(|k| k.to_string()).collect(),
            summary_metric_keys: SUMMARY_METRIC_KEYS.iter().map(|k| k.to_string()).collect(),
            footer: FooterSpec::default(),
        }
    }
}

impl ComposerSettings {
    pub fn content_top(&self) -> Pt {
        self.margins.top + pt(HEADER_HEIGHT)
    }

    pub fn geometry(&self) -> GridGeometry {
        GridGeometry {
            page_size: self.page_size,
            margins: self.margins,
            card_height: self.card_height,
            gap: self.card_gap,
            content_top: self.content_top(),
            footer_reserve: self.footer.reserve,
        }
    }
}

pub struct PageComposer {
    settings: ComposerSettings,
    debug: Option<Arc<DebugLogger>>,
}

impl PageComposer {
    pub fn new(settings: ComposerSettings) -> Self {
        Self {
            settings,
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<Arc<DebugLogger>>) -> Self {
        self.debug = debug;
        self
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    /// Validates, lays out and footer-stamps one report.
    pub fn compose(&self, request: &ReportRequest) -> Result<Document, ReportError> {
        request.validate(self.settings.max_metrics)?;
        let lookup = normalize(request);
        let sections = self.plan(request, &lookup);
        let document = self.draw(request, &sections);
        let generated_on = request.generated_label();
        let document = footer::stamp(document, &request.branding, &self.settings.footer, &generated_on);
        log::debug!(
            "composed {} report for {:?}: {} pages",
            request.report_type.as_str(),
            request.client_name,
            document.page_count()
        );
        self.event(
            "footer.stamp",
            json!({"pages": document.page_count(), "date": generated_on}),
        );
        Ok(document)
    }

    /// Ordered sections for the request's tier. Metric sections with nothing to show are
    /// already dropped.
    pub fn plan(&self, request: &ReportRequest, lookup: &MetricLookup) -> Vec<PageSection> {
        match request.report_type {
            ReportType::Executive => self.executive_plan(request, lookup),
            ReportType::Standard => self.standard_plan(request, lookup),
            ReportType::Custom => self.custom_plan(request, lookup),
        }
    }

    fn executive_plan(&self, request: &ReportRequest, lookup: &MetricLookup) -> Vec<PageSection> {
        vec![
            PageSection::Cover,
            self.summary_section(request, lookup),
            PageSection::Insights(content::insights(request, lookup)),
            PageSection::Recommendations(content::recommendations(request, lookup)),
        ]
    }

    fn standard_plan(&self, request: &ReportRequest, lookup: &MetricLookup) -> Vec<PageSection> {
        let keys = self.settings.standard_metric_keys.iter().map(String::as_str);
        self.tiered_plan(request, lookup, self.resolve_keys(keys, lookup, "metrics"))
    }

    fn custom_plan(&self, request: &ReportRequest, lookup: &MetricLookup) -> Vec<PageSection> {
        let keys = request.selected_metric_keys.iter().map(String::as_str);
        self.tiered_plan(request, lookup, self.resolve_keys(keys, lookup, "metrics"))
    }

    fn tiered_plan(
        &self,
        request: &ReportRequest,
        lookup: &MetricLookup,
        metrics: Vec<ResolvedMetric>,
    ) -> Vec<PageSection> {
        let mut sections = vec![PageSection::Cover, self.summary_section(request, lookup)];
        if metrics.is_empty() {
            log::debug!("metrics section omitted: no selected metric has data");
        } else {
            sections.push(PageSection::MetricsGrid(metrics));
        }
        sections.push(PageSection::Insights(content::insights(request, lookup)));
        sections.push(PageSection::Recommendations(content::recommendations(request, lookup)));
        sections
    }

    fn summary_section(&self, request: &ReportRequest, lookup: &MetricLookup) -> PageSection {
        let keys = self.settings.summary_metric_keys.iter().map(String::as_str);
        PageSection::ExecutiveSummary {
            narrative: content::summary_narrative(request, lookup),
            metrics: self.resolve_keys(keys, lookup, "executive_summary"),
        }
    }

    // Keeps caller order, drops repeats and anything the catalog cannot resolve.
    fn resolve_keys<'a>(
        &self,
        keys: impl Iterator<Item = &'a str>,
        lookup: &MetricLookup,
        section: &str,
    ) -> Vec<ResolvedMetric> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for key in keys.map(str::trim) {
            if !seen.insert(key) {
                continue;
            }
            match resolve(key, lookup) {
                Some(metric) => out.push(metric),
                None => {
                    log::debug!("metric {key:?} omitted from {section}: unknown id or no data");
                    self.event("metric.omitted", json!({"metric": key, "section": section}));
                }
            }
        }
        out
    }

    fn draw(&self, request: &ReportRequest, sections: &[PageSection]) -> Document {
        let mut writer = PageWriter {
            canvas: Canvas::new(self.settings.page_size),
            request,
            settings: &self.settings,
            geometry: self.settings.geometry(),
            brand: request.branding.primary_color(),
            composer: self,
            started: false,
        };
        for section in sections {
            writer.open_section(section);
            match section {
                PageSection::Cover => writer.draw_cover(),
                PageSection::ExecutiveSummary { narrative, metrics } => {
                    writer.draw_summary(section, narrative, metrics)
                }
                PageSection::MetricsGrid(metrics) => {
                    let top = self.settings.content_top();
                    writer.draw_grid(section, metrics, top);
                }
                PageSection::Insights(blocks) | PageSection::Recommendations(blocks) => {
                    writer.draw_blocks(section, blocks)
                }
            }
        }
        writer.canvas.finish()
    }

    fn event(&self, kind: &str, fields: serde_json::Value) {
        if let Some(logger) = self.debug.as_deref() {
            logger.event(kind, fields);
        }
    }

    fn count(&self, key: &str, amount: usize) {
        if let Some(logger) = self.debug.as_deref() {
            logger.increment(key, amount as u64);
        }
    }
}

impl Default for PageComposer {
    fn default() -> Self {
        Self::new(ComposerSettings::default())
    }
}

struct PageWriter<'a> {
    canvas: Canvas,
    request: &'a ReportRequest,
    settings: &'a ComposerSettings,
    geometry: GridGeometry,
    brand: Color,
    composer: &'a PageComposer,
    started: bool,
}

impl PageWriter<'_> {
    fn left(&self) -> Pt {
        self.settings.margins.left
    }

    fn open_section(&mut self, section: &PageSection) {
        if self.started {
            self.canvas.show_page();
        }
        self.started = true;
        self.canvas.meta(META_SECTION, section.key());
        self.composer.event(
            "compose.section",
            json!({
                "section": section.key(),
                "page_index": self.canvas.page_index(),
                "items": section.item_count(),
            }),
        );
        if !section.title().is_empty() {
            self.draw_header(section.title(), false);
        }
    }

    fn continue_section(&mut self, section: &PageSection) {
        self.canvas.show_page();
        self.canvas.meta(META_SECTION, section.key());
        self.canvas.meta(META_CONTINUED, "true");
        self.composer.event(
            "layout.page_break",
            json!({"section": section.key(), "page_index": self.canvas.page_index()}),
        );
        self.draw_header(section.title(), true);
    }

    fn draw_header(&mut self, title: &str, continued: bool) {
        let top = self.settings.margins.top;
        let left = self.left();
        let right = self.settings.page_size.width - self.settings.margins.right;
        let title = if continued {
            format!("{title} (continued)")
        } else {
            title.to_string()
        };
        self.canvas.draw_text(
            truncate_with_ellipsis(&title, right - left, pt(20.0), true),
            left,
            top,
            TextStyle::new(20.0, self.brand).bold(),
            TextAlign::Left,
        );
        let subtitle = TextStyle::new(10.0, Color::gray(0.45));
        let line = format!("{} | {}", self.request.client_name.trim(), self.request.date_range.label());
        self.canvas.draw_text(
            truncate_with_ellipsis(&line, right - left, subtitle.font_size, false),
            left,
            top + pt(28.0),
            subtitle,
            TextAlign::Left,
        );
        self.canvas.draw_line(
            Point::new(left, top + pt(46.0)),
            Point::new(right, top + pt(46.0)),
            self.brand,
            1.5,
        );
    }

    fn draw_cover(&mut self) {
        let width = self.settings.page_size.width;
        let left = self.left();
        let text_width = self.geometry.content_width();
        let branding = &self.request.branding;
        let agency = branding.agency_name().to_string();
        let client = self.request.client_name.trim();
        let fit = |text: &str, style: TextStyle| {
            truncate_with_ellipsis(text, text_width, style.font_size, style.bold)
        };

        self.canvas.meta(META_REPORT_TYPE, self.request.report_type.as_str());
        self.canvas.meta(META_CATALOG, catalog_fingerprint_sha256());

        self.canvas.draw_rect(
            Rect::new(Pt::ZERO, Pt::ZERO, width, pt(250.0)),
            Paint::fill(self.brand),
        );
        self.canvas.draw_circle(
            Point::new(width - pt(80.0), pt(70.0)),
            pt(60.0),
            Paint::fill(self.brand.tint(0.25)),
        );
        self.canvas.draw_circle(
            Point::new(width - pt(30.0), pt(215.0)),
            pt(40.0),
            Paint::fill(self.brand.tint(0.45)),
        );
        if let Some(logo) = branding.logo_ref() {
            self.canvas
                .draw_image(Rect::new(left, pt(36.0), pt(120.0), pt(48.0)), logo);
        }

        let white = Color::WHITE;
        let agency_style = TextStyle::new(13.0, white).bold();
        self.canvas
            .draw_text(fit(&agency, agency_style), left, pt(100.0), agency_style, TextAlign::Left);
        self.canvas.draw_text(
            self.request.report_type.title(),
            left,
            pt(130.0),
            TextStyle::new(28.0, white).bold(),
            TextAlign::Left,
        );
        let client_style = TextStyle::new(18.0, white);
        self.canvas
            .draw_text(fit(client, client_style), left, pt(172.0), client_style, TextAlign::Left);

        let label = TextStyle::new(10.0, Color::gray(0.45)).bold();
        let value = TextStyle::new(15.0, Color::gray(0.15)).bold();
        let rows = [
            ("Reporting Period", self.request.date_range.label(), 290.0),
            ("Prepared For", client.to_string(), 350.0),
            ("Prepared By", agency, 410.0),
        ];
        for (caption, text, y) in rows {
            self.canvas.draw_text(caption, left, pt(y), label, TextAlign::Left);
            self.canvas
                .draw_text(fit(&text, value), left, pt(y + 16.0), value, TextAlign::Left);
        }
    }

    fn draw_summary(&mut self, section: &PageSection, narrative: &str, metrics: &[ResolvedMetric]) {
        let left = self.left();
        let style = TextStyle::new(11.0, Color::gray(0.2));
        let lines = wrap_lines(narrative, self.geometry.content_width(), style.font_size, false);
        let mut y = self.settings.content_top();
        for line in lines {
            self.canvas.draw_text(line, left, y, style, TextAlign::Left);
            y += Pt::from_i32(NARRATIVE_LINE_HEIGHT);
        }
        if metrics.is_empty() {
            return;
        }
        y += pt(KEY_METRICS_GAP);
        // Heading stays on the page of the first card row.
        let row = pt(KEY_METRICS_HEADING) + self.geometry.card_height;
        let limit = self.geometry.bottom_limit();
        if y + row > limit && self.settings.content_top() + row <= limit {
            self.continue_section(section);
            y = self.settings.content_top();
        }
        self.canvas.draw_text(
            "Key Metrics",
            left,
            y,
            TextStyle::new(13.0, Color::gray(0.15)).bold(),
            TextAlign::Left,
        );
        self.draw_grid(section, metrics, y + pt(KEY_METRICS_HEADING));
    }

    fn draw_grid(&mut self, section: &PageSection, metrics: &[ResolvedMetric], start_y: Pt) {
        let plan = layout::place_grid(metrics, &self.geometry, start_y);
        let columns = plan.columns.to_string();
        self.canvas.meta(META_GRID_COLUMNS, columns.clone());
        for step in &plan.steps {
            match step {
                PlacementStep::PageBreak => {
                    self.continue_section(section);
                    self.canvas.meta(META_GRID_COLUMNS, columns.clone());
                }
                PlacementStep::Card(card) => self.draw_card(card.rect, &metrics[card.index]),
            }
        }
        self.composer.count("layout.cards", plan.cards().count());
    }

    fn draw_card(&mut self, rect: Rect, metric: &ResolvedMetric) {
        self.canvas.meta(META_CARD, metric.id.clone());
        let inner = (rect.width - pt(24.0)).max(Pt::ZERO);
        self.canvas.rounded_rect(
            rect,
            pt(8.0),
            Paint::fill_and_stroke(self.brand.tint(0.93), self.brand.tint(0.7), 0.75),
        );
        self.canvas.draw_circle(
            Point::new(rect.x + pt(16.0), rect.y + pt(16.5)),
            pt(4.0),
            Paint::fill(self.brand),
        );

        let title = TextStyle::new(9.0, Color::gray(0.3)).bold();
        let value = TextStyle::new(20.0, self.brand).bold();
        let description = TextStyle::new(7.5, Color::gray(0.45));
        self.canvas.draw_text(
            truncate_with_ellipsis(&metric.title, inner - pt(14.0), title.font_size, true),
            rect.x + pt(26.0),
            rect.y + pt(12.0),
            title,
            TextAlign::Left,
        );
        self.canvas.draw_text(
            truncate_with_ellipsis(&metric.formatted_value, inner, value.font_size, true),
            rect.x + pt(12.0),
            rect.y + pt(28.0),
            value,
            TextAlign::Left,
        );
        self.canvas.draw_text(
            truncate_with_ellipsis(&metric.description, inner, description.font_size, false),
            rect.x + pt(12.0),
            rect.y + pt(57.0),
            description,
            TextAlign::Left,
        );
    }

    fn draw_blocks(&mut self, section: &PageSection, blocks: &[Block]) {
        let body = TextStyle::new(10.0, Color::gray(0.25));
        let wrap_width = self.geometry.content_width() - Pt::from_i32(BLOCK_INSET * 2);
        let wrapped: Vec<Vec<String>> = blocks
            .iter()
            .map(|block| wrap_lines(&block.body, wrap_width, body.font_size, false))
            .collect();
        let items: Vec<StackItem> = wrapped
            .iter()
            .map(|lines| {
                StackItem::new(
                    Pt::from_i32(BLOCK_CHROME),
                    Pt::from_i32(BLOCK_LINE_HEIGHT),
                    lines.len(),
                )
            })
            .collect();
        let plan = layout::place_stack(
            &items,
            &self.geometry,
            self.settings.content_top(),
            Pt::from_i32(BLOCK_GAP),
        );
        for step in &plan.steps {
            match step {
                StackStep::PageBreak => self.continue_section(section),
                StackStep::Block(placed) => {
                    let lines = &wrapped[placed.index][placed.line_range()];
                    self.draw_block(placed, &blocks[placed.index], lines, body)
                }
            }
        }
        self.composer.count("layout.blocks", blocks.len());
    }

    fn draw_block(&mut self, placed: &StackPlacement, block: &Block, lines: &[String], body: TextStyle) {
        let rect = placed.rect;
        if !placed.is_continuation() {
            self.canvas.meta(META_BLOCK, block.title.clone());
        }
        let accent = tone_color(block.tone, self.brand);
        self.canvas
            .rounded_rect(rect, pt(6.0), Paint::fill(accent.tint(0.9)));
        self.canvas.draw_rect(
            Rect::new(rect.x, rect.y, pt(4.0), rect.height),
            Paint::fill(accent),
        );
        let x = rect.x + Pt::from_i32(BLOCK_INSET);
        let heading = TextStyle::new(12.0, Color::gray(0.1)).bold();
        let title = if placed.is_continuation() {
            format!("{} (continued)", block.title)
        } else {
            block.title.clone()
        };
        let title_width = (rect.width - Pt::from_i32(BLOCK_INSET * 2)).max(Pt::ZERO);
        self.canvas.draw_text(
            truncate_with_ellipsis(&title, title_width, heading.font_size, true),
            x,
            rect.y + pt(14.0),
            heading,
            TextAlign::Left,
        );
        let mut y = rect.y + pt(34.0);
        for line in lines {
            self.canvas.draw_text(line.clone(), x, y, body, TextAlign::Left);
            y += Pt::from_i32(BLOCK_LINE_HEIGHT);
        }
    }
}

fn tone_color(tone: BlockTone, brand: Color) -> Color {
    match tone {
        BlockTone::Neutral => brand,
        BlockTone::Positive => Color::rgb(0.086, 0.639, 0.29),
        BlockTone::Warning => Color::rgb(0.851, 0.467, 0.024),
    }
}
