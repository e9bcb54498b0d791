//! Drift report model and HTML email rendering.
//!
//! A report is built fresh every run and discarded after it is sent. Events
//! without any changed page only show up in the summary counts; the detail
//! table lists changed events alone, and a run with no changes at all
//! renders a short notice instead of the table.

use chrono::{DateTime, Utc};
use drift_store::PageRole;
use serde::{Deserialize, Serialize};

use crate::diff::{DiffSegment, DriftSummary, SegmentTag};

/// Characters of unchanged text shown on each side of a change.
pub const CONTEXT_CHARS: usize = 80;

/// Changed segments longer than this are cut short in the email.
pub const MAX_SEGMENT_CHARS: usize = 2_000;

const ADDED_COLOR: &str = "#22863a";
const ADDED_BG: &str = "#e6ffed";
const REMOVED_COLOR: &str = "#cb2431";
const REMOVED_BG: &str = "#ffeef0";
const MUTED: &str = "#666";
const FONT: &str = "font-family: Arial, sans-serif;";

// ── model ─────────────────────────────────────────────────────────────────

/// Drift of both pages of one event. `None` means the page produced no
/// data this run (no URL, or the fetch failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDrift {
    pub abbreviation: String,
    pub name: String,
    pub main_url: Option<String>,
    pub important_dates_url: Option<String>,
    pub main: Option<DriftSummary>,
    pub important_dates: Option<DriftSummary>,
}

impl EventDrift {
    pub fn summary(&self, role: PageRole) -> Option<&DriftSummary> {
        match role {
            PageRole::Main => self.main.as_ref(),
            PageRole::ImportantDates => self.important_dates.as_ref(),
        }
    }

    pub fn url(&self, role: PageRole) -> Option<&str> {
        match role {
            PageRole::Main => self.main_url.as_deref(),
            PageRole::ImportantDates => self.important_dates_url.as_deref(),
        }
    }

    pub fn changed(&self, role: PageRole) -> bool {
        self.summary(role).is_some_and(|s| s.has_changes)
    }

    pub fn has_changes(&self) -> bool {
        PageRole::ALL.iter().any(|&role| self.changed(role))
    }

    pub fn changed_roles(&self) -> Vec<PageRole> {
        PageRole::ALL
            .into_iter()
            .filter(|&role| self.changed(role))
            .collect()
    }
}

/// Everything one run found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub events: Vec<EventDrift>,
}

impl Report {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Report {
            generated_at,
            events: Vec::new(),
        }
    }

    /// Events considered this run.
    pub fn total(&self) -> usize {
        self.events.len()
    }

    pub fn changed_events(&self) -> impl Iterator<Item = &EventDrift> {
        self.events.iter().filter(|e| e.has_changes())
    }

    pub fn changed_count(&self) -> usize {
        self.changed_events().count()
    }

    pub fn changed_count_for(&self, role: PageRole) -> usize {
        self.events.iter().filter(|e| e.changed(role)).count()
    }
}

/// Subject and HTML body of the report email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub subject: String,
    pub body_html: String,
}

// ── rendering ─────────────────────────────────────────────────────────────

/// Render a report as an HTML email.
pub fn render(report: &Report) -> RenderedReport {
    let subject = format!(
        "Drift Report for {}",
        report.generated_at.format("%a %b %d %Y")
    );

    let mut body = String::new();
    body.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n</head>\n",
    );
    body.push_str(
        "<body style=\"margin: 0; padding: 0; background-color: #f5f5f5;\">\n\
         <div style=\"max-width: 1200px; margin: 0 auto; background-color: white; padding: 20px;\">\n",
    );
    body.push_str(&format!(
        "<h1 style=\"{FONT} color: #333; text-align: center;\">Conference Website Drift Report</h1>\n"
    ));
    body.push_str(&format!(
        "<p style=\"{FONT} color: {MUTED}; text-align: center;\">Generated on {}</p>\n",
        report.generated_at.format("%A, %B %-d, %Y at %H:%M UTC")
    ));

    if report.changed_count() == 0 {
        body.push_str(&no_changes_notice(report.total()));
    } else {
        body.push_str(&summary_section(report));
        body.push_str(&detail_table(report));
    }

    body.push_str(&format!(
        "<div style=\"{FONT} color: #999; text-align: center; margin-top: 40px; \
         padding-top: 20px; border-top: 1px solid #eee; font-size: 12px;\">\n\
         <p>This is an automated report from the PL Conferences drift detection system.</p>\n\
         <p>Changes are detected by comparing the current website content with previously stored versions.</p>\n\
         </div>\n"
    ));
    body.push_str("</div>\n</body>\n</html>\n");

    RenderedReport {
        subject,
        body_html: body,
    }
}

fn no_changes_notice(total: usize) -> String {
    format!(
        "<div class=\"no-changes-notice\" style=\"{FONT} padding: 20px; text-align: center; color: {MUTED};\">\n\
         <h2>No changes detected in any monitored events</h2>\n\
         <p>All {total} monitored conference websites remain unchanged since the last check.</p>\n\
         </div>\n"
    )
}

fn summary_section(report: &Report) -> String {
    let mut html = format!(
        "<div class=\"summary\" style=\"{FONT} background: #f8f9fa; padding: 20px; border-radius: 8px; \
         margin: 20px auto; max-width: 800px;\">\n\
         <h2 style=\"color: #333; margin-top: 0;\">Summary</h2>\n\
         <ul style=\"color: {MUTED}; line-height: 1.8;\">\n\
         <li><strong>{}</strong> conferences monitored</li>\n\
         <li><strong>{}</strong> conferences with changes detected</li>\n\
         <li><strong>{}</strong> main page changes</li>\n\
         <li><strong>{}</strong> important dates page changes</li>\n\
         </ul>\n",
        report.total(),
        report.changed_count(),
        report.changed_count_for(PageRole::Main),
        report.changed_count_for(PageRole::ImportantDates),
    );

    html.push_str(
        "<div style=\"margin-top: 16px; padding-top: 16px; border-top: 1px solid #dee2e6;\">\n\
         <strong style=\"color: #333;\">Conferences with changes:</strong>\n<div style=\"margin-top: 8px;\">\n",
    );
    for event in report.changed_events() {
        let roles: Vec<&str> = event.changed_roles().iter().map(|r| r.label()).collect();
        html.push_str(&format!(
            "<span class=\"chip\" style=\"display: inline-block; background: #e9ecef; padding: 4px 8px; \
             margin: 4px; border-radius: 4px; font-size: 14px;\">{} ({})</span>\n",
            escape_html(&event.abbreviation.to_uppercase()),
            roles.join(", ")
        ));
    }
    html.push_str("</div>\n</div>\n</div>\n");
    html
}

fn detail_table(report: &Report) -> String {
    let mut html = format!(
        "<table class=\"drift-table\" style=\"{FONT} border-collapse: collapse; width: 100%; margin: 20px auto;\">\n\
         <thead>\n<tr>\n\
         <th style=\"width: 15%; text-align: left; padding: 12px; border-bottom: 2px solid #dee2e6;\">Conference</th>\n\
         <th style=\"width: 42.5%; text-align: left; padding: 12px; border-bottom: 2px solid #dee2e6;\">Main Page Changes</th>\n\
         <th style=\"width: 42.5%; text-align: left; padding: 12px; border-bottom: 2px solid #dee2e6;\">Important Dates Changes</th>\n\
         </tr>\n</thead>\n<tbody>\n"
    );

    for event in report.changed_events() {
        html.push_str("<tr>\n");
        html.push_str(&format!(
            "<td style=\"padding: 12px; vertical-align: top; border-bottom: 1px solid #dee2e6;\">\n\
             <div style=\"font-weight: bold; color: #0066cc; font-size: 16px;\">{}</div>\n\
             <div style=\"font-size: 12px; color: {MUTED}; margin-top: 2px;\">{}</div>\n</td>\n",
            escape_html(&event.abbreviation.to_uppercase()),
            escape_html(if event.name.is_empty() {
                &event.abbreviation
            } else {
                &event.name
            }),
        ));
        for role in PageRole::ALL {
            html.push_str(
                "<td style=\"padding: 12px; vertical-align: top; border-bottom: 1px solid #dee2e6;\">\n",
            );
            html.push_str(&role_cell(event, role));
            html.push_str("</td>\n");
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn role_cell(event: &EventDrift, role: PageRole) -> String {
    let quiet = |text: &str| {
        format!("<div style=\"color: {MUTED}; font-style: italic; font-size: 14px;\">{text}</div>\n")
    };
    let summary = match event.summary(role) {
        None => return quiet("Not checked this run"),
        Some(s) if !s.has_changes => return quiet("No changes detected"),
        Some(s) => s,
    };

    let title = match role {
        PageRole::Main => "Main Page",
        PageRole::ImportantDates => "Important Dates",
    };
    let link = match event.url(role) {
        Some(url) => format!(
            "<a href=\"{}\" style=\"font-size: 12px; color: #0066cc;\" target=\"_blank\">View Page →</a>",
            escape_html(url)
        ),
        None => "<span style=\"font-size: 12px;\">Url not available</span>".to_string(),
    };

    format!(
        "<div style=\"font-weight: bold; color: #333; margin-bottom: 4px;\">{title} {link}</div>\n\
         <div style=\"font-size: 12px; color: {MUTED}; margin-top: 4px;\">{}</div>\n\
         <div style=\"margin-top: 8px;\">\n{}</div>\n",
        change_counts(summary.added_count, summary.removed_count),
        diff_section(&summary.segments),
    )
}

fn change_counts(added: usize, removed: usize) -> String {
    let mut parts = Vec::new();
    if added > 0 {
        parts.push(format!(
            "<span style=\"color: {ADDED_COLOR};\">+{added} characters added</span>"
        ));
    }
    if removed > 0 {
        parts.push(format!(
            "<span style=\"color: {REMOVED_COLOR};\">-{removed} characters removed</span>"
        ));
    }
    if parts.is_empty() {
        format!("<span style=\"color: {MUTED};\">No changes</span>")
    } else {
        parts.join(", ")
    }
}

/// Render the segments of one page: changed text with a `+`/`-` marker and
/// color, unchanged text as short surrounding context.
fn diff_section(segments: &[DiffSegment]) -> String {
    let mut html = String::from(
        "<div style=\"font-family: monospace; font-size: 12px; line-height: 1.4; background: #f8f9fa; \
         padding: 10px; border-radius: 4px; overflow-x: auto;\">\n",
    );

    for (i, segment) in segments.iter().enumerate() {
        match segment.tag {
            SegmentTag::Unchanged => {
                let after_change = i > 0;
                let before_change = i + 1 < segments.len();
                if let Some(context) = context_excerpt(&segment.text, after_change, before_change) {
                    html.push_str(&format!(
                        "<div class=\"context\" style=\"color: {MUTED}; margin: 4px 0;\">{}</div>\n",
                        escape_html(&context)
                    ));
                }
            }
            SegmentTag::Added => html.push_str(&changed_line(
                "added", '+', ADDED_COLOR, ADDED_BG, &segment.text,
            )),
            SegmentTag::Removed => html.push_str(&changed_line(
                "removed", '-', REMOVED_COLOR, REMOVED_BG, &segment.text,
            )),
        }
    }

    html.push_str("</div>\n");
    html
}

fn changed_line(class: &str, marker: char, color: &str, background: &str, text: &str) -> String {
    let total = text.chars().count();
    let mut shown = head_chars(text, MAX_SEGMENT_CHARS);
    if total > MAX_SEGMENT_CHARS {
        shown.push_str(&format!(" … ({} more characters)", total - MAX_SEGMENT_CHARS));
    }
    format!(
        "<div class=\"{class}\" style=\"background: {background}; color: {color}; padding: 2px 4px; \
         margin: 1px 0; border-left: 3px solid {color}; white-space: pre-wrap;\">{marker} {}</div>\n",
        escape_html(&shown)
    )
}

/// The part of an unchanged span worth showing next to the changes around it.
fn context_excerpt(text: &str, after_change: bool, before_change: bool) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let len = text.chars().count();
    let excerpt = match (after_change, before_change) {
        (true, true) if len <= 2 * CONTEXT_CHARS => text.to_string(),
        (true, true) => format!(
            "{} … {}",
            head_chars(text, CONTEXT_CHARS),
            tail_chars(text, CONTEXT_CHARS)
        ),
        (true, false) if len <= CONTEXT_CHARS => text.to_string(),
        (true, false) => format!("{}…", head_chars(text, CONTEXT_CHARS)),
        (false, true) if len <= CONTEXT_CHARS => text.to_string(),
        (false, true) => format!("…{}", tail_chars(text, CONTEXT_CHARS)),
        (false, false) => return None,
    };
    Some(excerpt)
}

fn head_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn tail_chars(text: &str, n: usize) -> String {
    let len = text.chars().count();
    text.chars().skip(len.saturating_sub(n)).collect()
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 17, 0, 0).unwrap()
    }

    fn event(id: &str, main: Option<DriftSummary>, dates: Option<DriftSummary>) -> EventDrift {
        EventDrift {
            abbreviation: id.to_string(),
            name: format!("{id} conference"),
            main_url: Some(format!("https://{id}.test/")),
            important_dates_url: None,
            main,
            important_dates: dates,
        }
    }

    #[test]
    fn subject_carries_the_run_date() {
        let rendered = render(&Report::new(at()));
        assert_eq!(rendered.subject, "Drift Report for Fri Oct 16 2026");
        assert!(rendered.body_html.contains("Friday, October 16, 2026 at 17:00 UTC"));
    }

    #[test]
    fn no_changes_renders_notice_without_table() {
        let mut report = Report::new(at());
        report.events.push(event("pldi", Some(diff("same", "same")), None));
        report.events.push(event("popl", None, None));

        let html = render(&report).body_html;
        assert!(html.contains("No changes detected in any monitored events"));
        assert!(html.contains("All 2 monitored"));
        assert!(!html.contains("<table"));
        assert!(!html.contains("PLDI"));
    }

    #[test]
    fn summary_counts_and_chips() {
        let mut report = Report::new(at());
        report.events.push(event("pldi", Some(diff("Jan", "Feb")), Some(diff("a", "b"))));
        report.events.push(event("popl", None, Some(diff("x", "x y"))));
        report.events.push(event("icfp", Some(diff("same", "same")), None));

        assert_eq!(report.total(), 3);
        assert_eq!(report.changed_count(), 2);
        assert_eq!(report.changed_count_for(PageRole::Main), 1);
        assert_eq!(report.changed_count_for(PageRole::ImportantDates), 2);

        let html = render(&report).body_html;
        assert!(html.contains("<strong>3</strong> conferences monitored"));
        assert!(html.contains("<strong>2</strong> conferences with changes detected"));
        assert!(html.contains("PLDI (main page, important dates)"));
        assert!(html.contains("POPL (important dates)"));
        // Unchanged events stay out of the detail table.
        assert!(!html.contains("ICFP"));
    }

    #[test]
    fn added_and_removed_are_distinguishable() {
        let mut report = Report::new(at());
        report
            .events
            .push(event("pldi", Some(diff("Deadline: Jan 1", "Deadline: Feb 1")), None));

        let html = render(&report).body_html;
        assert!(html.contains(&format!("border-left: 3px solid {REMOVED_COLOR}; white-space: pre-wrap;\">- Jan</div>")));
        assert!(html.contains(&format!("border-left: 3px solid {ADDED_COLOR}; white-space: pre-wrap;\">+ Feb</div>")));
        assert!(html.contains("+3 characters added"));
        assert!(html.contains("-3 characters removed"));
        assert!(html.contains("href=\"https://pldi.test/\""));
        assert!(html.contains("Not checked this run"));
    }

    #[test]
    fn page_text_is_escaped() {
        let mut report = Report::new(at());
        report
            .events
            .push(event("pldi", Some(diff("", "<script>alert('x')</script>")), None));
        let html = render(&report).body_html;
        assert!(html.contains("&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn long_segments_are_truncated() {
        let long = "x".repeat(MAX_SEGMENT_CHARS + 25);
        let line = changed_line("added", '+', ADDED_COLOR, ADDED_BG, &long);
        assert!(line.contains("… (25 more characters)"));
    }

    #[test]
    fn context_excerpts() {
        let long = "a".repeat(200);
        assert_eq!(context_excerpt("  ", true, true), None);
        assert_eq!(context_excerpt("short", true, true).as_deref(), Some("short"));
        assert_eq!(context_excerpt(&long, false, false), None);
        let trail = context_excerpt(&long, false, true).unwrap();
        assert!(trail.starts_with('…'));
        assert_eq!(trail.chars().count(), CONTEXT_CHARS + 1);
        let both = context_excerpt(&long, true, true).unwrap();
        assert!(both.contains(" … "));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut report = Report::new(at());
        report.events.push(event("pldi", Some(diff("a b", "a c")), None));
        assert_eq!(render(&report), render(&report));
    }
}
