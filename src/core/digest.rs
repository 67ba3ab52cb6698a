//! Aggregated digest rendering.
//!
//! One HTML mail per run covering every discovered ticket, with
//! unresolved calls listed first.

use chrono::{DateTime, Utc};

use crate::domain::{ResolutionStatus, TicketRecord};

/// Order records for the digest: ascending sort on the resolved flag
/// puts unresolved calls first, and the stable sort keeps discovery
/// order within each group.
pub fn sort_for_digest(records: &mut [TicketRecord]) {
    records.sort_by_key(|record| record.resolved);
}

/// Subject line for the digest mail.
pub fn digest_subject(report_date: DateTime<Utc>) -> String {
    format!("Voice Ticket Summaries for {}", report_date.format("%Y-%m-%d"))
}

/// Render the digest body. Tickets that never produced a transcript
/// still get a block, with their unfilled fields left blank.
pub fn render_digest(records: &[TicketRecord]) -> String {
    if records.is_empty() {
        return "<p>No voice tickets were found in this window.</p>".to_string();
    }

    let mut html = String::from("<html><body>");
    for record in records {
        let status = if record.resolved {
            ResolutionStatus::Resolved
        } else {
            ResolutionStatus::Unresolved
        };
        let duration = record.duration.map(|d| d.to_string()).unwrap_or_default();
        html.push_str(&format!(
            "<h3>Ticket {}: {}</h3>\
             <p><b>Duration:</b> {}</p>\
             <p><b>Company:</b> {}</p>\
             <p>{}</p>",
            record.id,
            status.label(),
            duration,
            escape(&record.company),
            escape(&record.summary),
        ));
    }
    html.push_str("</body></html>");
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
