use crate::core::workflow::context::Context;
use crate::core::workflow::span::Span;
use serde::Serialize;

/// One row of the tabular execution report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub task: String,
    pub name: String,
    pub timestamp: String,
    pub status: String,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl ReportRow {
    fn from_span(span: &Span) -> Self {
        ReportRow {
            task: span.task.clone(),
            name: span.name.clone(),
            timestamp: span.timestamp.clone(),
            status: span.status.as_str().to_string(),
            duration_ms: span
                .attributes
                .get("duration_ms")
                .and_then(|value| value.as_u64()),
            error: span
                .attributes
                .get("error")
                .and_then(|value| value.as_str())
                .map(|s| s.to_string()),
        }
    }
}

/// Build the execution report from a finished context's span log, one row
/// per span in execution order.
pub fn build_report(ctx: &Context) -> Vec<ReportRow> {
    ctx.spans.iter().map(ReportRow::from_span).collect()
}

/// Render report rows as a fixed-width text table.
pub fn render_table(rows: &[ReportRow]) -> String {
    let headers = ["TASK", "SPAN", "STATUS", "DURATION", "ERROR"];
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.task.clone(),
                row.name.clone(),
                row.status.clone(),
                row.duration_ms
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
                row.error.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    for row in &cells {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.len());
        }
    }

    let mut out = String::new();
    for (index, header) in headers.iter().enumerate() {
        out.push_str(&format!("{:<width$}  ", header, width = widths[index]));
    }
    out.push('\n');
    for (index, _) in headers.iter().enumerate() {
        out.push_str(&"-".repeat(widths[index]));
        out.push_str("  ");
    }
    out.push('\n');
    for row in &cells {
        for (index, cell) in row.iter().enumerate() {
            out.push_str(&format!("{:<width$}  ", cell, width = widths[index]));
        }
        out.push('\n');
    }
    out
}
