//! Markdown performance report over the pipeline log.

use crate::audit::RunStatus;
use crate::engine::Warehouse;
use crate::error::{EltError, EltResult};
use crate::sql::{self, QualifiedName};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Runs for one day and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub run_date: NaiveDate,
    pub status: String,
    pub run_count: i64,
    pub total_rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub window_days: u32,
    pub rows: Vec<ReportRow>,
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

impl Report {
    /// Aggregate the last `window_days` days of the log.
    pub async fn fetch(
        warehouse: &Warehouse,
        log: &QualifiedName,
        title: &str,
        window_days: u32,
    ) -> EltResult<Self> {
        let days = i32::try_from(window_days)
            .map_err(|_| EltError::Report(format!("window of {} days is too large", window_days)))?;

        let rows: Vec<(NaiveDate, String, i64, i64)> =
            sqlx::query_as(&sql::report_summary(log))
                .bind(days)
                .fetch_all(warehouse.pool())
                .await
                .map_err(|e| EltError::Report(format!("querying {}: {}", log, e)))?;

        info!(log = %log, days = window_days, groups = rows.len(), "report data fetched");
        Ok(Self {
            title: title.to_string(),
            window_days,
            rows: rows
                .into_iter()
                .map(|(run_date, status, run_count, total_rows)| ReportRow {
                    run_date,
                    status,
                    run_count,
                    total_rows,
                })
                .collect(),
        })
    }

    /// Successful runs as a percentage of all runs; 0 with no runs.
    pub fn success_rate(&self) -> f64 {
        let total: i64 = self.rows.iter().map(|r| r.run_count).sum();
        if total == 0 {
            return 0.0;
        }
        let success: i64 = self
            .rows
            .iter()
            .filter(|r| r.status == RunStatus::Success.as_str())
            .map(|r| r.run_count)
            .sum();
        success as f64 / total as f64 * 100.0
    }

    pub fn total_rows(&self) -> i64 {
        self.rows.iter().map(|r| r.total_rows).sum()
    }

    pub fn render(&self, generated_at: NaiveDateTime) -> String {
        let mut md = format!("# {}\n", self.title);
        md.push_str(&format!(
            "*Generated on: {}*\n\n",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary Table\n");
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.run_date.to_string(),
                    r.status.clone(),
                    r.run_count.to_string(),
                    r.total_rows.to_string(),
                ]
            })
            .collect();
        md.push_str(&markdown_table(
            &["RunDate", "Status", "RunCount", "TotalRows"],
            &[Align::Left, Align::Left, Align::Right, Align::Right],
            &cells,
        ));

        md.push_str("\n\n## Key Insights\n");
        md.push_str(&format!(
            "- **Overall Success Rate:** {:.1}%\n",
            self.success_rate()
        ));
        md.push_str(&format!(
            "- **Total Rows Processed ({} Days):** {}\n",
            self.window_days,
            group_thousands(self.total_rows())
        ));
        md
    }

    /// Render and save to `path`.
    pub fn write_to(&self, path: &Path, generated_at: NaiveDateTime) -> EltResult<()> {
        std::fs::write(path, self.render(generated_at))?;
        info!(path = %path.display(), "report written");
        Ok(())
    }
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Pipe table without a trailing newline.
fn markdown_table(headers: &[&str], align: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let pad = |text: &str, width: usize, align: Align| match align {
        Align::Left => format!("{:<width$}", text),
        Align::Right => format!("{:>width$}", text),
    };
    let line = |cells: Vec<String>| format!("| {} |", cells.join(" | "));

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(
        headers
            .iter()
            .zip(&widths)
            .zip(align)
            .map(|((h, w), a)| pad(*h, *w, *a))
            .collect(),
    ));

    let rule: Vec<String> = widths
        .iter()
        .zip(align)
        .map(|(w, a)| match a {
            Align::Left => format!(":{}", "-".repeat(w + 1)),
            Align::Right => format!("{}:", "-".repeat(w + 1)),
        })
        .collect();
    lines.push(format!("|{}|", rule.join("|")));

    for row in rows {
        lines.push(line(
            row.iter()
                .zip(&widths)
                .zip(align)
                .map(|((c, w), a)| pad(c.as_str(), *w, *a))
                .collect(),
        ));
    }
    lines.join("\n")
}
