//! Output formatters for run results
//!
//! Provides table, JSON, CSV and one-line summary formats.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::models::{TestStatus, UnitResult};
use crate::results::RunSummary;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single unit result
    pub fn format_result(&self, result: &UnitResult) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result)?,
            OutputFormat::Csv => write_csv(std::slice::from_ref(result))?,
            OutputFormat::Summary => format!(
                "{} {} ({}ms)",
                result.status.symbol(),
                result.id,
                result.duration_ms
            ),
        })
    }

    fn status_label(&self, status: TestStatus) -> &'static str {
        if self.colorize {
            match status {
                TestStatus::Pass => "\x1b[32m✓ PASS\x1b[0m",
                TestStatus::Fail => "\x1b[31m✗ FAIL\x1b[0m",
                TestStatus::Skip => "\x1b[33m○ SKIP\x1b[0m",
                TestStatus::Error => "\x1b[31m! ERROR\x1b[0m",
            }
        } else {
            match status {
                TestStatus::Pass => "✓ PASS",
                TestStatus::Fail => "✗ FAIL",
                TestStatus::Skip => "○ SKIP",
                TestStatus::Error => "! ERROR",
            }
        }
    }

    fn format_result_table(&self, result: &UnitResult) -> String {
        let mut line = format!(
            "{:32} {} [{:>6}ms]",
            result.id.as_str(),
            self.status_label(result.status),
            result.duration_ms
        );
        if result.status != TestStatus::Pass {
            if let Some(message) = &result.message {
                line.push_str(&format!("  {message}"));
            }
        }
        line
    }

    /// Format a whole run
    pub fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary)?,
            OutputFormat::Csv => write_csv(&summary.results)?,
            OutputFormat::Summary => self.format_summary_brief(summary),
        })
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Run {:24} - {:11} backend        ║\n",
            summary.run_id, summary.strategy
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for suite in summary.suites() {
            output.push_str(&format!("║  {suite}\n"));
            for result in summary.results.iter().filter(|r| r.suite_name() == suite) {
                output.push_str(&format!("║    {}\n", self.format_result_table(result)));
            }
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Skip: {:2} | Error: {:2}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms | Proxies: {}\n",
            summary.pass_rate(),
            summary.total_duration_ms,
            summary.proxies
        ));
        if summary.stopped_early {
            output.push_str("║  Stopped early: remaining suites were not started\n");
        }
        if let Some(fatal) = &summary.fatal {
            let fatal = if self.colorize {
                format!("\x1b[31m{fatal}\x1b[0m")
            } else {
                fatal.clone()
            };
            output.push_str(&format!("║  Aborted: {fatal}\n"));
        }
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        let mut line = format!(
            "{} ({}): {}/{} passed ({:.1}%), {} failed, {} errors, {} skipped in {}ms",
            summary.run_id,
            summary.strategy,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.errors,
            summary.skipped,
            summary.total_duration_ms
        );
        if let Some(fatal) = &summary.fatal {
            line.push_str(&format!(" [aborted: {fatal}]"));
        }
        line
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn write_csv(results: &[UnitResult]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["id", "suite", "name", "status", "duration_ms", "message"])?;
    for result in results {
        let status = result.status.to_string();
        let duration = result.duration_ms.to_string();
        writer.write_record([
            result.id.as_str(),
            result.suite_name(),
            result.name.as_str(),
            status.as_str(),
            duration.as_str(),
            result.message.as_deref().unwrap_or(""),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write a run to a file, without colors
pub fn write_results_to_file(
    path: impl AsRef<Path>,
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<()> {
    let path = path.as_ref();
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
