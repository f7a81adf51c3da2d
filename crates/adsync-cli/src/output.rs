use adsync_core::domain::{BatchReport, SyncStatus};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output with status marks
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// One JSON document per message on stdout, diagnostics on stderr
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({"success": true, "message": message}));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Milliseconds as `850ms` or `12.4s`
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Prints a finished batch
///
/// Human output lists every principal that changed or failed; skipped
/// principals only show up with `verbose`.
pub fn print_report(formatter: &dyn OutputFormatter, report: &BatchReport, verbose: bool) {
    match serde_json::to_value(report) {
        Ok(json) => formatter.print_json(&json),
        Err(e) => formatter.error(&format!("Failed to serialize report: {}", e)),
    }

    let counts = &report.counts;
    let headline = format!(
        "{} finished in {}: {} created, {} updated, {} skipped, {} failed",
        capitalize(&report.kind.to_string()),
        format_duration_ms(report.elapsed_ms),
        counts.created,
        counts.updated,
        counts.skipped,
        counts.failed,
    );
    match &report.aborted {
        Some(reason) => formatter.error(&format!("{} (stopped early: {})", headline, reason)),
        None if counts.failed > 0 => formatter.warn(&headline),
        None => formatter.success(&headline),
    }

    for warning in &report.warnings {
        formatter.warn(warning);
    }
    if !report.anomalies.is_empty() {
        formatter.warn(&format!(
            "{} identity anomal{}:",
            report.anomalies.len(),
            if report.anomalies.len() == 1 { "y" } else { "ies" }
        ));
        for anomaly in &report.anomalies {
            formatter.info(&format!("  - {}", anomaly));
        }
    }

    for outcome in &report.outcomes {
        match outcome.status {
            SyncStatus::Created | SyncStatus::Updated => {
                formatter.info(&format!(
                    "{} {} ({} change{})",
                    outcome.status,
                    outcome.identifier,
                    outcome.changes.len(),
                    plural(outcome.changes.len())
                ));
                if verbose {
                    for change in &outcome.changes {
                        formatter.info(&format!("    {}", change));
                    }
                }
            }
            SyncStatus::Failed => formatter.info(&format!(
                "failed  {}: {}",
                outcome.identifier,
                outcome.reason.as_deref().unwrap_or("unknown error")
            )),
            SyncStatus::Skipped if verbose => formatter.info(&format!(
                "skipped {}: {}",
                outcome.identifier,
                outcome.reason.as_deref().unwrap_or("-")
            )),
            SyncStatus::Skipped => {}
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
