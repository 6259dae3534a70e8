//! End-of-run aggregation and the human-readable report

use crate::{format_duration, PageResult};
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

const RULE: &str = "==================================================";

/// Tallies over the final result sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub screenshot_files: usize,
    /// Failed results, in run order
    pub failures: Vec<PageResult>,
    /// Results carrying warnings, pass or fail, in run order
    pub warned: Vec<PageResult>,
}

impl RunSummary {
    pub fn from_results(results: &[PageResult]) -> Self {
        let failures: Vec<PageResult> = results.iter().filter(|r| !r.success).cloned().collect();
        let warned = results
            .iter()
            .filter(|r| !r.warnings.is_empty())
            .cloned()
            .collect();

        Self {
            checked: results.len(),
            passed: results.len() - failures.len(),
            failed: failures.len(),
            screenshot_files: results.iter().map(|r| r.screenshots.len()).sum(),
            failures,
            warned,
        }
    }

    /// 0 when nothing failed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// What happened around the results, for the report footer
#[derive(Debug, Clone, Default)]
pub struct RunContext<'a> {
    pub output_dir: Option<&'a Path>,
    pub elapsed: Duration,
    /// Label of the critical job that stopped the run; jobs never started are not counted
    pub aborted_by: Option<&'a str>,
}

pub fn render_report(summary: &RunSummary, context: &RunContext<'_>) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Page audit summary");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Jobs checked:     {}", summary.checked);
    let _ = writeln!(out, "Passed:           {}", summary.passed);
    let _ = writeln!(out, "Failed:           {}", summary.failed);
    let _ = writeln!(out, "Screenshot files: {}", summary.screenshot_files);
    let _ = writeln!(out, "Duration:         {}", format_duration(context.elapsed));

    write_section(&mut out, "Failures", &summary.failures, |r| &r.errors);
    write_section(&mut out, "Warnings", &summary.warned, |r| &r.warnings);

    if let Some(label) = context.aborted_by {
        let _ = writeln!(out);
        let _ = writeln!(out, "Critical failure: {label}");
        let _ = writeln!(out, "Run aborted; later batches were not started");
    }

    if let Some(dir) = context.output_dir {
        let _ = writeln!(out);
        let _ = writeln!(out, "Screenshots saved to: {}", dir.display());
    }

    out
}

fn write_section<F>(out: &mut String, title: &str, results: &[PageResult], messages: F)
where
    F: Fn(&PageResult) -> &Vec<String>,
{
    if results.is_empty() {
        return;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{title}:");
    for result in results {
        let _ = writeln!(out, "  {}", result.label());
        for message in messages(result) {
            let _ = writeln!(out, "    - {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, errors: &[&str], warnings: &[&str], files: usize) -> PageResult {
        PageResult {
            url: url.to_string(),
            device: "desktop".to_string(),
            success: errors.is_empty(),
            errors: errors.iter().map(|s| s.to_string()).collect(),
            warnings: warnings.iter().map(|s| s.to_string()).collect(),
            duration: Duration::from_millis(900),
            screenshots: (0..files).map(|i| format!("file{i}.png")).collect(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result("https://a.example/", &[], &[], 1),
            result("https://b.example/", &["Status 500"], &[], 0),
            result("https://c.example/", &[], &["Slow page load: 7.0s"], 3),
            result("https://d.example/", &["Missing selector: #app"], &["Slow page load: 5.5s"], 1),
        ];

        let summary = RunSummary::from_results(&results);

        assert_eq!(summary.checked, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.screenshot_files, 5);
        assert_eq!(
            summary.failures.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(),
            vec!["https://b.example/", "https://d.example/"]
        );
        assert_eq!(
            summary.warned.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(),
            vec!["https://c.example/", "https://d.example/"]
        );
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_zero_when_only_warnings() {
        let results = vec![result("https://a.example/", &[], &["Selector not visible"], 1)];
        assert_eq!(RunSummary::from_results(&results).exit_code(), 0);
        assert_eq!(RunSummary::from_results(&[]).exit_code(), 0);
    }

    #[test]
    fn test_report_layout() {
        let results = vec![
            result("https://a.example/", &[], &[], 1),
            result("https://b.example/", &["Status 404"], &[], 0),
        ];
        let summary = RunSummary::from_results(&results);
        let report = render_report(
            &summary,
            &RunContext {
                output_dir: Some(Path::new("screenshots/2025-01-31_09-15-00")),
                elapsed: Duration::from_secs(75),
                ..Default::default()
            },
        );

        assert!(report.contains("Jobs checked:     2\n"));
        assert!(report.contains("Passed:           1\n"));
        assert!(report.contains("Failed:           1\n"));
        assert!(report.contains("Screenshot files: 1\n"));
        assert!(report.contains("Duration:         1m 15s\n"));
        assert!(report.contains("Failures:\n  https://b.example/ [desktop]\n    - Status 404\n"));
        assert!(!report.contains("Warnings:"));
        assert!(!report.contains("Aborted"));
        assert!(report.ends_with("Screenshots saved to: screenshots/2025-01-31_09-15-00\n"));
    }

    #[test]
    fn test_report_mentions_abort() {
        let results = vec![result("https://a.example/", &["Timeout exceeded"], &[], 0)];
        let report = render_report(
            &RunSummary::from_results(&results),
            &RunContext {
                aborted_by: Some("https://a.example/ [desktop]"),
                ..Default::default()
            },
        );

        assert!(report.contains("Critical failure: https://a.example/ [desktop]\n"));
        assert!(report.contains("Run aborted; later batches were not started\n"));
        // Jobs that never ran are neither failed nor skipped
        assert!(report.contains("Jobs checked:     1\n"));
        assert!(report.contains("Failed:           1\n"));
        assert!(!report.contains("skipped"));
        assert!(!report.contains("not run"));
    }
}
