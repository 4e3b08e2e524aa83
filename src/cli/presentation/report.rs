//! Run presentation: class lists and run summaries.

use crate::session::RunReport;

pub fn format_class_list(classes: &[String]) -> String {
    classes.join("\n")
}

pub fn format_run_report(command: &str, report: &RunReport) -> String {
    let mut s = format!(
        "{}: {} queries, {} delivered",
        command, report.queries, report.delivered
    );
    if !report.failures.is_empty() {
        s.push_str(&format!("\n\nFailures ({}):", report.failures.len()));
        for f in &report.failures {
            s.push_str(&format!("\n  - {}: {}", f.subject, f.message));
        }
    }
    if !report.dropped_merges.is_empty() {
        s.push_str(&format!("\n\nDropped merges ({}):", report.dropped_merges.len()));
        for m in &report.dropped_merges {
            s.push_str(&format!("\n  - {}", m));
        }
    }
    s
}
