//! Terminal rendering of mirror progress and diagnostics.

use provider_mirror_core::{DependencyReport, Diagnostic, Reporter, Severity};
use std::io::{self, Write};

/// Prints each dependency's progress lines to stdout as soon as it is
/// reported, and its diagnostics to stderr.
#[derive(Debug, Default)]
pub struct TextReporter;

impl Reporter for TextReporter {
    fn dependency_finished(&self, report: &DependencyReport) {
        let mut stdout = io::stdout().lock();
        for line in &report.messages {
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();

        if !report.diagnostics.is_empty() {
            let mut stderr = io::stderr().lock();
            for diagnostic in &report.diagnostics {
                let _ = write!(stderr, "{}", render_diagnostic(diagnostic));
            }
        }
    }
}

/// Collects nothing; the JSON envelope is written once the run ends.
#[derive(Debug, Default)]
pub struct QuietReporter;

impl Reporter for QuietReporter {
    fn dependency_finished(&self, _report: &DependencyReport) {}
}

/// Human-readable block for one diagnostic.
#[must_use]
pub fn render_diagnostic(diagnostic: &Diagnostic) -> String {
    let label = match diagnostic.severity {
        Severity::Error => "Error",
        Severity::Warning => "Warning",
    };
    format!(
        "\n{label}: {}\n\n{}\n\n",
        diagnostic.summary, diagnostic.detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_diagnostic() {
        let rendered = render_diagnostic(&Diagnostic::error(
            "Provider not available",
            "Failed to download registry.example.com/ns/foo from its origin registry: boom.",
        ));
        assert_eq!(
            rendered,
            "\nError: Provider not available\n\nFailed to download registry.example.com/ns/foo from its origin registry: boom.\n\n"
        );

        let rendered = render_diagnostic(&Diagnostic::warning("Index ignored", "corrupt"));
        assert!(rendered.starts_with("\nWarning: Index ignored"));
    }
}
