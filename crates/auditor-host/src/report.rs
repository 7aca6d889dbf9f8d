use auditor_abstractions::tracing::info;
use auditor_core::issue::{Issue, Severity};

/// Emits findings to the console, one line per issue:
/// `source:row:col:severity{confidence}:description [-W detector_id]`.
///
/// Severity derivation from the CVSS vector happens outside the core; the caller passes the bucket
/// it computed.
pub struct ConsoleNoter;

impl ConsoleNoter {
	pub fn note(issue: &Issue, severity: Severity) { info!("{}", Self::formatted(issue, severity)); }

	pub fn formatted(issue: &Issue, severity: Severity) -> String {
		format!(
			"{source}:{row}:{col}:{severity}{{{confidence}}}:{description} [-W{detector_id}]",
			source = issue.source.as_deref().unwrap_or("(global)"),
			row = issue.row.unwrap_or(0),
			col = issue.col.unwrap_or(0),
			severity = severity,
			confidence = issue.confidence,
			description = issue.brief_description(),
			detector_id = issue.detector_id,
		)
	}
}
