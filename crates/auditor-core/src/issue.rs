use std::fmt;

/// How certain a detector is that a finding is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
	Tentative,
	Firm,
	Certain,
}

impl Confidence {
	pub fn as_str(&self) -> &'static str {
		match self {
			Confidence::Tentative => "tentative",
			Confidence::Firm => "firm",
			Confidence::Certain => "certain",
		}
	}

	pub fn parse(name: &str) -> Confidence {
		match name {
			"certain" => Confidence::Certain,
			"firm" => Confidence::Firm,
			_ => Confidence::Tentative,
		}
	}
}

impl fmt::Display for Confidence {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Severity buckets derived from a CVSS score. The derivation itself happens outside the core; the
/// vocabulary lives here because issue consumers share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Info,
	Low,
	Medium,
	High,
	Critical,
}

impl Severity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Severity::Info => "info",
			Severity::Low => "low",
			Severity::Medium => "medium",
			Severity::High => "high",
			Severity::Critical => "critical",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A single finding emitted by a detector.
///
/// Issues are append-only during detection; the store coalesces duplicates carrying the same
/// `(detector_id, summary, source, info1, info2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
	pub detector_id: String,
	pub confidence: Confidence,
	pub cvss3_vector: String,
	pub summary: String,
	pub synopsis: Option<String>,
	pub source: Option<String>,
	pub row: Option<i64>,
	pub col: Option<i64>,
	pub info1: Option<String>,
	pub info2: Option<String>,
}

impl Issue {
	pub fn new(detector_id: &str, confidence: Confidence, cvss3_vector: &str, summary: &str) -> Issue {
		Issue {
			detector_id: detector_id.to_string(),
			confidence,
			cvss3_vector: cvss3_vector.to_string(),
			summary: summary.to_string(),
			synopsis: None,
			source: None,
			row: None,
			col: None,
			info1: None,
			info2: None,
		}
	}

	pub fn with_synopsis(mut self, synopsis: &str) -> Issue {
		self.synopsis = Some(synopsis.to_string());
		self
	}

	pub fn with_source(mut self, source: Option<String>) -> Issue {
		self.source = source;
		self
	}

	pub fn with_info1(mut self, info1: impl Into<String>) -> Issue {
		self.info1 = Some(info1.into());
		self
	}

	pub fn with_info2(mut self, info2: impl Into<String>) -> Issue {
		self.info2 = Some(info2.into());
		self
	}

	/// The summary followed by whatever detail the detector attached, colon-joined.
	pub fn brief_description(&self) -> String {
		[Some(self.summary.as_str()), self.info1.as_deref(), self.info2.as_deref()]
			.into_iter()
			.flatten()
			.collect::<Vec<_>>()
			.join(": ")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn brief_description_joins_available_detail() {
		let issue = Issue::new("security-log", Confidence::Tentative, "CVSS:3.0/AV:P/", "detected logging")
			.with_info1("Landroid/util/Log;->d");

		assert_eq!(issue.brief_description(), "detected logging: Landroid/util/Log;->d");
	}

	#[test]
	fn confidence_ordering_ranks_certain_highest() {
		assert!(Confidence::Certain > Confidence::Firm);
		assert!(Confidence::Firm > Confidence::Tentative);
	}
}
