use auditor_abstractions::async_trait::async_trait;
use auditor_core::issue::{Confidence, Issue};
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:L/A:N/";
const SUMMARY: &str = "Potential client-side XSS (JQuery)";
const SYNOPSIS: &str = "The application pours literal HTML in JQuery context.";

/// Flags `.html(` sinks in bundled JQuery-style scripts.
pub struct ClientXSSJQDetector;

#[async_trait]
impl Detector for ClientXSSJQDetector {
	fn option(&self) -> &'static str { "security-cxss-jq" }

	fn description(&self) -> &'static str { "Detects potential client-side XSS vector in JQuery-based apps" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		lazy_static! {
			static ref HTML_SINK: Regex = Regex::new(r"\.html\(").unwrap();
		}

		for (path, blob) in context.query().file_enum("root/assets/%.js")? {
			let content = String::from_utf8_lossy(&blob);

			for line in content.lines() {
				for _ in HTML_SINK.find_iter(line) {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY)
							.with_synopsis(SYNOPSIS)
							.with_info1(format!("{line} ({path})")),
					)?;
				}
			}
		}

		Ok(())
	}
}
