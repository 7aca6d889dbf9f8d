use auditor_abstractions::async_trait::async_trait;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:P/AC:H/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const SUMMARY: &str = "detected format string";

lazy_static! {
	static ref INJECTABLE: Regex = Regex::new(r"(://|[<>/&?])").unwrap();
}

// A `%s` in a string that also carries URL or markup characters is worth a look.
fn looks_injectable(value: &str) -> bool { value.contains("%s") && INJECTABLE.is_match(value) }

/// Flags format strings whose expansion ends up inside URLs or markup.
pub struct FormatStringDetector;

#[async_trait]
impl Detector for FormatStringDetector {
	fn option(&self) -> &'static str { "security-format-string" }

	fn description(&self) -> &'static str { "Detects format string usages" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for cl in q.consts(&InvocationPattern::new("const-string", "%s")?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let value = cl.target_value();
			if looks_injectable(value) {
				context.raise_issue(
					Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY)
						.with_info1(value)
						.with_source(qualname),
				)?;
			}
		}

		for (name, value) in context.string_resources().await {
			if looks_injectable(&value) {
				context.raise_issue(
					Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY)
						.with_info1(value)
						.with_source(Some(format!("R.string.{name}"))),
				)?;
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn urls_and_markup_around_a_placeholder_qualify() {
		assert!(looks_injectable("https://x/?q=%s"));
		assert!(looks_injectable("<b>%s</b>"));
		assert!(!looks_injectable("%s records"));
		assert!(!looks_injectable("plain token"));
	}
}
