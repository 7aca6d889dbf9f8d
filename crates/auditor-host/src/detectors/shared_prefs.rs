use auditor_abstractions::async_trait::async_trait;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:L/AC:H/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const SUMMARY: &str = "detected SharedPreference access";
const SYNOPSIS: &str = "The application is using SharedPreferences. This is purely informational; Using the subsystem alone does not constitute a security issue.";

const ACCESSES: &[(&str, &str)] = &[
	(r"Landroid/content/SharedPreferences;->get(Boolean|Float|Int|String|StringSet)\(Ljava/lang/String;", "read"),
	(r"Landroid/content/SharedPreferences\$Editor;->put(Boolean|Float|Int|String|StringSet)\(Ljava/lang/String;", "write"),
	(r"Landroid/content/SharedPreferences\$Editor;->remove\(Ljava/lang/String;", "delete"),
];

/// Notes every SharedPreferences get/put/remove together with the key it touches.
pub struct SecuritySharedPreferencesDetector;

#[async_trait]
impl Detector for SecuritySharedPreferencesDetector {
	fn option(&self) -> &'static str { "security-sharedpref" }

	fn description(&self) -> &'static str { "Detects SharedPreferences access" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for (pattern, kind) in ACCESSES {
			for cl in q.invocations(&InvocationPattern::new("invoke-interface", pattern)?)? {
				let qualname = q.qualname_of(&cl)?;
				if context.is_qualname_excluded(qualname.as_deref()) {
					continue;
				}

				let key = dataflow::solved_constant_data_in_invocation(context.store(), &cl, 0)
					.unwrap_or_else(|_| "(unknown name)".to_string());

				context.raise_issue(
					Issue::new(self.option(), Confidence::Certain, CVSS, SUMMARY)
						.with_synopsis(SYNOPSIS)
						.with_info1(key)
						.with_info2(*kind)
						.with_source(qualname),
				)?;
			}
		}

		Ok(())
	}
}
