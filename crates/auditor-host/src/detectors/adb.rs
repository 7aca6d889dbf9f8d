use auditor_abstractions::async_trait::async_trait;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const SUMMARY: &str = "USB debugging detection";
const SYNOPSIS: &str = "The application is probing for USB debugging (adbd.)";

/// Flags reads of the `adb_enabled` system setting.
pub struct ADBProbeDetector;

#[async_trait]
impl Detector for ADBProbeDetector {
	fn option(&self) -> &'static str { "security-adb-detect" }

	fn description(&self) -> &'static str { "Detects probe of adbd status." }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for cl in q.invocations(&InvocationPattern::new(
			"invoke-",
			r"^Landroid/provider/Settings\$(Global|Secure);->getInt\(",
		)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			for found in dataflow::solved_possible_constant_data_in_invocation(context.store(), &cl, 1) {
				if found == "adb_enabled" {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY)
							.with_synopsis(SYNOPSIS)
							.with_source(qualname.clone()),
					)?;
				}
			}
		}

		Ok(())
	}
}
