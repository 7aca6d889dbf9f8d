use auditor_abstractions::async_trait::async_trait;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:P/AC:H/PR:N/UI:N/S:U/C:L/I:N/A:N/";
const SUMMARY: &str = "detected logging";

// Log.d/w/i/e/wtf and friends, System.out.print*, and printStackTrace.
const LOG_APIS: &str = r"L.*->([dwie]|debug|error|exception|warning|info|notice|wtf)\(Ljava/lang/String;Ljava/lang/String;.*?Ljava/lang/(Throwable|.*?Exception);|L.*;->print(ln)?\(Ljava/lang/String;|LException;->printStackTrace\(";

/// Flags logging call sites, resolving the logged tag or message where the dataflow allows.
pub struct LogDetector;

#[async_trait]
impl Detector for LogDetector {
	fn option(&self) -> &'static str { "security-log" }

	fn description(&self) -> &'static str { "Detects logging activities" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for cl in q.invocations(&InvocationPattern::new("invoke-", LOG_APIS)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let target = cl.target_value().to_string();

			// Log-style APIs carry the message at argument 1, print-style at argument 0;
			// printStackTrace carries nothing resolvable.
			let message = if !target.contains("print") {
				dataflow::solved_constant_data_in_invocation(context.store(), &cl, 1).ok()
			} else if !target.contains("Exception;->") {
				dataflow::solved_constant_data_in_invocation(context.store(), &cl, 0).ok()
			} else {
				None
			};

			let mut issue = Issue::new(self.option(), Confidence::Tentative, CVSS, SUMMARY)
				.with_info1(target)
				.with_source(qualname);
			if let Some(message) = message {
				issue = issue.with_info2(message);
			}

			context.raise_issue(issue)?;
		}

		Ok(())
	}
}
