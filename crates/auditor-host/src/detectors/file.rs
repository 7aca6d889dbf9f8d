use auditor_abstractions::async_trait::async_trait;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const OPEN_FILE_OUTPUT: &str = r"Landroid/content/Context;->openFileOutput\(Ljava/lang/String;I\)";

lazy_static! {
	static ref LOGGING_NAME: Regex = Regex::new(r"debug|log|info|report|screen|err|tomb|drop").unwrap();
	static ref KERNEL_PATH: Regex = Regex::new(r"^/proc/|^/sys/").unwrap();
}

/// Flags `openFileOutput` calls whose mode argument grants world access.
pub struct SecurityFilePermissionDetector;

const PERMISSION_CVSS: &str = "CVSS:3.0/AV:L/AC:L/PR:N/UI:N/S:C/C:L/I:L/A:L/";

#[async_trait]
impl Detector for SecurityFilePermissionDetector {
	fn option(&self) -> &'static str { "security-file-permission" }

	fn description(&self) -> &'static str { "Detects insecure file creation" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for cl in q.invocations(&InvocationPattern::new("invoke-virtual", OPEN_FILE_OUTPUT)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let Ok(value) = dataflow::solved_constant_data_in_invocation(context.store(), &cl, 1) else {
				continue;
			};
			let Some(mode) = super::parse_hex_int(&value) else { continue };

			if mode & 3 != 0 {
				let grant = if mode & 1 != 0 { "MODE_WORLD_READABLE" } else { "MODE_WORLD_WRITEABLE" };

				context.raise_issue(
					Issue::new(self.option(), Confidence::Certain, PERMISSION_CVSS, "insecure file permission")
						.with_info1(grant)
						.with_source(qualname),
				)?;
			}
		}

		Ok(())
	}
}

/// Flags file creation, splitting out names that smell like on-device logging.
pub struct SecurityFileWriteDetector;

const LOGGING_CVSS: &str = "CVSS:3.0/AV:L/AC:H/PR:N/UI:N/S:U/C:L/I:N/A:N/";
const LOGGING_SUMMARY: &str = "detected potential logging into file";
const LOGGING_SYNOPSIS: &str = "The application is potentially logging into file.";
const WRITE_CVSS: &str = "CVSS:3.0/AV:L/AC:H/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const WRITE_SUMMARY: &str = "open files for writing";
const WRITE_SYNOPSIS: &str = "The application opens files for writing.";

#[async_trait]
impl Detector for SecurityFileWriteDetector {
	fn option(&self) -> &'static str { "security-file-write" }

	fn description(&self) -> &'static str { "Detects file creation" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		for cl in q.invocations(&InvocationPattern::new("invoke-virtual", OPEN_FILE_OUTPUT)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let target = dataflow::solved_constant_data_in_invocation(context.store(), &cl, 0)
				.unwrap_or_else(|_| "(unknown name)".to_string());

			let issue = if LOGGING_NAME.is_match(&target) {
				Issue::new(self.option(), Confidence::Certain, LOGGING_CVSS, LOGGING_SUMMARY)
					.with_synopsis(LOGGING_SYNOPSIS)
			} else {
				Issue::new(self.option(), Confidence::Certain, WRITE_CVSS, WRITE_SUMMARY)
					.with_synopsis(WRITE_SYNOPSIS)
			};

			context.raise_issue(issue.with_info1(target).with_source(qualname))?;
		}

		for cl in q.invocations(&InvocationPattern::new(
			"invoke-direct",
			r"java/io/File(Writer|OutputStream)?;-><init>\(Ljava/lang/String;\)",
		)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let Ok(target) = dataflow::solved_constant_data_in_invocation(context.store(), &cl, 0) else {
				continue;
			};

			if LOGGING_NAME.is_match(&target) && !KERNEL_PATH.is_match(&target) {
				context.raise_issue(
					Issue::new(self.option(), Confidence::Tentative, LOGGING_CVSS, LOGGING_SUMMARY)
						.with_synopsis(LOGGING_SYNOPSIS)
						.with_info1(target)
						.with_source(qualname),
				)?;
			}
		}

		Ok(())
	}
}
