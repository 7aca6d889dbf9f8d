use std::collections::BTreeSet;

use auditor_abstractions::async_trait::async_trait;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:P/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const PATH_PATTERN: &str = r"^/[{}$%a-zA-Z0-9_-]+(/[{}$%a-zA-Z0-9_-]+)+";

lazy_static! {
	static ref ABSOLUTE_PATH: Regex = Regex::new(PATH_PATTERN).unwrap();
	static ref ROOT_HINT: Regex = Regex::new(r"Sup|su|xbin|sbin|root").unwrap();
}

/// Flags lopsided rooted-device probing: path-based probes without remote attestation, or remote
/// attestation without path-based probes. An application doing both stays quiet.
pub struct SecurityInsecureRootedDetector;

#[async_trait]
impl Detector for SecurityInsecureRootedDetector {
	fn option(&self) -> &'static str { "security-insecure-rooted" }

	fn description(&self) -> &'static str { "Detects insecure rooted device probes" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		let mut attestations: BTreeSet<String> = BTreeSet::new();
		let mut found: BTreeSet<String> = BTreeSet::new();

		for cl in q.invocations(&InvocationPattern::new(
			"invoke-",
			r"Lcom/google/android/gms/safetynet/SafetyNetClient;->attest\(\[BLjava/lang/String;\)",
		)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let verdict_accesses =
				q.consts_in_class(&cl, &InvocationPattern::new("const-string", "ctsProfileMatch|basicIntegrity")?)?;
			if let (false, Some(qualname)) = (verdict_accesses.is_empty(), qualname) {
				attestations.insert(qualname);
			}
		}

		for cl in q.consts(&InvocationPattern::new("const-string", PATH_PATTERN)?)? {
			let qualname = q.qualname_of(&cl)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			found.extend(ABSOLUTE_PATH.find_iter(cl.target_value()).map(|m| m.as_str().to_string()));
		}
		for (_, value) in context.string_resources().await {
			found.extend(ABSOLUTE_PATH.find_iter(&value).map(|m| m.as_str().to_string()));
		}

		let probes: BTreeSet<String> = found.into_iter().filter(|s| ROOT_HINT.is_match(s)).collect();

		if !probes.is_empty() && attestations.is_empty() {
			context.raise_issue(
				Issue::new(self.option(), Confidence::Firm, CVSS, "manual root detections without remote attestations")
					.with_info1(probes.iter().join(",")),
			)?;
		} else if !attestations.is_empty() && probes.is_empty() {
			context.raise_issue(
				Issue::new(self.option(), Confidence::Firm, CVSS, "remote attestations without manual root detections")
					.with_info1(attestations.iter().join(",")),
			)?;
		}

		Ok(())
	}
}
