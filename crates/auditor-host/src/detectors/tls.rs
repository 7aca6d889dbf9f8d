use std::collections::BTreeSet;

use auditor_abstractions::async_trait::async_trait;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

const CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:H/UI:R/S:C/C:L/I:L/A:L/";
const CVSS_INFO: &str = "CVSS:3.0/AV:N/AC:L/PR:L/UI:N/S:U/C:N/I:N/A:N/";
const SUMMARY: &str = "insecure TLS connection";

/// Looks for certificate (non-)pinning: a network security config that trusts user certificates,
/// explicit pin declarations, and hand-rolled trust managers or hostname verifiers.
pub struct SecurityTlsInterceptionDetector;

#[async_trait]
impl Detector for SecurityTlsInterceptionDetector {
	fn option(&self) -> &'static str { "security-tls-interception" }

	fn description(&self) -> &'static str { "Detects certificate (non-)pinning" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let mut pin_nsc = false;

		// Since API 24 the platform ships a locked-down default network security config, unless
		// the build is debuggable.
		if context.get_min_sdk_version() > 23 {
			let debuggable = context
				.parsed_manifest()
				.map(|m| m.find_all("application").iter().any(|a| a.attr("android:debuggable") == Some("true")))
				.unwrap_or(false);

			if !debuggable {
				pin_nsc = true;
			}
		}

		for (_, tree) in context.xml_resources().await {
			if !tree.tag.to_lowercase().contains("network-security-config") {
				continue;
			}

			for certificates in tree.find_all("certificates") {
				if certificates.attr("src") == Some("user") {
					pin_nsc = false;
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY)
							.with_info1("user-trusting network security config detected"),
					)?;
				}
			}

			for pin in tree.find_all("pin") {
				let digest = pin.attr("digest").unwrap_or("(unknown)");

				context.raise_issue(
					Issue::new(self.option(), Confidence::Firm, CVSS_INFO, "explicit certificate pinning")
						.with_info1(format!("{digest}:{}", pin.text)),
				)?;
			}
		}

		if !pin_nsc
			&& self.pinning_trust_managers(context)?.is_empty()
			&& self.pinning_hostname_verifiers(context)?.is_empty()
		{
			context.raise_issue(
				Issue::new(self.option(), Confidence::Firm, CVSS, SUMMARY).with_info1("no pinning detected"),
			)?;
		}

		Ok(())
	}
}

impl SecurityTlsInterceptionDetector {
	/// Classes whose `checkServerTrusted` actually verifies or rejects, intersected with the trust
	/// manager types that flow into an `SSLContext.init` call.
	fn pinning_trust_managers(&self, context: &AnalysisContext) -> Result<BTreeSet<String>, DetectorError> {
		let q = context.query();
		let mut pins = BTreeSet::new();

		for m in q.methods_in_class("checkServerTrusted", "X509TrustManager")? {
			for probe in ["verify", "throw"] {
				if q.matches_in_method(&m, &InvocationPattern::new(probe, "")?)?.is_empty() {
					continue;
				}
				if let Some(class) = q.class_of_method(&m)? {
					if let Some(name) = q.class_name_of(&class) {
						pins.insert(name);
					}
				}
			}
		}

		if !pins.is_empty() {
			let mut custom_sslcontext_detected = false;

			for cl in q.invocations(&InvocationPattern::new("invoke-virtual", "Ljavax/net/ssl/SSLContext;->init")?)? {
				custom_sslcontext_detected = true;

				let types = dataflow::solved_typeset_in_invocation(context.store(), &cl, 1);
				pins = pins.intersection(&types).cloned().collect();
			}

			if !custom_sslcontext_detected {
				return Ok(BTreeSet::new());
			}
		}

		Ok(pins)
	}

	/// Classes whose `HostnameVerifier.verify` consults the hostname or the peer certificates.
	fn pinning_hostname_verifiers(&self, context: &AnalysisContext) -> Result<BTreeSet<String>, DetectorError> {
		let q = context.query();
		let mut pins = BTreeSet::new();

		for m in q.methods_in_class("verify(Ljava/lang/String;Ljavax/net/ssl/SSLSession;)Z", "HostnameVerifier")? {
			let probing = q.matches_in_method(
				&m,
				&InvocationPattern::new("invoke", "contains|equals|verify|Ljavax/net/ssl/SSLSession;->getPeerCertificates")?,
			)?;

			if !probing.is_empty() {
				if let Some(class) = q.class_of_method(&m)? {
					if let Some(name) = q.class_name_of(&class) {
						pins.insert(name);
					}
				}
			}
		}

		Ok(pins)
	}
}
