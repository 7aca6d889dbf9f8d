use std::collections::BTreeSet;

use auditor_abstractions::async_trait::async_trait;
use auditor_abstractions::tracing::warn;
use auditor_abstractions::xml::XmlElement;
use auditor_core::dataflow;
use auditor_core::issue::{Confidence, Issue};
use auditor_core::model::InvocationPattern;
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AnalysisContext;
use crate::framework::{Detector, DetectorError};

use super::layout::LayoutSizeGuesser;

const SEEDS: &[&str] = &["WebView", "XWalkView", "GeckoView"];

/// Computes the fixed point of the WebView-like class set: the seeds plus every indexed class
/// reachable over the subclass/implementer relation. Bounded by the number of classes in the
/// store.
fn webview_target_classes(context: &AnalysisContext) -> Result<BTreeSet<String>, DetectorError> {
	let q = context.query();
	let mut targets: BTreeSet<String> = SEEDS.iter().map(|s| s.to_string()).collect();

	let mut more = true;
	while more {
		more = false;

		let union = Regex::new(&targets.iter().cloned().collect::<Vec<_>>().join("|"))?;
		for cl in q.related_classes(&union)? {
			if let Some(name) = q.class_name_of(&cl) {
				if targets.insert(name) {
					more = true;
				}
			}
		}
	}

	Ok(targets)
}

fn descendants_with_container<'a>(root: &'a XmlElement) -> Vec<(&'a XmlElement, Option<&'a XmlElement>)> {
	let mut out = vec![(root, None)];
	let mut stack = vec![root];

	while let Some(e) = stack.pop() {
		for child in &e.children {
			out.push((child, Some(e)));
			stack.push(child);
		}
	}

	out
}

/// Flags WebViews an attacker has a realistic surface on: large on-screen declarations in layout
/// resources, and cleartext URLs loaded into any WebView-like class.
pub struct SecurityTamperableWebViewDetector;

const TAMPERABLE_SUMMARY: &str = "tamperable webview";
const TAMPERABLE_URL_SUMMARY: &str = "tamperable webview with URL";
const TAMPERABLE_CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:N/UI:R/S:U/C:N/I:L/A:L/";
const TAMPERABLE_URL_CVSS: &str = "CVSS:3.0/AV:N/AC:L/PR:N/UI:R/S:U/C:N/I:L/A:L/";

#[async_trait]
impl Detector for SecurityTamperableWebViewDetector {
	fn option(&self) -> &'static str { "security-tamperable-webview" }

	fn description(&self) -> &'static str { "Detects tamperable WebView" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();
		let targets = webview_target_classes(context)?;

		for (path, blob) in q.file_enum("%/res/%layout%.xml")? {
			let Some(root) = XmlElement::parse(&blob) else { continue };

			for target in &targets {
				let tag = context.class_name_of_dalvik_class_type(target).replace('$', "_");

				for (element, container) in descendants_with_container(&root) {
					if element.tag != tag {
						continue;
					}

					let size = LayoutSizeGuesser.guessed_size(element, container, &path);
					if size <= 0.5 {
						continue;
					}

					match element.attr("android:id") {
						Some(id) => context.raise_issue(
							Issue::new(self.option(), Confidence::Tentative, TAMPERABLE_CVSS, TAMPERABLE_SUMMARY)
								.with_info1(format!("{id} (score: {size:.02})"))
								.with_source(Some(context.source_name_of_disassembled_resource(&path))),
						)?,
						None => warn!(path = path.as_str(), "oversized webview declaration without an id"),
					}
				}
			}
		}

		for op in q.invocations(&InvocationPattern::new("invoke-", ";->loadUrl")?)? {
			let qualname = q.qualname_of(&op)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			if let Ok(url) = dataflow::solved_constant_data_in_invocation(context.store(), &op, 0) {
				if url.starts_with("http://") {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, TAMPERABLE_URL_CVSS, TAMPERABLE_URL_SUMMARY)
							.with_info1(url)
							.with_source(qualname),
					)?;
				}
			}
		}

		Ok(())
	}
}

/// Flags insecure WebView wiring: Javascript interfaces reachable on old API levels, permissive
/// mixed-content modes, and asset HTML without a sound content security policy.
pub struct SecurityInsecureWebViewDetector;

const INSECURE_CVSS: &str = "CVSS:3.0/AV:N/AC:L/PR:N/UI:N/S:C/C:L/I:L/A:L/";
const MIXED_CVSS: &str = "CVSS:3.0/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:L/A:L/";
const MIXED_COMPAT_CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:N/UI:N/S:U/C:L/I:N/A:N/";
const CSP_CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:N/UI:N/S:U/C:N/I:L/A:N/";
const CSP_INFO_CVSS: &str = "CVSS:3.0/AV:N/AC:H/PR:N/UI:N/S:U/C:N/I:N/A:N/";
const JSIF_SUMMARY: &str = "insecure Javascript interface";
const MIXED_SUMMARY: &str = "insecure mixed content mode";
const MIXED_COMPAT_SUMMARY: &str = "potentially insecure mixed content mode";
const CSP_SUMMARY: &str = "insecure CSP";
const CSP_INFO_SUMMARY: &str = "detected CSP";

const ASSET_URL_PREFIX: &str = "file:///android_asset/";

#[async_trait]
impl Detector for SecurityInsecureWebViewDetector {
	fn option(&self) -> &'static str { "security-insecure-webview" }

	fn description(&self) -> &'static str { "Detects insecure WebView" }

	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError> {
		let q = context.query();

		let mut targets = webview_target_classes(context)?;
		for seed in SEEDS {
			targets.insert(format!("L.*{seed};"));
		}

		// https://developer.android.com/reference/android/webkit/WebView.html#addJavascriptInterface(java.lang.Object,%2520java.lang.String)
		if context.get_min_sdk_version() <= 16 {
			for p in q.invocations(&InvocationPattern::new(
				"invoke-virtual",
				"Landroid/webkit/WebSettings;->setJavaScriptEnabled",
			)?)? {
				let qualname = q.qualname_of(&p)?;
				if context.is_qualname_excluded(qualname.as_deref()) {
					continue;
				}

				let Ok(enabled) = dataflow::solved_constant_data_in_invocation(context.store(), &p, 0) else {
					continue;
				};
				if enabled == "0x0" {
					continue;
				}

				for target in &targets {
					let pattern =
						InvocationPattern::new("invoke-virtual", &format!("{target}->addJavascriptInterface"))?;

					for site in q.invocations_in_class(&p, &pattern)? {
						let confidence =
							match dataflow::solved_constant_data_in_invocation(context.store(), &site, 0) {
								Ok(_) => Confidence::Firm,
								Err(_) => Confidence::Tentative,
							};

						context.raise_issue(
							Issue::new(self.option(), confidence, INSECURE_CVSS, JSIF_SUMMARY)
								.with_source(q.qualname_of(&site)?),
						)?;
					}
				}
			}
		}

		// https://developer.android.com/reference/android/webkit/WebSettings#setMixedContentMode(int)
		if context.get_min_sdk_version() >= 21 {
			for site in q.invocations(&InvocationPattern::new(
				"invoke-virtual",
				"Landroid/webkit/WebSettings;->setMixedContentMode",
			)?)? {
				let qualname = q.qualname_of(&site)?;
				if context.is_qualname_excluded(qualname.as_deref()) {
					continue;
				}

				let Ok(value) = dataflow::solved_constant_data_in_invocation(context.store(), &site, 0) else {
					continue;
				};

				match super::parse_hex_int(&value) {
					Some(0) => context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, MIXED_CVSS, MIXED_SUMMARY)
							.with_info1("MIXED_CONTENT_ALWAYS_ALLOW")
							.with_source(qualname),
					)?,
					Some(2) => context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, MIXED_COMPAT_CVSS, MIXED_COMPAT_SUMMARY)
							.with_info1("MIXED_CONTENT_COMPATIBILITY_MODE")
							.with_source(qualname),
					)?,
					_ => {}
				}
			}
		} else {
			for target in &targets {
				for site in q.invocations(&InvocationPattern::new("invoke-virtual", &format!("{target}->loadUrl"))?)? {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, INSECURE_CVSS, MIXED_SUMMARY)
							.with_info1("mixed mode always enabled in API < 21")
							.with_source(q.qualname_of(&site)?),
					)?;
				}
			}
		}

		for op in q.invocations(&InvocationPattern::new("invoke-", ";->loadUrl")?)? {
			let qualname = q.qualname_of(&op)?;
			if context.is_qualname_excluded(qualname.as_deref()) {
				continue;
			}

			let Ok(url) = dataflow::solved_constant_data_in_invocation(context.store(), &op, 0) else {
				continue;
			};
			if !url.starts_with(ASSET_URL_PREFIX) {
				continue;
			}

			let path = url.replace(ASSET_URL_PREFIX, "assets/");
			let Some(blob) = q.file_get(&format!("root/{path}"))? else { continue };

			let content = String::from_utf8_lossy(&blob).into_owned();
			let csp = content_security_policy_of(&content);

			match csp {
				Some(csp) if !csp.to_lowercase().contains("unsafe") && !csp.to_lowercase().contains("http:") => {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, CSP_INFO_CVSS, CSP_INFO_SUMMARY)
							.with_info1(path)
							.with_info2(csp)
							.with_source(qualname),
					)?;
				}
				csp => {
					context.raise_issue(
						Issue::new(self.option(), Confidence::Firm, CSP_CVSS, CSP_SUMMARY)
							.with_info1(path)
							.with_info2(csp.unwrap_or_else(|| "default".to_string()))
							.with_source(qualname),
					)?;
				}
			}
		}

		Ok(())
	}
}

fn content_security_policy_of(content: &str) -> Option<String> {
	lazy_static! {
		static ref CSP_META: Regex =
			Regex::new(r#"(?i)<meta .*Content-Security-Policy.*content="(.*)?">"#).unwrap();
	}

	CSP_META.captures(content).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}
