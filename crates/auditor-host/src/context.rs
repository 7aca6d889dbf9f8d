use std::sync::Arc;

use auditor_abstractions::resources::AnyResourceProvider;
use auditor_abstractions::tracing::debug;
use auditor_abstractions::xml::XmlElement;
use auditor_core::issue::{Issue, Severity};
use auditor_core::query::Query;
use auditor_core::store::Store;
use regex::RegexSet;

use crate::framework::DetectorError;

/// Derives a severity bucket from a CVSS v3 vector. The scoring model itself lives outside the
/// audit core; hosts plug one in when they want the severity floor enforced.
pub trait SeverityScorer: Send + Sync {
	fn severity_of(&self, cvss3_vector: &str) -> Severity;
}

/// Host-side configuration of an [`AnalysisContext`].
#[derive(Default)]
pub struct ContextConfig {
	/// Qualified-name globs (`*` wildcards) whose findings the user opted out of.
	pub exclude_qualnames: Vec<String>,
	/// Issues scored below this severity are dropped at the sink. Inert without a scorer.
	pub severity_floor: Option<Severity>,
	pub scorer: Option<Box<dyn SeverityScorer>>,
}

/// The shared, read-only state every detector runs against: the indexed store, the parsed
/// manifest, the resource provider and the precompiled exclusion matcher.
///
/// Issue emission is the sole write path and is serialized by the store.
pub struct AnalysisContext {
	store: Arc<Store>,
	resources: AnyResourceProvider,
	manifest: Option<XmlElement>,
	min_sdk_version: u32,
	exclusions: RegexSet,
	severity_floor: Option<Severity>,
	scorer: Option<Box<dyn SeverityScorer>>,
}

impl AnalysisContext {
	/// Builds a context over an indexed store, reading the manifest once up front.
	pub async fn new(
		store: Arc<Store>,
		resources: AnyResourceProvider,
		config: ContextConfig,
	) -> Result<AnalysisContext, DetectorError> {
		let manifest = resources.parsed_manifest().await;
		let min_sdk_version = manifest.as_ref().and_then(min_sdk_of).unwrap_or(1);
		let exclusions = RegexSet::new(config.exclude_qualnames.iter().map(|g| glob_to_regex(g)))?;

		Ok(AnalysisContext {
			store,
			resources,
			manifest,
			min_sdk_version,
			exclusions,
			severity_floor: config.severity_floor,
			scorer: config.scorer,
		})
	}

	pub fn store(&self) -> &Store { &self.store }

	pub fn query(&self) -> Query<'_> { self.store.query() }

	/// The `minSdkVersion` declared by the manifest, defaulting to 1.
	pub fn get_min_sdk_version(&self) -> u32 { self.min_sdk_version }

	/// The manifest tree, when one could be read.
	pub fn parsed_manifest(&self) -> Option<&XmlElement> { self.manifest.as_ref() }

	/// All XML resources of the package, forgivingly parsed.
	pub async fn xml_resources(&self) -> Vec<(String, XmlElement)> { self.resources.xml_resources().await }

	/// The string resources of the package.
	pub async fn string_resources(&self) -> Vec<(String, String)> { self.resources.string_resources().await }

	/// Converts a Dalvik type descriptor (`Lcom/example/Foo;`) to its source-level class name
	/// (`com.example.Foo`). Anything that is not a descriptor passes through unchanged.
	pub fn class_name_of_dalvik_class_type(&self, desc: &str) -> String { dotted_class_name(desc) }

	pub fn source_name_of_disassembled_resource(&self, path: &str) -> String {
		self.resources.source_name_of_disassembled_resource(path)
	}

	/// Returns `true` when the user excluded the qualified name from analysis. Ops outside any
	/// method (no qualname) are never excluded.
	pub fn is_qualname_excluded(&self, qualname: Option<&str>) -> bool {
		match qualname {
			Some(qualname) => self.exclusions.is_match(qualname),
			None => false,
		}
	}

	/// Appends an issue to the store, honoring the configured severity floor. Duplicates coalesce
	/// on insert.
	pub fn raise_issue(&self, issue: Issue) -> Result<(), DetectorError> {
		if let (Some(floor), Some(scorer)) = (self.severity_floor, self.scorer.as_ref()) {
			if scorer.severity_of(&issue.cvss3_vector) < floor {
				return Ok(());
			}
		}

		if self.store.issue_raise(&issue)? {
			debug!(detector = issue.detector_id.as_str(), summary = issue.summary.as_str(), "issue raised");
		}

		Ok(())
	}
}

fn dotted_class_name(desc: &str) -> String {
	match desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
		Some(inner) => inner.replace('/', "."),
		None => desc.to_string(),
	}
}

fn min_sdk_of(manifest: &XmlElement) -> Option<u32> {
	manifest
		.find_all("uses-sdk")
		.iter()
		.find_map(|e| e.attr("android:minSdkVersion"))
		.and_then(|v| v.parse().ok())
}

fn glob_to_regex(glob: &str) -> String {
	let mut out = String::from("^");

	for ch in glob.chars() {
		match ch {
			'*' => out.push_str(".*"),
			ch if "\\.+()[]{}^$|?".contains(ch) => {
				out.push('\\');
				out.push(ch);
			}
			ch => out.push(ch),
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn globs_translate_to_anchored_expressions() {
		assert_eq!(glob_to_regex("Lcom/example/*"), "^Lcom/example/.*");
		assert_eq!(glob_to_regex("Lcom/a$b;->run()V"), "^Lcom/a\\$b;->run\\(\\)V");
	}

	#[test]
	fn descriptors_convert_to_class_names() {
		assert_eq!(dotted_class_name("Lcom/example/Foo$Bar;"), "com.example.Foo$Bar");
		assert_eq!(dotted_class_name("WebView"), "WebView");
	}
}
