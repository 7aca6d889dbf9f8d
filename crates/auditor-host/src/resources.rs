use std::sync::Arc;

use auditor_abstractions::async_trait::async_trait;
use auditor_abstractions::resources::ResourceProvider;
use auditor_abstractions::tracing::warn;
use auditor_abstractions::xml::XmlElement;
use auditor_core::store::Store;

// The unpacker writes the manifest either at the table root or under the disassembly root.
const MANIFEST_PATHS: &[&str] = &["AndroidManifest.xml", "root/AndroidManifest.xml"];

/// A [`ResourceProvider`] over the analysis store's file table, where the unpacker has left the
/// disassembled resources (`root/res/...`, `root/assets/...`).
pub struct StoreResourceProvider {
	store: Arc<Store>,
}

impl StoreResourceProvider {
	pub fn new(store: Arc<Store>) -> StoreResourceProvider { StoreResourceProvider { store } }
}

#[async_trait]
impl ResourceProvider for StoreResourceProvider {
	async fn parsed_manifest(&self) -> Option<XmlElement> {
		for path in MANIFEST_PATHS {
			match self.store.query().file_get(path) {
				Ok(Some(blob)) => return XmlElement::parse(&blob),
				Ok(None) => continue,
				Err(err) => {
					warn!(error = %err, "manifest could not be read");
					return None;
				}
			}
		}

		None
	}

	async fn xml_resources(&self) -> Vec<(String, XmlElement)> {
		let files = match self.store.query().file_enum("%/res/%.xml") {
			Ok(files) => files,
			Err(err) => {
				warn!(error = %err, "XML resources could not be enumerated");
				return Vec::new();
			}
		};

		files
			.into_iter()
			.filter_map(|(path, blob)| match XmlElement::parse(&blob) {
				Some(tree) => Some((path, tree)),
				None => {
					warn!(path = path.as_str(), "skipping unreadable XML resource");
					None
				}
			})
			.collect()
	}

	async fn string_resources(&self) -> Vec<(String, String)> {
		let files = match self.store.query().file_enum("%/res/values%/strings.xml") {
			Ok(files) => files,
			Err(err) => {
				warn!(error = %err, "string resources could not be enumerated");
				return Vec::new();
			}
		};

		let mut strings = Vec::new();
		for (_, blob) in files {
			let Some(tree) = XmlElement::parse(&blob) else { continue };

			for string in tree.find_all("string") {
				if let Some(name) = string.attr("name") {
					strings.push((name.to_string(), string.text.clone()));
				}
			}
		}

		strings
	}

	fn source_name_of_disassembled_resource(&self, path: &str) -> String {
		path.strip_prefix("root/").unwrap_or(path).to_string()
	}
}
