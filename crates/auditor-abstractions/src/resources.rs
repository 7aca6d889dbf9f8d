use async_trait::async_trait;

use crate::xml::XmlElement;

/// Supplies the unpacked, non-code side of an application package: its manifest, XML resources and
/// string table.
///
/// The audit core does not unpack packages itself; a host supplies an implementation over whatever
/// it has on hand (typically the file table of the analysis store).
#[async_trait]
pub trait ResourceProvider {
	/// Returns the application manifest as an XML tree, if one could be read.
	async fn parsed_manifest(&self) -> Option<XmlElement>;

	/// Enumerates all XML resources as `(path, tree)` pairs. Unreadable resources are skipped.
	async fn xml_resources(&self) -> Vec<(String, XmlElement)>;

	/// Enumerates string resources as `(name, value)` pairs.
	async fn string_resources(&self) -> Vec<(String, String)>;

	/// Maps a path in the disassembled tree back to its name inside the original package.
	fn source_name_of_disassembled_resource(&self, path: &str) -> String;
}

pub type AnyResourceProvider = Box<dyn ResourceProvider + Send + Sync>;
