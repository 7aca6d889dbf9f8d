use quick_xml::{events::Event, reader::Reader};

/// An owned XML element tree.
///
/// Attribute and tag names are kept verbatim, including any namespace prefix (`android:id` stays
/// `android:id`); disassembled resources use the prefixes literally and the detectors match on
/// them the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
	pub tag: String,
	pub attributes: Vec<(String, String)>,
	pub children: Vec<XmlElement>,
	pub text: String,
}

impl XmlElement {
	/// Returns the value of the named attribute, if present.
	pub fn attr(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
	}

	/// Returns the current element and all of its descendants, in document order.
	pub fn descendants(&self) -> Vec<&XmlElement> {
		let mut out = Vec::new();
		let mut stack = vec![self];

		while let Some(e) = stack.pop() {
			out.push(e);
			stack.extend(e.children.iter().rev());
		}

		out
	}

	/// Returns the current element and all descendants carrying the given tag.
	pub fn find_all(&self, tag: &str) -> Vec<&XmlElement> {
		self.descendants().into_iter().filter(|e| e.tag == tag).collect()
	}

	/// Reads an XML document into a tree, recovering from malformed input.
	///
	/// Returns the tree built so far when the reader reports an error or runs out of input with
	/// open elements, and [`None`] only when no element could be read at all. Undecodable bytes are
	/// replaced rather than rejected.
	pub fn parse(blob: &[u8]) -> Option<XmlElement> {
		fn element_of(e: &quick_xml::events::BytesStart<'_>) -> XmlElement {
			let mut element = XmlElement {
				tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
				..XmlElement::default()
			};

			for attr in e.attributes().flatten() {
				let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
				let value = match attr.unescape_value() {
					Ok(value) => value.into_owned(),
					Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
				};

				element.attributes.push((key, value));
			}

			element
		}

		let mut reader = Reader::from_reader(blob);
		let mut buf = Vec::new();
		let mut stack: Vec<XmlElement> = Vec::new();
		let mut roots: Vec<XmlElement> = Vec::new();

		loop {
			match reader.read_event_into(&mut buf) {
				Ok(Event::Start(ref e)) => stack.push(element_of(e)),
				Ok(Event::Empty(ref e)) => {
					let element = element_of(e);

					match stack.last_mut() {
						Some(parent) => parent.children.push(element),
						None => roots.push(element),
					}
				}
				Ok(Event::End(_)) => {
					if let Some(element) = stack.pop() {
						match stack.last_mut() {
							Some(parent) => parent.children.push(element),
							None => roots.push(element),
						}
					}
				}
				Ok(Event::Text(ref t)) => {
					if let Some(element) = stack.last_mut() {
						let text = match t.unescape() {
							Ok(text) => text.into_owned(),
							Err(_) => String::from_utf8_lossy(t).into_owned(),
						};

						element.text.push_str(text.trim());
					}
				}
				Ok(Event::Eof) => break,
				Ok(_) => {}
				Err(_) => break, // Recover with whatever has been built so far.
			}

			buf.clear();
		}

		// Close any elements left open by truncated or malformed input.
		while let Some(element) = stack.pop() {
			match stack.last_mut() {
				Some(parent) => parent.children.push(element),
				None => roots.push(element),
			}
		}

		roots.into_iter().next()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_nested_elements_and_attributes() {
		let doc = br#"<?xml version="1.0"?>
			<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
				<uses-sdk android:minSdkVersion="24"/>
				<application android:debuggable="true"><activity/></application>
			</manifest>"#;

		let root = XmlElement::parse(doc).unwrap();

		assert_eq!(root.tag, "manifest");
		assert_eq!(root.attr("package"), Some("com.example.app"));
		assert_eq!(root.find_all("uses-sdk")[0].attr("android:minSdkVersion"), Some("24"));
		assert_eq!(root.find_all("activity").len(), 1);
	}

	#[test]
	fn recovers_from_truncated_input() {
		let root = XmlElement::parse(b"<a><b attr=\"1\"><c/>").unwrap();

		assert_eq!(root.tag, "a");
		assert_eq!(root.children[0].tag, "b");
		assert_eq!(root.children[0].children[0].tag, "c");
	}

	#[test]
	fn yields_none_for_unreadable_input() {
		assert_eq!(XmlElement::parse(b""), None);
	}

	#[test]
	fn collects_element_text() {
		let root = XmlElement::parse(b"<resources><string name=\"app_name\">demo</string></resources>").unwrap();

		assert_eq!(root.find_all("string")[0].text, "demo");
		assert_eq!(root.find_all("string")[0].attr("name"), Some("app_name"));
	}
}
