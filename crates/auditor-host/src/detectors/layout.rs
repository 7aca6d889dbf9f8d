use std::collections::BTreeSet;

use auditor_abstractions::tracing::{debug, warn};
use auditor_abstractions::xml::XmlElement;
use lazy_static::lazy_static;
use regex::Regex;

// Screen buckets in dp: width, height in portrait.
const BUCKETS: [(&str, (f64, f64)); 4] =
	[("small", (320.0, 426.0)), ("normal", (320.0, 470.0)), ("large", (480.0, 640.0)), ("xlarge", (720.0, 960.0))];
const DEFAULT_BUCKET: (f64, f64) = (480.0, 640.0);

/// Estimates how much of the screen a layout element covers, as a fraction of the screen bucket
/// the layout path names.
///
/// Only the element itself and its immediate container are consulted for bound dimensions; an
/// unbound pair keeps falling through and ultimately reads as full-screen (1.0).
pub struct LayoutSizeGuesser;

impl LayoutSizeGuesser {
	pub fn guessed_size(&self, element: &XmlElement, container: Option<&XmlElement>, path: &str) -> f64 {
		let (dx, dy) = Self::dps_from_modifiers(&Self::modifiers_in(path));

		for e in [Some(element), container].into_iter().flatten() {
			match (e.attr("android:layout_width"), e.attr("android:layout_height")) {
				(Some(width), Some(height)) => {
					if Self::is_bound(width) || Self::is_bound(height) {
						return Self::guessed_dp(width, dx) * Self::guessed_dp(height, dy);
					}
				}
				_ => {
					match e.attr("android:id") {
						Some(id) => warn!(id, "ignoring improper webview declaration"),
						None => warn!("ignoring improper webview declaration"),
					}
					return 0.0;
				}
			}
		}

		1.0
	}

	fn modifiers_in(path: &str) -> BTreeSet<String> {
		path.split('/')
			.find(|component| component.contains("layout"))
			.map(|component| component.split('-').map(|m| m.to_string()).collect())
			.unwrap_or_default()
	}

	fn dps_from_modifiers(modifiers: &BTreeSet<String>) -> (f64, f64) {
		let (x, y) = BUCKETS
			.iter()
			.find(|(bucket, _)| modifiers.contains(*bucket))
			.map(|(_, dims)| *dims)
			.unwrap_or(DEFAULT_BUCKET);

		if modifiers.contains("land") {
			(y, x)
		} else {
			(x, y)
		}
	}

	fn is_bound(x: &str) -> bool { !matches!(x, "fill_parent" | "match_parent" | "wrap_content") }

	/// A bound dimension reads as its fraction of the bucket axis; an unbound one counts as the
	/// full bucket dimension.
	fn guessed_dp(x: &str, dp: f64) -> f64 {
		lazy_static! {
			static ref DP_SUFFIX: Regex = Regex::new(r"di?p$").unwrap();
			static ref NON_NUMERIC: Regex = Regex::new(r"[^0-9-]").unwrap();
		}

		if !Self::is_bound(x) {
			return dp;
		}

		if let Ok(n) = DP_SUFFIX.replace(x, "").parse::<f64>() {
			return n / dp;
		}

		match NON_NUMERIC.replace_all(x, "").parse::<f64>() {
			Ok(n) => {
				debug!(dimension = x, "ignoring non-dp suffix");
				n / dp
			}
			Err(_) => {
				debug!(dimension = x, "ignoring unknown dimension");
				0.0
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn webview(width: &str, height: &str) -> XmlElement {
		XmlElement {
			tag: "WebView".to_string(),
			attributes: vec![
				("android:id".to_string(), "@+id/web".to_string()),
				("android:layout_width".to_string(), width.to_string()),
				("android:layout_height".to_string(), height.to_string()),
			],
			children: Vec::new(),
			text: String::new(),
		}
	}

	#[test]
	fn bound_dimensions_scale_by_the_bucket_with_land_swap() {
		let element = webview("480dp", "360dp");
		let size = LayoutSizeGuesser.guessed_size(&element, None, "res/layout-large-land/main.xml");

		assert_eq!(size, (480.0 / 640.0) * (360.0 / 480.0));
		assert!(size > 0.5);
	}

	#[test]
	fn defaults_to_the_large_bucket() {
		let element = webview("240dp", "320dp");
		let size = LayoutSizeGuesser.guessed_size(&element, None, "res/layout/main.xml");

		assert_eq!(size, (240.0 / 480.0) * (320.0 / 640.0));
	}

	#[test]
	fn unbound_pairs_fall_through_to_full_screen() {
		let element = webview("match_parent", "match_parent");
		let size = LayoutSizeGuesser.guessed_size(&element, None, "res/layout/main.xml");

		assert_eq!(size, 1.0);
	}

	#[test]
	fn dip_suffix_and_bare_numbers_both_decode() {
		let element = webview("480dip", "360");
		let size = LayoutSizeGuesser.guessed_size(&element, None, "res/layout-large/main.xml");

		assert_eq!(size, (480.0 / 480.0) * (360.0 / 640.0));
	}

	#[test]
	fn missing_dimensions_score_zero() {
		let element = XmlElement { tag: "WebView".to_string(), ..XmlElement::default() };

		assert_eq!(LayoutSizeGuesser.guessed_size(&element, None, "res/layout/main.xml"), 0.0);
	}
}
