//! The built-in audit rules. Each detector is a pure reader over the shared context plus an issue
//! emitter; they compose through the registry and know nothing about one another.

mod adb;
mod file;
mod format_string;
mod layout;
mod logging;
mod rooted;
mod shared_prefs;
mod tls;
mod webview;
mod xss;

pub use adb::ADBProbeDetector;
pub use file::{SecurityFilePermissionDetector, SecurityFileWriteDetector};
pub use format_string::FormatStringDetector;
pub use layout::LayoutSizeGuesser;
pub use logging::LogDetector;
pub use rooted::SecurityInsecureRootedDetector;
pub use shared_prefs::SecuritySharedPreferencesDetector;
pub use tls::SecurityTlsInterceptionDetector;
pub use webview::{SecurityInsecureWebViewDetector, SecurityTamperableWebViewDetector};
pub use xss::ClientXSSJQDetector;

use std::sync::Arc;

use crate::framework::DetectorRegistry;

/// Builds a registry carrying every built-in security detector.
pub fn default_registry() -> DetectorRegistry {
	let mut registry = DetectorRegistry::new();

	registry.register(Arc::new(SecurityFilePermissionDetector));
	registry.register(Arc::new(SecurityTlsInterceptionDetector));
	registry.register(Arc::new(SecurityTamperableWebViewDetector));
	registry.register(Arc::new(SecurityInsecureWebViewDetector));
	registry.register(Arc::new(FormatStringDetector));
	registry.register(Arc::new(LogDetector));
	registry.register(Arc::new(ADBProbeDetector));
	registry.register(Arc::new(ClientXSSJQDetector));
	registry.register(Arc::new(SecurityFileWriteDetector));
	registry.register(Arc::new(SecurityInsecureRootedDetector));
	registry.register(Arc::new(SecuritySharedPreferencesDetector));

	registry
}

/// Decodes a smali integer literal (`0x1f`, `-0x2`, `1`); the bare form reads as hex too, the way
/// disassemblers print immediates.
pub(crate) fn parse_hex_int(v: &str) -> Option<i64> {
	let (negative, v) = match v.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, v),
	};
	let v = v.strip_prefix("0x").unwrap_or(v);

	i64::from_str_radix(v, 16).ok().map(|n| if negative { -n } else { n })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn registry_carries_all_builtin_options() {
		let registry = default_registry();
		let options = registry.options();

		assert_eq!(options.len(), 11);
		assert!(options.contains(&"security-file-permission"));
		assert!(options.contains(&"security-sharedpref"));
	}

	#[test]
	fn hex_literals_decode() {
		assert_eq!(parse_hex_int("0x1"), Some(1));
		assert_eq!(parse_hex_int("1f"), Some(31));
		assert_eq!(parse_hex_int("-0x2"), Some(-2));
		assert_eq!(parse_hex_int("borked"), None);
	}
}
