use std::sync::Arc;

use auditor_abstractions::async_trait::async_trait;
use auditor_abstractions::futures_extensions::async_extensions::AsyncPool;
use auditor_abstractions::futures_extensions::FutureCompletionSource;
use auditor_abstractions::tracing::{error, info};
use cancellation::{CancellationToken, OperationCanceled};
use futures::future::{self, Either};
use thiserror::Error;

use crate::context::AnalysisContext;

/// Represents an error raised by a detector.
///
/// A failing detector is logged and suppressed by the scheduler; it never takes the other
/// detectors down with it.
#[derive(Error, Debug)]
pub enum DetectorError {
	/// The underlying fact base failed; this is fatal to the detector.
	#[error("storage failure during detection: {0}")]
	Store(#[from] auditor_core::store::StoreError),

	/// A detection pattern did not compile.
	#[error("invalid detection pattern: {0}")]
	Pattern(#[from] regex::Error),
}

/// A single audit rule: a pure reader over the shared analysis context that emits issues through
/// it.
#[async_trait]
pub trait Detector: Send + Sync {
	/// The stable identifier the detector is selected and reported by.
	fn option(&self) -> &'static str;

	/// A human readable description.
	fn description(&self) -> &'static str;

	/// Runs the detection over the shared context.
	async fn detect(&self, context: &AnalysisContext) -> Result<(), DetectorError>;
}

pub type AnyDetector = Arc<dyn Detector>;

/// Narrows the registered detectors down to the set one analysis should run.
#[derive(Debug, Clone, Default)]
pub struct Selection {
	/// Option identifiers to run; empty means all.
	pub include: Vec<String>,
	/// Option identifiers to leave out.
	pub exclude: Vec<String>,
}

impl Selection {
	pub fn selects(&self, option: &str) -> bool {
		(self.include.is_empty() || self.include.iter().any(|o| o == option))
			&& !self.exclude.iter().any(|o| o == option)
	}
}

/// The detector registry, keyed by option identifier.
#[derive(Default)]
pub struct DetectorRegistry {
	detectors: Vec<AnyDetector>,
}

impl DetectorRegistry {
	pub fn new() -> DetectorRegistry { DetectorRegistry::default() }

	/// Registers a detector. A detector re-using an already registered option replaces it.
	pub fn register(&mut self, detector: AnyDetector) {
		self.detectors.retain(|d| d.option() != detector.option());
		self.detectors.push(detector);
	}

	/// The option identifiers currently registered.
	pub fn options(&self) -> Vec<&'static str> { self.detectors.iter().map(|d| d.option()).collect() }

	/// Returns the registered detectors matching a [`Selection`].
	pub fn select(&self, selection: &Selection) -> Vec<AnyDetector> {
		self.detectors.iter().filter(|d| selection.selects(d.option())).cloned().collect()
	}
}

/// Schedules detectors concurrently over a shared read-only context.
pub struct DetectorRunner {
	registry: DetectorRegistry,
}

impl DetectorRunner {
	pub fn new(registry: DetectorRegistry) -> DetectorRunner { DetectorRunner { registry } }

	/// Runs every selected detector to completion on the cooperative pool.
	///
	/// Detectors suspend only at store and resource boundaries; issue emission lands in the store
	/// as it happens, so work already emitted survives a cancellation. Completes with
	/// [`OperationCanceled`] when `cancel_token` fires before the detectors finish.
	pub async fn run(
		&self,
		context: Arc<AnalysisContext>,
		selection: &Selection,
		cancel_token: Arc<CancellationToken>,
	) -> Result<(), OperationCanceled> {
		let selected = self.registry.select(selection);
		let mut completions = Vec::with_capacity(selected.len());

		for detector in selected {
			let completion = FutureCompletionSource::<(), ()>::new();

			completions.push(completion.clone());
			AsyncPool::spawn_work(dispatch(detector, context.clone(), completion));
		}

		let awaited = async {
			for completion in &completions {
				let _ = completion.future().await;
			}
		};

		let result = match future::select(Box::pin(AsyncPool::start(cancel_token)), Box::pin(awaited)).await {
			Either::Left((result, _)) => result,
			Either::Right(((), _)) => Ok(()),
		};
		result
	}
}

async fn dispatch(detector: AnyDetector, context: Arc<AnalysisContext>, completion: FutureCompletionSource<(), ()>) {
	info!(option = detector.option(), "detector starting");

	if let Err(err) = detector.detect(&context).await {
		// One buggy detector must not lose the results of any other.
		error!(option = detector.option(), error = %err, "detector failed");
	}

	let _ = completion.set_value(());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn selection_defaults_to_everything() {
		let selection = Selection::default();

		assert!(selection.selects("security-log"));
	}

	#[test]
	fn selection_honors_include_and_exclude() {
		let selection = Selection {
			include: vec!["security-log".to_string(), "security-adb-detect".to_string()],
			exclude: vec!["security-adb-detect".to_string()],
		};

		assert!(selection.selects("security-log"));
		assert!(!selection.selects("security-adb-detect"));
		assert!(!selection.selects("security-file-permission"));
	}
}
