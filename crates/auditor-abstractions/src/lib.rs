// Re-export the shared surfaces so that dependent crates pick up consistent versions.
pub use async_trait;
pub use cancellation;
pub use event_listener;
pub use futures;
pub use tracing;

pub mod futures_extensions;
pub mod resources;
pub mod xml;

use std::{future::Future, pin::Pin};

/// A boxed [`Future`] as scheduled by the cooperative async pool.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
