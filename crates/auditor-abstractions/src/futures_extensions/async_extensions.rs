use std::{
	sync::{Arc, Mutex},
	task::Context,
};

use crate::BoxFuture;
use async_channel::{Receiver, Sender};
use cancellation::{CancellationToken, OperationCanceled};
use futures::{
	task::{waker_ref, ArcWake},
	Future,
};
use lazy_static::lazy_static;

/// A unit of work queued onto the [`AsyncPool`].
struct AsyncWork {
	future: Mutex<Option<BoxFuture<'static, ()>>>,
	sender: Sender<Arc<AsyncWork>>,
}

impl AsyncWork {
	pub fn new<T>(future: T, sender: Sender<Arc<AsyncWork>>) -> Self
	where
		T: Future<Output = ()> + Send + 'static,
	{
		Self { future: Mutex::new(Some(Box::pin(future))), sender }
	}
}

impl ArcWake for AsyncWork {
	fn wake_by_ref(arc_self: &Arc<Self>) {
		if arc_self.sender.is_closed() {
			return;
		}
		let cloned = arc_self.clone();

		arc_self.sender.send_blocking(cloned).unwrap();
	}
}

type WorkChannel = (Sender<Arc<AsyncWork>>, Receiver<Arc<AsyncWork>>);

/// A cooperative work pool.
///
/// Spawned work is polled in turn whenever [`AsyncPool::start`] is being awaited; tasks make
/// progress only between one another's suspension points, which is exactly the execution model the
/// detector scheduler requires over its shared read-only state. The work channel is process-wide
/// so that spawning and polling need not happen on the same executor thread.
pub struct AsyncPool;

lazy_static! {
	static ref WORK_CHANNEL: WorkChannel = async_channel::unbounded::<Arc<AsyncWork>>();
}

impl AsyncPool {
	/// Starts processing the work that was queued through [`AsyncPool::spawn_work`].
	///
	/// Completes with [`OperationCanceled`] once `cancel_token` is canceled; in-flight work is then
	/// no longer polled.
	pub async fn start(cancel_token: Arc<CancellationToken>) -> Result<(), OperationCanceled> {
		let (_, receiver) = WORK_CHANNEL.clone();

		while !cancel_token.is_canceled() {
			match receiver.recv().await {
				Ok(work) => {
					let mut future_slot = work.future.lock().unwrap();

					if let Some(mut future) = future_slot.take() {
						let waker = waker_ref(&work);
						let context = &mut Context::from_waker(&waker);

						if future.as_mut().poll(context).is_pending() {
							*future_slot = Some(future)
						}
					}
				}
				Err(_) => break, // `work_channel` has been closed.
			}
		}

		if cancel_token.is_canceled() {
			return Err(OperationCanceled);
		}

		Ok(())
	}

	/// Queues a new unit of work onto the pool.
	pub fn spawn_work<T>(future: T)
	where
		T: Future<Output = ()> + Send + 'static,
	{
		let (sender, _) = WORK_CHANNEL.clone();
		let future = Box::pin(future);
		let work = Arc::new(AsyncWork::new(future, sender.clone()));

		sender.send_blocking(work).unwrap();
	}
}
