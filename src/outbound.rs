//! Bounded hand-off between the webhook receiver and the delivery consumer.
//!
//! Enqueueing waits for free capacity instead of dropping messages, so a slow
//! consumer slows down webhook responses.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// a rendered alert on its way to a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMsg {
	/// destination, derived from the webhook path
	pub channel: String,
	/// rendered message, or the raw alert if rendering failed
	pub alert: String,
}

/// Error returned if the consumer side of the queue is gone
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("outbound queue closed")]
pub struct QueueClosed;

/// Creates the outbound queue. A capacity of zero is treated as one.
pub fn channel(capacity: usize) -> (AlertSender, AlertReceiver) {
	let (tx, rx) = mpsc::channel(capacity.max(1));

	(AlertSender(tx), AlertReceiver(rx))
}

/// producing side of the outbound queue, cheap to clone
#[derive(Debug, Clone)]
pub struct AlertSender(mpsc::Sender<AlertMsg>);

impl AlertSender {
	/// Queue a message, waiting while the queue is full.
	pub async fn enqueue(&self, msg: AlertMsg) -> Result<(), QueueClosed> {
		self.0.send(msg).await.map_err(|_| QueueClosed)
	}

	/// Queue messages in order. Stops at the first message that can't be queued.
	pub async fn enqueue_all(
		&self,
		msgs: impl IntoIterator<Item = AlertMsg>,
	) -> Result<(), QueueClosed> {
		for msg in msgs {
			self.enqueue(msg).await?;
		}

		Ok(())
	}
}

/// consuming side of the outbound queue
#[derive(Debug)]
pub struct AlertReceiver(mpsc::Receiver<AlertMsg>);

impl AlertReceiver {
	/// next queued message, [None] once every sender is dropped and the queue is drained
	pub async fn recv(&mut self) -> Option<AlertMsg> {
		self.0.recv().await
	}

	/// next queued message if there is one right now
	#[cfg(test)]
	pub fn try_recv(&mut self) -> Option<AlertMsg> {
		self.0.try_recv().ok()
	}
}

/// Drains the queue into the log until every sender is dropped.
///
/// Stands in for a chat backend: every message ends up as an `info` event
/// carrying its channel.
pub async fn run_log_consumer(mut rx: AlertReceiver) -> usize {
	let mut delivered = 0;

	while let Some(AlertMsg { channel, alert }) = rx.recv().await {
		tracing::info!(channel = %channel, "{}", alert);
		delivered += 1;
	}

	tracing::debug!("outbound queue closed after {} messages", delivered);

	delivered
}
