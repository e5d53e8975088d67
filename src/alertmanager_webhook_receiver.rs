//! Webhook endpoint for prometheus alertmanager.
//!
//! `POST /{channel}` decodes the alert group, formats it and queues the
//! messages for `channel`. Responds with
//! - `200` once every message is queued, even if some alerts had to be sent raw
//! - `404` for requests without a channel
//! - `422` if the body isn't an alert group
//! - `503` if the outbound queue is gone
use std::{
	net::{IpAddr, Ipv4Addr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	extract::{Path, State},
	http::StatusCode,
	routing::post,
	Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
	alert, message_formatter::MessageFormatter, metrics::RelayMetrics, outbound::AlertSender,
};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AlertReceiverSettings {
	#[serde(default = "AlertReceiverSettings::default_bind_address")]
	pub bind_address: IpAddr,
	#[serde(default = "AlertReceiverSettings::default_port")]
	pub port: u16,
}

impl AlertReceiverSettings {
	fn default_bind_address() -> IpAddr {
		IpAddr::V4(Ipv4Addr::LOCALHOST)
	}

	fn default_port() -> u16 {
		8000
	}

	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

impl Default for AlertReceiverSettings {
	fn default() -> Self {
		Self { bind_address: Self::default_bind_address(), port: Self::default_port() }
	}
}

/// shared by all requests
#[derive(Clone)]
pub struct ReceiverState {
	formatter: MessageFormatter,
	queue: AlertSender,
	/// prepended to the path segment to form the message channel
	channel_prefix: Arc<str>,
	metrics: RelayMetrics,
}

impl ReceiverState {
	pub fn new(
		formatter: MessageFormatter,
		queue: AlertSender,
		channel_prefix: &str,
		metrics: RelayMetrics,
	) -> Self {
		Self { formatter, queue, channel_prefix: Arc::from(channel_prefix), metrics }
	}
}

async fn prometheus_receiver(
	State(state): State<Arc<ReceiverState>>,
	Path(channel): Path<String>,
	body: Bytes,
) -> StatusCode {
	let status = receive(&state, &channel, &body).await;

	state.metrics.record_request(status);

	status
}

/// `channel` is never empty, `/` is answered by [unrouted]
async fn receive(state: &ReceiverState, channel: &str, body: &[u8]) -> StatusCode {
	let group = match alert::decode(body) {
		Ok(group) => group,
		Err(err) => {
			tracing::debug!("failed to decode alert group for {}: {}", channel, err);
			return StatusCode::UNPROCESSABLE_ENTITY;
		}
	};

	let channel = format!("{}{}", state.channel_prefix, channel);
	state.metrics.record_received_alerts(&channel, group.alerts.len());

	let msgs = state.formatter.format(&group, &channel);
	let count = msgs.len();

	match state.queue.enqueue_all(msgs).await {
		Ok(()) => {
			tracing::debug!("queued {} messages for {}", count, channel);
			StatusCode::OK
		}
		Err(err) => {
			tracing::error!("dropping alerts for {}: {}", channel, err);
			StatusCode::SERVICE_UNAVAILABLE
		}
	}
}

/// every path that isn't a single channel segment, `/` included
async fn unrouted(State(state): State<Arc<ReceiverState>>) -> StatusCode {
	state.metrics.record_request(StatusCode::NOT_FOUND);

	StatusCode::NOT_FOUND
}

/// Router serving the webhook, without binding it to a socket
pub fn router(state: ReceiverState) -> Router {
	Router::new()
		.route("/{channel}", post(prometheus_receiver))
		.fallback(unrouted)
		.with_state(Arc::new(state))
}

/// Serves the webhook until `shutdown` is cancelled.
pub async fn run_prometheus_receiver(
	settings: &AlertReceiverSettings,
	state: ReceiverState,
	shutdown: CancellationToken,
) -> Result<()> {
	let addr = settings.to_socket_addr();

	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.context(format!("could not bind alertmanager webhook receiver to {addr}"))?;

	tracing::info!("receiving alertmanager webhooks on {}", addr);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await
		.context("prometheus endpoint crashed")?;

	tracing::info!("alertmanager webhook receiver stopped");

	Ok(())
}
