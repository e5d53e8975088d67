//! Here we expose prometheus metrics about the relay
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
	extract::State,
	http::{header::CONTENT_TYPE, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::metrics::RelayMetrics;

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryEndpointSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl TelemetryEndpointSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

async fn metrics_handler(State(metrics): State<RelayMetrics>) -> Response {
	let mut buffer = vec![];
	let encoder = TextEncoder::new();
	let metric_families = metrics.registry().gather();

	if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!("failed to encode metrics: {}", err);
		return StatusCode::INTERNAL_SERVER_ERROR.into_response();
	}

	([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response()
}

fn router(metrics: RelayMetrics) -> Router {
	Router::new().route("/metrics", get(metrics_handler)).with_state(metrics)
}

pub async fn run_telemetry_endpoint(
	settings: &TelemetryEndpointSettings,
	metrics: RelayMetrics,
	shutdown: CancellationToken,
) -> Result<()> {
	let addr = settings.to_socket_addr();

	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.context(format!("could not bind telemetry endpoint to {addr}"))?;

	tracing::info!("serving metrics on {}", addr);

	axum::serve(listener, router(metrics))
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await
		.context("telemetry endpoint crashed")?;

	Ok(())
}
