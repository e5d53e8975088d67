//! prometheus alertmanager receiver that renders alerts and queues them for delivery
//!
//! Features:
//! - forwards different webhook url paths into different channels
//! - tera templates, with alertmanager style `{{ .Labels.alertname }}` references
//! - one message per alert, or one per alert group
//! - alerts the template can't render are forwarded as raw json

use std::sync::Arc;

use anyhow::{Context, Result};
use settings::Settings;
use tokio_util::sync::CancellationToken;

use crate::{
	alert_renderer::AlertRenderer, alertmanager_webhook_receiver::ReceiverState,
	message_formatter::MessageFormatter, metrics::RelayMetrics,
};

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod log;
mod message_formatter;
mod metrics;
mod outbound;
mod settings;
mod telemetry_endpoint;
mod template_dialect;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// cancels `shutdown` on ctrl-c or SIGTERM
async fn watch_shutdown_signals(shutdown: CancellationToken) {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!("failed to listen for ctrl-c: {}", err);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				tracing::error!("failed to listen for SIGTERM: {}", err);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	tracing::info!("shutting down");
	shutdown.cancel();
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::init().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let renderer =
		AlertRenderer::new(&settings.msg_template).context("failed to compile msg_template")?;

	let metrics = RelayMetrics::new().context("failed to register metrics")?;

	let formatter =
		MessageFormatter::new(Arc::new(renderer), settings.msg_once).with_metrics(metrics.clone());

	let (tx_queue, rx_queue) = outbound::channel(settings.queue_capacity);

	let consumer = tokio::spawn(outbound::run_log_consumer(rx_queue));

	let shutdown = CancellationToken::new();

	tokio::spawn(watch_shutdown_signals(shutdown.clone()));

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		let metrics = metrics.clone();
		let shutdown = shutdown.clone();

		tokio::spawn(async move {
			if let Err(err) =
				telemetry_endpoint::run_telemetry_endpoint(&telemetry, metrics, shutdown).await
			{
				tracing::error!("{:#}", err);
			}
		});
	}

	let state = ReceiverState::new(formatter, tx_queue, &settings.channel_prefix, metrics);

	alertmanager_webhook_receiver::run_prometheus_receiver(&settings.http, state, shutdown)
		.await
		.context("prometheus alertmanager receiver endpoint failed to start or crashed")?;

	// the receiver owned the last queue sender, the consumer drains what's left
	let delivered = consumer.await.context("outbound consumer crashed")?;
	tracing::info!("handed {} messages to the outbound consumer", delivered);

	Ok(())
}
