//! prometheus meters for the relay
//!
//! Meters live in their own [Registry] instead of the process global one, the
//! telemetry endpoint gathers from it.

use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
};

use prometheus::{opts, IntCounterVec, Registry};

/// channels come from the request path, only this many get their own series
pub const MAX_CHANNEL_SERIES: usize = 100;

/// label of alerts received for channels past [MAX_CHANNEL_SERIES]
pub const OTHER_CHANNEL: &str = "other";

#[derive(Clone)]
/// prometheus meters for the webhook receiver and message formatter
pub struct RelayMetrics {
	registry: Registry,
	/// number of decoded alerts per channel
	received_alerts: IntCounterVec,
	/// channels that have a series in `received_alerts`
	channel_series: Arc<Mutex<HashSet<String>>>,
	/// webhook requests by response status
	requests: IntCounterVec,
	/// templates that failed to render, by render mode
	render_failures: IntCounterVec,
}

impl RelayMetrics {
	/// construct and register prometheus meters
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let received_alerts = IntCounterVec::new(
			opts!("received_alerts_total", "total number of decoded alerts")
				.namespace("alertrelay")
				.subsystem("webhook"),
			&["channel"],
		)?;

		let requests = IntCounterVec::new(
			opts!("requests_total", "webhook requests by response status")
				.namespace("alertrelay")
				.subsystem("webhook"),
			&["status"],
		)?;

		let render_failures = IntCounterVec::new(
			opts!("render_failures_total", "alerts sent raw because the template failed")
				.namespace("alertrelay")
				.subsystem("formatter"),
			&["mode"],
		)?;

		registry.register(Box::new(received_alerts.clone()))?;
		registry.register(Box::new(requests.clone()))?;
		registry.register(Box::new(render_failures.clone()))?;

		Ok(Self {
			registry,
			received_alerts,
			channel_series: Arc::default(),
			requests,
			render_failures,
		})
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn record_received_alerts(&self, channel: &str, count: usize) {
		let label = {
			let mut series = self.channel_series.lock().unwrap_or_else(|err| err.into_inner());

			if series.contains(channel) {
				channel
			} else if series.len() < MAX_CHANNEL_SERIES {
				series.insert(channel.to_owned());
				channel
			} else {
				OTHER_CHANNEL
			}
		};

		self.received_alerts.with_label_values(&[label]).inc_by(count as u64);
	}

	pub fn record_request(&self, status: axum::http::StatusCode) {
		self.requests.with_label_values(&[status.as_str()]).inc();
	}

	pub fn record_render_failure(&self, mode: &str) {
		self.render_failures.with_label_values(&[mode]).inc();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn instances_do_not_collide() {
		let first = RelayMetrics::new().unwrap();
		let second = RelayMetrics::new().unwrap();

		first.record_received_alerts("ops", 2);
		second.record_render_failure("group");

		assert_eq!(first.received_alerts.with_label_values(&["ops"]).get(), 2);
		assert_eq!(second.received_alerts.with_label_values(&["ops"]).get(), 0);
		assert_eq!(second.render_failures.with_label_values(&["group"]).get(), 1);
	}

	#[test]
	fn channel_series_are_bounded() {
		let metrics = RelayMetrics::new().unwrap();

		for i in 0..MAX_CHANNEL_SERIES + 50 {
			metrics.record_received_alerts(&format!("chan{i}"), 1);
		}
		// known channels keep their series
		metrics.record_received_alerts("chan0", 1);

		let family = metrics
			.registry()
			.gather()
			.into_iter()
			.find(|family| family.get_name() == "alertrelay_webhook_received_alerts_total")
			.unwrap();

		assert_eq!(family.get_metric().len(), MAX_CHANNEL_SERIES + 1);
		assert_eq!(metrics.received_alerts.with_label_values(&["chan0"]).get(), 2);
		assert_eq!(metrics.received_alerts.with_label_values(&[OTHER_CHANNEL]).get(), 50);
	}

	#[test]
	fn gathers_registered_meters() {
		let metrics = RelayMetrics::new().unwrap();
		metrics.record_request(axum::http::StatusCode::OK);

		let names: Vec<_> =
			metrics.registry().gather().iter().map(|family| family.get_name().to_owned()).collect();

		assert!(names.contains(&"alertrelay_webhook_requests_total".to_owned()), "{names:?}");
	}
}
