//! Turns a decoded alert group into outbound messages.
//!
//! Alerts are never dropped because of a broken template: if rendering fails
//! the alert (or the whole group) is sent as its raw json instead.

use std::sync::Arc;

use serde::Serialize;

use crate::{
	alert::AlertGroup,
	alert_renderer::{AlertRenderer, RenderError},
	metrics::RelayMetrics,
	outbound::AlertMsg,
};

/// Renders alert groups into [AlertMsg]s for a channel
#[derive(Clone)]
pub struct MessageFormatter {
	renderer: Arc<AlertRenderer>,
	/// render one message per group instead of one per alert
	once: bool,
	metrics: Option<RelayMetrics>,
}

impl MessageFormatter {
	pub fn new(renderer: Arc<AlertRenderer>, once: bool) -> Self {
		Self { renderer, once, metrics: None }
	}

	pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
		self.metrics = Some(metrics);
		self
	}

	/// Formats an alert group.
	///
	/// Returns one message per alert in the order they were received, or a
	/// single message for the whole group if grouping is enabled.
	///
	/// # Arguments
	///
	/// * `group` - decoded alert group
	///
	/// * `channel` - destination of the produced messages
	pub fn format(&self, group: &AlertGroup, channel: &str) -> Vec<AlertMsg> {
		if self.once {
			let alert = self.render_or_raw("group", self.renderer.render_group(group), group);

			return vec![AlertMsg { channel: channel.to_owned(), alert }];
		}

		group
			.alerts
			.iter()
			.map(|entry| {
				let alert = self.render_or_raw("alert", self.renderer.render_alert(entry), entry);

				AlertMsg { channel: channel.to_owned(), alert }
			})
			.collect()
	}

	fn render_or_raw(
		&self,
		mode: &str,
		rendered: Result<String, RenderError>,
		raw: &impl Serialize,
	) -> String {
		let err = match rendered {
			Ok(text) => return text,
			Err(err) => err,
		};

		tracing::warn!("could not render {}, sending it raw: {:#}", mode, anyhow::Error::new(err));

		if let Some(metrics) = &self.metrics {
			metrics.record_render_failure(mode);
		}

		serde_json::to_string(raw).unwrap_or_else(|err| format!("failed to serialize {mode}: {err}"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alert::{
		tests::{simple_group, FIRST_ALERT_RAW, SECOND_ALERT_RAW},
		Alert,
	};

	fn formatter(template: &str, once: bool) -> MessageFormatter {
		MessageFormatter::new(Arc::new(AlertRenderer::new(template).unwrap()), once)
	}

	fn msg(alert: &str) -> AlertMsg {
		AlertMsg { channel: "somechannel".into(), alert: alert.into() }
	}

	#[test]
	fn one_message_per_alert_in_order() {
		let formatter =
			formatter("Alert {{.Labels.alertname}} on {{.Labels.instance}} is {{.Status}}", false);

		assert_eq!(
			formatter.format(&simple_group(), "somechannel"),
			[
				msg("Alert airDown on instance1:3456 is resolved"),
				msg("Alert airDown on instance2:7890 is resolved"),
			]
		);
	}

	#[test]
	fn one_message_per_group() {
		let formatter = formatter("Alert {{.GroupLabels.alertname}} is {{.Status}}", true);

		assert_eq!(
			formatter.format(&simple_group(), "somechannel"),
			[msg("Alert airDown is resolved")]
		);
	}

	#[test]
	fn failed_alerts_are_sent_raw() {
		let formatter = formatter("Bogus template {{ nil }}", false);
		let group = simple_group();

		let msgs = formatter.format(&group, "somechannel");
		assert_eq!(msgs, [msg(FIRST_ALERT_RAW), msg(SECOND_ALERT_RAW)]);

		for (msg, alert) in msgs.iter().zip(&group.alerts) {
			let parsed: Alert = serde_json::from_str(&msg.alert).unwrap();
			assert_eq!(&parsed, alert);
		}
	}

	#[test]
	fn only_failing_alerts_fall_back() {
		let formatter = formatter("{{ .Labels.owner }}", false);
		let mut group = simple_group();
		group.alerts[1].labels.insert("owner".into(), "team-air".into());

		assert_eq!(
			formatter.format(&group, "somechannel"),
			[msg(FIRST_ALERT_RAW), msg("team-air")]
		);
	}

	#[test]
	fn failed_group_is_sent_raw() {
		let metrics = RelayMetrics::new().unwrap();
		let formatter = formatter("{{ .Labels.alertname }}", true).with_metrics(metrics.clone());
		let group = simple_group();

		let msgs = formatter.format(&group, "somechannel");
		assert_eq!(msgs.len(), 1);

		let parsed = crate::alert::decode(msgs[0].alert.as_bytes()).unwrap();
		assert_eq!(parsed, group);
		assert!(msgs[0].alert.starts_with(r#"{"receiver":"relay","status":"resolved","alerts":[{"#));
		assert!(msgs[0].alert.ends_with(r#""commonAnnotations":{},"externalURL":"https://alertmanager.example.com"}"#));

		let failures: Vec<_> = metrics
			.registry()
			.gather()
			.into_iter()
			.filter(|family| family.get_name() == "alertrelay_formatter_render_failures_total")
			.collect();
		assert_eq!(failures.len(), 1);
	}

	#[test]
	fn empty_groups() {
		let mut group = simple_group();
		group.alerts.clear();

		assert!(formatter("{{ .Status }}", false).format(&group, "somechannel").is_empty());
		assert_eq!(formatter("{{ .Status }}", true).format(&group, "somechannel"), [msg("resolved")]);
	}
}
