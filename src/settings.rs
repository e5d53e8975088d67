use anyhow::{ensure, Context, Result};
use clap::{Arg, Command};
use config::{builder::DefaultState, Config, ConfigBuilder};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::{
	alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
	telemetry_endpoint::TelemetryEndpointSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// prefix of environment variables overriding the config file, e.g. `ALERTRELAY_MSG_ONCE=true`
/// or `ALERTRELAY_HTTP__PORT=9000`
const ENV_PREFIX: &str = "ALERTRELAY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(default)]
	pub http: AlertReceiverSettings,
	/// template every alert (or alert group) is rendered with
	#[serde(default = "Settings::default_msg_template")]
	pub msg_template: String,
	/// render one message per alert group instead of one per alert
	#[serde(default)]
	pub msg_once: bool,
	/// prepended to the webhook path to form the channel, e.g. `#`
	#[serde(default)]
	pub channel_prefix: String,
	#[serde(default = "Settings::default_queue_capacity")]
	pub queue_capacity: usize,
	#[serde(default)]
	pub log: LogSettings,
	#[serde(default)]
	pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
}

impl Settings {
	fn default_msg_template() -> String {
		String::from("Alert {{ .Labels.alertname }} for {{ .Labels.job }} is {{ .Status }}")
	}

	fn default_queue_capacity() -> usize {
		64
	}

	/// Loads config file and command line arguments. Subsequent calls return the
	/// already loaded settings.
	pub fn init() -> Result<&'static Self> {
		SETTINGS.get_or_try_init(Self::load)
	}

	fn load() -> Result<Self> {
		let opts = Command::new(clap::crate_name!())
			.version(clap::crate_version!())
			.about(clap::crate_description!())
			.author(clap::crate_authors!())
			.args(&[
				Arg::new("config")
					.help("path of config file")
					.takes_value(true)
					.short('c')
					.long("config")
					.default_value("./config.yaml"),
				Arg::new("level")
					.help("log level")
					.possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
					.ignore_case(true)
					.takes_value(true)
					.long("log"),
			])
			.get_matches();

		let config_path = opts.value_of("config").context("no config path given")?;

		let mut settings = Self::from_builder(
			Config::builder()
				.add_source(config::File::with_name(config_path))
				.add_source(
					config::Environment::with_prefix(ENV_PREFIX)
						.prefix_separator("_")
						.separator("__")
						.try_parsing(true),
				),
		)?;

		if let Some(level) = opts.value_of("level") {
			settings.log.level = level.to_string();
		}

		Ok(settings)
	}

	fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
		let settings: Self = builder
			.build()
			.context("can't load config")?
			.try_deserialize()
			.context("can't load config")?;

		ensure!(settings.queue_capacity > 0, "queue_capacity must be at least 1");

		Ok(settings)
	}
}

#[cfg(test)]
mod tests {
	use std::net::{IpAddr, Ipv4Addr};

	use config::FileFormat;

	use super::*;

	fn from_yaml(yaml: &str) -> Result<Settings> {
		Settings::from_builder(Config::builder().add_source(config::File::from_str(yaml, FileFormat::Yaml)))
	}

	#[test]
	fn empty_config_uses_defaults() {
		let settings = from_yaml("{}").unwrap();

		assert_eq!(settings.http, AlertReceiverSettings::default());
		assert_eq!(settings.http.port, 8000);
		assert_eq!(settings.msg_template, Settings::default_msg_template());
		assert!(!settings.msg_once);
		assert!(settings.channel_prefix.is_empty());
		assert_eq!(settings.queue_capacity, 64);
		assert_eq!(settings.log.level, "info");
		assert!(settings.telemetry_endpoint.is_none());
	}

	#[test]
	fn reads_full_config() {
		let settings = from_yaml(
			r##"
http:
  bind_address: 0.0.0.0
  port: 9093
msg_template: "Alert {{ .GroupLabels.alertname }} is {{ .Status }}"
msg_once: true
channel_prefix: "#"
queue_capacity: 8
log:
  level: debug
telemetry_endpoint:
  bind_address: 127.0.0.1
  port: 9100
"##,
		)
		.unwrap();

		assert_eq!(settings.http.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
		assert_eq!(settings.http.port, 9093);
		assert_eq!(settings.msg_template, "Alert {{ .GroupLabels.alertname }} is {{ .Status }}");
		assert!(settings.msg_once);
		assert_eq!(settings.channel_prefix, "#");
		assert_eq!(settings.queue_capacity, 8);
		assert_eq!(settings.log.level, "debug");
		assert_eq!(settings.telemetry_endpoint.map(|telemetry| telemetry.port), Some(9100));
	}

	#[test]
	fn rejects_empty_queue() {
		assert!(from_yaml("queue_capacity: 0").is_err());
	}
}
