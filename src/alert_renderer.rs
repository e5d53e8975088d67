//! Renders alerts via tera templates.
//!
//! The message template is compiled once at startup. Every render gets an
//! explicit context: [AlertContext] for a single alert, [GroupContext] when a
//! whole alert group is rendered into one message.

use serde::Serialize;
use tera::Tera;
use thiserror::Error;

use crate::{
	alert::{timestamp, Alert, AlertGroup, AlertStatus, LabelSet},
	template_dialect,
};

/// name the message template is registered under. No `.html` suffix, so tera
/// doesn't autoescape the output.
const TEMPLATE_NAME: &str = "message";

/// Error returned if the configured template can't be compiled
#[derive(Error, Debug)]
#[error("invalid message template")]
pub struct TemplateCompileError(#[source] tera::Error);

/// Error returned if an alert can't be rendered with the configured template
#[derive(Error, Debug)]
#[error("failed to render alert")]
pub struct RenderError(#[source] tera::Error);

/// template context of a single alert
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlertContext<'a> {
	status: &'a AlertStatus,
	labels: &'a LabelSet,
	annotations: &'a LabelSet,
	starts_at: Option<String>,
	ends_at: Option<String>,
	#[serde(rename = "GeneratorURL")]
	generator_url: &'a str,
	fingerprint: &'a str,
}

impl<'a> From<&'a Alert> for AlertContext<'a> {
	fn from(alert: &'a Alert) -> Self {
		Self {
			status: &alert.status,
			labels: &alert.labels,
			annotations: &alert.annotations,
			starts_at: alert.starts_at.as_ref().map(timestamp::format),
			ends_at: alert.ends_at.as_ref().map(timestamp::format),
			generator_url: &alert.generator_url,
			fingerprint: &alert.fingerprint,
		}
	}
}

/// template context of an alert group
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupContext<'a> {
	status: &'a AlertStatus,
	group_labels: &'a LabelSet,
	common_labels: &'a LabelSet,
	common_annotations: &'a LabelSet,
	receiver: &'a str,
	#[serde(rename = "ExternalURL")]
	external_url: &'a str,
	alerts: Vec<AlertContext<'a>>,
}

impl<'a> From<&'a AlertGroup> for GroupContext<'a> {
	fn from(group: &'a AlertGroup) -> Self {
		Self {
			status: &group.status,
			group_labels: &group.group_labels,
			common_labels: &group.common_labels,
			common_annotations: &group.common_annotations,
			receiver: &group.receiver,
			external_url: &group.external_url,
			alerts: group.alerts.iter().map(AlertContext::from).collect(),
		}
	}
}

/// Compiled message template
pub struct AlertRenderer {
	tera: Tera,
}

impl AlertRenderer {
	/// Compiles the message template.
	///
	/// # Arguments
	///
	/// * `source` - template text, either tera syntax or alertmanager style dot rooted references
	pub fn new(source: &str) -> Result<Self, TemplateCompileError> {
		let mut tera = Tera::default();

		tera.add_raw_template(TEMPLATE_NAME, &template_dialect::normalize(source))
			.map_err(TemplateCompileError)?;

		Ok(Self { tera })
	}

	/// render a single alert
	pub fn render_alert(&self, alert: &Alert) -> Result<String, RenderError> {
		self.render(&AlertContext::from(alert))
	}

	/// render a whole alert group into one message
	pub fn render_group(&self, group: &AlertGroup) -> Result<String, RenderError> {
		self.render(&GroupContext::from(group))
	}

	fn render(&self, context: &impl Serialize) -> Result<String, RenderError> {
		let context = tera::Context::from_serialize(context).map_err(RenderError)?;

		self.tera.render(TEMPLATE_NAME, &context).map_err(RenderError)
	}
}
