//! data structures for deserializing incoming alerts
//!
//! The [Serialize] impls double as the canonical form used when an alert can't
//! be rendered: fields keep the alertmanager wire order, label maps are sorted
//! and timestamps keep the offset they arrived with.
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// label or annotation set of an alert, sorted by key
pub type LabelSet = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
/// state of a single alert or of a whole alert group
///
/// Statuses other than `firing` and `resolved`, including a missing one, are
/// kept verbatim so they serialize back the way they were received.
pub enum AlertStatus {
	Firing,
	Resolved,
	Other(String),
	#[default]
	Unknown,
}

impl AlertStatus {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Firing => "firing",
			Self::Resolved => "resolved",
			Self::Other(status) => status,
			Self::Unknown => "",
		}
	}
}

impl From<String> for AlertStatus {
	fn from(status: String) -> Self {
		match status.as_str() {
			"firing" => Self::Firing,
			"resolved" => Self::Resolved,
			"" => Self::Unknown,
			_ => Self::Other(status),
		}
	}
}

impl From<AlertStatus> for String {
	fn from(status: AlertStatus) -> Self {
		match status {
			AlertStatus::Other(status) => status,
			status => status.as_str().to_owned(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// group of alerts received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertGroup {
	#[serde(default, deserialize_with = "nullable")]
	pub receiver: String,
	#[serde(default, deserialize_with = "nullable")]
	pub status: AlertStatus,
	#[serde(default, deserialize_with = "nullable")]
	pub alerts: Vec<Alert>,
	#[serde(default, deserialize_with = "nullable")]
	pub group_labels: LabelSet,
	#[serde(default, deserialize_with = "nullable")]
	pub common_labels: LabelSet,
	#[serde(default, deserialize_with = "nullable")]
	pub common_annotations: LabelSet,
	#[serde(default, rename = "externalURL", deserialize_with = "nullable")]
	pub external_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// a single alert, independent of the group it arrived in
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde(default, deserialize_with = "nullable")]
	pub status: AlertStatus,
	#[serde(default, deserialize_with = "nullable")]
	pub labels: LabelSet,
	#[serde(default, deserialize_with = "nullable")]
	pub annotations: LabelSet,
	#[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
	pub starts_at: Option<timestamp::Timestamp>,
	#[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
	pub ends_at: Option<timestamp::Timestamp>,
	#[serde(default, rename = "generatorURL", deserialize_with = "nullable")]
	pub generator_url: String,
	#[serde(default, deserialize_with = "nullable")]
	pub fingerprint: String,
}

/// Error returned if a webhook body isn't a valid alert group
#[derive(Error, Debug)]
pub enum DecodeError {
	#[error("malformed alert group: {0}")]
	Json(#[from] serde_json::Error),
	#[error("alert group must be a json object")]
	NotAnObject,
}

/// Decodes a webhook request body into an [AlertGroup].
///
/// Missing fields default to empty values, but the document itself has to be
/// an object and `alerts`, if present, a list.
pub fn decode(raw: &[u8]) -> Result<AlertGroup, DecodeError> {
	let value: serde_json::Value = serde_json::from_slice(raw)?;

	if !value.is_object() {
		return Err(DecodeError::NotAnObject);
	}

	Ok(AlertGroup::deserialize(value)?)
}

/// treat `null` like an absent field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// RFC 3339 timestamps, written like alertmanager writes them: offset kept,
/// trailing zeros of the fraction dropped and `Z` for UTC
pub mod timestamp {
	use chrono::{DateTime, FixedOffset, SecondsFormat};
	use serde::{Deserialize, Deserializer, Serializer};

	pub type Timestamp = DateTime<FixedOffset>;

	/// formats a timestamp the way it's serialized
	pub fn format(ts: &Timestamp) -> String {
		let formatted = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);

		let Some(dot) = formatted.find('.') else {
			return formatted;
		};

		let (seconds, rest) = (&formatted[..dot], &formatted[dot + 1..]);
		let offset_at = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
		let (fraction, offset) = rest.split_at(offset_at);
		let fraction = fraction.trim_end_matches('0');

		if fraction.is_empty() {
			format!("{seconds}{offset}")
		} else {
			format!("{seconds}.{fraction}{offset}")
		}
	}

	pub fn serialize<S>(ts: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match ts {
			Some(ts) => serializer.serialize_str(&format(ts)),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<Timestamp>::deserialize(deserializer)
	}
}
