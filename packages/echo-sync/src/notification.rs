use serde::Deserialize;

use echo_storage::models::ChangeAction;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
	entity_id: String,
	action: String,
}

/// A notification payload, resolved exactly once at the listener boundary.
/// Payloads that are not well-formed JSON (or carry an unknown action) are
/// never dropped; the whole payload degrades to the entity id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NotificationPayload {
	Parsed { entity_id: String, action: ChangeAction },
	Fallback { raw: String },
}
impl NotificationPayload {
	pub fn parse(raw: &str) -> Self {
		if let Ok(payload) = serde_json::from_str::<RawPayload>(raw)
			&& let Some(action) = ChangeAction::parse(&payload.action)
		{
			return Self::Parsed { entity_id: payload.entity_id, action };
		}

		Self::Fallback { raw: raw.to_string() }
	}

	pub fn entity_id(&self) -> &str {
		match self {
			Self::Parsed { entity_id, .. } => entity_id,
			Self::Fallback { raw } => raw,
		}
	}
}
