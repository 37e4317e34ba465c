use serde::{Deserialize, Serialize};

use crate::entry::EntryData;
use crate::event::AlarmEvent;

/// Recipient lists are stored the way the original operator tooling wrote
/// them: one colon-separated string.
const RECIPIENT_SEPARATOR: char = ':';

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct StoredEntry {
    pub id: String,
    pub point: String,
    pub recipients: String,
    pub condition: String,
    pub alarm_values: String,
    pub unit: String,
    pub warning: String,
    pub subject: String,
    pub cooldown_secs: f64,
    pub group: String,
}

impl StoredEntry {
    pub(super) fn from_data(data: &EntryData) -> Self {
        Self {
            id: data.id.clone(),
            point: data.point.clone(),
            recipients: data.recipients.join(&RECIPIENT_SEPARATOR.to_string()),
            condition: data.condition.clone(),
            alarm_values: data.alarm_values.clone(),
            unit: data.unit.clone(),
            warning: data.warning.clone(),
            subject: data.subject.clone(),
            cooldown_secs: data.cooldown_secs,
            group: data.group.clone(),
        }
    }

    pub(super) fn into_data(self) -> EntryData {
        EntryData {
            id: self.id,
            point: self.point.trim().to_string(),
            recipients: self
                .recipients
                .trim()
                .split(RECIPIENT_SEPARATOR)
                .map(|piece| piece.trim().to_string())
                .filter(|piece| !piece.is_empty())
                .collect(),
            condition: self.condition.trim().to_string(),
            alarm_values: self.alarm_values.trim().to_string(),
            unit: self.unit.trim().to_string(),
            warning: self.warning.trim().to_string(),
            subject: self.subject.trim().to_string(),
            cooldown_secs: self.cooldown_secs,
            group: self.group,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct StoredGroup {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// Archived copy of a dispatched alarm event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub point: String,
    pub condition: String,
    pub specified_range: String,
    pub unit: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub warning: String,
    pub value_measured: String,
    pub timestamp_utc: String,
}

impl StoredEvent {
    pub(super) fn from_event(event: &AlarmEvent) -> Self {
        Self {
            point: event.point.clone(),
            condition: event.condition.to_string(),
            specified_range: event.specified_range.clone(),
            unit: event.unit.clone(),
            subject: event.subject.clone(),
            recipients: event.recipients.clone(),
            warning: event.warning.clone(),
            value_measured: event.value_measured.clone(),
            timestamp_utc: event.timestamp.utc().to_rfc3339(),
        }
    }
}
