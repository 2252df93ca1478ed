use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::document::Record;
use crate::model::occurrence::Occurrence;

/// Last minute of the day; times are minutes since local midnight.
pub const LAST_MINUTE: u16 = 1439;

/// A personal event, or its mirror under a group (same id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub occurrence: Occurrence,
    pub time_start: u16,
    pub time_end: u16,
    /// Author display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Event {
    pub fn new(title: impl Into<String>, occurrence: Occurrence, time_start: u16, time_end: u16) -> Self {
        Self {
            id: None,
            title: title.into(),
            occurrence,
            time_start,
            time_end,
            name: None,
        }
    }

    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `HH:MM - HH:MM`
    pub fn time_range(&self) -> String {
        format!(
            "{:02}:{:02} - {:02}:{:02}",
            self.time_start / 60,
            self.time_start % 60,
            self.time_end / 60,
            self.time_end % 60
        )
    }
}

impl Record for Event {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn validate(&self) -> SyncResult<()> {
        validate_minutes(self.time_start, self.time_end)
    }
}

pub(crate) fn validate_minutes(start: u16, end: u16) -> SyncResult<()> {
    // start < end is expected but not enforced
    for minute in [start, end] {
        if minute > LAST_MINUTE {
            return Err(SyncError::Decode(format!(
                "time {minute} is outside 0..={LAST_MINUTE}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::Document;
    use serde_json::json;

    #[test]
    fn decodes_document_and_attaches_id() {
        let document = Document::new(
            "ev-1",
            json!({
                "title": "Standup",
                "occurrence": [1, 3, 5],
                "timeStart": 540,
                "timeEnd": 570
            }),
        );
        let event = Event::from_document(&document).expect("decode");
        assert_eq!(event.id.as_deref(), Some("ev-1"));
        assert_eq!(event.occurrence, Occurrence::weekly([1, 3, 5]).expect("weekly"));
        assert_eq!(event.time_range(), "09:00 - 09:30");
        assert!(event.name.is_none());
    }

    #[test]
    fn fields_omit_id() {
        let mut event = Event::new("Gym", Occurrence::weekly([2]).expect("weekly"), 1080, 1140)
            .with_author("Al");
        event.set_id("ev-9".to_string());
        let fields = event.to_fields().expect("fields");
        assert!(fields.get("id").is_none());
        assert_eq!(fields["name"], json!("Al"));
        assert_eq!(fields["timeStart"], json!(1080));
    }

    #[test]
    fn out_of_range_minutes_fail_to_decode() {
        let document = Document::new(
            "bad",
            json!({ "title": "x", "occurrence": [1], "timeStart": 2000, "timeEnd": 10 }),
        );
        assert!(matches!(
            Event::from_document(&document),
            Err(SyncError::Decode(_))
        ));
    }
}
