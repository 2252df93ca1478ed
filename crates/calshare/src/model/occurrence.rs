//! Recurrence rule attached to events and proposals.
//!
//! Stored documents carry an explicit discriminant:
//!
//! ```json
//! { "kind": "weekly", "values": [1, 3, 5] }
//! { "kind": "specific_dates", "values": [1893456000] }
//! ```
//!
//! Older documents hold a bare integer list. Those are classified by value
//! range when decoded: a list made only of 1..=7 is weekly, anything else is a
//! list of local-midnight epoch seconds.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const MONDAY: u8 = 1;
pub const SUNDAY: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceKind {
    Weekly,
    SpecificDates,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OccurrenceRepr", into = "TaggedOccurrence")]
pub enum Occurrence {
    /// Weekday numbers, Monday = 1 ... Sunday = 7.
    Weekly(BTreeSet<u8>),
    /// Epoch seconds of local midnight for each date.
    SpecificDates(BTreeSet<i64>),
}

impl Occurrence {
    pub fn weekly(days: impl IntoIterator<Item = u8>) -> Result<Self, SyncError> {
        let days: BTreeSet<u8> = days.into_iter().collect();
        if let Some(bad) = days.iter().find(|day| !(MONDAY..=SUNDAY).contains(*day)) {
            return Err(SyncError::InvalidInput(format!(
                "weekday {bad} is outside {MONDAY}..={SUNDAY}"
            )));
        }
        Ok(Occurrence::Weekly(days))
    }

    pub fn specific_dates(epoch_days: impl IntoIterator<Item = i64>) -> Self {
        Occurrence::SpecificDates(epoch_days.into_iter().collect())
    }

    /// Weekly iff every value lies in 1..=7. An empty list is weekly and
    /// never matches anything.
    pub fn classify(values: &[i64]) -> OccurrenceKind {
        if values
            .iter()
            .all(|value| (i64::from(MONDAY)..=i64::from(SUNDAY)).contains(value))
        {
            OccurrenceKind::Weekly
        } else {
            OccurrenceKind::SpecificDates
        }
    }

    /// Interpret an untagged integer list.
    pub fn from_legacy(values: &[i64]) -> Self {
        match Self::classify(values) {
            // classify guarantees every value fits in 1..=7
            OccurrenceKind::Weekly => {
                Occurrence::Weekly(values.iter().map(|value| *value as u8).collect())
            }
            OccurrenceKind::SpecificDates => Occurrence::SpecificDates(values.iter().copied().collect()),
        }
    }

    pub fn kind(&self) -> OccurrenceKind {
        match self {
            Occurrence::Weekly(_) => OccurrenceKind::Weekly,
            Occurrence::SpecificDates(_) => OccurrenceKind::SpecificDates,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Occurrence::Weekly(days) => days.is_empty(),
            Occurrence::SpecificDates(dates) => dates.is_empty(),
        }
    }

    /// Raw stored integers, sorted.
    pub fn values(&self) -> Vec<i64> {
        match self {
            Occurrence::Weekly(days) => days.iter().map(|day| i64::from(*day)).collect(),
            Occurrence::SpecificDates(dates) => dates.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedKind {
    Weekly,
    SpecificDates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaggedOccurrence {
    kind: TaggedKind,
    values: Vec<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OccurrenceRepr {
    Tagged(TaggedOccurrence),
    Legacy(Vec<i64>),
}

impl From<Occurrence> for TaggedOccurrence {
    fn from(occurrence: Occurrence) -> Self {
        let kind = match occurrence.kind() {
            OccurrenceKind::Weekly => TaggedKind::Weekly,
            OccurrenceKind::SpecificDates => TaggedKind::SpecificDates,
        };
        TaggedOccurrence {
            kind,
            values: occurrence.values(),
        }
    }
}

impl TryFrom<OccurrenceRepr> for Occurrence {
    type Error = SyncError;

    fn try_from(repr: OccurrenceRepr) -> Result<Self, Self::Error> {
        match repr {
            OccurrenceRepr::Legacy(values) => Ok(Occurrence::from_legacy(&values)),
            OccurrenceRepr::Tagged(TaggedOccurrence {
                kind: TaggedKind::SpecificDates,
                values,
            }) => Ok(Occurrence::specific_dates(values)),
            OccurrenceRepr::Tagged(TaggedOccurrence {
                kind: TaggedKind::Weekly,
                values,
            }) => {
                let days = values
                    .into_iter()
                    .map(|value| {
                        u8::try_from(value).map_err(|_| {
                            SyncError::Decode(format!("weekday {value} is outside {MONDAY}..={SUNDAY}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Occurrence::weekly(days).map_err(|error| SyncError::Decode(error.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_by_value_range() {
        assert_eq!(Occurrence::classify(&[1, 3, 5]), OccurrenceKind::Weekly);
        assert_eq!(Occurrence::classify(&[7]), OccurrenceKind::Weekly);
        assert_eq!(Occurrence::classify(&[]), OccurrenceKind::Weekly);
        assert_eq!(Occurrence::classify(&[0]), OccurrenceKind::SpecificDates);
        assert_eq!(
            Occurrence::classify(&[1, 1_893_456_000]),
            OccurrenceKind::SpecificDates
        );
    }

    #[test]
    fn tagged_form_keeps_discriminant() {
        let occurrence = Occurrence::specific_dates([1_893_456_000]);
        let value = serde_json::to_value(&occurrence).expect("serialize");
        assert_eq!(
            value,
            json!({ "kind": "specific_dates", "values": [1_893_456_000i64] })
        );

        let weekly: Occurrence =
            serde_json::from_value(json!({ "kind": "weekly", "values": [5, 1, 3] })).expect("decode");
        assert_eq!(weekly, Occurrence::weekly([1, 3, 5]).expect("weekly"));
    }

    #[test]
    fn tagged_specific_dates_in_weekday_range_stay_dates() {
        // Epoch seconds 1..=7 would be misread by the legacy rule.
        let occurrence: Occurrence =
            serde_json::from_value(json!({ "kind": "specific_dates", "values": [3] })).expect("decode");
        assert_eq!(occurrence.kind(), OccurrenceKind::SpecificDates);
    }

    #[test]
    fn legacy_list_is_classified() {
        let weekly: Occurrence = serde_json::from_value(json!([1, 3, 5])).expect("decode");
        assert_eq!(weekly.kind(), OccurrenceKind::Weekly);

        let dates: Occurrence = serde_json::from_value(json!([1_893_456_000i64])).expect("decode");
        assert_eq!(dates, Occurrence::specific_dates([1_893_456_000]));
    }

    #[test]
    fn tagged_weekly_out_of_range_is_rejected() {
        let result: Result<Occurrence, _> =
            serde_json::from_value(json!({ "kind": "weekly", "values": [8] }));
        assert!(result.is_err());
        assert!(Occurrence::weekly([0]).is_err());
    }
}
