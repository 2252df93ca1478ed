use crate::error::{SyncError, SyncResult};

/// Outcome of one fan-out, per target group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub event_id: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, SyncError)>,
}

impl FanOutReport {
    pub(crate) fn collect(
        event_id: &str,
        results: impl IntoIterator<Item = (String, SyncResult<()>)>,
    ) -> Self {
        let mut report = Self {
            event_id: event_id.to_string(),
            ..Self::default()
        };
        for (group_id, result) in results {
            match result {
                Ok(()) => report.succeeded.push(group_id),
                Err(error) => report.failed.push((group_id, error)),
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}
