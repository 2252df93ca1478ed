//! Best-effort propagation of personal events into group calendars.
//!
//! A mirror shares its personal event's id, which is what lets later
//! updates and deletes find it. Each group is written independently: a
//! failure is logged and reported, never retried or rolled back, and never
//! affects the personal write or the other groups.

pub mod report;
pub mod target;

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::model::document::object_mut;
use crate::model::{Event, Record};
use crate::remote::{CollectionPath, SharedRemote};

pub use report::FanOutReport;
pub use target::{DirectMirrorTarget, MirrorTarget};

#[derive(Clone)]
pub struct MirrorCoordinator {
    remote: SharedRemote,
    target: Arc<dyn MirrorTarget>,
}

impl MirrorCoordinator {
    pub fn new(remote: SharedRemote) -> Self {
        let target = Arc::new(DirectMirrorTarget::new(remote.clone()));
        Self { remote, target }
    }

    pub fn with_target(remote: SharedRemote, target: Arc<dyn MirrorTarget>) -> Self {
        Self { remote, target }
    }

    /// Mirror a new personal event into every group, giving it an id first
    /// if it has none.
    pub async fn on_personal_event_created(
        &self,
        user_id: &str,
        event: &mut Event,
        group_ids: &[String],
    ) -> SyncResult<FanOutReport> {
        if event.id.is_none() {
            let id = self
                .remote
                .allocate_id(&CollectionPath::user_calendar(user_id));
            event.set_id(id);
        }
        self.put_everywhere(event, group_ids, "create").await
    }

    /// Fully replace the mirror in every group. The event must carry the id
    /// its mirrors were written under.
    pub async fn on_personal_event_updated(
        &self,
        event: &Event,
        group_ids: &[String],
    ) -> SyncResult<FanOutReport> {
        self.put_everywhere(event, group_ids, "update").await
    }

    pub async fn on_personal_event_deleted(
        &self,
        event_id: &str,
        group_ids: &[String],
    ) -> FanOutReport {
        let removals = group_ids.iter().map(|group_id| async move {
            let result = self.target.remove(group_id, event_id).await;
            (group_id.clone(), result)
        });
        let report = FanOutReport::collect(event_id, join_all(removals).await);
        log_failures(&report, "delete");
        report
    }

    /// Copy every personal event currently in the user's calendar into the
    /// group, keeping ids and stamping `author` as the event's name.
    ///
    /// One-off: events created later reach the group through the other
    /// operations.
    pub async fn backfill_on_group_join_or_create(
        &self,
        user_id: &str,
        group_id: &str,
        author: &str,
    ) -> SyncResult<FanOutReport> {
        let documents = self
            .remote
            .list(&CollectionPath::user_calendar(user_id))
            .await?;
        let copies = documents.into_iter().map(|document| async move {
            let mut data = document.data;
            let stamped = object_mut(&mut data).map(|fields| {
                fields.insert("name".to_string(), Value::String(author.to_string()));
            });
            let result = match stamped {
                Ok(()) => self.target.put(group_id, &document.id, data).await,
                Err(error) => Err(error),
            };
            (document.id, result)
        });

        let mut report = FanOutReport {
            event_id: format!("backfill:{group_id}"),
            ..FanOutReport::default()
        };
        for (event_id, result) in join_all(copies).await {
            match result {
                Ok(()) => report.succeeded.push(event_id),
                Err(error) => {
                    tracing::warn!(
                        "backfill of event {} into group {} failed: {}",
                        event_id,
                        group_id,
                        error
                    );
                    report.failed.push((event_id, error));
                }
            }
        }
        tracing::info!(
            "backfilled {} of {} events into group {}",
            report.succeeded.len(),
            report.attempted(),
            group_id
        );
        Ok(report)
    }

    async fn put_everywhere(
        &self,
        event: &Event,
        group_ids: &[String],
        action: &str,
    ) -> SyncResult<FanOutReport> {
        let event_id = event
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SyncError::InvalidInput(format!("cannot {action} a mirror without an event id"))
            })?;
        let fields = event.to_fields()?;
        let writes = group_ids.iter().map(|group_id| {
            let fields = fields.clone();
            let event_id = event_id.as_str();
            async move {
                let result = self.target.put(group_id, event_id, fields).await;
                (group_id.clone(), result)
            }
        });
        let report = FanOutReport::collect(&event_id, join_all(writes).await);
        log_failures(&report, action);
        Ok(report)
    }
}

fn log_failures(report: &FanOutReport, action: &str) {
    for (group_id, error) in &report.failed {
        tracing::warn!(
            "mirror {} of event {} to group {} failed: {}",
            action,
            report.event_id,
            group_id,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Occurrence};
    use crate::remote::{MemoryRemote, RemoteStore, WriteOp};
    use serde_json::json;

    fn groups(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn standup() -> Event {
        Event::new("Standup", Occurrence::weekly([1, 3, 5]).expect("weekly"), 540, 570)
            .with_author("Al")
    }

    #[tokio::test]
    async fn create_mirrors_with_shared_id_despite_one_failure() {
        let remote = Arc::new(MemoryRemote::new());
        remote.fail_writes("groups/g2/");
        let coordinator = MirrorCoordinator::new(remote.clone());

        let mut event = standup();
        let event_id = remote.allocate_id(&CollectionPath::user_calendar("u1"));
        event.set_id(event_id.clone());
        remote
            .set(
                &CollectionPath::user_calendar("u1").doc(&event_id),
                event.to_fields().expect("fields"),
            )
            .await
            .expect("personal write");

        let report = coordinator
            .on_personal_event_created("u1", &mut event, &groups(&["g1", "g2"]))
            .await
            .expect("fan out");

        let mirror_writes: Vec<_> = remote
            .writes()
            .into_iter()
            .filter(|write| write.path.collection().as_str().starts_with("groups/"))
            .collect();
        assert_eq!(mirror_writes.len(), 2);
        assert!(mirror_writes.iter().all(|write| write.path.id() == event_id));

        assert_eq!(report.succeeded, vec!["g1".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "g2");

        let mirrored = remote
            .get(&CollectionPath::group_calendar("g1").doc(&event_id))
            .await
            .expect("get")
            .expect("mirror exists");
        assert_eq!(mirrored.data["title"], json!("Standup"));
        assert!(remote
            .get(&CollectionPath::user_calendar("u1").doc(&event_id))
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn create_assigns_missing_id() {
        let remote = Arc::new(MemoryRemote::new());
        let coordinator = MirrorCoordinator::new(remote.clone());
        let mut event = standup();
        let report = coordinator
            .on_personal_event_created("u1", &mut event, &groups(&["g1"]))
            .await
            .expect("fan out");
        let event_id = event.id.clone().expect("assigned");
        assert_eq!(report.event_id, event_id);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn update_and_delete_target_the_same_id() {
        let remote = Arc::new(MemoryRemote::new());
        let coordinator = MirrorCoordinator::new(remote.clone());
        let mut event = standup();
        event.set_id("e1".to_string());
        let targets = groups(&["g1", "g2"]);
        coordinator
            .on_personal_event_created("u1", &mut event, &targets)
            .await
            .expect("create");

        event.title = "Daily".to_string();
        coordinator
            .on_personal_event_updated(&event, &targets)
            .await
            .expect("update");
        let mirrored = remote
            .get(&CollectionPath::group_calendar("g2").doc("e1"))
            .await
            .expect("get")
            .expect("mirror");
        assert_eq!(mirrored.data["title"], json!("Daily"));

        let report = coordinator.on_personal_event_deleted("e1", &targets).await;
        assert_eq!(report.succeeded.len(), 2);
        assert!(remote
            .list(&CollectionPath::group_calendar("g1"))
            .await
            .expect("list")
            .is_empty());
        let deletes = remote
            .writes()
            .into_iter()
            .filter(|write| write.op == WriteOp::Delete)
            .count();
        assert_eq!(deletes, 2);
    }

    #[tokio::test]
    async fn backfill_copies_raw_documents_with_author() {
        let remote = Arc::new(MemoryRemote::new());
        let calendar = CollectionPath::user_calendar("u1");
        remote
            .set(
                &calendar.doc("e1"),
                json!({ "title": "Gym", "occurrence": [2], "timeStart": 1080, "timeEnd": 1140 }),
            )
            .await
            .expect("seed e1");
        remote
            .set(
                &calendar.doc("e2"),
                json!({ "title": "Old", "occurrence": [1_893_456_000i64], "timeStart": 0,
                        "timeEnd": 30, "name": "Someone" }),
            )
            .await
            .expect("seed e2");
        let coordinator = MirrorCoordinator::new(remote.clone());

        let report = coordinator
            .backfill_on_group_join_or_create("u1", "g1", "Al")
            .await
            .expect("backfill");
        assert_eq!(report.succeeded.len(), 2);

        let copies: Vec<Document> = remote
            .list(&CollectionPath::group_calendar("g1"))
            .await
            .expect("list");
        let ids: Vec<&str> = copies.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert!(copies.iter().all(|doc| doc.data["name"] == json!("Al")));
        assert_eq!(copies[1].data["occurrence"], json!([1_893_456_000i64]));
    }

    #[tokio::test]
    async fn no_groups_means_no_writes() {
        let remote = Arc::new(MemoryRemote::new());
        let coordinator = MirrorCoordinator::new(remote.clone());
        let mut event = standup();
        let report = coordinator
            .on_personal_event_created("u1", &mut event, &[])
            .await
            .expect("fan out");
        assert_eq!(report.attempted(), 0);
        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn update_without_id_writes_nothing() {
        let remote = Arc::new(MemoryRemote::new());
        let coordinator = MirrorCoordinator::new(remote.clone());
        let err = coordinator
            .on_personal_event_updated(&standup(), &groups(&["g1", "g2"]))
            .await
            .expect_err("no id");
        assert!(matches!(err, SyncError::InvalidInput(_)));
        assert!(remote.writes().is_empty());
        assert!(remote
            .list(&CollectionPath::group_calendar("g1"))
            .await
            .expect("list")
            .is_empty());
    }
}
