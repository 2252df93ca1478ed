use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{timeout, Duration};

use super::*;
use crate::bus::Bus;
use crate::cache::{spawn_cache, CacheState, LocalCache};
use crate::event::CacheEvent;
use crate::remote::{MemoryRemote, RemoteStore};
use crate::storage::MemoryStorage;
use crate::subscription::handle::spawn_subscriptions;

async fn test_cache() -> CacheHandle {
    let cache = LocalCache::load(Arc::new(MemoryStorage::new()), "current_user", Bus::new(32))
        .await
        .expect("load");
    spawn_cache(cache)
}

async fn test_actor() -> (SubscriptionActor, Arc<MemoryRemote>, CacheHandle) {
    let remote = Arc::new(MemoryRemote::new());
    let cache = test_cache().await;
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let actor = SubscriptionActor::new(
        remote.clone(),
        cache.clone(),
        SyncConfig::default(),
        command_tx,
        command_rx,
    );
    (actor, remote, cache)
}

async fn next_delivery(actor: &mut SubscriptionActor) -> Delivery {
    let command = timeout(Duration::from_millis(200), actor.command_rx.recv())
        .await
        .expect("timeout")
        .expect("channel open");
    match command {
        SyncCommand::Delivery(delivery) => delivery,
        _ => panic!("expected a delivery"),
    }
}

async fn wait_for(cache: &CacheHandle, predicate: impl Fn(&CacheState) -> bool) -> Arc<CacheState> {
    let mut rx = cache.subscribe();
    timeout(Duration::from_secs(1), async {
        loop {
            let state = rx.borrow_and_update().clone();
            if predicate(&state) {
                return state;
            }
            rx.changed().await.expect("cache closed");
        }
    })
    .await
    .expect("timeout waiting for cache")
}

fn event_doc(title: &str) -> Value {
    json!({ "title": title, "occurrence": [1, 3, 5], "timeStart": 540, "timeEnd": 570 })
}

async fn seed_user(remote: &MemoryRemote, user_id: &str, groups: &[String]) {
    remote
        .set(
            &DocumentPath::user(user_id),
            json!({ "email": "al@example.com", "name": "Al", "profilePicture": "", "groups": groups }),
        )
        .await
        .expect("seed user");
}

async fn seed_group(remote: &MemoryRemote, group_id: &str, name: &str) {
    remote
        .set(
            &DocumentPath::group(group_id),
            json!({ "name": name, "members": ["u1"] }),
        )
        .await
        .expect("seed group");
}

#[tokio::test]
async fn delivery_after_stop_is_ignored() {
    let (mut actor, remote, cache) = test_actor().await;
    remote
        .set(&CollectionPath::user_calendar("u1").doc("e1"), event_doc("Standup"))
        .await
        .expect("seed");
    actor.user_id = Some("u1".to_string());

    assert!(actor.start(SubscriptionKey::PersonalEvents).await.expect("start"));
    let delivery = next_delivery(&mut actor).await;
    assert!(actor.stop(&SubscriptionKey::PersonalEvents));

    actor.handle_delivery(delivery).await.expect("handle");
    assert!(cache.state().events.is_empty());
}

#[tokio::test]
async fn delivery_from_replaced_generation_is_ignored() {
    let (mut actor, remote, cache) = test_actor().await;
    remote
        .set(&CollectionPath::user_calendar("u1").doc("e1"), event_doc("Standup"))
        .await
        .expect("seed");
    actor.user_id = Some("u1".to_string());

    actor.start(SubscriptionKey::PersonalEvents).await.expect("start");
    let stale = next_delivery(&mut actor).await;
    actor.stop(&SubscriptionKey::PersonalEvents);
    actor.start(SubscriptionKey::PersonalEvents).await.expect("restart");
    let fresh = next_delivery(&mut actor).await;
    assert_eq!(fresh.generation, stale.generation + 1);

    actor.handle_delivery(stale).await.expect("stale");
    assert!(cache.state().events.is_empty());
    actor.handle_delivery(fresh).await.expect("fresh");
    assert_eq!(cache.state().events.len(), 1);
}

#[tokio::test]
async fn start_is_idempotent_per_key() {
    let (mut actor, remote, _cache) = test_actor().await;
    actor.user_id = Some("u1".to_string());
    assert!(actor.start(SubscriptionKey::PersonalEvents).await.expect("first"));
    assert!(!actor.start(SubscriptionKey::PersonalEvents).await.expect("second"));
    assert_eq!(remote.listener_count(), 1);
    assert_eq!(actor.active_keys(), vec![SubscriptionKey::PersonalEvents]);
}

#[tokio::test]
async fn personal_events_need_a_user() {
    let (mut actor, _remote, _cache) = test_actor().await;
    let err = actor
        .start(SubscriptionKey::PersonalEvents)
        .await
        .expect_err("no user");
    assert_eq!(err, SyncError::NotSignedIn);
}

#[tokio::test]
async fn undecodable_documents_are_skipped() {
    let (mut actor, remote, cache) = test_actor().await;
    let calendar = CollectionPath::user_calendar("u1");
    remote
        .set(&calendar.doc("good"), event_doc("Standup"))
        .await
        .expect("good");
    remote
        .set(&calendar.doc("bad"), json!({ "title": 4 }))
        .await
        .expect("bad");
    actor.user_id = Some("u1".to_string());
    actor.start(SubscriptionKey::PersonalEvents).await.expect("start");
    let delivery = next_delivery(&mut actor).await;
    actor.handle_delivery(delivery).await.expect("handle");

    let events = &cache.state().events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id.as_deref(), Some("good"));
}

#[tokio::test]
async fn twenty_three_groups_open_three_batches_and_merge_sorted() {
    let remote = Arc::new(MemoryRemote::new());
    let group_ids: Vec<String> = (0..23).map(|i| format!("g{i:02}")).collect();
    for (i, group_id) in group_ids.iter().enumerate() {
        // names run opposite to ids
        seed_group(&remote, group_id, &format!("Group {:02}", 22 - i)).await;
    }
    seed_user(&remote, "u1", &group_ids).await;
    let cache = test_cache().await;
    let config = SyncConfig {
        follow_group_calendars: false,
        ..SyncConfig::default()
    };
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), config);

    manager.start_after_authentication("u1").await.expect("start");
    let keys = manager.active_keys().await.expect("keys");
    assert_eq!(
        keys,
        vec![
            SubscriptionKey::PersonalEvents,
            SubscriptionKey::GroupBatch(0),
            SubscriptionKey::GroupBatch(1),
            SubscriptionKey::GroupBatch(2),
        ]
    );

    let state = wait_for(&cache, |state| state.groups.len() == 23).await;
    let names: Vec<&str> = state.groups.iter().map(|group| group.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(names, sorted);
    assert_eq!(state.groups[0].id.as_deref(), Some("g22"));
}

#[tokio::test]
async fn start_after_authentication_twice_keeps_one_listener_per_key() {
    let remote = Arc::new(MemoryRemote::new());
    seed_group(&remote, "g1", "Family").await;
    seed_user(&remote, "u1", &["g1".to_string()]).await;
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());

    manager.start_after_authentication("u1").await.expect("first");
    // personal events, one batch, then group events and proposals once the batch lands
    let keys = timeout(Duration::from_secs(1), async {
        loop {
            let keys = manager.active_keys().await.expect("keys");
            if keys.len() == 4 {
                return keys;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("group calendars followed");
    assert!(keys.contains(&SubscriptionKey::GroupEvents("g1".to_string())));
    assert!(keys.contains(&SubscriptionKey::GroupProposals("g1".to_string())));
    let listeners = remote.listener_count();

    manager.start_after_authentication("u1").await.expect("second");
    assert_eq!(manager.active_keys().await.expect("keys"), keys);
    assert_eq!(remote.listener_count(), listeners);
    let state = wait_for(&cache, |state| state.groups.len() == 1).await;
    assert_eq!(state.user_id(), Some("u1"));
}

#[tokio::test]
async fn followed_group_calendars_reach_the_cache() {
    let remote = Arc::new(MemoryRemote::new());
    seed_group(&remote, "g1", "Family").await;
    seed_user(&remote, "u1", &["g1".to_string()]).await;
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());
    manager.start_after_authentication("u1").await.expect("start");

    remote
        .set(
            &CollectionPath::group_calendar("g1").doc("e1"),
            json!({ "title": "Dinner", "occurrence": { "kind": "weekly", "values": [5] },
                    "timeStart": 1140, "timeEnd": 1260, "name": "Al" }),
        )
        .await
        .expect("mirror");
    remote
        .set(
            &CollectionPath::group_proposals("g1").doc("p1"),
            json!({ "title": "Hike", "occurrence": [6], "timeStart": 600, "timeEnd": 900,
                    "accepted": { "u1": "Al" }, "declined": {} }),
        )
        .await
        .expect("proposal");

    let state = wait_for(&cache, |state| {
        state.group_events("g1").len() == 1 && state.group_proposals("g1").len() == 1
    })
    .await;
    assert_eq!(state.group_events("g1")[0].name.as_deref(), Some("Al"));
    assert_eq!(state.group_proposals("g1")[0].accepted.len(), 1);
}

#[tokio::test]
async fn resolving_fewer_groups_drops_their_batches() {
    let remote = Arc::new(MemoryRemote::new());
    let group_ids: Vec<String> = (0..12).map(|i| format!("g{i:02}")).collect();
    for group_id in &group_ids {
        seed_group(&remote, group_id, group_id).await;
    }
    seed_user(&remote, "u1", &group_ids).await;
    let cache = test_cache().await;
    let config = SyncConfig {
        follow_group_calendars: false,
        ..SyncConfig::default()
    };
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), config);
    manager.start_after_authentication("u1").await.expect("start");
    wait_for(&cache, |state| state.groups.len() == 12).await;

    manager
        .resolve_groups(group_ids[..10].to_vec())
        .await
        .expect("resolve");
    let state = wait_for(&cache, |state| state.groups.len() == 10).await;
    assert!(state.groups.iter().all(|group| group.id.as_deref() != Some("g11")));
    assert!(!manager
        .active_keys()
        .await
        .expect("keys")
        .contains(&SubscriptionKey::GroupBatch(1)));

    manager.resolve_groups(Vec::new()).await.expect("resolve none");
    wait_for(&cache, |state| state.groups.is_empty()).await;
}

#[tokio::test]
async fn subscription_error_is_not_fatal() {
    let remote = Arc::new(MemoryRemote::new());
    seed_user(&remote, "u1", &[]).await;
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());
    manager.start_after_authentication("u1").await.expect("start");

    let calendar = CollectionPath::user_calendar("u1");
    remote.break_listeners(&calendar, "permission denied");
    remote
        .set(&calendar.doc("e1"), event_doc("Standup"))
        .await
        .expect("write");
    wait_for(&cache, |state| state.events.len() == 1).await;
}

#[tokio::test]
async fn stop_all_releases_every_listener() {
    let remote = Arc::new(MemoryRemote::new());
    seed_group(&remote, "g1", "Family").await;
    seed_user(&remote, "u1", &["g1".to_string()]).await;
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());
    manager.start_after_authentication("u1").await.expect("start");

    manager.stop_all().await.expect("stop all");
    assert!(manager.active_keys().await.expect("keys").is_empty());
    timeout(Duration::from_secs(1), async {
        while remote.listener_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("listeners released");
}

#[tokio::test]
async fn growing_a_batch_never_publishes_without_listed_groups() {
    let remote = Arc::new(MemoryRemote::new());
    seed_group(&remote, "g1", "Alpha").await;
    seed_user(&remote, "u1", &["g1".to_string()]).await;
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());
    manager.start_after_authentication("u1").await.expect("start");
    wait_for(&cache, |state| state.groups.len() == 1).await;

    let mut bus_rx = cache.bus().subscribe();
    let mut watch_rx = cache.subscribe();
    let recorder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while watch_rx.changed().await.is_ok() {
            let ids = watch_rx.borrow_and_update().group_ids();
            let done = ids.len() == 2;
            seen.push(ids);
            if done {
                break;
            }
        }
        seen
    });

    seed_group(&remote, "g2", "Beta").await;
    seed_user(&remote, "u1", &["g1".to_string(), "g2".to_string()]).await;
    manager.refresh_groups().await.expect("refresh");
    let state = wait_for(&cache, |state| state.groups.len() == 2).await;
    assert_eq!(state.group_ids(), vec!["g1".to_string(), "g2".to_string()]);

    let seen = timeout(Duration::from_secs(1), recorder)
        .await
        .expect("recorder timeout")
        .expect("recorder");
    assert!(seen.iter().all(|ids| ids.contains(&"g1".to_string())), "{seen:?}");

    tokio::task::yield_now().await;
    let mut group_changes = 0;
    while let Ok(event) = bus_rx.try_recv() {
        if event == CacheEvent::GroupsChanged {
            group_changes += 1;
        }
    }
    assert_eq!(group_changes, 1);
    let keys = manager.active_keys().await.expect("keys");
    assert!(keys.contains(&SubscriptionKey::GroupEvents("g1".to_string())));
    assert!(keys.contains(&SubscriptionKey::GroupEvents("g2".to_string())));
}

#[tokio::test]
async fn group_deleted_elsewhere_drops_its_cached_calendars() {
    let remote = Arc::new(MemoryRemote::new());
    seed_group(&remote, "g1", "Family").await;
    seed_user(&remote, "u1", &["g1".to_string()]).await;
    remote
        .set(&CollectionPath::group_calendar("g1").doc("e1"), event_doc("Dinner"))
        .await
        .expect("mirror");
    let cache = test_cache().await;
    let manager = spawn_subscriptions(remote.clone(), cache.clone(), SyncConfig::default());
    manager.start_after_authentication("u1").await.expect("start");
    wait_for(&cache, |state| {
        state.group_events("g1").len() == 1 && state.group_proposals_cache.contains_key("g1")
    })
    .await;

    remote.delete(&DocumentPath::group("g1")).await.expect("delete");
    let state = wait_for(&cache, |state| {
        state.groups.is_empty()
            && !state.group_events_cache.contains_key("g1")
            && !state.group_proposals_cache.contains_key("g1")
    })
    .await;
    assert!(state.groups.is_empty());
    let keys = manager.active_keys().await.expect("keys");
    assert!(!keys.contains(&SubscriptionKey::GroupEvents("g1".to_string())));
}
