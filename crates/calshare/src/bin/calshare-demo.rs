//! Walks one user through sign-up, a shared group and a vote against the
//! in-process remote store.
//!
//! Usage: `RUST_LOG=calshare=debug cargo run --bin calshare-demo`
//! Set `CALSHARE_DATA_DIR` to persist the cache snapshot on disk.

use std::sync::Arc;
use std::time::Duration;

use calshare::remote::MemoryRemote;
use calshare::storage::{FileStorage, MemoryStorage, SharedStorage};
use calshare::{Event, Occurrence, Proposal, Session, StaticAuth, SyncConfig, SyncResult};
use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info,calshare=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run(SyncConfig::from_env()).await {
        tracing::error!("demo failed: {}", error);
        std::process::exit(1);
    }
}

async fn run(config: SyncConfig) -> SyncResult<()> {
    let storage: SharedStorage = match &config.data_dir {
        Some(dir) => Arc::new(FileStorage::new(dir.clone())),
        None => Arc::new(MemoryStorage::new()),
    };
    let remote = Arc::new(MemoryRemote::new());

    let session = Session::open(
        &StaticAuth::signed_in("demo-user"),
        remote.clone(),
        storage,
        config,
    )
    .await?;
    session.register_profile("demo@example.com", "Demo").await?;
    session.start_sync().await?;

    let group = session.create_group("Book club").await?;
    let group_id = group.id.clone().unwrap_or_default();

    let standup = Event::new("Standup", Occurrence::weekly([1, 3, 5])?, 540, 570);
    let (standup, report) = session.create_event(standup).await?;
    tracing::info!(
        "created {} ({}) mirrored into {} group(s)",
        standup.title,
        standup.time_range(),
        report.succeeded.len()
    );

    let meeting = Proposal::new("Monthly meeting", Occurrence::weekly([4])?, 1140, 1260);
    let meeting = session.propose_event(&group_id, meeting).await?;
    if let Some(proposal_id) = meeting.id.as_deref() {
        session.accept_proposal(&group_id, proposal_id).await?;
    }

    // let the subscriptions catch up
    tokio::time::sleep(Duration::from_millis(100)).await;

    let today = Local::now().date_naive();
    let state = session.state();
    tracing::info!(
        "cache: {} event(s), {} group(s), {} proposal(s) in {}",
        state.events.len(),
        state.groups.len(),
        state.group_proposals(&group_id).len(),
        group.name
    );
    for event in session.events_on(today) {
        tracing::info!("today: {} {}", event.time_range(), event.title);
    }
    for proposal in session.proposals_on(&group_id, today) {
        tracing::info!(
            "proposed today: {} ({} accepted)",
            proposal.title,
            proposal.accepted.len()
        );
    }

    session.sign_out().await
}
