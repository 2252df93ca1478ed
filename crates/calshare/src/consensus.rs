//! Per-member accept/decline votes on group proposals.
//!
//! A member is in at most one of `accepted` and `declined`. A vote sets the
//! member in one map and deletes it from the other in a single remote
//! update, so repeating a vote changes nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::model::{Proposal, Record};
use crate::recurrence::RecurrenceEvaluator;
use crate::remote::{CollectionPath, FieldUpdate, SharedRemote};

const ACCEPTED: &str = "accepted";
const DECLINED: &str = "declined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    NoResponse,
    Accepted,
    Declined,
}

impl Vote {
    fn maps(self) -> (&'static str, &'static str) {
        match self {
            Vote::Accept => (ACCEPTED, DECLINED),
            Vote::Decline => (DECLINED, ACCEPTED),
        }
    }
}

pub fn vote_state(proposal: &Proposal, member_id: &str) -> VoteState {
    if proposal.accepted.contains_key(member_id) {
        VoteState::Accepted
    } else if proposal.declined.contains_key(member_id) {
        VoteState::Declined
    } else {
        VoteState::NoResponse
    }
}

/// The local equivalent of [`vote_updates`]; `true` if anything changed.
pub fn apply_vote(proposal: &mut Proposal, member_id: &str, member_name: &str, vote: Vote) -> bool {
    let (into, out_of) = match vote {
        Vote::Accept => (&mut proposal.accepted, &mut proposal.declined),
        Vote::Decline => (&mut proposal.declined, &mut proposal.accepted),
    };
    let removed = out_of.remove(member_id).is_some();
    let previous = into.insert(member_id.to_string(), member_name.to_string());
    removed || previous.as_deref() != Some(member_name)
}

/// Set the member in one vote map and delete it from the other.
pub fn vote_updates(member_id: &str, member_name: &str, vote: Vote) -> SyncResult<Vec<FieldUpdate>> {
    if member_id.is_empty() || member_id.contains('.') {
        return Err(SyncError::InvalidInput(format!(
            "member id {member_id:?} cannot be used as a field name"
        )));
    }
    let (into, out_of) = vote.maps();
    Ok(vec![
        FieldUpdate::set(
            format!("{into}.{member_id}"),
            Value::String(member_name.to_string()),
        ),
        FieldUpdate::delete(format!("{out_of}.{member_id}")),
    ])
}

#[derive(Clone)]
pub struct ProposalConsensus {
    remote: SharedRemote,
    evaluator: RecurrenceEvaluator,
}

impl ProposalConsensus {
    pub fn new(remote: SharedRemote, evaluator: RecurrenceEvaluator) -> Self {
        Self { remote, evaluator }
    }

    pub async fn accept(
        &self,
        group_id: &str,
        proposal_id: &str,
        member_id: &str,
        member_name: &str,
    ) -> SyncResult<()> {
        self.vote(group_id, proposal_id, member_id, member_name, Vote::Accept)
            .await
    }

    pub async fn decline(
        &self,
        group_id: &str,
        proposal_id: &str,
        member_id: &str,
        member_name: &str,
    ) -> SyncResult<()> {
        self.vote(group_id, proposal_id, member_id, member_name, Vote::Decline)
            .await
    }

    /// Nothing is changed locally; the vote shows up with the next snapshot.
    pub async fn vote(
        &self,
        group_id: &str,
        proposal_id: &str,
        member_id: &str,
        member_name: &str,
        vote: Vote,
    ) -> SyncResult<()> {
        let path = CollectionPath::group_proposals(group_id).doc(proposal_id);
        let updates = vote_updates(member_id, member_name, vote)?;
        if let Err(error) = self.remote.update(&path, updates).await {
            tracing::warn!("vote {:?} on {} failed: {}", vote, path, error);
            return Err(error);
        }
        Ok(())
    }

    /// Store a new proposal with empty vote maps and return it with its id.
    pub async fn propose(&self, group_id: &str, mut proposal: Proposal) -> SyncResult<Proposal> {
        proposal.accepted.clear();
        proposal.declined.clear();
        proposal.id = None;
        proposal.validate()?;
        let id = self
            .remote
            .add(&CollectionPath::group_proposals(group_id), proposal.to_fields()?)
            .await?;
        proposal.set_id(id);
        Ok(proposal)
    }

    pub fn occurs_on(&self, date: NaiveDate, proposal: &Proposal) -> bool {
        self.evaluator.occurs(date, &proposal.as_event())
    }

    /// Proposals occurring on `date`, in input order.
    pub fn proposals_on<'a>(&self, date: NaiveDate, proposals: &'a [Proposal]) -> Vec<&'a Proposal> {
        proposals
            .iter()
            .filter(|proposal| self.occurs_on(date, proposal))
            .collect()
    }
}
