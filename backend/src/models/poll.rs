//! Decision poll model.

use serde::{Deserialize, Serialize};

/// One of the two poll options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PollChoice {
    A,
    B,
}

impl PollChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollChoice::A => "A",
            PollChoice::B => "B",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(PollChoice::A),
            "B" => Some(PollChoice::B),
            _ => None,
        }
    }

    /// Column holding this option's vote counter.
    pub fn count_column(&self) -> &'static str {
        match self {
            PollChoice::A => "option_a_votes",
            PollChoice::B => "option_b_votes",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PollStatus {
    Active,
    Closed,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PollStatus::Active),
            "closed" => Some(PollStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub label: String,
    pub votes: i64,
}

/// A two-option decision poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub author_id: String,
    pub question: String,
    pub option_a: PollOption,
    pub option_b: PollOption,
    pub deadline: String,
    pub status: PollStatus,
    pub created_at: String,
    /// The caller's current vote, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_vote: Option<PollChoice>,
}

impl Poll {
    pub fn total_votes(&self) -> i64 {
        self.option_a.votes + self.option_b.votes
    }
}

/// Request body for creating a poll.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    /// RFC 3339 timestamp
    pub deadline: String,
}

/// Request body for casting or moving a vote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub choice: PollChoice,
}
