//! Lucky box (gacha) reward draws.
//!
//! A draw picks a rarity tier from fixed cumulative probability bands, then a
//! reward uniformly from that tier's list. Draws carry no state between them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Points debited up front for a ten-pull.
pub const OPEN_TEN_COST: i64 = 100;

/// Number of draws in a ten-pull.
pub const OPEN_TEN_COUNT: usize = 10;

/// Entries kept in the rolling history.
pub const HISTORY_LIMIT: usize = 20;

/// Korea Standard Time, used for the daily free-open boundary.
const KST_OFFSET_SECS: i64 = 9 * 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Common, Tier::Rare, Tier::Epic, Tier::Legendary];

    /// Probability of this tier in percent.
    pub fn percent(self) -> u32 {
        match self {
            Tier::Common => 60,
            Tier::Rare => 25,
            Tier::Epic => 12,
            Tier::Legendary => 3,
        }
    }

    /// Map a uniform sample in `[0, 1)` onto the cumulative bands.
    pub fn from_roll(roll: f64) -> Tier {
        let mut upper = 0.0;
        for tier in Tier::ALL {
            upper += f64::from(tier.percent()) / 100.0;
            if roll < upper {
                return tier;
            }
        }
        // Floating point accumulation can leave the top band a hair short of 1.0.
        Tier::Legendary
    }

    pub fn rewards(self) -> &'static [Reward] {
        match self {
            Tier::Common => COMMON_REWARDS,
            Tier::Rare => RARE_REWARDS,
            Tier::Epic => EPIC_REWARDS,
            Tier::Legendary => LEGENDARY_REWARDS,
        }
    }
}

/// A reward from the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub id: &'static str,
    pub name: &'static str,
    pub points: i64,
}

impl Reward {
    const fn new(id: &'static str, name: &'static str, points: i64) -> Self {
        Self { id, name, points }
    }
}

const COMMON_REWARDS: &[Reward] = &[
    Reward::new("coffee_stamp", "커피 스탬프", 5),
    Reward::new("receipt_roll", "영수증 용지", 5),
    Reward::new("cheer_note", "응원 쪽지", 8),
    Reward::new("bamboo_leaf", "대나무 잎", 10),
];

const RARE_REWARDS: &[Reward] = &[
    Reward::new("regular_customer", "단골 손님", 20),
    Reward::new("good_review", "별점 5점 리뷰", 25),
    Reward::new("lunch_rush", "점심 대박", 30),
];

const EPIC_REWARDS: &[Reward] = &[
    Reward::new("tv_feature", "맛집 방송 출연", 50),
    Reward::new("rent_freeze", "임대료 동결", 80),
];

const LEGENDARY_REWARDS: &[Reward] = &[
    Reward::new("golden_bamboo", "황금 대나무", 300),
    Reward::new("building_owner", "건물주", 500),
];

/// One draw result, as recorded in the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawnReward {
    pub tier: Tier,
    pub reward_id: String,
    pub name: String,
    pub points: i64,
    pub drawn_at: DateTime<Utc>,
}

impl DrawnReward {
    fn new(tier: Tier, reward: &Reward, drawn_at: DateTime<Utc>) -> Self {
        Self {
            tier,
            reward_id: reward.id.to_string(),
            name: reward.name.to_string(),
            points: reward.points,
            drawn_at,
        }
    }
}

/// Draw a single reward.
pub fn draw<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> DrawnReward {
    let tier = Tier::from_roll(rng.gen::<f64>());
    let rewards = tier.rewards();
    let reward = &rewards[rng.gen_range(0..rewards.len())];
    DrawnReward::new(tier, reward, now)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoxError {
    #[error("the free box was already opened today")]
    AlreadyOpenedToday,
    #[error("opening ten boxes costs {cost} points, balance is {balance}")]
    InsufficientPoints { cost: i64, balance: i64 },
}

/// Per-user lucky box subtree of the game snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoxState {
    #[serde(default)]
    pub last_opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reward: Option<DrawnReward>,
    /// Newest first, at most `HISTORY_LIMIT` entries.
    #[serde(default)]
    pub history: Vec<DrawnReward>,
    #[serde(default)]
    pub total_opened: u64,
    #[serde(default)]
    pub legendary_count: u64,
    #[serde(default)]
    pub epic_count: u64,
}

/// Outcome of an open; `points_delta` is the net change to the balance.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenOutcome {
    pub rewards: Vec<DrawnReward>,
    pub points_spent: i64,
    pub points_won: i64,
    pub points_delta: i64,
}

impl BoxState {
    /// Whether the free daily box is available at `now`.
    pub fn can_open_free(&self, now: DateTime<Utc>) -> bool {
        match self.last_opened_at {
            Some(last) => kst_date(last) != kst_date(now),
            None => true,
        }
    }

    /// Open the free daily box.
    pub fn open_free<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<OpenOutcome, BoxError> {
        if !self.can_open_free(now) {
            return Err(BoxError::AlreadyOpenedToday);
        }

        let reward = draw(rng, now);
        self.record(&reward);
        self.last_opened_at = Some(now);

        Ok(OpenOutcome {
            points_won: reward.points,
            points_delta: reward.points,
            points_spent: 0,
            rewards: vec![reward],
        })
    }

    /// Paid ten-pull. The cost is charged regardless of what is drawn.
    pub fn open_ten<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        balance: i64,
        now: DateTime<Utc>,
    ) -> Result<OpenOutcome, BoxError> {
        if balance < OPEN_TEN_COST {
            return Err(BoxError::InsufficientPoints {
                cost: OPEN_TEN_COST,
                balance,
            });
        }

        let rewards: Vec<DrawnReward> = (0..OPEN_TEN_COUNT).map(|_| draw(rng, now)).collect();
        for reward in &rewards {
            self.record(reward);
        }
        let points_won: i64 = rewards.iter().map(|r| r.points).sum();

        Ok(OpenOutcome {
            rewards,
            points_spent: OPEN_TEN_COST,
            points_won,
            points_delta: points_won - OPEN_TEN_COST,
        })
    }

    fn record(&mut self, reward: &DrawnReward) {
        self.total_opened += 1;
        match reward.tier {
            Tier::Legendary => self.legendary_count += 1,
            Tier::Epic => self.epic_count += 1,
            _ => {}
        }
        self.history.insert(0, reward.clone());
        self.history.truncate(HISTORY_LIMIT);
        self.last_reward = Some(reward.clone());
    }
}

fn kst_date(at: DateTime<Utc>) -> NaiveDate {
    (at + Duration::seconds(KST_OFFSET_SECS)).date_naive()
}
