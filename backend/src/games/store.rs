//! Store growth idle game.
//!
//! The store earns currency every second from owned upgrades. Experience
//! follows revenue, and each level-up doubles revenue for a short window.
//! Time spent away is credited once at load as a lump sum.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cost multiplier applied per owned unit.
pub const COST_GROWTH: f64 = 1.5;

/// Revenue multiplier while the level-up bonus is active.
pub const BONUS_MULTIPLIER: i64 = 2;

/// Length of the level-up bonus window, in ticks (seconds).
pub const BONUS_DURATION_SECS: u32 = 60;

/// Offline catch-up never credits more than a day.
pub const OFFLINE_CAP_SECS: i64 = 24 * 60 * 60;

/// Longest stretch of active play one report may cover. Longer gaps are
/// credited through offline reconciliation on the next load.
pub const MAX_REPORT_SECS: u32 = 5 * 60;

/// Slack allowed between reported play time and wall-clock time.
pub const REPORT_SLACK_SECS: i64 = 5;

/// Manual clicks accepted per second of reported play.
pub const MAX_CLICKS_PER_SEC: u64 = 20;

/// A purchasable upgrade.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Upgrade {
    pub id: &'static str,
    pub name: &'static str,
    pub base_cost: i64,
    pub rate_per_unit: i64,
}

pub const UPGRADES: &[Upgrade] = &[
    Upgrade {
        id: "part_timer",
        name: "알바생",
        base_cost: 15,
        rate_per_unit: 1,
    },
    Upgrade {
        id: "coffee_machine",
        name: "커피 머신",
        base_cost: 100,
        rate_per_unit: 5,
    },
    Upgrade {
        id: "delivery_app",
        name: "배달앱 입점",
        base_cost: 500,
        rate_per_unit: 20,
    },
    Upgrade {
        id: "second_branch",
        name: "2호점",
        base_cost: 3_000,
        rate_per_unit: 100,
    },
    Upgrade {
        id: "franchise",
        name: "프랜차이즈",
        base_cost: 20_000,
        rate_per_unit: 500,
    },
];

pub fn find_upgrade(id: &str) -> Option<&'static Upgrade> {
    UPGRADES.iter().find(|u| u.id == id)
}

/// Price of the next unit when `owned` units are already held.
pub fn upgrade_cost(base_cost: i64, owned: u32) -> i64 {
    let exponent = i32::try_from(owned).unwrap_or(i32::MAX);
    (base_cost as f64 * COST_GROWTH.powi(exponent)).round() as i64
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown upgrade '{0}'")]
    UnknownUpgrade(String),
    #[error("upgrade costs {cost}, balance is {balance}")]
    InsufficientCurrency { cost: i64, balance: i64 },
    #[error("reported {reported}s of play but only {allowed}s have passed")]
    ReportTooLong { reported: i64, allowed: i64 },
    #[error("reported {clicks} clicks, at most {allowed} allowed")]
    TooManyClicks { clicks: u64, allowed: u64 },
}

/// Per-user store subtree of the game snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreState {
    pub currency: i64,
    pub total_earned: i64,
    /// Owned count per upgrade id.
    pub upgrades: BTreeMap<String, u32>,
    pub level: u32,
    pub experience: i64,
    pub bonus_seconds_remaining: u32,
    /// Base revenue at the last save, used for offline credit.
    pub last_revenue_rate: i64,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            currency: 0,
            total_earned: 0,
            upgrades: BTreeMap::new(),
            level: 1,
            experience: 0,
            bonus_seconds_remaining: 0,
            last_revenue_rate: 0,
            last_saved_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub earned: i64,
    pub levels_gained: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub upgrade_id: String,
    pub cost: i64,
    pub owned: u32,
    pub next_cost: i64,
}

impl StoreState {
    pub fn owned(&self, upgrade_id: &str) -> u32 {
        self.upgrades.get(upgrade_id).copied().unwrap_or(0)
    }

    /// Revenue per second before the bonus multiplier.
    pub fn base_revenue(&self) -> i64 {
        UPGRADES
            .iter()
            .map(|u| u.rate_per_unit * i64::from(self.owned(u.id)))
            .sum()
    }

    pub fn bonus_multiplier(&self) -> i64 {
        if self.bonus_seconds_remaining > 0 {
            BONUS_MULTIPLIER
        } else {
            1
        }
    }

    pub fn experience_to_next_level(&self) -> i64 {
        i64::from(self.level) * 100
    }

    /// One second of play.
    pub fn tick(&mut self) -> TickReport {
        let revenue = self.base_revenue() * self.bonus_multiplier();
        self.currency += revenue;
        self.total_earned += revenue;
        self.bonus_seconds_remaining = self.bonus_seconds_remaining.saturating_sub(1);

        self.experience += revenue / 10;
        let mut levels_gained = 0;
        while self.experience >= self.experience_to_next_level() {
            self.experience -= self.experience_to_next_level();
            self.level += 1;
            self.bonus_seconds_remaining = BONUS_DURATION_SECS;
            levels_gained += 1;
        }

        TickReport {
            earned: revenue,
            levels_gained,
        }
    }

    pub fn advance(&mut self, seconds: u32) -> TickReport {
        let mut report = TickReport::default();
        for _ in 0..seconds {
            let step = self.tick();
            report.earned += step.earned;
            report.levels_gained += step.levels_gained;
        }
        report
    }

    /// Manual clicks earn one unit of currency per level each.
    pub fn click(&mut self, clicks: u64) -> i64 {
        let earned = i64::try_from(clicks)
            .unwrap_or(i64::MAX)
            .saturating_mul(i64::from(self.level));
        self.currency += earned;
        self.total_earned += earned;
        earned
    }

    /// Buy one unit of an upgrade. Nothing changes when the balance is short.
    pub fn purchase(&mut self, upgrade_id: &str) -> Result<PurchaseReceipt, StoreError> {
        let upgrade = find_upgrade(upgrade_id)
            .ok_or_else(|| StoreError::UnknownUpgrade(upgrade_id.to_string()))?;
        let owned = self.owned(upgrade.id);
        let cost = upgrade_cost(upgrade.base_cost, owned);

        if self.currency < cost {
            return Err(StoreError::InsufficientCurrency {
                cost,
                balance: self.currency,
            });
        }

        self.currency -= cost;
        self.upgrades.insert(upgrade.id.to_string(), owned + 1);

        Ok(PurchaseReceipt {
            upgrade_id: upgrade.id.to_string(),
            cost,
            owned: owned + 1,
            next_cost: upgrade_cost(upgrade.base_cost, owned + 1),
        })
    }

    /// Credit time away since the last save. Returns the amount credited.
    pub fn reconcile_offline(&mut self, now: DateTime<Utc>) -> i64 {
        let credit = match self.last_saved_at {
            Some(last) => {
                let elapsed = (now - last).num_seconds().clamp(0, OFFLINE_CAP_SECS);
                // The level-up bonus runs on wall-clock time while away.
                self.bonus_seconds_remaining = self
                    .bonus_seconds_remaining
                    .saturating_sub(u32::try_from(elapsed).unwrap_or(u32::MAX));
                elapsed * self.last_revenue_rate
            }
            None => 0,
        };

        self.currency += credit;
        self.total_earned += credit;
        self.mark_saved(now);
        credit
    }

    /// Apply a client-reported stretch of active play, then mark saved.
    pub fn apply_play(
        &mut self,
        seconds: u32,
        clicks: u64,
        now: DateTime<Utc>,
    ) -> Result<TickReport, StoreError> {
        let allowed = match self.last_saved_at {
            Some(last) => (now - last).num_seconds().max(0) + REPORT_SLACK_SECS,
            None => REPORT_SLACK_SECS,
        }
        .min(i64::from(MAX_REPORT_SECS));
        if i64::from(seconds) > allowed {
            return Err(StoreError::ReportTooLong {
                reported: i64::from(seconds),
                allowed,
            });
        }

        let allowed_clicks = u64::from(seconds.max(1)) * MAX_CLICKS_PER_SEC;
        if clicks > allowed_clicks {
            return Err(StoreError::TooManyClicks {
                clicks,
                allowed: allowed_clicks,
            });
        }

        let mut report = self.advance(seconds);
        report.earned += self.click(clicks);
        self.mark_saved(now);
        Ok(report)
    }

    pub fn mark_saved(&mut self, now: DateTime<Utc>) {
        self.last_saved_at = Some(now);
        self.last_revenue_rate = self.base_revenue();
    }
}
