//! Spend governance over rolling hourly and daily windows.
//!
//! The governor is advisory gatekeeping plus a source of truth: `check`
//! is called before a request and commits nothing, `record` is called
//! after a completed call and always commits. Windows reset lazily the
//! moment a check or record observes that they have elapsed; there is no
//! background timer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Spend ceilings and the alert fraction at which advisory warnings fire.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub max_tokens_per_hour: u64,
    pub max_tokens_per_day: u64,
    /// USD ceiling for the rolling hour.
    pub max_cost_per_hour: f64,
    /// Fraction of any ceiling at which a warning is logged without
    /// failing the check.
    pub alert_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_hour: 100_000,
            max_tokens_per_day: 1_000_000,
            max_cost_per_hour: 10.0,
            alert_threshold: 0.8,
        }
    }
}

/// A ceiling the pending request would cross.
#[derive(Debug, Error, PartialEq)]
pub enum BudgetError {
    #[error("hourly token limit: {used} used + {requested} requested > {limit}")]
    HourlyTokens { used: u64, requested: u64, limit: u64 },

    #[error("daily token limit: {used} used + {requested} requested > {limit}")]
    DailyTokens { used: u64, requested: u64, limit: u64 },

    #[error("hourly cost limit: ${used:.4} spent + ${requested:.4} requested > ${limit:.2}")]
    HourlyCost { used: f64, requested: f64, limit: f64 },
}

/// Read-only snapshot of counters and configured limits.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetUsage {
    pub hourly_tokens: u64,
    pub hourly_token_limit: u64,
    pub daily_tokens: u64,
    pub daily_token_limit: u64,
    pub hourly_cost: f64,
    pub hourly_cost_limit: f64,
    pub hour_window_started: DateTime<Utc>,
    pub day_window_started: DateTime<Utc>,
}

/// USD price per 1K tokens. Unknown models bill at the default rate.
pub fn price_per_1k_tokens(model: &str) -> f64 {
    match model {
        "deepseek-chat" => 0.0014,
        "deepseek-reasoner" => 0.0055,
        "gpt-4o" => 0.0125,
        "gpt-4o-mini" => 0.000_375,
        "gpt-3.5-turbo" => 0.001,
        _ => 0.002,
    }
}

fn cost_of(tokens: u64, model: &str) -> f64 {
    tokens as f64 / 1000.0 * price_per_1k_tokens(model)
}

/// Rolling-window usage and cost ceilings for one orchestrator instance.
#[derive(Debug)]
pub struct BudgetGovernor {
    config: BudgetConfig,
    hour_tokens: u64,
    hour_cost: f64,
    hour_started: DateTime<Utc>,
    day_tokens: u64,
    day_started: DateTime<Utc>,
}

impl BudgetGovernor {
    pub fn new(config: BudgetConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            hour_tokens: 0,
            hour_cost: 0.0,
            hour_started: now,
            day_tokens: 0,
            day_started: now,
        }
    }

    /// Restart any window whose length has elapsed. Called from every
    /// check and record; this is the only place counters reset.
    fn roll_windows(&mut self) {
        let now = Utc::now();
        if now - self.hour_started >= Duration::hours(1) {
            tracing::debug!("hourly budget window elapsed, resetting counters");
            self.hour_tokens = 0;
            self.hour_cost = 0.0;
            self.hour_started = now;
        }
        if now - self.day_started >= Duration::days(1) {
            tracing::debug!("daily budget window elapsed, resetting counters");
            self.day_tokens = 0;
            self.day_started = now;
        }
    }

    /// Fail when `estimated_tokens` on `model` would cross a ceiling.
    ///
    /// Commits nothing: usage only moves through [`Self::record`]. When
    /// the estimate would cross the alert fraction of a ceiling without
    /// crossing the ceiling itself, a warning is logged and the check
    /// still passes.
    pub fn check(&mut self, estimated_tokens: u64, model: &str) -> Result<(), BudgetError> {
        self.roll_windows();

        let projected_hour = self.hour_tokens + estimated_tokens;
        if projected_hour > self.config.max_tokens_per_hour {
            return Err(BudgetError::HourlyTokens {
                used: self.hour_tokens,
                requested: estimated_tokens,
                limit: self.config.max_tokens_per_hour,
            });
        }

        let projected_day = self.day_tokens + estimated_tokens;
        if projected_day > self.config.max_tokens_per_day {
            return Err(BudgetError::DailyTokens {
                used: self.day_tokens,
                requested: estimated_tokens,
                limit: self.config.max_tokens_per_day,
            });
        }

        let estimated_cost = cost_of(estimated_tokens, model);
        let projected_cost = self.hour_cost + estimated_cost;
        if projected_cost > self.config.max_cost_per_hour {
            return Err(BudgetError::HourlyCost {
                used: self.hour_cost,
                requested: estimated_cost,
                limit: self.config.max_cost_per_hour,
            });
        }

        let alert = self.config.alert_threshold;
        if projected_hour as f64 >= alert * self.config.max_tokens_per_hour as f64 {
            tracing::warn!(
                "hourly token usage at {}/{} with {} more requested, past {:.0}% alert threshold",
                self.hour_tokens,
                self.config.max_tokens_per_hour,
                estimated_tokens,
                alert * 100.0
            );
        }
        if projected_day as f64 >= alert * self.config.max_tokens_per_day as f64 {
            tracing::warn!(
                "daily token usage at {}/{} with {} more requested, past {:.0}% alert threshold",
                self.day_tokens,
                self.config.max_tokens_per_day,
                estimated_tokens,
                alert * 100.0
            );
        }
        if projected_cost >= alert * self.config.max_cost_per_hour {
            tracing::warn!(
                "hourly cost at ${:.4}/${:.2}, past {:.0}% alert threshold",
                self.hour_cost,
                self.config.max_cost_per_hour,
                alert * 100.0
            );
        }

        Ok(())
    }

    /// Commit actual consumption after a completed call.
    ///
    /// Always applies, whether or not a prior check passed: the check is
    /// advisory gatekeeping, this is the source of truth.
    pub fn record(&mut self, actual_tokens: u64, model: &str) {
        self.roll_windows();
        self.hour_tokens += actual_tokens;
        self.day_tokens += actual_tokens;
        self.hour_cost += cost_of(actual_tokens, model);
        tracing::debug!(
            "recorded {} tokens on {} (hour total {}, day total {})",
            actual_tokens,
            model,
            self.hour_tokens,
            self.day_tokens
        );
    }

    /// Read-only snapshot of counters and limits.
    pub fn usage(&self) -> BudgetUsage {
        BudgetUsage {
            hourly_tokens: self.hour_tokens,
            hourly_token_limit: self.config.max_tokens_per_hour,
            daily_tokens: self.day_tokens,
            daily_token_limit: self.config.max_tokens_per_day,
            hourly_cost: self.hour_cost,
            hourly_cost_limit: self.config.max_cost_per_hour,
            hour_window_started: self.hour_started,
            day_window_started: self.day_started,
        }
    }

    /// Backdate the window starts, standing in for elapsed wall-clock time.
    #[cfg(test)]
    fn backdate(&mut self, hours: i64) {
        self.hour_started -= Duration::hours(hours);
        self.day_started -= Duration::hours(hours);
    }
}

impl Default for BudgetGovernor {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}
