//! Budget - 日次と分単位のリクエスト枠
//!
//! `DailyBudget` は UTC 日付ごとの成功件数を数え、`MinuteWindow` は
//! 60 秒の固定ウィンドウ内のディスパッチ件数を数える。
//!
//! # 判定
//!
//! - 日次枠: 成功済み + 実行中 が上限に達したら新規ディスパッチを保留し、
//!   成功済みだけで上限に達したら待機中のリクエストを拒否する
//! - 分単位枠: ウィンドウが埋まったらウィンドウ終了まで保留する (拒否はしない)

use std::time::Duration;

use chrono::NaiveDate;
use tokio::time::Instant;

use crate::config::{clamp_daily_limit, clamp_per_minute_limit};

/// Length of one per-minute window.
pub(crate) const MINUTE: Duration = Duration::from_secs(60);

/// Whether the daily budget lets another attempt start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Open,
    /// Attempts in flight may still spend the remaining budget.
    Hold,
    /// Today's budget is spent.
    Exhausted(u32),
}

/// Successful requests counted per UTC day.
///
/// The counter belongs to one calendar date; any query with a different date
/// starts a fresh count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DailyBudget {
    limit: Option<u32>,
    used: u32,
    day: NaiveDate,
}

impl DailyBudget {
    pub fn new(limit: Option<u32>, today: NaiveDate) -> Self {
        Self {
            limit,
            used: 0,
            day: today,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.used = 0;
        }
    }

    /// Every attempt in flight may still succeed, so they count against
    /// the budget until their outcome is known.
    pub fn admit(&mut self, today: NaiveDate, in_flight: usize) -> Admission {
        self.roll(today);
        let Some(limit) = self.limit else {
            return Admission::Open;
        };
        if self.used >= limit {
            Admission::Exhausted(limit)
        } else if self.used as usize + in_flight >= limit as usize {
            Admission::Hold
        } else {
            Admission::Open
        }
    }

    pub fn record_success(&mut self, today: NaiveDate) {
        self.roll(today);
        self.used = self.used.saturating_add(1);
    }

    pub fn used(&mut self, today: NaiveDate) -> u32 {
        self.roll(today);
        self.used
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Returns the limit actually applied.
    pub fn set_limit(&mut self, limit: u32) -> u32 {
        let limit = clamp_daily_limit(limit);
        self.limit = Some(limit);
        limit
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// Dispatches counted in a fixed 60 second window.
///
/// The window opens with the first dispatch after the previous one ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MinuteWindow {
    limit: Option<u32>,
    started: Option<Instant>,
    count: u32,
}

impl MinuteWindow {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            started: None,
            count: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        if self.started.is_some_and(|started| now >= started + MINUTE) {
            self.started = None;
            self.count = 0;
        }
    }

    /// When the window is full, the instant it ends.
    pub fn full_until(&mut self, now: Instant) -> Option<Instant> {
        self.roll(now);
        let limit = self.limit?;
        if self.count < limit {
            return None;
        }
        self.started.map(|started| started + MINUTE)
    }

    pub fn record(&mut self, now: Instant) {
        self.roll(now);
        self.started.get_or_insert(now);
        self.count = self.count.saturating_add(1);
    }

    pub fn count(&mut self, now: Instant) -> u32 {
        self.roll(now);
        self.count
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Returns the limit actually applied.
    pub fn set_limit(&mut self, limit: u32) -> u32 {
        let limit = clamp_per_minute_limit(limit);
        self.limit = Some(limit);
        limit
    }
}
