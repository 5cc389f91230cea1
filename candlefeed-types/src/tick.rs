use serde::{Deserialize, Serialize};

/// Where a tick price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TickKind {
    /// Executed trade; volume-confirmed.
    Trade,
    /// Mid/quote update; may move the close but not the traded extremes.
    #[default]
    Mid,
}

/// One real-time price update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Price.
    pub price: f64,
    /// Event time in epoch seconds; stamped by the feed clock when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    /// Trade or mid update.
    #[serde(default)]
    pub kind: TickKind,
    /// Traded size for trade ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Tick {
    /// A mid-price tick without a timestamp.
    #[must_use]
    pub const fn mid(price: f64) -> Self {
        Self {
            price,
            time: None,
            kind: TickKind::Mid,
            volume: None,
        }
    }

    /// A mid-price tick at `time`.
    #[must_use]
    pub const fn at(time: i64, price: f64) -> Self {
        Self {
            price,
            time: Some(time),
            kind: TickKind::Mid,
            volume: None,
        }
    }

    /// A trade tick at `time` with `volume`.
    #[must_use]
    pub const fn trade(time: i64, price: f64, volume: f64) -> Self {
        Self {
            price,
            time: Some(time),
            kind: TickKind::Trade,
            volume: Some(volume),
        }
    }
}

/// Connection status reported by a tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickStatus {
    /// Streaming.
    Connected,
    /// Not streaming.
    Disconnected,
    /// Attempting to resume.
    Reconnecting,
}

/// Event pushed by a tick source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TickEvent {
    /// Price update.
    Price(Tick),
    /// Connection status change.
    Status(TickStatus),
}

/// Load state of one `(symbol, granularity)` series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeedPhase {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Backfill for the visible range is running.
    Loading,
    /// Backfill settled; updates flow from ticks.
    Live,
}
