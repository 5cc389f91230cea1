use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FeedError;

mod unbounded_hours {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(hours: &f64, s: S) -> Result<S::Ok, S::Error> {
        if hours.is_finite() {
            s.serialize_some(hours)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

/// Bucket size of a candle series, from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    /// One minute.
    #[serde(rename = "1m")]
    M1,
    /// Five minutes.
    #[serde(rename = "5m")]
    M5,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    M15,
    /// One hour.
    #[serde(rename = "1h")]
    H1,
    /// Six hours.
    #[serde(rename = "6h")]
    H6,
    /// One day.
    #[serde(rename = "1d")]
    D1,
}

impl Granularity {
    /// Every granularity, finest first.
    pub const ALL: [Self; 6] = [Self::M1, Self::M5, Self::M15, Self::H1, Self::H6, Self::D1];

    /// Bucket length in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H6 => 21_600,
            Self::D1 => 86_400,
        }
    }

    /// Short label such as `"15m"`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H6 => "6h",
            Self::D1 => "1d",
        }
    }

    /// Look up a granularity by its bucket length.
    #[must_use]
    pub fn from_seconds(secs: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.seconds() == secs)
    }

    /// Next finer granularity, if any.
    #[must_use]
    pub const fn finer(self) -> Option<Self> {
        match self {
            Self::M1 => None,
            Self::M5 => Some(Self::M1),
            Self::M15 => Some(Self::M5),
            Self::H1 => Some(Self::M15),
            Self::H6 => Some(Self::H1),
            Self::D1 => Some(Self::H6),
        }
    }

    /// Next coarser granularity, if any.
    #[must_use]
    pub const fn coarser(self) -> Option<Self> {
        match self {
            Self::M1 => Some(Self::M5),
            Self::M5 => Some(Self::M15),
            Self::M15 => Some(Self::H1),
            Self::H1 => Some(Self::H6),
            Self::H6 => Some(Self::D1),
            Self::D1 => None,
        }
    }

    /// Floor `ts` to the start of its bucket.
    #[must_use]
    pub const fn align(self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.seconds())
    }

    /// Ceil `ts` to the next bucket boundary (identity when already aligned).
    #[must_use]
    pub const fn align_up(self, ts: i64) -> i64 {
        let rem = ts.rem_euclid(self.seconds());
        if rem == 0 { ts } else { ts - rem + self.seconds() }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Granularity {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FeedError::InvalidArg(format!("unknown granularity: {s}")))
    }
}

/// Visible-duration band served by one granularity.
///
/// Adjacent bands overlap; the overlap is the hysteresis zone where the
/// currently active granularity is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GranularityBand {
    /// Granularity used while the visible duration is inside the band.
    pub granularity: Granularity,
    /// Inclusive lower bound in hours.
    pub min_hours: f64,
    /// Inclusive upper bound in hours; `f64::INFINITY` for an open-ended band
    /// (serialized as `null`).
    #[serde(with = "unbounded_hours")]
    pub max_hours: f64,
    /// Warm the next coarser granularity after switching to this band.
    pub preload_next: bool,
}

impl GranularityBand {
    /// Create a band.
    #[must_use]
    pub const fn new(
        granularity: Granularity,
        min_hours: f64,
        max_hours: f64,
        preload_next: bool,
    ) -> Self {
        Self {
            granularity,
            min_hours,
            max_hours,
            preload_next,
        }
    }

    /// Whether `hours` lies inside `[min_hours, max_hours]`.
    #[must_use]
    pub fn contains(&self, hours: f64) -> bool {
        hours >= self.min_hours && hours <= self.max_hours
    }

    /// Default band table, finest first.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Granularity::M1, 0.0, 8.0, true),
            Self::new(Granularity::M5, 6.0, 48.0, true),
            Self::new(Granularity::M15, 36.0, 120.0, true),
            Self::new(Granularity::H1, 96.0, 504.0, true),
            Self::new(Granularity::H6, 336.0, 2_880.0, true),
            Self::new(Granularity::D1, 1_440.0, f64::INFINITY, false),
        ]
    }
}
