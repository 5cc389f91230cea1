use candlefeed_core::{FeedError, Granularity, GranularityBand};

/// Maps a visible duration to a granularity using overlapping bands.
///
/// Overlap between adjacent bands is the hysteresis zone: while the visible
/// duration stays inside the current granularity's band, the current
/// granularity is kept even if a finer or coarser band also matches.
#[derive(Debug, Clone)]
pub struct GranularitySelector {
    bands: Vec<GranularityBand>,
}

impl GranularitySelector {
    /// Build a selector from bands given in preference order.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an empty table, a band with `min_hours > max_hours`
    /// or a NaN bound, or a granularity listed twice.
    pub fn new(bands: Vec<GranularityBand>) -> Result<Self, FeedError> {
        if bands.is_empty() {
            return Err(FeedError::InvalidArg(
                "granularity band table is empty".to_string(),
            ));
        }
        for (i, band) in bands.iter().enumerate() {
            if band.min_hours.is_nan() || band.max_hours.is_nan() || band.min_hours > band.max_hours
            {
                return Err(FeedError::InvalidArg(format!(
                    "band {} has invalid bounds [{}, {}]",
                    band.granularity, band.min_hours, band.max_hours
                )));
            }
            if bands[..i].iter().any(|b| b.granularity == band.granularity) {
                return Err(FeedError::InvalidArg(format!(
                    "granularity {} listed in more than one band",
                    band.granularity
                )));
            }
        }
        Ok(Self { bands })
    }

    /// Recommend a granularity for `visible_hours` given the `current` one.
    #[must_use]
    pub fn recommend(&self, visible_hours: f64, current: Granularity) -> Granularity {
        if self.band(current).is_some_and(|b| b.contains(visible_hours)) {
            return current;
        }
        self.bands
            .iter()
            .find(|b| b.contains(visible_hours))
            .map_or_else(|| self.coarsest(), |b| b.granularity)
    }

    /// Band configured for `granularity`, if any.
    #[must_use]
    pub fn band(&self, granularity: Granularity) -> Option<&GranularityBand> {
        self.bands.iter().find(|b| b.granularity == granularity)
    }

    /// Coarsest granularity in the table.
    #[must_use]
    pub fn coarsest(&self) -> Granularity {
        self.bands
            .iter()
            .map(|b| b.granularity)
            .max()
            .unwrap_or(Granularity::D1)
    }

    /// Bands in preference order.
    #[must_use]
    pub fn bands(&self) -> &[GranularityBand] {
        &self.bands
    }
}

impl Default for GranularitySelector {
    fn default() -> Self {
        Self {
            bands: GranularityBand::defaults(),
        }
    }
}
