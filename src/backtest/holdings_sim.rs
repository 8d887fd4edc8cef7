//! Holdings snapshot interpolation.
//!
//! Instrument constituents are only published at sparse dates (typically
//! quarterly). The backtest approximates the discrete rebalances as
//! continuous drift: weights move linearly between the bracketing
//! snapshots, entering holdings fade in and leaving holdings fade out, and
//! a materiality floor suppresses phantom near-zero positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::backtest::InterpolationMode;
use crate::domain::instrument::sort_by_weight_desc;
use crate::domain::CandidateInstrument;
use crate::market::HoldingsSnapshot;

/// Default minimum interpolated weight below which a one-sided holding is
/// treated as absent.
pub const DEFAULT_MATERIALITY_FLOOR: Decimal = dec!(0.01);

/// An ordered set of holdings snapshots with point-in-time lookup.
pub struct SnapshotSet {
    snapshots: Vec<HoldingsSnapshot>,
    materiality_floor: Decimal,
}

impl SnapshotSet {
    pub fn new(mut snapshots: Vec<HoldingsSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.date);
        Self {
            snapshots,
            materiality_floor: DEFAULT_MATERIALITY_FLOOR,
        }
    }

    pub fn with_materiality_floor(mut self, floor: Decimal) -> Self {
        self.materiality_floor = floor;
        self
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Candidate instruments holding `security_code` as of `target`.
    ///
    /// The bracketing snapshots at/before and at/after `target` drive the
    /// result: a single available side is returned verbatim, `Step` mode
    /// returns the earlier side verbatim, and `Linear` mode interpolates
    /// between the two (see module docs).
    pub fn holdings_at(
        &self,
        security_code: &str,
        target: DateTime<Utc>,
        mode: InterpolationMode,
    ) -> Vec<CandidateInstrument> {
        let before = self
            .snapshots
            .iter()
            .rev()
            .find(|s| s.date <= target);
        let after = self.snapshots.iter().find(|s| s.date >= target);

        let (before, after) = match (before, after) {
            (None, None) => return Vec::new(),
            (Some(b), None) => return b.candidates_for(security_code).to_vec(),
            (None, Some(a)) => return a.candidates_for(security_code).to_vec(),
            (Some(b), Some(a)) => (b, a),
        };

        // Both sides resolve to the same snapshot when `target` lands
        // exactly on a capture date.
        if before.date == after.date {
            return before.candidates_for(security_code).to_vec();
        }

        if mode == InterpolationMode::Step {
            return before.candidates_for(security_code).to_vec();
        }

        let ratio = interpolation_ratio(before.date, after.date, target);
        self.interpolate(
            before.candidates_for(security_code),
            after.candidates_for(security_code),
            ratio,
        )
    }

    fn interpolate(
        &self,
        before: &[CandidateInstrument],
        after: &[CandidateInstrument],
        ratio: Decimal,
    ) -> Vec<CandidateInstrument> {
        let inverse = Decimal::ONE - ratio;
        let mut merged: Vec<CandidateInstrument> = Vec::new();

        for candidate in before {
            let counterpart = after.iter().find(|c| c.code == candidate.code);
            match counterpart {
                Some(later) => {
                    // Present in both: plain linear blend, no floor.
                    let mut blended = candidate.clone();
                    blended.weight = candidate.weight * inverse + later.weight * ratio;
                    merged.push(blended);
                }
                None => {
                    // Leaving the instrument: decay toward zero, drop once
                    // immaterial.
                    let decayed = candidate.weight * inverse;
                    if decayed > self.materiality_floor {
                        let mut fading = candidate.clone();
                        fading.weight = decayed;
                        merged.push(fading);
                    }
                }
            }
        }

        for candidate in after {
            if before.iter().any(|c| c.code == candidate.code) {
                continue;
            }
            // Entering the instrument: grow from zero, include once
            // material.
            let grown = candidate.weight * ratio;
            if grown > self.materiality_floor {
                let mut emerging = candidate.clone();
                emerging.weight = grown;
                merged.push(emerging);
            }
        }

        sort_by_weight_desc(&mut merged);
        merged
    }
}

/// Position of `target` between `before` and `after`, clamped to [0, 1].
fn interpolation_ratio(
    before: DateTime<Utc>,
    after: DateTime<Utc>,
    target: DateTime<Utc>,
) -> Decimal {
    let span = (after - before).num_seconds();
    if span <= 0 {
        return Decimal::ZERO;
    }
    let elapsed = (target - before).num_seconds();
    let ratio = Decimal::from(elapsed) / Decimal::from(span);
    ratio.clamp(Decimal::ZERO, Decimal::ONE)
}
