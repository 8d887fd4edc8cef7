use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An ETF-like instrument that holds a watched security, as resolved from a
/// mapping or holdings query. Read-only once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInstrument {
    pub code: String,
    pub name: String,
    /// Portfolio weight of the security inside this instrument, in [0, 1].
    pub weight: Decimal,
    /// Instrument category, e.g. "industry", "broad", "theme".
    pub category: String,
    /// Position of the security within the instrument's top holdings;
    /// -1 when unknown.
    pub rank: i32,
    pub in_top10: bool,
    /// Sum of the top-10 holding weights, in [0, 1].
    pub top10_ratio: Decimal,
}

impl CandidateInstrument {
    pub const UNKNOWN_RANK: i32 = -1;

    pub fn has_known_rank(&self) -> bool {
        self.rank != Self::UNKNOWN_RANK
    }
}

/// Stable descending sort by weight; equal weights keep upstream order.
pub fn sort_by_weight_desc(candidates: &mut [CandidateInstrument]) {
    candidates.sort_by(|a, b| b.weight.cmp(&a.weight));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn candidate(code: &str, weight: Decimal) -> CandidateInstrument {
        CandidateInstrument {
            code: code.to_string(),
            name: format!("ETF {code}"),
            weight,
            category: "industry".to_string(),
            rank: 1,
            in_top10: true,
            top10_ratio: dec!(0.55),
        }
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut list = vec![
            candidate("510300", dec!(0.05)),
            candidate("512880", dec!(0.08)),
            candidate("515000", dec!(0.05)),
        ];
        sort_by_weight_desc(&mut list);
        let codes: Vec<_> = list.iter().map(|c| c.code.as_str()).collect();
        // 0.08 first, then the two 0.05 entries in their original order.
        assert_eq!(codes, vec!["512880", "510300", "515000"]);
    }

    #[test]
    fn test_unknown_rank() {
        let mut c = candidate("510300", dec!(0.05));
        c.rank = CandidateInstrument::UNKNOWN_RANK;
        assert!(!c.has_known_rank());
    }
}
