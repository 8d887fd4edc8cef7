use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::CandidateInstrument;
use crate::error::{PivotError, Result};

/// Security -> ranked candidate instruments. BTreeMap keeps persisted JSON
/// output deterministic.
pub type HoldingsMapping = BTreeMap<String, Vec<CandidateInstrument>>;

/// One constituent row of an instrument's top holdings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingRow {
    pub security_code: String,
    pub security_name: String,
    /// Weight of the security inside the instrument, in [0, 1].
    pub weight: Decimal,
}

/// Ranked largest constituent positions of a basket instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopHoldings {
    pub instrument_code: String,
    pub instrument_name: String,
    pub category: String,
    /// Rows ordered by descending weight as published by the provider.
    pub holdings: Vec<HoldingRow>,
    pub total_weight: Decimal,
}

impl TopHoldings {
    /// 1-based rank of a security in the holdings list.
    pub fn rank_of(&self, security_code: &str) -> Option<usize> {
        self.holdings
            .iter()
            .position(|row| row.security_code == security_code)
            .map(|idx| idx + 1)
    }

    pub fn weight_of(&self, security_code: &str) -> Option<Decimal> {
        self.holdings
            .iter()
            .find(|row| row.security_code == security_code)
            .map(|row| row.weight)
    }

    /// Concentration of the ten largest positions.
    pub fn top10_ratio(&self) -> Decimal {
        self.holdings.iter().take(10).map(|row| row.weight).sum()
    }

    /// Build a [`CandidateInstrument`] for a security held by this
    /// instrument, or `None` if the security is absent.
    pub fn candidate_for(&self, security_code: &str) -> Option<CandidateInstrument> {
        let rank = self.rank_of(security_code)?;
        let weight = self.weight_of(security_code)?;
        Some(CandidateInstrument {
            code: self.instrument_code.clone(),
            name: self.instrument_name.clone(),
            weight,
            category: self.category.clone(),
            rank: rank as i32,
            in_top10: rank <= 10,
            top10_ratio: self.top10_ratio(),
        })
    }
}

/// Provider of instrument constituent data.
#[async_trait]
pub trait HoldingsProvider: Send + Sync {
    async fn top_holdings(&self, instrument_code: &str) -> Result<TopHoldings>;

    /// Discover which instruments hold which watched securities. Expensive;
    /// the arbitrage engine runs it once and persists the result.
    async fn build_mapping(
        &self,
        securities: &[String],
        instruments: &[String],
    ) -> Result<HoldingsMapping> {
        let mut mapping = HoldingsMapping::new();
        for instrument in instruments {
            let top = self.top_holdings(instrument).await?;
            for security in securities {
                if let Some(candidate) = top.candidate_for(security) {
                    mapping.entry(security.clone()).or_default().push(candidate);
                }
            }
        }
        for candidates in mapping.values_mut() {
            crate::domain::instrument::sort_by_weight_desc(candidates);
        }
        Ok(mapping)
    }
}

/// In-memory holdings table keyed by instrument code.
pub struct StaticHoldingsProvider {
    table: DashMap<String, TopHoldings>,
}

impl StaticHoldingsProvider {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }

    pub fn with_holdings(entries: impl IntoIterator<Item = TopHoldings>) -> Self {
        let provider = Self::new();
        for entry in entries {
            provider.upsert(entry);
        }
        provider
    }

    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<TopHoldings> = serde_json::from_str(&raw)?;
        Ok(Self::with_holdings(entries))
    }

    pub fn upsert(&self, holdings: TopHoldings) {
        self.table
            .insert(holdings.instrument_code.clone(), holdings);
    }

    pub fn instrument_codes(&self) -> Vec<String> {
        self.table.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for StaticHoldingsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HoldingsProvider for StaticHoldingsProvider {
    async fn top_holdings(&self, instrument_code: &str) -> Result<TopHoldings> {
        self.table
            .get(instrument_code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PivotError::HoldingsUnavailable(instrument_code.to_string()))
    }
}

/// A captured point-in-time record of security -> instrument weights.
/// Immutable once captured; a small number (e.g. quarterly) are held at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    pub date: DateTime<Utc>,
    pub holdings: HoldingsMapping,
}

impl HoldingsSnapshot {
    pub fn candidates_for(&self, security_code: &str) -> &[CandidateInstrument] {
        self.holdings
            .get(security_code)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
