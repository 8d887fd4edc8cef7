//! Strategy registry.
//!
//! One explicit name -> constructor table per strategy family (detector,
//! selector, filter), populated at startup by [`StrategyRegistry::builtin`].
//! Engines receive a shared registry instance by injection; there is no
//! global registration side effect.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{PivotError, Result};
use crate::strategy::detector::{BreakoutDetector, EventDetector, LimitUpDetector, MomentumDetector};
use crate::strategy::filter::{
    ConcentrationFilter, ConfidenceFilter, LiquidityFilter, SignalFilter, TimeToCloseFilter,
};
use crate::strategy::selector::{
    BalancedSelector, BestLiquiditySelector, HighestWeightSelector, InstrumentSelector,
    LowestPremiumSelector,
};

// ============================================================================
// Parameters
// ============================================================================

/// Keyword construction arguments for one strategy, as loose JSON values.
/// An empty map means default construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyParams(HashMap<String, serde_json::Value>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, serde_json::Value>) -> Self {
        Self(map)
    }

    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decimal parameter; accepts JSON numbers and numeric strings.
    pub fn decimal(&self, key: &str) -> Result<Option<Decimal>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    PivotError::StrategyParam(format!("'{key}' is not a decimal: {e}"))
                }),
        }
    }

    pub fn integer(&self, key: &str) -> Result<Option<i64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                PivotError::StrategyParam(format!("'{key}' is not an integer"))
            }),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value.as_bool().map(Some).ok_or_else(|| {
                PivotError::StrategyParam(format!("'{key}' is not a boolean"))
            }),
        }
    }

    pub fn text(&self, key: &str) -> Result<Option<String>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| PivotError::StrategyParam(format!("'{key}' is not a string"))),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Metadata recorded alongside each registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMeta {
    pub priority: i32,
    pub version: String,
    pub description: String,
}

impl StrategyMeta {
    fn new(priority: i32, description: &str) -> Self {
        Self {
            priority,
            version: "1.0".to_string(),
            description: description.to_string(),
        }
    }
}

struct Entry<T: ?Sized> {
    ctor: fn(&StrategyParams) -> Result<Box<T>>,
    meta: StrategyMeta,
}

struct FamilyTable<T: ?Sized> {
    family: &'static str,
    entries: BTreeMap<String, Entry<T>>,
}

impl<T: ?Sized> FamilyTable<T> {
    fn new(family: &'static str) -> Self {
        Self {
            family,
            entries: BTreeMap::new(),
        }
    }

    fn register(
        &mut self,
        name: &str,
        ctor: fn(&StrategyParams) -> Result<Box<T>>,
        meta: StrategyMeta,
    ) {
        self.entries.insert(name.to_string(), Entry { ctor, meta });
    }

    fn resolve(&self, name: &str, params: &StrategyParams) -> Result<Box<T>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| PivotError::StrategyNotFound {
                family: self.family,
                name: name.to_string(),
                available: self.names(),
            })?;
        (entry.ctor)(params)
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn meta(&self, name: &str) -> Option<&StrategyMeta> {
        self.entries.get(name).map(|e| &e.meta)
    }
}

/// Name -> constructor + metadata tables for the three pluggable families.
pub struct StrategyRegistry {
    detectors: FamilyTable<dyn EventDetector>,
    selectors: FamilyTable<dyn InstrumentSelector>,
    filters: FamilyTable<dyn SignalFilter>,
}

impl StrategyRegistry {
    /// Empty registry; tests register their own entries.
    pub fn new() -> Self {
        Self {
            detectors: FamilyTable::new("detector"),
            selectors: FamilyTable::new("selector"),
            filters: FamilyTable::new("filter"),
        }
    }

    /// Registry populated with every built-in strategy. Constructed once at
    /// startup and shared by injection.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_detector(
            "limit_up",
            |p| Ok(Box::new(LimitUpDetector::from_params(p)?)),
            StrategyMeta::new(100, "Limit-up dislocation detector"),
        );
        registry.register_detector(
            "breakout",
            |p| Ok(Box::new(BreakoutDetector::from_params(p)?)),
            StrategyMeta::new(50, "Sharp single-day breakout detector"),
        );
        registry.register_detector(
            "momentum",
            |p| Ok(Box::new(MomentumDetector::from_params(p)?)),
            StrategyMeta::new(40, "Short-window momentum detector"),
        );

        registry.register_selector(
            "highest_weight",
            |p| Ok(Box::new(HighestWeightSelector::from_params(p)?)),
            StrategyMeta::new(100, "Pick the instrument with the largest holding weight"),
        );
        registry.register_selector(
            "best_liquidity",
            |p| Ok(Box::new(BestLiquiditySelector::from_params(p)?)),
            StrategyMeta::new(60, "Liquidity-ranked selection (weight fallback)"),
        );
        registry.register_selector(
            "lowest_premium",
            |p| Ok(Box::new(LowestPremiumSelector::from_params(p)?)),
            StrategyMeta::new(60, "Premium-ranked selection (weight fallback)"),
        );
        registry.register_selector(
            "balanced",
            |p| Ok(Box::new(BalancedSelector::from_params(p)?)),
            StrategyMeta::new(70, "Weighted combination of weight/liquidity/premium scores"),
        );

        registry.register_filter(
            "time_to_close",
            |p| Ok(Box::new(TimeToCloseFilter::from_params(p)?)),
            StrategyMeta::new(100, "Reject signals too close to the session close"),
        );
        registry.register_filter(
            "liquidity",
            |p| Ok(Box::new(LiquidityFilter::from_params(p)?)),
            StrategyMeta::new(90, "Reject instruments without enough traded amount"),
        );
        registry.register_filter(
            "confidence",
            |p| Ok(Box::new(ConfidenceFilter::from_params(p)?)),
            StrategyMeta::new(50, "Warn on low-confidence drafts"),
        );
        registry.register_filter(
            "concentration",
            |p| Ok(Box::new(ConcentrationFilter::from_params(p)?)),
            StrategyMeta::new(40, "Warn on concentrated or low-ranked holdings"),
        );

        registry
    }

    pub fn register_detector(
        &mut self,
        name: &str,
        ctor: fn(&StrategyParams) -> Result<Box<dyn EventDetector>>,
        meta: StrategyMeta,
    ) {
        self.detectors.register(name, ctor, meta);
    }

    pub fn register_selector(
        &mut self,
        name: &str,
        ctor: fn(&StrategyParams) -> Result<Box<dyn InstrumentSelector>>,
        meta: StrategyMeta,
    ) {
        self.selectors.register(name, ctor, meta);
    }

    pub fn register_filter(
        &mut self,
        name: &str,
        ctor: fn(&StrategyParams) -> Result<Box<dyn SignalFilter>>,
        meta: StrategyMeta,
    ) {
        self.filters.register(name, ctor, meta);
    }

    pub fn resolve_detector(
        &self,
        name: &str,
        params: &StrategyParams,
    ) -> Result<Box<dyn EventDetector>> {
        self.detectors.resolve(name, params)
    }

    pub fn resolve_selector(
        &self,
        name: &str,
        params: &StrategyParams,
    ) -> Result<Box<dyn InstrumentSelector>> {
        self.selectors.resolve(name, params)
    }

    pub fn resolve_filter(
        &self,
        name: &str,
        params: &StrategyParams,
    ) -> Result<Box<dyn SignalFilter>> {
        self.filters.resolve(name, params)
    }

    pub fn is_detector(&self, name: &str) -> bool {
        self.detectors.contains(name)
    }

    pub fn is_selector(&self, name: &str) -> bool {
        self.selectors.contains(name)
    }

    pub fn is_filter(&self, name: &str) -> bool {
        self.filters.contains(name)
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.names()
    }

    pub fn selector_names(&self) -> Vec<String> {
        self.selectors.names()
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.names()
    }

    pub fn detector_meta(&self, name: &str) -> Option<&StrategyMeta> {
        self.detectors.meta(name)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Chain configuration
// ============================================================================

/// One detector, one selector, an ordered filter list, and a parameter map
/// per strategy name. Every name must resolve in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyChainConfig {
    pub detector: String,
    pub selector: String,
    pub filters: Vec<String>,
    #[serde(default)]
    pub params: HashMap<String, StrategyParams>,
}

impl StrategyChainConfig {
    /// Sensible live default: limit-up detection, highest-weight selection,
    /// the full built-in filter chain.
    pub fn standard() -> Self {
        Self {
            detector: "limit_up".to_string(),
            selector: "highest_weight".to_string(),
            filters: vec![
                "time_to_close".to_string(),
                "liquidity".to_string(),
                "confidence".to_string(),
                "concentration".to_string(),
            ],
            params: HashMap::new(),
        }
    }

    pub fn params_for(&self, name: &str) -> StrategyParams {
        self.params.get(name).cloned().unwrap_or_default()
    }

    /// Check every referenced name against the registry, reporting all
    /// violations together rather than stopping at the first.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<()> {
        let mut violations = Vec::new();

        if !registry.is_detector(&self.detector) {
            violations.push(format!(
                "unknown detector '{}' (available: {})",
                self.detector,
                registry.detector_names().join(", ")
            ));
        }
        if !registry.is_selector(&self.selector) {
            violations.push(format!(
                "unknown selector '{}' (available: {})",
                self.selector,
                registry.selector_names().join(", ")
            ));
        }
        for filter in &self.filters {
            if !registry.is_filter(filter) {
                violations.push(format!(
                    "unknown filter '{}' (available: {})",
                    filter,
                    registry.filter_names().join(", ")
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PivotError::StrategyChainInvalid(violations))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
