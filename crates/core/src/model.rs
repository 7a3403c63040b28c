//! Model tiers and their quota price multipliers.

use serde::{Deserialize, Serialize};

/// The capability tiers agents pick models from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Low,
    Standard,
    High,
    Embedding,
}

/// A concrete model and how many quota units one of its tokens costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub multiplier: i64,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, multiplier: i64) -> Self {
        Self {
            name: name.into(),
            multiplier,
        }
    }
}

/// The model chosen for every tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSet {
    pub low: ModelSpec,
    pub standard: ModelSpec,
    pub high: ModelSpec,
    pub embedding: ModelSpec,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            low: ModelSpec::new("gpt-4o-mini", 15),
            standard: ModelSpec::new("o4-mini", 110),
            high: ModelSpec::new("o3", 200),
            embedding: ModelSpec::new("text-embedding-3-small", 2),
        }
    }
}

impl ModelSet {
    pub fn get(&self, tier: ModelTier) -> &ModelSpec {
        match tier {
            ModelTier::Low => &self.low,
            ModelTier::Standard => &self.standard,
            ModelTier::High => &self.high,
            ModelTier::Embedding => &self.embedding,
        }
    }

    /// Tier serving `model`, if any. Lower tiers win when names repeat.
    pub fn tier_of(&self, model: &str) -> Option<ModelTier> {
        [
            ModelTier::Embedding,
            ModelTier::Low,
            ModelTier::Standard,
            ModelTier::High,
        ]
        .into_iter()
        .find(|t| self.get(*t).name == model)
    }

    /// Price multiplier for `model`; unknown models pay the standard rate.
    pub fn multiplier_for(&self, model: &str) -> i64 {
        match self.tier_of(model) {
            Some(tier) => self.get(tier).multiplier,
            None => {
                tracing::warn!(model, "Model matches no tier, charging standard rate");
                self.standard.multiplier
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers() {
        let m = ModelSet::default();
        assert_eq!(m.get(ModelTier::Low).name, "gpt-4o-mini");
        assert_eq!(m.get(ModelTier::Standard).multiplier, 110);
        assert_eq!(m.get(ModelTier::High).multiplier, 200);
        assert_eq!(m.get(ModelTier::Embedding).multiplier, 2);
    }

    #[test]
    fn multiplier_lookup_by_name() {
        let m = ModelSet::default();
        assert_eq!(m.multiplier_for("gpt-4o-mini"), 15);
        assert_eq!(m.multiplier_for("o3"), 200);
        assert_eq!(m.multiplier_for("text-embedding-3-small"), 2);
        assert_eq!(m.tier_of("o4-mini"), Some(ModelTier::Standard));
    }

    #[test]
    fn unknown_model_pays_standard() {
        let m = ModelSet::default();
        assert_eq!(m.tier_of("mystery"), None);
        assert_eq!(m.multiplier_for("mystery"), 110);
    }
}
