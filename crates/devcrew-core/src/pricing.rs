use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
}

impl Pricing {
    pub fn cost(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        (tokens_in as f64 / 1000.0) * self.input_price_per_1k
            + (tokens_out as f64 / 1000.0) * self.output_price_per_1k
    }
}

/// `model -> Pricing` lookup with a `default` fallback entry, loaded once
/// at startup from a static JSON file.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    entries: HashMap<String, Pricing>,
}

impl PricingTable {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: HashMap<String, Pricing> = serde_json::from_str(&raw)?;
        Ok(Self { entries })
    }

    pub fn with_entries(entries: HashMap<String, Pricing>) -> Self {
        Self { entries }
    }

    pub fn get(&self, model: &str) -> Pricing {
        self.entries
            .get(model)
            .or_else(|| self.entries.get("default"))
            .copied()
            .unwrap_or(Pricing {
                input_price_per_1k: 0.0,
                output_price_per_1k: 0.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_entry() {
        let mut entries = HashMap::new();
        entries.insert(
            "default".to_string(),
            Pricing {
                input_price_per_1k: 0.01,
                output_price_per_1k: 0.02,
            },
        );
        let table = PricingTable::with_entries(entries);
        let pricing = table.get("unknown-model");
        assert_eq!(pricing.cost(1000, 1000), 0.03);
    }

    #[test]
    fn exact_model_wins_over_default() {
        let mut entries = HashMap::new();
        entries.insert(
            "default".to_string(),
            Pricing {
                input_price_per_1k: 1.0,
                output_price_per_1k: 1.0,
            },
        );
        entries.insert(
            "gpt-4o".to_string(),
            Pricing {
                input_price_per_1k: 0.005,
                output_price_per_1k: 0.015,
            },
        );
        let table = PricingTable::with_entries(entries);
        assert_eq!(table.get("gpt-4o").cost(1000, 0), 0.005);
    }
}
