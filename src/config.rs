use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Outer rounds of forward propagation, co-parent alignment, sibling
    /// cohesion and spouse realignment.
    pub propagation_passes: usize,
    /// Sweeps allowed for the final repair of ordering and equality constraints.
    pub settle_passes: usize,
    /// Hop limit for the walk that re-pins a married-in family.
    pub realign_depth: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            propagation_passes: 10,
            settle_passes: 20,
            realign_depth: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub card_width: f32,
    /// Space between two partner cards inside one couple card.
    pub card_gap: f32,
    /// Fixed horizontal slot reserved per child under a family.
    pub child_width: f32,
    pub child_spacing: f32,
    /// Gap between neighbouring families in one generation row.
    pub family_gap: f32,
    /// Gap between spouse subgroups inside a co-parent family.
    pub spouse_group_gap: f32,
    pub min_unit_width: f32,
    pub vertical_spacing: f32,
    pub generations: GenerationConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            card_width: 160.0,
            card_gap: 20.0,
            child_width: 180.0,
            child_spacing: 40.0,
            family_gap: 80.0,
            spouse_group_gap: 60.0,
            min_unit_width: 200.0,
            vertical_spacing: 220.0,
            generations: GenerationConfig::default(),
        }
    }
}

impl LayoutConfig {
    pub fn couple_width(&self) -> f32 {
        self.card_width * 2.0 + self.card_gap
    }

    /// Width of `count` partner cards placed side by side.
    pub fn cards_width(&self, count: usize) -> f32 {
        if count == 0 {
            return 0.0;
        }
        self.card_width * count as f32 + self.card_gap * (count - 1) as f32
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigFile {
    propagation_passes: Option<usize>,
    settle_passes: Option<usize>,
    realign_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    card_width: Option<f32>,
    card_gap: Option<f32>,
    child_width: Option<f32>,
    child_spacing: Option<f32>,
    family_gap: Option<f32>,
    spouse_group_gap: Option<f32>,
    min_unit_width: Option<f32>,
    vertical_spacing: Option<f32>,
    generations: Option<GenerationConfigFile>,
}

/// Reads a camelCase JSON5 file (comments and trailing commas allowed) and
/// applies every field it sets on top of the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let Some(path) = path else {
        return Ok(LayoutConfig::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<LayoutConfig> {
    let mut config = LayoutConfig::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(v) = parsed.card_width {
        config.card_width = v;
    }
    if let Some(v) = parsed.card_gap {
        config.card_gap = v;
    }
    if let Some(v) = parsed.child_width {
        config.child_width = v;
    }
    if let Some(v) = parsed.child_spacing {
        config.child_spacing = v;
    }
    if let Some(v) = parsed.family_gap {
        config.family_gap = v;
    }
    if let Some(v) = parsed.spouse_group_gap {
        config.spouse_group_gap = v;
    }
    if let Some(v) = parsed.min_unit_width {
        config.min_unit_width = v;
    }
    if let Some(v) = parsed.vertical_spacing {
        config.vertical_spacing = v;
    }
    if let Some(generations) = parsed.generations {
        if let Some(v) = generations.propagation_passes {
            config.generations.propagation_passes = v;
        }
        if let Some(v) = generations.settle_passes {
            config.generations.settle_passes = v;
        }
        if let Some(v) = generations.realign_depth {
            config.generations.realign_depth = v;
        }
    }

    if config.card_width <= 0.0 || config.vertical_spacing <= 0.0 {
        return Err(anyhow::anyhow!(
            "cardWidth and verticalSpacing must be positive"
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, LayoutConfig::default());
        assert_eq!(config.couple_width(), 340.0);
    }

    #[test]
    fn json5_overrides_selected_fields() {
        let config = parse_config(
            r#"{
                // tighter rows
                verticalSpacing: 150,
                familyGap: 40,
                generations: { settlePasses: 5, },
            }"#,
        )
        .unwrap();
        assert_eq!(config.vertical_spacing, 150.0);
        assert_eq!(config.family_gap, 40.0);
        assert_eq!(config.generations.settle_passes, 5);
        assert_eq!(config.generations.realign_depth, 8);
        assert_eq!(config.card_width, 160.0);
    }

    #[test]
    fn rejects_non_positive_card_width() {
        assert!(parse_config("{ cardWidth: 0 }").is_err());
    }

    #[test]
    fn cards_width_counts_gaps() {
        let config = LayoutConfig::default();
        assert_eq!(config.cards_width(0), 0.0);
        assert_eq!(config.cards_width(1), 160.0);
        assert_eq!(config.cards_width(3), 520.0);
    }
}
