use super::{EmptyModifier, HideOresModifier, Modifier, NoiseModifier, ProximityRevealModifier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use umbra_common::{BlockRegistry, BlockState, Result, UmbraError};
use umbra_storage::MAX_REVEAL_DISTANCE;

/// Serialized form of a built-in modifier, as it appears in engine configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModifierConfig {
    Empty,
    HideOres {
        hidden: Vec<String>,
        replacement: String,
    },
    Noise {
        replaceable: Vec<String>,
        decoys: Vec<String>,
        chance: f64,
        max_y: i32,
    },
    ProximityReveal {
        targets: Vec<String>,
        distance: u8,
    },
}

/// Every state of every named block.
fn resolve_set(registry: &BlockRegistry, names: &[String]) -> Result<HashSet<BlockState>> {
    let mut states = HashSet::new();
    for name in names {
        let block = registry
            .states_of(name)
            .ok_or_else(|| UmbraError::Config(format!("unknown block {}", name)))?;
        states.extend(block);
    }
    Ok(states)
}

/// Default states of the named blocks, in config order.
fn resolve_list(registry: &BlockRegistry, names: &[String]) -> Result<Vec<BlockState>> {
    names.iter().map(|name| registry.require(name)).collect()
}

impl ModifierConfig {
    pub fn build(&self, registry: &BlockRegistry) -> Result<Box<dyn Modifier>> {
        let modifier: Box<dyn Modifier> = match self {
            ModifierConfig::Empty => Box::new(EmptyModifier),
            ModifierConfig::HideOres {
                hidden,
                replacement,
            } => Box::new(HideOresModifier::new(
                self.clone(),
                resolve_set(registry, hidden)?,
                registry.require(replacement)?,
            )),
            ModifierConfig::Noise {
                replaceable,
                decoys,
                chance,
                max_y,
            } => {
                if !(0.0..=1.0).contains(chance) {
                    return Err(UmbraError::Config(format!(
                        "noise chance {} is outside 0..=1",
                        chance
                    )));
                }
                let decoys = resolve_list(registry, decoys)?;
                if decoys.is_empty() {
                    return Err(UmbraError::Config("noise needs at least one decoy".to_owned()));
                }
                Box::new(NoiseModifier::new(
                    self.clone(),
                    resolve_set(registry, replaceable)?,
                    decoys,
                    *chance,
                    *max_y,
                ))
            }
            ModifierConfig::ProximityReveal { targets, distance } => {
                if *distance == 0 || *distance > MAX_REVEAL_DISTANCE {
                    return Err(UmbraError::Config(format!(
                        "reveal distance {} is outside 1..={}",
                        distance, MAX_REVEAL_DISTANCE
                    )));
                }
                Box::new(ProximityRevealModifier::new(
                    self.clone(),
                    resolve_set(registry, targets)?,
                    *distance,
                ))
            }
        };
        Ok(modifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registry() -> BlockRegistry {
        BlockRegistry::builder()
            .air("air")
            .opaque("stone")
            .block("diamond_ore", 2, true, false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_tagged() {
        let configs: Vec<ModifierConfig> = serde_json::from_str(
            r#"[
                {"type": "empty"},
                {"type": "hide_ores", "hidden": ["diamond_ore"], "replacement": "stone"},
                {"type": "noise", "replaceable": ["stone"], "decoys": ["diamond_ore"],
                 "chance": 0.1, "max_y": 64},
                {"type": "proximity_reveal", "targets": ["diamond_ore"], "distance": 4}
            ]"#,
        )
        .unwrap();
        assert_eq!(configs.len(), 4);
        assert_eq!(configs[0], ModifierConfig::Empty);

        let names: Vec<String> = configs
            .iter()
            .map(|config| config.build(&registry()).unwrap().name().to_owned())
            .collect();
        assert_eq!(names, ["empty", "hide_ores", "noise", "proximity_reveal"]);
    }

    #[test]
    fn test_rejects_bad_configs() {
        let registry = registry();
        let unknown = ModifierConfig::HideOres {
            hidden: vec!["gold_ore".into()],
            replacement: "stone".into(),
        };
        assert_matches!(unknown.build(&registry).err(), Some(UmbraError::Config(_)));

        let chance = ModifierConfig::Noise {
            replaceable: vec!["stone".into()],
            decoys: vec!["diamond_ore".into()],
            chance: 1.5,
            max_y: 0,
        };
        assert_matches!(chance.build(&registry).err(), Some(UmbraError::Config(_)));

        let distance = ModifierConfig::ProximityReveal {
            targets: vec!["diamond_ore".into()],
            distance: 11,
        };
        assert_matches!(distance.build(&registry).err(), Some(UmbraError::Config(_)));
    }
}
