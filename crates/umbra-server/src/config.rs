use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use umbra_common::{BlockRegistry, Result, UmbraError, WorldProperties};
use umbra_logger::LogSeverity;
use umbra_shadow::ModifierConfig;

/// Block list bundled with the binary.
pub const DEFAULT_BLOCKS: &str = include_str!("../assets/blocks.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Region file directory. No directory means views are kept in memory.
    pub directory: Option<PathBuf>,
    /// Bumped by operators to invalidate every cached view.
    pub generation: u64,
    pub save_interval_ticks: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            generation: 0,
            save_interval_ticks: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldProperties,
    /// Path of a blocks.json style registry. The bundled list is used when
    /// absent.
    pub blocks: Option<PathBuf>,
    pub dynamism_enabled: bool,
    /// Chunks watched around an observer, as a square radius.
    pub view_distance: u32,
    pub tick_millis: u64,
    pub cache: CacheConfig,
    pub log_level: String,
    pub modifiers: Vec<ModifierConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world: WorldProperties::new("overworld", 0x5eed, -64, 384),
            blocks: None,
            dynamism_enabled: true,
            view_distance: 4,
            tick_millis: 50,
            cache: CacheConfig::default(),
            log_level: "info".to_owned(),
            modifiers: vec![
                ModifierConfig::HideOres {
                    hidden: [
                        "coal_ore",
                        "iron_ore",
                        "gold_ore",
                        "redstone_ore",
                        "diamond_ore",
                        "emerald_ore",
                        "deepslate_diamond_ore",
                    ]
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                    replacement: "stone".to_owned(),
                },
                ModifierConfig::Noise {
                    replaceable: vec!["stone".to_owned(), "deepslate".to_owned()],
                    decoys: vec![
                        "diamond_ore".to_owned(),
                        "gold_ore".to_owned(),
                        "iron_ore".to_owned(),
                    ],
                    chance: 0.02,
                    max_y: 48,
                },
                ModifierConfig::ProximityReveal {
                    targets: vec![
                        "diamond_ore".to_owned(),
                        "deepslate_diamond_ore".to_owned(),
                        "emerald_ore".to_owned(),
                    ],
                    distance: 4,
                },
            ],
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.world.validate()?;
        if self.tick_millis == 0 {
            return Err(UmbraError::Config("tick_millis must be positive".to_owned()));
        }
        if self.cache.save_interval_ticks == 0 {
            return Err(UmbraError::Config(
                "cache.save_interval_ticks must be positive".to_owned(),
            ));
        }
        self.log_severity()?;
        Ok(())
    }

    pub fn log_severity(&self) -> Result<LogSeverity> {
        self.log_level.parse().map_err(UmbraError::Config)
    }

    pub fn registry(&self) -> Result<BlockRegistry> {
        match &self.blocks {
            Some(path) => BlockRegistry::from_json(&fs::read_to_string(path)?),
            None => BlockRegistry::from_json(DEFAULT_BLOCKS),
        }
    }
}
