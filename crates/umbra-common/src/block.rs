use crate::error::UmbraError;
use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interned block state id. Id 0 is always air.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockState(pub u32);

impl BlockState {
    pub const AIR: BlockState = BlockState(0);

    pub fn id(&self) -> u32 {
        self.0
    }
}

const FLAG_OPAQUE: u8 = 0b01;
const FLAG_AIR: u8 = 0b10;

/// One block entry of a registry file. Field names follow the blocks.json
/// layout used by the data generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub name: String,
    #[serde(rename = "minStateId")]
    pub min_state_id: u32,
    #[serde(rename = "maxStateId")]
    pub max_state_id: u32,
    #[serde(default = "default_opaque")]
    pub opaque: bool,
    #[serde(default)]
    pub air: bool,
}

fn default_opaque() -> bool {
    true
}

/// Read-only block state registry injected into the engine.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    flags: Vec<u8>,
    names: Vec<String>,
    /// Owning block index for every state.
    state_block: Vec<u32>,
    by_name: HashMap<String, BlockState>,
}

impl BlockRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn from_defs(defs: Vec<BlockDef>) -> Result<Self> {
        let mut defs = defs;
        defs.sort_by_key(|def| def.min_state_id);

        let mut flags = Vec::new();
        let mut names = Vec::with_capacity(defs.len());
        let mut state_block = Vec::new();
        let mut by_name = HashMap::new();

        for (block_index, def) in defs.iter().enumerate() {
            if def.min_state_id as usize != flags.len() || def.max_state_id < def.min_state_id {
                return Err(UmbraError::Config(format!(
                    "block {} has non contiguous state range {}..={}",
                    def.name, def.min_state_id, def.max_state_id
                )));
            }
            let mut flag = 0;
            if def.opaque {
                flag |= FLAG_OPAQUE;
            }
            if def.air {
                flag |= FLAG_AIR;
            }
            for _ in def.min_state_id..=def.max_state_id {
                flags.push(flag);
                state_block.push(block_index as u32);
            }
            names.push(def.name.clone());
            by_name.insert(def.name.clone(), BlockState(def.min_state_id));
        }

        if flags.first().map_or(true, |flag| flag & FLAG_AIR == 0) {
            return Err(UmbraError::Config(
                "state 0 must be registered as air".to_owned(),
            ));
        }

        Ok(Self {
            flags,
            names,
            state_block,
            by_name,
        })
    }

    /// Parses a JSON array of [`BlockDef`].
    pub fn from_json(json: &str) -> Result<Self> {
        let defs: Vec<BlockDef> = serde_json::from_str(json)?;
        Self::from_defs(defs)
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Bits needed to address every state directly.
    pub fn bits(&self) -> u8 {
        let len = self.flags.len().max(2) as u32;
        (32 - (len - 1).leading_zeros()) as u8
    }

    pub fn contains(&self, state: BlockState) -> bool {
        (state.0 as usize) < self.flags.len()
    }

    pub fn is_air(&self, state: BlockState) -> bool {
        self.flags
            .get(state.0 as usize)
            .map_or(false, |flag| flag & FLAG_AIR != 0)
    }

    /// Unknown states are treated as see-through.
    pub fn is_opaque(&self, state: BlockState) -> bool {
        self.flags
            .get(state.0 as usize)
            .map_or(false, |flag| flag & FLAG_OPAQUE != 0)
    }

    /// Default (first) state of the named block.
    pub fn state(&self, name: &str) -> Option<BlockState> {
        self.by_name.get(name).copied()
    }

    /// Like [`BlockRegistry::state`] but reports unknown names as a config error.
    pub fn require(&self, name: &str) -> Result<BlockState> {
        self.state(name)
            .ok_or_else(|| UmbraError::Config(format!("unknown block {}", name)))
    }

    /// Every state of the named block, in id order.
    pub fn states_of(&self, name: &str) -> Option<Vec<BlockState>> {
        let first = self.state(name)?;
        let block = self.state_block[first.0 as usize];
        Some(
            (first.0..self.len() as u32)
                .take_while(|state| self.state_block[*state as usize] == block)
                .map(BlockState)
                .collect(),
        )
    }

    pub fn name(&self, state: BlockState) -> Option<&str> {
        let block = *self.state_block.get(state.0 as usize)?;
        self.names.get(block as usize).map(String::as_str)
    }

    pub fn validate(&self, state: BlockState) -> Result<BlockState> {
        if self.contains(state) {
            Ok(state)
        } else {
            Err(UmbraError::UnknownBlockState(state.0))
        }
    }
}

/// Incremental registry construction, mostly for tests and tools.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    defs: Vec<BlockDef>,
    next_state: u32,
}

impl RegistryBuilder {
    pub fn block(mut self, name: &str, states: u32, opaque: bool, air: bool) -> Self {
        let states = states.max(1);
        self.defs.push(BlockDef {
            name: name.to_owned(),
            min_state_id: self.next_state,
            max_state_id: self.next_state + states - 1,
            opaque,
            air,
        });
        self.next_state += states;
        self
    }

    pub fn air(self, name: &str) -> Self {
        self.block(name, 1, false, true)
    }

    pub fn opaque(self, name: &str) -> Self {
        self.block(name, 1, true, false)
    }

    pub fn transparent(self, name: &str) -> Self {
        self.block(name, 1, false, false)
    }

    pub fn build(self) -> Result<BlockRegistry> {
        BlockRegistry::from_defs(self.defs)
    }
}
