use super::{Modifier, ModifierConfig};
use crate::view::ObfuscationView;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashSet;
use umbra_common::{BlockPos, BlockState, Result, SignatureBuilder, WorldProperties};

/// Scatters decoy blocks through buried filler so that hidden blocks can
/// not be found by looking for gaps.
#[derive(Debug, Clone)]
pub struct NoiseModifier {
    config: ModifierConfig,
    replaceable: HashSet<BlockState>,
    decoys: Vec<BlockState>,
    chance: f64,
    max_y: i32,
}

impl NoiseModifier {
    pub fn new(
        config: ModifierConfig,
        replaceable: HashSet<BlockState>,
        decoys: Vec<BlockState>,
        chance: f64,
        max_y: i32,
    ) -> Self {
        Self {
            config,
            replaceable,
            decoys,
            chance,
            max_y,
        }
    }
}

impl Modifier for NoiseModifier {
    fn name(&self) -> &str {
        "noise"
    }

    fn is_compatible(&self, properties: &WorldProperties) -> bool {
        properties.min_y <= self.max_y
    }

    fn append_signature(&self, signature: &mut SignatureBuilder) {
        signature.push_json(&self.config);
    }

    fn require_neighbors_loaded(&self) -> bool {
        true
    }

    fn modify(
        &self,
        view: &mut ObfuscationView<'_, '_>,
        min: BlockPos,
        max: BlockPos,
        rng: &mut StdRng,
    ) -> Result<()> {
        if self.decoys.is_empty() || min.y > self.max_y {
            return Ok(());
        }
        let max = BlockPos::new(max.x, max.y.min(self.max_y), max.z);
        let candidates = view.find_real(min, max, |state| self.replaceable.contains(&state));
        for pos in candidates {
            // Draw for every candidate so the sequence does not depend on
            // exposure of earlier positions.
            let roll: f64 = rng.gen();
            let decoy = self.decoys[rng.gen_range(0..self.decoys.len())];
            if roll < self.chance && !view.is_exposed(pos) {
                view.set_fake(pos, decoy)?;
            }
        }
        Ok(())
    }
}
