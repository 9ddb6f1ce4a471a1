use super::{Modifier, ModifierConfig};
use crate::view::ObfuscationView;
use rand::rngs::StdRng;
use std::collections::HashSet;
use umbra_common::{BlockPos, BlockState, Result, SignatureBuilder};

/// Replaces hidden blocks that no observer could see with a filler block.
#[derive(Debug, Clone)]
pub struct HideOresModifier {
    config: ModifierConfig,
    hidden: HashSet<BlockState>,
    replacement: BlockState,
}

impl HideOresModifier {
    pub fn new(
        config: ModifierConfig,
        hidden: HashSet<BlockState>,
        replacement: BlockState,
    ) -> Self {
        Self {
            config,
            hidden,
            replacement,
        }
    }
}

impl Modifier for HideOresModifier {
    fn name(&self) -> &str {
        "hide_ores"
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
        _rng: &mut StdRng,
    ) -> Result<()> {
        let candidates = view.find_real(min, max, |state| self.hidden.contains(&state));
        for pos in candidates {
            if !view.is_exposed(pos) {
                view.set_fake(pos, self.replacement)?;
            }
        }
        Ok(())
    }
}
