use super::{Modifier, ModifierConfig};
use crate::view::ObfuscationView;
use rand::rngs::StdRng;
use std::collections::HashSet;
use umbra_common::{BlockPos, BlockState, Result, SignatureBuilder};

/// Lets observers see the real target blocks once they come within
/// `distance`, wherever an earlier modifier replaced them.
#[derive(Debug, Clone)]
pub struct ProximityRevealModifier {
    config: ModifierConfig,
    targets: HashSet<BlockState>,
    distance: u8,
}

impl ProximityRevealModifier {
    pub fn new(config: ModifierConfig, targets: HashSet<BlockState>, distance: u8) -> Self {
        Self {
            config,
            targets,
            distance,
        }
    }
}

impl Modifier for ProximityRevealModifier {
    fn name(&self) -> &str {
        "proximity_reveal"
    }

    fn append_signature(&self, signature: &mut SignatureBuilder) {
        signature.push_json(&self.config);
    }

    fn modify(
        &self,
        view: &mut ObfuscationView<'_, '_>,
        min: BlockPos,
        max: BlockPos,
        _rng: &mut StdRng,
    ) -> Result<()> {
        if !view.dynamism_enabled() {
            return Ok(());
        }
        let candidates = view.find_real(min, max, |state| self.targets.contains(&state));
        for pos in candidates {
            let real = view.real_block(pos);
            if real.is_some() && real != Some(view.fake_block(pos)?) {
                view.set_dynamism(pos, self.distance)?;
            }
        }
        Ok(())
    }
}
