use super::Modifier;
use crate::view::ObfuscationView;
use rand::rngs::StdRng;
use umbra_common::{BlockPos, Result, SignatureBuilder};

/// Leaves the fake view untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyModifier;

impl Modifier for EmptyModifier {
    fn name(&self) -> &str {
        "empty"
    }

    fn append_signature(&self, _signature: &mut SignatureBuilder) {}

    fn modify(
        &self,
        _view: &mut ObfuscationView<'_, '_>,
        _min: BlockPos,
        _max: BlockPos,
        _rng: &mut StdRng,
    ) -> Result<()> {
        Ok(())
    }
}
