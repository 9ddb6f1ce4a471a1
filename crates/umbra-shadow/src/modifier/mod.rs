mod config;
mod empty;
mod hide;
mod noise;
mod proximity;

pub use config::ModifierConfig;
pub use empty::EmptyModifier;
pub use hide::HideOresModifier;
pub use noise::NoiseModifier;
pub use proximity::ProximityRevealModifier;

use crate::view::ObfuscationView;
use rand::rngs::StdRng;
use umbra_common::{BlockPos, BlockRegistry, Result, Signature, SignatureBuilder, WorldProperties};
use umbra_logger::{log, LogSeverity};

/// One obfuscation strategy. Implementations must be deterministic for a
/// given rng seed and configuration, since cached views are reused only while
/// the pipeline signature matches.
pub trait Modifier: Send + Sync {
    fn name(&self) -> &str;

    fn is_compatible(&self, _properties: &WorldProperties) -> bool {
        true
    }

    /// Hashes everything about this modifier that affects its output.
    fn append_signature(&self, signature: &mut SignatureBuilder);

    /// Whether `modify` reads exposure across chunk borders.
    fn require_neighbors_loaded(&self) -> bool {
        false
    }

    /// Rewrites the fake view inside the inclusive box `min..=max`.
    ///
    /// Writes made before an error is returned are kept. The pass is not
    /// rolled back, so a modifier should validate before it writes.
    fn modify(
        &self,
        view: &mut ObfuscationView<'_, '_>,
        min: BlockPos,
        max: BlockPos,
        rng: &mut StdRng,
    ) -> Result<()>;
}

/// Ordered list of modifiers run on every obfuscation pass.
#[derive(Default)]
pub struct ModifierPipeline {
    modifiers: Vec<Box<dyn Modifier>>,
}

impl ModifierPipeline {
    /// Keeps the modifiers compatible with `properties`, in order.
    pub fn new(modifiers: Vec<Box<dyn Modifier>>, properties: &WorldProperties) -> Self {
        let modifiers = modifiers
            .into_iter()
            .filter(|modifier| {
                let compatible = modifier.is_compatible(properties);
                if !compatible {
                    log(
                        format!(
                            "Modifier {} is not compatible with world {}, skipping it",
                            modifier.name(),
                            properties.name
                        ),
                        LogSeverity::Warning,
                    );
                }
                compatible
            })
            .collect();
        Self { modifiers }
    }

    pub fn from_configs(
        configs: &[ModifierConfig],
        registry: &BlockRegistry,
        properties: &WorldProperties,
    ) -> Result<Self> {
        let modifiers = configs
            .iter()
            .map(|config| config.build(registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(modifiers, properties))
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().map(|modifier| modifier.name())
    }

    pub fn requires_neighbors(&self) -> bool {
        self.modifiers
            .iter()
            .any(|modifier| modifier.require_neighbors_loaded())
    }

    /// Identity of every view this pipeline can produce.
    pub fn signature(&self, dynamism_enabled: bool, generation: u64) -> Signature {
        let mut builder = SignatureBuilder::new();
        builder.push_u64(self.modifiers.len() as u64);
        for modifier in &self.modifiers {
            builder.push_str(modifier.name());
            modifier.append_signature(&mut builder);
        }
        builder.push_bool(dynamism_enabled).push_u64(generation);
        builder.finish()
    }

    /// Runs every modifier over the box. A failing modifier is logged and
    /// the rest still run; whatever it wrote before failing stays.
    pub fn run(
        &self,
        view: &mut ObfuscationView<'_, '_>,
        min: BlockPos,
        max: BlockPos,
        rng: &mut StdRng,
    ) {
        for modifier in &self.modifiers {
            if let Err(e) = modifier.modify(view, min, max, rng) {
                log(
                    format!(
                        "Modifier {} failed on chunk {}: {}",
                        modifier.name(),
                        view.chunk(),
                        e
                    ),
                    LogSeverity::Error,
                );
            }
        }
    }
}
