use rand::Rng;
use std::num::NonZeroUsize;
use surge_core::ENTITY_ID_PREFIX;

/// The fixed, ordered set of merchant ids a run dispatches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPool {
    ids: Vec<String>,
}

impl EntityPool {
    /// `merchant_0001` through `merchant_NNNN`.
    pub fn generate(count: NonZeroUsize) -> Self {
        let ids = (1..=count.get())
            .map(|i| format!("{ENTITY_ID_PREFIX}{i:04}"))
            .collect();
        Self { ids }
    }

    /// Uniform random pick. Short runs may well hit some merchants more than others.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // NOTE: `ids` is never empty since `count` is non-zero.
        &self.ids[rng.gen_range(0..self.ids.len())]
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
