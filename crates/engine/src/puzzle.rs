use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use splashdle_protocol::{Puzzle, PuzzleView, VariantRef, Vec2};

use crate::catalog::{Catalog, CatalogCache};
use crate::error::CatalogError;
use crate::MAX_ZOOM;

/// Focus stays inside this band so the minimum zoom never exposes blank margins.
const FOCUS_MIN: f64 = 0.25;
const FOCUS_MAX: f64 = 0.75;
const EDGE_BIAS: f64 = 0.85;
const LOW_BAND: (f64, f64) = (0.25, 0.40);
const HIGH_BAND: (f64, f64) = (0.60, 0.75);
const DEAD_CENTER: (f64, f64) = (0.46, 0.54);

#[derive(Clone)]
pub struct PuzzleGenerator {
    catalog: Arc<CatalogCache>,
}

impl PuzzleGenerator {
    pub fn new(catalog: Arc<CatalogCache>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    /// Fails with [`CatalogError::NotLoaded`] until the catalog has been fetched.
    pub fn generate(&self) -> Result<Puzzle, CatalogError> {
        let catalog = self.catalog.get().ok_or(CatalogError::NotLoaded)?;
        random_puzzle(&catalog, &mut rand::thread_rng())
    }

    pub fn generate_series(&self, count: usize) -> Result<Vec<Puzzle>, CatalogError> {
        (0..count).map(|_| self.generate()).collect()
    }
}

pub fn random_puzzle<R: Rng + ?Sized>(catalog: &Catalog, rng: &mut R) -> Result<Puzzle, CatalogError> {
    let reference = pick_reference(catalog, rng)
        .ok_or_else(|| CatalogError::InvalidPayload("catalog has no characters".to_string()))?;
    Ok(Puzzle {
        reference,
        view: PuzzleView {
            focus: pick_focus(rng),
            zoom: MAX_ZOOM,
        },
    })
}

/// Uniform character, then a uniform non-default variant. Characters with
/// only the base variant fall back to any variant.
pub fn pick_reference<R: Rng + ?Sized>(catalog: &Catalog, rng: &mut R) -> Option<VariantRef> {
    let id = catalog.keys().choose(rng)?;
    let character = catalog.character(id)?;
    let distinctive: Vec<u32> = character
        .variants
        .iter()
        .map(|v| v.num)
        .filter(|num| *num != 0)
        .collect();
    let variant_num = match distinctive.choose(rng) {
        Some(num) => *num,
        None => character.variants.choose(rng).map(|v| v.num).unwrap_or(0),
    };
    Some(VariantRef {
        character_key: character.id.clone(),
        variant_num,
    })
}

pub fn pick_focus<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2 {
        x: pick_axis(rng),
        y: pick_axis(rng),
    }
}

fn pick_axis<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    if rng.gen_bool(EDGE_BIAS) {
        let (lo, hi) = if rng.gen_bool(0.5) { LOW_BAND } else { HIGH_BAND };
        return rng.gen_range(lo..hi);
    }
    let v = rng.gen_range(FOCUS_MIN..FOCUS_MAX);
    if v > DEAD_CENTER.0 && v < DEAD_CENTER.1 {
        return if v < 0.5 { DEAD_CENTER.0 } else { DEAD_CENTER.1 };
    }
    v
}
