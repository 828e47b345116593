//! Randomized synthesis helpers.
//!
//! Age synthesis draws from an asymmetric Gaussian: a standard-normal sample
//! scaled by a different spread on each side of the center, so synthesized
//! parents skew plausibly older rather than symmetrically around the mean.

use rand::Rng;

use crate::config::AgeSynthesisConfig;

/// Standard normal sample via the Box–Muller transform.
pub fn standard_normal<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Asymmetric Gaussian around `center` with independent spreads per side.
pub fn gaussian_asymmetric<R: Rng>(
    rng: &mut R,
    center: f32,
    spread_left: f32,
    spread_right: f32,
) -> f32 {
    let n = standard_normal(rng);
    if n <= 0.0 {
        center + n * spread_left
    } else {
        center + n * spread_right
    }
}

/// Age gap between a synthesized parent and the group's oldest child,
/// in years, never negative.
pub fn parent_age_offset<R: Rng>(
    rng: &mut R,
    life_expectancy: f32,
    age: &AgeSynthesisConfig,
) -> f32 {
    let mean = age.mean_factor * life_expectancy;
    let spread_left = mean - age.left_factor * life_expectancy;
    let spread_right = age.right_factor * life_expectancy - mean;
    gaussian_asymmetric(rng, mean, spread_left, spread_right).max(0.0)
}
