//! Synthetic motor claims portfolio with a known frequency structure.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const N_POWER_GROUPS: usize = 6;
pub const N_REGIONS: usize = 10;

/// A simulated portfolio, features are stored column-major so they can be
/// wrapped in a [`crate::data::Matrix`] directly.
///
/// Columns: driver age (numeric), vehicle power group (categorical code),
/// region (categorical code).
#[derive(Debug, Clone)]
pub struct SimulatedClaims {
    pub features: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    pub exposure: Vec<f64>,
    pub counts: Vec<f64>,
    /// True annual claim frequency of each policy.
    pub frequency: Vec<f64>,
}

/// Annual claim frequency used to generate the portfolio.
pub fn true_frequency(age: f64, power: usize, region: usize) -> f64 {
    let age_effect = if age < 26.0 {
        2.0
    } else if age > 65.0 {
        1.3
    } else {
        1.0
    };
    let power_effect = 1.0 + 0.1 * power as f64;
    let region_effect = if region < 3 { 1.5 } else { 1.0 };
    0.1 * age_effect * power_effect * region_effect
}

/// Draw from a Poisson distribution by sequential inversion.
/// Only suited to the small means of claim counts.
pub fn sample_poisson<R: Rng>(rng: &mut R, lambda: f64) -> f64 {
    let u: f64 = rng.gen();
    let mut k = 0;
    let mut p = (-lambda).exp();
    let mut s = p;
    while u > s {
        k += 1;
        p *= lambda / k as f64;
        s += p;
        if p <= 0.0 {
            break;
        }
    }
    k as f64
}

/// Simulate `n` policies with the generator seeded by `seed`.
pub fn simulate_claims(n: usize, seed: u64) -> SimulatedClaims {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut age = Vec::with_capacity(n);
    let mut power = Vec::with_capacity(n);
    let mut region = Vec::with_capacity(n);
    let mut exposure = Vec::with_capacity(n);
    let mut counts = Vec::with_capacity(n);
    let mut frequency = Vec::with_capacity(n);

    for _ in 0..n {
        let a = rng.gen_range(18.0_f64..80.0).floor();
        let p = rng.gen_range(0..N_POWER_GROUPS);
        let r = rng.gen_range(0..N_REGIONS);
        let e: f64 = rng.gen_range(0.05..=1.0);
        let f = true_frequency(a, p, r);
        counts.push(sample_poisson(&mut rng, e * f));
        age.push(a);
        power.push(p as f64);
        region.push(r as f64);
        exposure.push(e);
        frequency.push(f);
    }

    let mut features = age;
    features.extend(power);
    features.extend(region);

    SimulatedClaims {
        features,
        rows: n,
        cols: 3,
        exposure,
        counts,
        frequency,
    }
}
