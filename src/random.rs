/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

//! Deterministic random stream and the distribution transforms built
//! on top of it.
//!
//! The stream is a PCG generator owned by the [`Simulation`]; every
//! draw depends only on the seed and the draws before it, never on the
//! clock, so a fixed model and seed reproduce bit-identical runs on
//! every platform.

use chrono::Duration;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Cauchy, Distribution, Exp, Gamma, LogNormal, Normal, Triangular, Weibull};
use rand_pcg::Pcg64Mcg;

use crate::error::SimError;
use crate::simulation::{from_seconds, to_seconds, Simulation};

/// Seeded PCG stream.
pub struct RandomStream {
    rng: Pcg64Mcg,
}

impl RandomStream {
    pub fn new(seed: u64) -> RandomStream {
        RandomStream {
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Restart the stream from a fresh seed.
    pub fn reinitialize(&mut self, seed: u64) {
        self.rng = Pcg64Mcg::seed_from_u64(seed);
    }

    /// Next raw draw.
    pub fn next(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform integer in `[lo, hi)`; returns `lo` for an empty range.
    pub fn next_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        if lo >= hi {
            lo
        } else {
            self.rng.gen_range(lo..hi)
        }
    }

    /// Uniform double in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

impl RngCore for RandomStream {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

impl Simulation {
    /// Direct access to the simulation's random stream.
    pub fn random(&mut self) -> &mut RandomStream {
        &mut self.random
    }

    /// Uniform draw in `[a, b)`.
    pub fn rand_uniform(&mut self, a: f64, b: f64) -> Result<f64, SimError> {
        if !(a <= b) {
            return Err(SimError::InvalidDistribution("uniform bounds out of order"));
        }
        if a == b {
            return Ok(a);
        }
        Ok(self.random.rng.gen_range(a..b))
    }

    /// Exponential draw with the given mean.
    pub fn rand_exponential(&mut self, mean: f64) -> Result<f64, SimError> {
        if !(mean > 0.0) || !mean.is_finite() {
            return Err(SimError::InvalidDistribution("exponential mean must be positive"));
        }
        let exp = Exp::new(1.0 / mean)
            .map_err(|_| SimError::InvalidDistribution("exponential mean must be positive"))?;
        Ok(exp.sample(&mut self.random))
    }

    /// Normal draw with mean `mu` and standard deviation `sigma`.
    pub fn rand_normal(&mut self, mu: f64, sigma: f64) -> Result<f64, SimError> {
        let normal = Normal::new(mu, sigma)
            .map_err(|_| SimError::InvalidDistribution("sigma must be finite and non-negative"))?;
        Ok(normal.sample(&mut self.random))
    }

    /// Normal draw rejected until it is strictly positive.
    pub fn rand_normal_positive(&mut self, mu: f64, sigma: f64) -> Result<f64, SimError> {
        if sigma <= 0.0 {
            return Err(SimError::InvalidDistribution("sigma must be positive"));
        }
        loop {
            let draw = self.rand_normal(mu, sigma)?;
            if draw > 0.0 {
                return Ok(draw);
            }
        }
    }

    /// Normal draw rejected until it is strictly negative.
    pub fn rand_normal_negative(&mut self, mu: f64, sigma: f64) -> Result<f64, SimError> {
        if sigma <= 0.0 {
            return Err(SimError::InvalidDistribution("sigma must be positive"));
        }
        loop {
            let draw = self.rand_normal(mu, sigma)?;
            if draw < 0.0 {
                return Ok(draw);
            }
        }
    }

    /// Log-normal draw parameterized in log space.
    pub fn rand_log_normal(&mut self, mu: f64, sigma: f64) -> Result<f64, SimError> {
        let dist = LogNormal::new(mu, sigma)
            .map_err(|_| SimError::InvalidDistribution("sigma must be finite and non-negative"))?;
        Ok(dist.sample(&mut self.random))
    }

    /// Log-normal draw parameterized by its actual mean and
    /// coefficient of variation.
    pub fn rand_log_normal2(&mut self, mean: f64, cov: f64) -> Result<f64, SimError> {
        if mean <= 0.0 || cov < 0.0 {
            return Err(SimError::InvalidDistribution(
                "mean must be positive and cov non-negative",
            ));
        }
        if cov == 0.0 {
            return Ok(mean);
        }
        let sigma2 = (1.0 + cov * cov).ln();
        let mu = mean.ln() - 0.5 * sigma2;
        self.rand_log_normal(mu, sigma2.sqrt())
    }

    /// Cauchy draw with location `x0` and scale `gamma`.
    pub fn rand_cauchy(&mut self, x0: f64, gamma: f64) -> Result<f64, SimError> {
        let dist = Cauchy::new(x0, gamma)
            .map_err(|_| SimError::InvalidDistribution("gamma must be positive"))?;
        Ok(dist.sample(&mut self.random))
    }

    /// Weibull draw with the given shape and scale.
    pub fn rand_weibull(&mut self, shape: f64, scale: f64) -> Result<f64, SimError> {
        let dist = Weibull::new(scale, shape)
            .map_err(|_| SimError::InvalidDistribution("shape and scale must be positive"))?;
        Ok(dist.sample(&mut self.random))
    }

    /// Triangular draw on `[low, high]` with the given mode.
    pub fn rand_triangular(&mut self, low: f64, high: f64, mode: f64) -> Result<f64, SimError> {
        let dist = Triangular::new(low, high, mode)
            .map_err(|_| SimError::InvalidDistribution("mode must lie within [low, high]"))?;
        Ok(dist.sample(&mut self.random))
    }

    /// Erlang draw: sum of `k` exponential stages at the given rate.
    pub fn rand_erlang(&mut self, k: u32, rate: f64) -> Result<f64, SimError> {
        if k == 0 {
            return Err(SimError::InvalidDistribution("k must be positive"));
        }
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(SimError::InvalidDistribution("rate must be positive"));
        }
        let dist = Gamma::new(f64::from(k), 1.0 / rate)
            .map_err(|_| SimError::InvalidDistribution("rate must be positive"))?;
        Ok(dist.sample(&mut self.random))
    }

    /// Uniform pick from a slice.
    pub fn rand_choice<'a, T>(&mut self, items: &'a [T]) -> Result<&'a T, SimError> {
        if items.is_empty() {
            return Err(SimError::EmptyChoice);
        }
        let index = self.random.next_in_range(0, items.len() as i64) as usize;
        Ok(&items[index])
    }

    /// Span twin of [`rand_uniform`](Simulation::rand_uniform).
    pub fn rand_uniform_span(&mut self, a: Duration, b: Duration) -> Result<Duration, SimError> {
        let draw = self.rand_uniform(to_seconds(a), to_seconds(b))?;
        Ok(from_seconds(draw))
    }

    /// Span twin of [`rand_exponential`](Simulation::rand_exponential).
    pub fn rand_exponential_span(&mut self, mean: Duration) -> Result<Duration, SimError> {
        let draw = self.rand_exponential(to_seconds(mean))?;
        Ok(from_seconds(draw))
    }

    /// Span twin of [`rand_normal`](Simulation::rand_normal).
    pub fn rand_normal_span(&mut self, mu: Duration, sigma: Duration) -> Result<Duration, SimError> {
        let draw = self.rand_normal(to_seconds(mu), to_seconds(sigma))?;
        Ok(from_seconds(draw))
    }

    /// Span twin of [`rand_normal_positive`](Simulation::rand_normal_positive).
    pub fn rand_normal_positive_span(
        &mut self,
        mu: Duration,
        sigma: Duration,
    ) -> Result<Duration, SimError> {
        let draw = self.rand_normal_positive(to_seconds(mu), to_seconds(sigma))?;
        Ok(from_seconds(draw))
    }

    /// Span twin of [`rand_triangular`](Simulation::rand_triangular).
    pub fn rand_triangular_span(
        &mut self,
        low: Duration,
        high: Duration,
        mode: Duration,
    ) -> Result<Duration, SimError> {
        let draw = self.rand_triangular(to_seconds(low), to_seconds(high), to_seconds(mode))?;
        Ok(from_seconds(draw))
    }
}
