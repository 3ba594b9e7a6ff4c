//! Healthy / infected head counts.

use rayon::prelude::*;

use crate::population::{Person, Population};

/// Counts of healthy and infected people at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// People not yet infected
    pub healthy: usize,
    /// People infected so far
    pub infected: usize,
}

impl Stats {
    /// Counts a population in parallel.
    ///
    /// The counts come from a single consistent state, so `healthy + infected`
    /// equals the population size. Do not call this while holding a lock that
    /// rayon pool jobs also take.
    pub fn compute(population: &Population) -> Stats {
        Self::from_people(population.all())
    }

    pub fn from_people(people: &[Person]) -> Stats {
        let infected = people.par_iter().filter(|p| p.is_infected()).count();
        Stats {
            healthy: people.len() - infected,
            infected,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.infected
    }

    /// Share of the population that is infected, in `0.0..=1.0`.
    pub fn infected_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.infected as f64 / self.total() as f64
    }
}
