//! One simulation step: infected people infect some of their healthy neighbours.

use std::collections::BTreeSet;

use rand::seq::index::sample;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::grid::GridLayout;
use crate::population::Population;

/// Spreads the infection over a [`Population`] laid out by a [`GridLayout`].
#[derive(Debug, Clone)]
pub struct Propagator {
    infection_factor: usize,
    skipped_steps: u64,
}

impl Propagator {
    /// # Errors
    ///
    /// [`Error::InvalidInfectionFactor`] when `infection_factor` is zero. The
    /// upper bound depends on the population and is checked by
    /// [`SimulationConfig`](crate::SimulationConfig).
    pub fn new(infection_factor: usize) -> Result<Self> {
        if infection_factor == 0 {
            return Err(Error::InvalidInfectionFactor {
                factor: infection_factor,
                group_size: 0,
            });
        }
        Ok(Propagator {
            infection_factor,
            skipped_steps: 0,
        })
    }

    pub fn infection_factor(&self) -> usize {
        self.infection_factor
    }

    /// Number of steps skipped so far because no layout was known.
    pub fn skipped_steps(&self) -> u64 {
        self.skipped_steps
    }

    /// Picks the people that become infected in the next step.
    ///
    /// Works only on `infected`, a snapshot of the infection flags, so people
    /// infected by this step never act as sources within it. For every
    /// infected person the healthy neighbours form the candidate list; a
    /// uniformly random count in `1..=min(factor, candidates)` of distinct
    /// candidates is chosen. Proposals from several sources are merged.
    pub fn plan<R: Rng>(
        &self,
        infected: &[bool],
        layout: GridLayout,
        rng: &mut R,
    ) -> BTreeSet<usize> {
        let total = infected.len();
        let mut pending = BTreeSet::new();

        for (index, &sick) in infected.iter().enumerate() {
            if !sick {
                continue;
            }

            let candidates: Vec<usize> = layout
                .neighbors(index, total)
                .into_iter()
                .filter(|&n| !infected[n])
                .collect();

            let limit = self.infection_factor.min(candidates.len());
            if limit == 0 {
                continue;
            }

            let count = rng.gen_range(1..=limit);
            pending.extend(
                sample(rng, candidates.len(), count)
                    .into_iter()
                    .map(|i| candidates[i]),
            );
        }

        pending
    }

    /// Runs one step against `population` and commits the result at once.
    ///
    /// Returns the indices that became infected, in ascending order. Without a
    /// layout nothing happens; the first such skip is logged as a warning.
    pub fn step<R: Rng>(
        &mut self,
        population: &mut Population,
        layout: Option<GridLayout>,
        rng: &mut R,
    ) -> Vec<usize> {
        let Some(layout) = layout else {
            self.skipped_steps += 1;
            if self.skipped_steps == 1 {
                warn!("no row width known yet, skipping propagation until a layout arrives");
            } else {
                debug!(skipped = self.skipped_steps, "propagation skipped, no layout");
            }
            return Vec::new();
        };

        let snapshot = population.infection_flags();
        let pending = self.plan(&snapshot, layout, rng);
        // Every planned index comes from the neighbour lookup, which never
        // leaves the population.
        let infected = population.apply_batch(pending).unwrap_or_default();

        debug!(
            new_infections = infected.len(),
            items_per_row = layout.items_per_row(),
            "propagation step committed"
        );
        infected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layout(width: usize) -> Option<GridLayout> {
        Some(GridLayout::new(width).unwrap())
    }

    #[test]
    fn zero_factor_is_rejected() {
        assert!(Propagator::new(0).is_err());
    }

    #[test]
    fn no_layout_is_a_silent_no_op() {
        let mut population = Population::new(9);
        population.set_infected(4).unwrap();
        let mut propagator = Propagator::new(8).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert!(propagator.step(&mut population, None, &mut rng).is_empty());
        assert!(propagator.step(&mut population, None, &mut rng).is_empty());
        assert_eq!(propagator.skipped_steps(), 2);
        assert_eq!(population.infected_count(), 1);
    }

    #[test]
    fn healthy_population_never_changes() {
        let mut population = Population::new(20);
        let mut propagator = Propagator::new(3).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..10 {
            assert!(propagator.step(&mut population, layout(4), &mut rng).is_empty());
        }
    }

    #[test]
    fn center_of_three_by_three_can_infect_everyone_but_no_more() {
        let propagator = Propagator::new(8).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut flags = vec![false; 9];
        flags[4] = true;

        let mut saw_full_sweep = false;
        for _ in 0..2000 {
            let plan = propagator.plan(&flags, GridLayout::new(3).unwrap(), &mut rng);
            assert!(!plan.is_empty() && plan.len() <= 8);
            assert!(!plan.contains(&4));
            saw_full_sweep |= plan.len() == 8;
        }
        assert!(saw_full_sweep);
    }

    #[test]
    fn new_infections_stay_within_limit() {
        // Five people in one row; the middle one has two healthy neighbours.
        let mut rng = StdRng::seed_from_u64(4);
        let mut counts = [0usize; 3];
        for _ in 0..1000 {
            let mut population = Population::new(5);
            population.set_infected(2).unwrap();
            let mut propagator = Propagator::new(5).unwrap();
            let infected = propagator.step(&mut population, layout(5), &mut rng);
            let limit = 5usize.min(2);
            assert!((1..=limit).contains(&infected.len()));
            assert!(infected.iter().all(|&i| i == 1 || i == 3));
            counts[infected.len()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert!(counts[1] > 0 && counts[2] > 0);
    }

    #[test]
    fn fresh_infections_do_not_spread_within_the_same_step() {
        // A single row: only index 1 can be reached from index 0 in one step.
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let mut population = Population::new(6);
            population.set_infected(0).unwrap();
            let mut propagator = Propagator::new(6).unwrap();
            let infected = propagator.step(&mut population, layout(6), &mut rng);
            assert_eq!(infected, vec![1]);
        }
    }

    #[test]
    fn step_bound_and_monotonicity_hold_over_a_run() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut population = Population::new(97);
        population.set_infected(0).unwrap();
        population.set_infected(50).unwrap();
        let mut propagator = Propagator::new(2).unwrap();

        let mut previous = population.infection_flags();
        for step in 0..200 {
            // Width changes between steps take effect immediately.
            let width = 5 + step % 4;
            let sources = population.infected_count();
            let infected = propagator.step(&mut population, layout(width), &mut rng);
            assert!(infected.len() <= 2 * sources);
            assert!(infected.iter().all(|&i| !previous[i]));

            let current = population.infection_flags();
            assert!(previous.iter().zip(&current).all(|(&before, &after)| !before || after));
            previous = current;
        }
        assert_eq!(population.infected_count(), population.len());
    }
}
