//! A running simulation session.
//!
//! All mutable state lives in one [`SessionState`] behind a mutex shared by
//! the scheduler thread, manual infections and layout updates. Every mutation
//! (a whole propagation step, a single infection, a width change) happens
//! under one lock acquisition, so readers only ever see committed states.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, SimulationEvent};
use crate::grid::GridLayout;
use crate::population::{Person, PersonId, Population};
use crate::propagation::Propagator;
use crate::scheduler::Scheduler;
use crate::stats::Stats;

pub(crate) type SharedState = Arc<Mutex<SessionState>>;

/// State guarded by the session mutex.
#[derive(Debug)]
pub(crate) struct SessionState {
    population: Population,
    layout: Option<GridLayout>,
    propagator: Propagator,
    rng: StdRng,
    events: EventBus,
    /// Bumped on every scheduler start and stop; a driver only ticks while
    /// its own epoch is current.
    pub(crate) epoch: u64,
    pub(crate) period: Duration,
}

impl SessionState {
    /// One propagation step followed by the change notifications.
    pub(crate) fn step(&mut self) -> Vec<usize> {
        let changed = self
            .propagator
            .step(&mut self.population, self.layout, &mut self.rng);
        self.events
            .publish_infections(self.population.all(), &changed);
        changed
    }

    fn infect_index(&mut self, index: usize) -> Result<bool> {
        let changed = self.population.set_infected(index)?;
        if changed {
            self.events
                .publish_infections(self.population.all(), &[index]);
        }
        Ok(changed)
    }

    pub(crate) fn people(&self) -> Vec<Person> {
        self.population.all().to_vec()
    }

    pub(crate) fn publish(&mut self, event: SimulationEvent) {
        self.events.publish(event);
    }
}

pub(crate) fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    // A panic mid-step cannot leave a half-written batch: commits happen in
    // `Population::apply_batch` after validation.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a consistent copy of the population on the rayon pool and
/// publishes the result.
pub(crate) fn publish_statistics_async(state: &SharedState) {
    let state = Arc::clone(state);
    rayon::spawn(move || {
        // Copy under the lock, count outside it: a pool thread must not block
        // on the session mutex while nested parallel work is pending.
        let people = lock_state(&state).people();
        let stats = Stats::from_people(&people);
        lock_state(&state).publish(SimulationEvent::StatisticsUpdated(stats));
    });
}

/// Infection spread simulation over a grid-shaped population.
///
/// ```no_run
/// use infection_sim::{SimulationConfig, Simulator};
///
/// let config = SimulationConfig::from_secs(100, 3, 0.5)?;
/// let sim = Simulator::new(config)?;
/// let events = sim.subscribe();
/// sim.set_items_per_row(10)?;
/// sim.infect_at(45)?; // starts the scheduler
/// for event in events.iter().take(10) {
///     println!("{event:?}");
/// }
/// # Ok::<(), infection_sim::Error>(())
/// ```
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    state: SharedState,
    scheduler: Mutex<Scheduler>,
}

impl Simulator {
    /// Creates a session with `config.group_size` healthy people and an idle
    /// scheduler.
    ///
    /// # Errors
    ///
    /// Any configuration error from [`SimulationConfig::validate`].
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = SessionState {
            population: Population::new(config.group_size),
            layout: None,
            propagator: Propagator::new(config.infection_factor)?,
            rng,
            events: EventBus::default(),
            epoch: 0,
            period: config.tick_period,
        };
        info!(
            group_size = config.group_size,
            infection_factor = config.infection_factor,
            period_ms = config.tick_period.as_millis() as u64,
            "simulation session created"
        );
        Ok(Simulator {
            config,
            state: Arc::new(Mutex::new(state)),
            scheduler: Mutex::new(Scheduler::default()),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Registers a new observer. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SimulationEvent> {
        lock_state(&self.state).events.subscribe()
    }

    /// Sets the row width used for neighbour lookup; effective from the next step.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidItemsPerRow`] for a zero width. The previous width is kept.
    pub fn set_items_per_row(&self, items_per_row: usize) -> Result<()> {
        let layout = GridLayout::new(items_per_row)?;
        let mut state = lock_state(&self.state);
        if state.layout != Some(layout) {
            info!(items_per_row, "layout updated");
            state.layout = Some(layout);
        }
        Ok(())
    }

    pub fn items_per_row(&self) -> Option<usize> {
        lock_state(&self.state)
            .layout
            .map(|layout| layout.items_per_row())
    }

    /// Infects the person with `id` if they are healthy.
    ///
    /// Returns whether anything changed. Unknown ids and people that are
    /// already infected are ignored. A successful infection while the
    /// scheduler is idle starts it with the last used period.
    ///
    /// # Errors
    ///
    /// [`Error::SchedulerSpawn`] if the scheduler had to be started and could not.
    pub fn infect(&self, id: PersonId) -> Result<bool> {
        let index = lock_state(&self.state).population.index_of(id);
        match index {
            Some(index) => self.infect_at(index),
            None => {
                debug!(%id, "infection requested for unknown person");
                Ok(false)
            }
        }
    }

    /// Same as [`Simulator::infect`] but addresses the person by grid position.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] if `index` is not in the population, or
    /// [`Error::SchedulerSpawn`].
    pub fn infect_at(&self, index: usize) -> Result<bool> {
        let mut scheduler = self.lock_scheduler();
        let changed = lock_state(&self.state).infect_index(index)?;
        if changed {
            debug!(index, "manual infection");
            if !scheduler.is_running() {
                info!("manual infection while idle, starting scheduler");
                scheduler.start(&self.state, None)?;
            }
        }
        Ok(changed)
    }

    /// Runs one propagation step right now, independent of the scheduler.
    pub fn step(&self) -> Vec<usize> {
        lock_state(&self.state).step()
    }

    /// Starts (or restarts) periodic propagation with the last used period.
    pub fn start(&self) -> Result<()> {
        self.lock_scheduler().start(&self.state, None)
    }

    /// Starts (or restarts) periodic propagation with `period`, which also
    /// becomes the period reused by later implicit starts.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTickPeriod`] for a zero period, or [`Error::SchedulerSpawn`].
    pub fn start_with_period(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::InvalidTickPeriod(0.0));
        }
        self.lock_scheduler().start(&self.state, Some(period))
    }

    /// Stops periodic propagation. No tick commits after this returns.
    pub fn stop(&self) {
        self.lock_scheduler().stop(&self.state);
    }

    pub fn is_running(&self) -> bool {
        self.lock_scheduler().is_running()
    }

    /// Period used by the current or most recent run.
    pub fn period(&self) -> Duration {
        lock_state(&self.state).period
    }

    /// Head counts from one consistent read of the population.
    pub fn statistics(&self) -> Stats {
        // Counting runs on the rayon pool, whose workers may be waiting for
        // this lock, so count a copy.
        let people = lock_state(&self.state).people();
        Stats::from_people(&people)
    }

    /// Computes statistics in the background and publishes them as
    /// [`SimulationEvent::StatisticsUpdated`].
    pub fn request_statistics(&self) {
        publish_statistics_async(&self.state);
    }

    /// Copy of the whole population in layout order.
    pub fn people(&self) -> Vec<Person> {
        lock_state(&self.state).people()
    }

    pub fn len(&self) -> usize {
        self.config.group_size
    }

    pub fn is_empty(&self) -> bool {
        self.config.group_size == 0
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.lock_scheduler().stop(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(group_size: usize, factor: usize) -> Simulator {
        let config = SimulationConfig::new(group_size, factor, Duration::from_secs(3600))
            .unwrap()
            .with_seed(7);
        Simulator::new(config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SimulationConfig {
            group_size: 4,
            infection_factor: 9,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            Simulator::new(config),
            Err(Error::InvalidInfectionFactor { .. })
        ));
    }

    #[test]
    fn step_without_layout_does_nothing() {
        let sim = seeded(9, 8);
        sim.infect_at(4).unwrap();
        assert!(sim.step().is_empty());
        assert_eq!(sim.statistics().infected, 1);
    }

    #[test]
    fn zero_width_is_rejected_and_previous_kept() {
        let sim = seeded(9, 2);
        sim.set_items_per_row(3).unwrap();
        assert_eq!(sim.set_items_per_row(0), Err(Error::InvalidItemsPerRow(0)));
        assert_eq!(sim.items_per_row(), Some(3));
    }

    #[test]
    fn manual_infection_starts_idle_scheduler() {
        let sim = seeded(9, 2);
        assert!(!sim.is_running());
        let id = sim.people()[0].id();
        assert_eq!(sim.infect(id), Ok(true));
        assert!(sim.is_running());

        sim.stop();
        assert!(!sim.is_running());
        // Re-infecting the same person changes nothing and does not restart.
        assert_eq!(sim.infect(id), Ok(false));
        assert!(!sim.is_running());
    }

    #[test]
    fn unknown_id_is_ignored() {
        let sim = seeded(4, 1);
        let stranger = seeded(1, 1).people()[0].id();
        assert_eq!(sim.infect(stranger), Ok(false));
        assert!(!sim.is_running());
        assert_eq!(sim.statistics().infected, 0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let sim = seeded(4, 1);
        assert_eq!(
            sim.infect_at(4),
            Err(Error::IndexOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn manual_step_publishes_changes() {
        let sim = seeded(9, 8);
        let events = sim.subscribe();
        sim.set_items_per_row(3).unwrap();
        sim.infect_at(4).unwrap();
        sim.stop();

        let infected = sim.step();
        assert!(!infected.is_empty());
        let stats = sim.statistics();
        assert_eq!(stats.infected, 1 + infected.len());
        assert_eq!(stats.total(), 9);

        let announced = events
            .try_iter()
            .filter(|e| matches!(e, SimulationEvent::PersonInfected(_)))
            .count();
        assert_eq!(announced, 1 + infected.len());
    }

    #[test]
    fn start_with_period_is_remembered() {
        let sim = seeded(4, 1);
        sim.start_with_period(Duration::from_secs(60)).unwrap();
        assert_eq!(sim.period(), Duration::from_secs(60));
        sim.stop();
        sim.start().unwrap();
        assert_eq!(sim.period(), Duration::from_secs(60));
        assert!(sim.start_with_period(Duration::ZERO).is_err());
    }
}
