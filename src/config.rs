//! Simulation parameters collected from the user before a session starts.

use std::time::Duration;

use crate::error::{Error, Result};

/// Validated parameters of one simulation session.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Number of people in the population; fixed for the session.
    pub group_size: usize,
    /// Upper bound on new infections a single infected person causes per step.
    pub infection_factor: usize,
    /// Time between two propagation steps.
    pub tick_period: Duration,
    /// Seed for a reproducible run. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Builds a configuration, rejecting values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidGroupSize`] when `group_size` is zero
    /// * [`Error::InvalidInfectionFactor`] when `infection_factor` is outside `1..=group_size`
    /// * [`Error::InvalidTickPeriod`] when `tick_period` is zero
    pub fn new(group_size: usize, infection_factor: usize, tick_period: Duration) -> Result<Self> {
        let config = SimulationConfig {
            group_size,
            infection_factor,
            tick_period,
            seed: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same as [`SimulationConfig::new`] but takes the period as real-valued seconds.
    pub fn from_secs(group_size: usize, infection_factor: usize, secs: f64) -> Result<Self> {
        Self::new(group_size, infection_factor, period_from_secs(secs)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Re-checks every field. Fields are public, so the simulator calls this
    /// again instead of trusting whoever built the value.
    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(Error::InvalidGroupSize(self.group_size));
        }
        if self.infection_factor == 0 || self.infection_factor > self.group_size {
            return Err(Error::InvalidInfectionFactor {
                factor: self.infection_factor,
                group_size: self.group_size,
            });
        }
        if self.tick_period.is_zero() {
            return Err(Error::InvalidTickPeriod(0.0));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            group_size: 100,
            infection_factor: 3,
            tick_period: Duration::from_secs(1),
            seed: None,
        }
    }
}

/// Converts seconds to a period, refusing zero, negative, NaN and infinite input.
pub fn period_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::InvalidTickPeriod(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| Error::InvalidTickPeriod(secs))
}
