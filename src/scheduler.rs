//! Periodic driver for propagation steps and statistics.
//!
//! `Idle --start--> Running`, `Running --start--> Running` (driver replaced,
//! latest period wins), `Running --stop--> Idle`. The implicit
//! `Idle --manual infection--> Running` transition is issued by
//! [`Simulator::infect_at`](crate::Simulator::infect_at).

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::events::SimulationEvent;
use crate::simulation::{lock_state, publish_statistics_async, SharedState};

#[derive(Debug)]
struct Driver {
    /// Dropping this wakes the driver thread and makes it exit.
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    driver: Option<Driver>,
}

impl Scheduler {
    pub(crate) fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Installs a new driver, replacing a running one.
    ///
    /// `period` of `None` reuses the period stored in the session.
    pub(crate) fn start(&mut self, state: &SharedState, period: Option<Duration>) -> Result<()> {
        let restarting = self.stop_driver(state);

        let (epoch, period) = {
            let mut session = lock_state(state);
            session.epoch += 1;
            if let Some(period) = period {
                session.period = period;
            }
            (session.epoch, session.period)
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker_state = Arc::clone(state);
        let handle = thread::Builder::new()
            .name("infection-sim-scheduler".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                {
                    let mut session = lock_state(&worker_state);
                    // A stop or restart may have won the race for the lock.
                    if session.epoch != epoch {
                        break;
                    }
                    let changed = session.step();
                    debug!(epoch, new_infections = changed.len(), "tick");
                }
                publish_statistics_async(&worker_state);
            })
            .map_err(|err| {
                error!(%err, "failed to spawn scheduler thread");
                Error::SchedulerSpawn(err.to_string())
            })?;

        self.driver = Some(Driver { stop_tx, handle });
        if !restarting {
            lock_state(state).publish(SimulationEvent::RunningChanged(true));
        }
        info!(period_ms = period.as_millis() as u64, restarting, "simulation started");
        Ok(())
    }

    /// Stops the driver. Safe to call while idle.
    pub(crate) fn stop(&mut self, state: &SharedState) {
        if self.stop_driver(state) {
            lock_state(state).publish(SimulationEvent::RunningChanged(false));
            info!("simulation stopped");
        }
    }

    fn stop_driver(&mut self, state: &SharedState) -> bool {
        let Some(driver) = self.driver.take() else {
            return false;
        };
        // Invalidate the epoch first: once this lock is released no tick of
        // the old driver can commit, even if it is already waiting for it.
        lock_state(state).epoch += 1;
        drop(driver.stop_tx);
        if driver.handle.join().is_err() {
            error!("scheduler thread panicked");
        }
        true
    }
}
