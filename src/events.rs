//! Notifications pushed to whoever displays the simulation.
//!
//! Subscribers get a plain [`mpsc::Receiver`] and drain it on whatever thread
//! they like; the simulator never waits on them.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::population::{Person, PersonId};
use crate::stats::Stats;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    /// Full population after a commit that changed at least one person.
    PopulationUpdated(Arc<[Person]>),
    /// A single person became infected.
    PersonInfected(PersonId),
    /// Fresh head counts.
    StatisticsUpdated(Stats),
    /// The scheduler started (`true`) or stopped (`false`).
    RunningChanged(bool),
}

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<SimulationEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<SimulationEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends `event` to every live subscriber and forgets the ones that hung up.
    pub(crate) fn publish(&mut self, event: SimulationEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Publishes the per-person notifications followed by the new population.
    pub(crate) fn publish_infections(&mut self, people: &[Person], changed: &[usize]) {
        if changed.is_empty() {
            return;
        }
        for &index in changed {
            self.publish(SimulationEvent::PersonInfected(people[index].id()));
        }
        self.publish(SimulationEvent::PopulationUpdated(Arc::from(people)));
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
