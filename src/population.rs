//! The people being simulated and their infection flags.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

static NEXT_PERSON_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a person, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonId(u64);

impl PersonId {
    fn next() -> Self {
        PersonId(NEXT_PERSON_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "person-{}", self.0)
    }
}

/// One member of the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Person {
    id: PersonId,
    infected: bool,
}

impl Person {
    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn is_infected(&self) -> bool {
        self.infected
    }
}

/// Fixed-size, ordered collection of people.
///
/// Insertion order is the layout order used by [`GridLayout`](crate::GridLayout).
/// Infection only ever goes from healthy to infected; nothing here clears it.
#[derive(Debug, Clone)]
pub struct Population {
    people: Vec<Person>,
    by_id: HashMap<PersonId, usize>,
}

impl Population {
    /// Creates `size` healthy people.
    pub fn new(size: usize) -> Self {
        let people: Vec<Person> = (0..size)
            .map(|_| Person {
                id: PersonId::next(),
                infected: false,
            })
            .collect();
        let by_id = people
            .iter()
            .enumerate()
            .map(|(index, person)| (person.id, index))
            .collect();
        Population { people, by_id }
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Person> {
        self.people.get(index)
    }

    pub fn all(&self) -> &[Person] {
        &self.people
    }

    pub fn index_of(&self, id: PersonId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn is_infected(&self, index: usize) -> bool {
        self.people.get(index).is_some_and(|p| p.infected)
    }

    /// Infection flags in layout order.
    pub fn infection_flags(&self) -> Vec<bool> {
        self.people.iter().map(|p| p.infected).collect()
    }

    pub fn infected_count(&self) -> usize {
        self.people.iter().filter(|p| p.infected).count()
    }

    /// Marks the person at `index` infected.
    ///
    /// Returns `Ok(true)` if the flag changed and `Ok(false)` if the person was
    /// already infected.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] if `index` is past the end of the population.
    pub fn set_infected(&mut self, index: usize) -> Result<bool> {
        let len = self.people.len();
        let person = self
            .people
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        if person.infected {
            return Ok(false);
        }
        person.infected = true;
        Ok(true)
    }

    /// Infects the person with `id` if they are healthy.
    ///
    /// Returns the index of the person when the flag changed. An unknown id or
    /// an already infected person yields `None`.
    pub fn infect(&mut self, id: PersonId) -> Option<usize> {
        let index = self.index_of(id)?;
        let person = &mut self.people[index];
        if person.infected {
            return None;
        }
        person.infected = true;
        Some(index)
    }

    /// Commits a set of infections as one unit.
    ///
    /// All indices are checked before anything is written, so either every
    /// healthy person in `indices` becomes infected or nothing changes.
    /// Duplicates and already infected people are skipped. Returns the indices
    /// that actually changed, in ascending order.
    pub fn apply_batch<I>(&mut self, indices: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = usize>,
    {
        let len = self.people.len();
        let mut pending: Vec<usize> = indices.into_iter().collect();
        if let Some(&index) = pending.iter().find(|&&index| index >= len) {
            return Err(Error::IndexOutOfRange { index, len });
        }
        pending.sort_unstable();
        pending.dedup();
        pending.retain(|&index| !self.people[index].infected);
        for &index in &pending {
            self.people[index].infected = true;
        }
        Ok(pending)
    }
}
