//! Row-major layout of a flat population and neighbour lookup on it.
//!
//! The population is a flat sequence; a row width (`items_per_row`) reshapes
//! it into rows. When the population size is not a multiple of the width, the
//! last row is short and only holds `total % items_per_row` people.

use crate::error::{Error, Result};

/// A validated, non-zero row width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridLayout {
    items_per_row: usize,
}

impl GridLayout {
    /// # Errors
    ///
    /// Returns [`Error::InvalidItemsPerRow`] for a zero width.
    pub fn new(items_per_row: usize) -> Result<Self> {
        if items_per_row == 0 {
            return Err(Error::InvalidItemsPerRow(items_per_row));
        }
        Ok(GridLayout { items_per_row })
    }

    pub fn items_per_row(&self) -> usize {
        self.items_per_row
    }

    /// Number of rows needed for `total` people, counting a short last row.
    pub fn row_count(&self, total: usize) -> usize {
        total.div_ceil(self.items_per_row)
    }

    /// Converts a linear index to `(row, column)`.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.items_per_row, index % self.items_per_row)
    }

    /// Converts `(row, column)` back to a linear index if that cell holds a person.
    pub fn index_at(&self, row: usize, column: usize, total: usize) -> Option<usize> {
        if column >= self.items_per_row {
            return None;
        }
        let index = row * self.items_per_row + column;
        (index < total).then_some(index)
    }

    /// Neighbours of `index` in a population of `total`; see [`neighbors`].
    pub fn neighbors(&self, index: usize, total: usize) -> Vec<usize> {
        moore_neighbors(index, self.items_per_row, total)
    }
}

/// Returns the indices of the Moore neighbourhood (up to 8 cells) of `index`.
///
/// # Arguments
///
/// * `index` - Linear position of the person
/// * `items_per_row` - Row width used to reshape the population
/// * `total` - Population size
///
/// # Returns
///
/// Indices in ascending order, without duplicates or `index` itself, all
/// inside `0..total`. Cells beside the short last row only see the people
/// that row actually holds.
///
/// # Errors
///
/// Returns [`Error::InvalidItemsPerRow`] when `items_per_row` is zero.
pub fn neighbors(index: usize, items_per_row: usize, total: usize) -> Result<Vec<usize>> {
    let layout = GridLayout::new(items_per_row)?;
    Ok(layout.neighbors(index, total))
}

fn moore_neighbors(index: usize, items_per_row: usize, total: usize) -> Vec<usize> {
    let width = items_per_row as isize;
    let row = (index / items_per_row) as isize;
    let column = (index % items_per_row) as isize;

    let items_in_last_row = (total % items_per_row) as isize;
    let last_row_first_index = (total - total % items_per_row) as isize;
    // With a zero remainder every row is full and row `total / width` is empty,
    // so the short-row column bound (zero) rejects everything there.
    let last_row = (total / items_per_row) as isize;

    let mut result = Vec::with_capacity(8);
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }

            let nr = row + dy;
            let nc = column + dx;
            if nr < 0 || nr > last_row {
                continue;
            }

            let columns = if nr * width >= last_row_first_index {
                items_in_last_row
            } else {
                width
            };
            if nc < 0 || nc >= columns {
                continue;
            }

            let neighbor = nr * width + nc;
            if neighbor >= 0 && (neighbor as usize) < total {
                result.push(neighbor as usize);
            }
        }
    }
    result
}
