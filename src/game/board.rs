//! Per-player letter grid
//!
//! A board is append-only: a filled cell is never cleared or overwritten.

use serde::{Deserialize, Serialize};

use super::validation::validate_letter;
use crate::error::{GameError, Result};

/// Zero-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Line direction for scanning and word matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// N×N grid of optional letters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Option<char>>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_valid_position(&self, pos: Position) -> bool {
        pos.row < self.size && pos.col < self.size
    }

    pub fn get(&self, pos: Position) -> Option<char> {
        if !self.is_valid_position(pos) {
            return None;
        }
        self.cells[pos.row * self.size + pos.col]
    }

    pub fn is_empty(&self, pos: Position) -> bool {
        self.is_valid_position(pos) && self.get(pos).is_none()
    }

    /// Write `letter` into an empty cell.
    ///
    /// Fails with `InvalidPosition` outside the grid, `CellOccupied` on a
    /// filled cell and `InvalidLetter` for anything but A-Z.
    pub fn place(&mut self, pos: Position, letter: char) -> Result<()> {
        if !self.is_valid_position(pos) {
            return Err(GameError::InvalidPosition {
                row: pos.row,
                col: pos.col,
            });
        }
        let idx = pos.row * self.size + pos.col;
        if self.cells[idx].is_some() {
            return Err(GameError::CellOccupied {
                row: pos.row,
                col: pos.col,
            });
        }
        let letter = validate_letter(&letter.to_string())?;
        self.cells[idx] = Some(letter);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn empty_count(&self) -> usize {
        self.cells.len() - self.filled_count()
    }

    /// Empty cells in row-major order.
    pub fn empty_positions(&self) -> Vec<Position> {
        self.positions().filter(|p| self.get(*p).is_none()).collect()
    }

    /// Every cell in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size).flat_map(move |row| (0..self.size).map(move |col| Position::new(row, col)))
    }

    pub fn row(&self, row: usize) -> Vec<Option<char>> {
        (0..self.size).map(|col| self.get(Position::new(row, col))).collect()
    }

    pub fn col(&self, col: usize) -> Vec<Option<char>> {
        (0..self.size).map(|row| self.get(Position::new(row, col))).collect()
    }

    /// Filled orthogonal neighbours of `pos`.
    pub fn filled_neighbours(&self, pos: Position) -> usize {
        let mut count = 0;
        if pos.row > 0 && self.get(Position::new(pos.row - 1, pos.col)).is_some() {
            count += 1;
        }
        if self.get(Position::new(pos.row + 1, pos.col)).is_some() {
            count += 1;
        }
        if pos.col > 0 && self.get(Position::new(pos.row, pos.col - 1)).is_some() {
            count += 1;
        }
        if self.get(Position::new(pos.row, pos.col + 1)).is_some() {
            count += 1;
        }
        count
    }

    /// Render as text, `.` for empty cells. One line per row.
    pub fn render(&self) -> String {
        (0..self.size)
            .map(|r| {
                self.row(r)
                    .into_iter()
                    .map(|c| c.unwrap_or('.'))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
