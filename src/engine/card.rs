//! Card layout and the canonical cell-position convention.
//!
//! A card is five columns of five numbers: B 1-15, I 16-30, N 31-45,
//! G 46-60, O 61-75. The center of the N column is the free cell.
//!
//! Cell positions are **row-major**: `position = row * 5 + col`, where
//! `col` is the column index (B=0 .. O=4) and `row` runs 0..5 top to
//! bottom. The free cell is therefore position 12. Every place the engine
//! talks about cells (card storage, pattern definitions, marked sets)
//! uses this one convention.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::types::Letter;

pub const CARD_SIZE: usize = 5;
pub const CELL_COUNT: usize = CARD_SIZE * CARD_SIZE;

/// Row-major position of the free cell (row 2, N column).
pub const FREE_CELL: u8 = 12;

/// A 5x5 bingo card. `columns[col][row]` holds the printed number; the
/// free cell is stored as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BingoCard {
    columns: [[u8; CARD_SIZE]; CARD_SIZE],
}

impl BingoCard {
    /// Generate the card printed with the given card number.
    ///
    /// Generation is seeded by the card number so every device that knows
    /// the number derives the identical card, with no card blob on the
    /// wire.
    pub fn generate(card_number: u16) -> Self {
        let mut rng = StdRng::seed_from_u64(u64::from(card_number));
        let mut columns = [[0u8; CARD_SIZE]; CARD_SIZE];

        for (col, column) in columns.iter_mut().enumerate() {
            let low = (col as u8) * 15 + 1;
            let mut band: Vec<u8> = (low..low + 15).collect();
            band.shuffle(&mut rng);
            for (row, cell) in column.iter_mut().enumerate() {
                *cell = band[row];
            }
        }
        columns[Letter::N.column()][2] = 0; // free cell

        Self { columns }
    }

    /// Build a card from explicit column data. Rejects out-of-band or
    /// duplicated numbers and a non-free center.
    pub fn from_columns(columns: [[u8; CARD_SIZE]; CARD_SIZE]) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for (col, column) in columns.iter().enumerate() {
            let low = (col as u8) * 15 + 1;
            for (row, &number) in column.iter().enumerate() {
                if col == Letter::N.column() && row == 2 {
                    if number != 0 {
                        return Err("center cell must be the free cell (0)".to_string());
                    }
                    continue;
                }
                if number < low || number >= low + 15 {
                    return Err(format!(
                        "number {} out of band for column {}",
                        number, col
                    ));
                }
                if !seen.insert(number) {
                    return Err(format!("duplicate number {} on card", number));
                }
            }
        }
        Ok(Self { columns })
    }

    /// Row-major position of a cell.
    pub fn position(row: usize, col: usize) -> u8 {
        (row * CARD_SIZE + col) as u8
    }

    /// Number printed at a cell; `None` for the free cell.
    pub fn number_at(&self, row: usize, col: usize) -> Option<u8> {
        match self.columns[col][row] {
            0 => None,
            n => Some(n),
        }
    }

    /// Marked positions for this card: cells whose number has been called,
    /// plus manual daubs, plus the free cell.
    pub fn marked_positions(&self, called: &HashSet<u8>, manual_marks: &[u8]) -> HashSet<u8> {
        let mut marked = HashSet::with_capacity(CELL_COUNT);
        marked.insert(FREE_CELL);
        for pos in manual_marks {
            if usize::from(*pos) < CELL_COUNT {
                marked.insert(*pos);
            }
        }
        for row in 0..CARD_SIZE {
            for col in 0..CARD_SIZE {
                if let Some(number) = self.number_at(row, col) {
                    if called.contains(&number) {
                        marked.insert(Self::position(row, col));
                    }
                }
            }
        }
        marked
    }
}
