//! Winning patterns and the pure matching function.
//!
//! Patterns are configuration data, not code: a deployment can supply its
//! own set through `patterns_file`, and the built-in set covers the
//! standard shapes. Positions use the row-major convention documented in
//! [`crate::engine::card`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::card::{BingoCard, CARD_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinningPattern {
    pub name: String,
    /// Required cell positions, row-major 0..25.
    pub positions: Vec<u8>,
    /// Lower priority is checked first.
    pub priority: u8,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Progress of one pattern against a marked set, for operator feedback on
/// a non-winning verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternProgress {
    pub name: String,
    pub percent_complete: u8,
}

/// The ordered set of patterns a deployment plays with.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<WinningPattern>,
}

impl PatternSet {
    /// Wrap a pattern list, ordering it by ascending priority.
    pub fn new(mut patterns: Vec<WinningPattern>) -> Self {
        patterns.sort_by_key(|p| p.priority);
        Self { patterns }
    }

    /// Load patterns from a JSON file.
    pub fn load(path: &Path) -> Result<Self, crate::error::AppError> {
        let raw = std::fs::read_to_string(path)?;
        let patterns: Vec<WinningPattern> = serde_json::from_str(&raw)?;
        Ok(Self::new(patterns))
    }

    /// The standard set: every row, every column, both diagonals, four
    /// corners, and full card. Rows and columns share the lowest priority
    /// band, then diagonals, corners, and full card last.
    pub fn builtin() -> Self {
        let mut patterns = Vec::new();
        let rows = ["Top Row", "Second Row", "Middle Row", "Fourth Row", "Bottom Row"];
        for (row, name) in rows.iter().enumerate() {
            patterns.push(WinningPattern {
                name: (*name).to_string(),
                positions: (0..CARD_SIZE)
                    .map(|col| BingoCard::position(row, col))
                    .collect(),
                priority: 10,
                active: true,
            });
        }
        let columns = ["B Column", "I Column", "N Column", "G Column", "O Column"];
        for (col, name) in columns.iter().enumerate() {
            patterns.push(WinningPattern {
                name: (*name).to_string(),
                positions: (0..CARD_SIZE)
                    .map(|row| BingoCard::position(row, col))
                    .collect(),
                priority: 20,
                active: true,
            });
        }
        patterns.push(WinningPattern {
            name: "Diagonal".to_string(),
            positions: (0..CARD_SIZE).map(|i| BingoCard::position(i, i)).collect(),
            priority: 30,
            active: true,
        });
        patterns.push(WinningPattern {
            name: "Anti-Diagonal".to_string(),
            positions: (0..CARD_SIZE)
                .map(|i| BingoCard::position(i, CARD_SIZE - 1 - i))
                .collect(),
            priority: 30,
            active: true,
        });
        patterns.push(WinningPattern {
            name: "Four Corners".to_string(),
            positions: vec![
                BingoCard::position(0, 0),
                BingoCard::position(0, 4),
                BingoCard::position(4, 0),
                BingoCard::position(4, 4),
            ],
            priority: 40,
            active: true,
        });
        patterns.push(WinningPattern {
            name: "Full Card".to_string(),
            positions: (0..25).collect(),
            priority: 50,
            active: true,
        });
        Self::new(patterns)
    }

    /// Find the winning pattern for a marked set, if any: active patterns
    /// are evaluated in ascending priority, and the first whose full
    /// position set is covered wins.
    pub fn match_card(&self, marked: &HashSet<u8>) -> Option<&WinningPattern> {
        self.patterns
            .iter()
            .filter(|p| p.active)
            .find(|p| p.positions.iter().all(|pos| marked.contains(pos)))
    }

    /// Completion percentage of every active pattern against a marked set,
    /// most complete first.
    pub fn completion(&self, marked: &HashSet<u8>) -> Vec<PatternProgress> {
        let mut progress: Vec<PatternProgress> = self
            .patterns
            .iter()
            .filter(|p| p.active && !p.positions.is_empty())
            .map(|p| {
                let hit = p.positions.iter().filter(|pos| marked.contains(pos)).count();
                PatternProgress {
                    name: p.name.clone(),
                    percent_complete: (hit * 100 / p.positions.len()) as u8,
                }
            })
            .collect();
        progress.sort_by(|a, b| b.percent_complete.cmp(&a.percent_complete));
        progress
    }

    pub fn patterns(&self) -> &[WinningPattern] {
        &self.patterns
    }
}
