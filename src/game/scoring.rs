//! Board scoring
//!
//! Scoring is a pure function of a board and a dictionary. Every row is
//! scanned left to right and every column top to bottom; each maximal run of
//! filled cells is a candidate. A word scores its length, doubled when it
//! spans the whole line.

use serde::{Deserialize, Serialize};

use super::board::{Board, Orientation, Position};
use super::dictionary::{Dictionary, MIN_WORD_LENGTH};
use crate::types::PlayerId;

/// Multiplier for a word that fills an entire row or column.
pub const FULL_LINE_MULTIPLIER: u32 = 2;

/// Which parts of a run can count as words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringRule {
    /// The whole maximal run counts once if it is a word.
    #[default]
    Runs,
    /// Non-overlapping dictionary words inside each run, longest first.
    Subwords,
}

/// A scored word on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordMatch {
    pub word: String,
    pub score: u32,
    pub start: Position,
    pub orientation: Orientation,
}

/// One player's scored board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardScore {
    pub player_id: PlayerId,
    pub total: u32,
    pub matches: Vec<WordMatch>,
}

/// The winner of a game and whether the top score was shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub player_id: PlayerId,
    pub score: u32,
    pub tied: bool,
}

/// Points for a word of `len` letters on a board of `size`.
pub fn word_score(len: usize, size: usize) -> u32 {
    let base = len as u32;
    if len == size {
        base * FULL_LINE_MULTIPLIER
    } else {
        base
    }
}

/// Score every row and column of `board`.
pub fn score_board(
    player_id: &PlayerId,
    board: &Board,
    dictionary: &Dictionary,
    rule: ScoringRule,
) -> BoardScore {
    let size = board.size();
    let mut matches = Vec::new();

    for r in 0..size {
        let line = board.row(r);
        for (offset, run) in runs(&line) {
            for (start, word) in words_in_run(&run, dictionary, rule) {
                let len = word.chars().count();
                matches.push(WordMatch {
                    word,
                    score: word_score(len, size),
                    start: Position::new(r, offset + start),
                    orientation: Orientation::Horizontal,
                });
            }
        }
    }

    for c in 0..size {
        let line = board.col(c);
        for (offset, run) in runs(&line) {
            for (start, word) in words_in_run(&run, dictionary, rule) {
                let len = word.chars().count();
                matches.push(WordMatch {
                    word,
                    score: word_score(len, size),
                    start: Position::new(offset + start, c),
                    orientation: Orientation::Vertical,
                });
            }
        }
    }

    let total = matches.iter().map(|m| m.score).sum();
    BoardScore {
        player_id: player_id.clone(),
        total,
        matches,
    }
}

/// Maximal runs of filled cells with at least two letters, as (offset, letters).
fn runs(line: &[Option<char>]) -> Vec<(usize, Vec<char>)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Vec<char> = Vec::new();

    for (i, cell) in line.iter().enumerate() {
        match cell {
            Some(c) => {
                if current.is_empty() {
                    start = i;
                }
                current.push(*c);
            }
            None => {
                if current.len() >= MIN_WORD_LENGTH {
                    out.push((start, std::mem::take(&mut current)));
                }
                current.clear();
            }
        }
    }
    if current.len() >= MIN_WORD_LENGTH {
        out.push((start, current));
    }
    out
}

/// Words counted inside one run, as (offset within run, word).
fn words_in_run(run: &[char], dictionary: &Dictionary, rule: ScoringRule) -> Vec<(usize, String)> {
    match rule {
        ScoringRule::Runs => {
            let word: String = run.iter().collect();
            if dictionary.contains(&word) {
                vec![(0, word.to_uppercase())]
            } else {
                Vec::new()
            }
        }
        ScoringRule::Subwords => {
            let mut found = dictionary.find_words(run);
            // Stable: equal lengths keep the earlier start first.
            found.sort_by(|a, b| b.len().cmp(&a.len()));

            let mut used = vec![false; run.len()];
            let mut selected = Vec::new();
            for f in found {
                if used[f.start..f.end].iter().any(|u| *u) {
                    continue;
                }
                used[f.start..f.end].iter_mut().for_each(|u| *u = true);
                selected.push((f.start, f.word));
            }
            selected.sort_by_key(|(start, _)| *start);
            selected
        }
    }
}

/// Scores sorted highest first. Equal totals keep their input order.
pub fn ranked(scores: &[BoardScore]) -> Vec<BoardScore> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total.cmp(&a.total));
    sorted
}

/// Highest total wins; among equal totals the earliest entry wins and the
/// result is marked as tied. `scores` must be in seat order.
pub fn determine_winner(scores: &[BoardScore]) -> Option<Winner> {
    let best = scores.iter().map(|s| s.total).max()?;
    let mut leaders = scores.iter().filter(|s| s.total == best);
    let first = leaders.next()?;
    Some(Winner {
        player_id: first.player_id.clone(),
        score: best,
        tied: leaders.next().is_some(),
    })
}
