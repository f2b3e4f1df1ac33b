//! 3x3 board, marks and line evaluation.

use serde::{Deserialize, Serialize};

pub const CELLS: usize = 9;

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
pub const TRIPLES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Mark assigned by seat order: seat 0 plays X, seat 1 plays O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn for_seat(seat: usize) -> Self {
        if seat == 0 { Mark::X } else { Mark::O }
    }
}

/// A single board cell. Serializes as `""`, `"X"` or `"O"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    #[serde(rename = "")]
    Empty,
    X,
    O,
}

impl From<Mark> for Cell {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::X => Cell::X,
            Mark::O => Cell::O,
        }
    }
}

impl Cell {
    pub fn is_empty(&self) -> bool { matches!(self, Cell::Empty) }
}

/// Result of evaluating the board after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Line([usize; 3]),
    Full,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Cell; CELLS],
}

impl Board {
    pub fn new() -> Self { Self::default() }

    pub fn cells(&self) -> &[Cell; CELLS] { &self.cells }

    pub fn get(&self, position: usize) -> Option<Cell> {
        self.cells.get(position).copied()
    }

    /// Whether `position` is on the board and still empty.
    pub fn is_playable(&self, position: usize) -> bool {
        self.get(position).map(|c| c.is_empty()).unwrap_or(false)
    }

    /// Writes `mark` at `position`. Callers must check [`Board::is_playable`] first;
    /// an occupied or out-of-range cell is left untouched and `false` is returned.
    pub fn place(&mut self, position: usize, mark: Mark) -> bool {
        if !self.is_playable(position) {
            return false;
        }
        self.cells[position] = mark.into();
        true
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }

    pub fn winning_line(&self) -> Option<[usize; 3]> {
        TRIPLES.iter().copied().find(|&[a, b, c]| {
            let first = self.cells[a];
            !first.is_empty() && first == self.cells[b] && first == self.cells[c]
        })
    }

    /// A completed line is reported even when the same move also fills the board.
    pub fn verdict(&self) -> Verdict {
        if let Some(line) = self.winning_line() {
            Verdict::Line(line)
        } else if self.is_full() {
            Verdict::Full
        } else {
            Verdict::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(marks: &str) -> Board {
        let mut board = Board::new();
        for (i, ch) in marks.chars().enumerate() {
            match ch {
                'X' => { board.place(i, Mark::X); }
                'O' => { board.place(i, Mark::O); }
                _ => {}
            }
        }
        board
    }

    #[test]
    fn seats_map_to_marks() {
        assert_eq!(Mark::for_seat(0), Mark::X);
        assert_eq!(Mark::for_seat(1), Mark::O);
    }

    #[test]
    fn every_triple_wins() {
        for line in TRIPLES {
            let mut board = Board::new();
            for i in line { board.place(i, Mark::O); }
            assert_eq!(board.verdict(), Verdict::Line(line));
        }
    }

    #[test]
    fn mixed_line_is_not_a_win() {
        let board = board_from("XXO......");
        assert_eq!(board.verdict(), Verdict::Open);
    }

    #[test]
    fn full_board_without_line_is_full() {
        // X O X / X O O / O X X
        let board = board_from("XOXXOOOXX");
        assert_eq!(board.verdict(), Verdict::Full);
    }

    #[test]
    fn line_beats_full_board() {
        // X X X / O O X / X O O
        let board = board_from("XXXOOXXOO");
        assert!(board.is_full());
        assert_eq!(board.verdict(), Verdict::Line([0, 1, 2]));
    }

    #[test]
    fn place_rejects_occupied_and_out_of_range() {
        let mut board = Board::new();
        assert!(board.place(4, Mark::X));
        assert!(!board.place(4, Mark::O));
        assert!(!board.place(9, Mark::O));
        assert_eq!(board.get(4), Some(Cell::X));
        assert_eq!(board.get(9), None);
    }

    #[test]
    fn cells_serialize_as_strings() {
        let json = serde_json::to_string(&[Cell::Empty, Cell::X, Cell::O]).unwrap();
        assert_eq!(json, r#"["","X","O"]"#);
    }
}
