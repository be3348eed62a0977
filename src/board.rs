use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const START_PLACEMENT: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

pub const BOARD_SIZE: usize = 8;

const RANK_DELIMITER: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    pub fn from_char(c: char) -> Option<Piece> {
        match c.to_ascii_uppercase() {
            'P' => Some(Piece::Pawn),
            'N' => Some(Piece::Knight),
            'B' => Some(Piece::Bishop),
            'R' => Some(Piece::Rook),
            'Q' => Some(Piece::Queen),
            'K' => Some(Piece::King),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn fen_char(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    pub fn from_fen_field(field: &str) -> Result<Color, FenError> {
        match field {
            "w" => Ok(Color::White),
            "b" => Ok(Color::Black),
            other => Err(FenError::InvalidColor(other.to_string())),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occupant {
    pub piece: Piece,
    pub color: Color,
}

impl Occupant {
    pub fn new(piece: Piece, color: Color) -> Self {
        Self { piece, color }
    }

    pub fn from_char(c: char) -> Option<Occupant> {
        let piece = Piece::from_char(c)?;
        let color = if c.is_ascii_lowercase() {
            Color::Black
        } else {
            Color::White
        };
        Some(Occupant { piece, color })
    }

    pub fn to_char(self) -> char {
        let c = self.piece.to_char();
        match self.color {
            Color::White => c,
            Color::Black => c.to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("position text is empty")]
    Empty,
    #[error("invalid piece: {0}")]
    InvalidPiece(char),
    #[error("placement outside the board at row {row}, col {col}")]
    OutOfBounds { row: usize, col: usize },
    #[error("invalid side to move: {0}")]
    InvalidColor(String),
}

// How the decoder treats placements that fall off the 8x8 board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    #[default]
    Lenient,
    Strict,
}

// 8x8 occupancy grid. Row 0 is the first rank written in a FEN record
// (rank 8), column 0 is the a-file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    squares: [[Option<Occupant>; BOARD_SIZE]; BOARD_SIZE],
}

impl Grid {
    pub fn empty() -> Self {
        Self {
            squares: [[None; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    pub fn new() -> Self {
        let mut grid = Self::empty();
        let back_rank = [
            Piece::Rook,
            Piece::Knight,
            Piece::Bishop,
            Piece::Queen,
            Piece::King,
            Piece::Bishop,
            Piece::Knight,
            Piece::Rook,
        ];
        for (col, &piece) in back_rank.iter().enumerate() {
            grid.squares[0][col] = Some(Occupant::new(piece, Color::Black));
            grid.squares[1][col] = Some(Occupant::new(Piece::Pawn, Color::Black));
            grid.squares[6][col] = Some(Occupant::new(Piece::Pawn, Color::White));
            grid.squares[7][col] = Some(Occupant::new(piece, Color::White));
        }
        grid
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Occupant> {
        if row < BOARD_SIZE && col < BOARD_SIZE {
            self.squares[row][col]
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, occupant: Option<Occupant>) -> bool {
        if row < BOARD_SIZE && col < BOARD_SIZE {
            self.squares[row][col] = occupant;
            true
        } else {
            false
        }
    }

    pub fn rows(&self) -> &[[Option<Occupant>; BOARD_SIZE]; BOARD_SIZE] {
        &self.squares
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, Occupant)> + '_ {
        self.squares.iter().enumerate().flat_map(|(row, squares)| {
            squares
                .iter()
                .enumerate()
                .filter_map(move |(col, sq)| sq.map(|occupant| (row, col, occupant)))
        })
    }

    pub fn from_fen(text: &str) -> Result<Self, FenError> {
        Self::from_fen_with(text, DecodeMode::Lenient)
    }

    pub fn from_fen_with(text: &str, mode: DecodeMode) -> Result<Self, FenError> {
        let placement = placement_field(text);
        if placement.is_empty() && mode == DecodeMode::Strict {
            return Err(FenError::Empty);
        }

        let mut grid = Self::empty();
        let mut row = 0usize;
        let mut col = 0usize;

        for c in placement.chars() {
            if c == RANK_DELIMITER {
                row += 1;
                col = 0;
            } else if let Some(skip) = c.to_digit(10) {
                col += skip as usize;
            } else {
                let occupant = Occupant::from_char(c).ok_or(FenError::InvalidPiece(c))?;
                if !grid.set(row, col, Some(occupant)) {
                    match mode {
                        DecodeMode::Strict => return Err(FenError::OutOfBounds { row, col }),
                        DecodeMode::Lenient => warn!(
                            "dropping '{}' placed off the board at row {}, col {}",
                            c, row, col
                        ),
                    }
                }
                col += 1;
            }
        }

        Ok(grid)
    }

    pub fn to_fen(&self) -> String {
        let mut ranks = Vec::with_capacity(BOARD_SIZE);
        for squares in &self.squares {
            let mut rank = String::new();
            let mut empty = 0;
            for sq in squares {
                match sq {
                    Some(occupant) => {
                        if empty > 0 {
                            rank.push_str(&empty.to_string());
                            empty = 0;
                        }
                        rank.push(occupant.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                rank.push_str(&empty.to_string());
            }
            ranks.push(rank);
        }
        ranks.join(RANK_DELIMITER.to_string().as_str())
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  a b c d e f g h")?;
        for (row, squares) in self.squares.iter().enumerate() {
            write!(f, "{} ", BOARD_SIZE - row)?;
            for sq in squares {
                match sq {
                    Some(occupant) => write!(f, "{} ", occupant.to_char())?,
                    None => write!(f, ". ")?,
                }
            }
            writeln!(f, "{}", BOARD_SIZE - row)?;
        }
        write!(f, "  a b c d e f g h")
    }
}

fn placement_field(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

// A grid together with the side to move. The two are only ever updated
// together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub grid: Grid,
    pub side_to_move: Color,
}

impl Position {
    pub fn new() -> Self {
        Self {
            grid: Grid::new(),
            side_to_move: Color::White,
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        Self::from_fen_with(fen, DecodeMode::Lenient)
    }

    pub fn from_fen_with(fen: &str, mode: DecodeMode) -> Result<Self, FenError> {
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::Empty)?;
        let grid = Grid::from_fen_with(placement, mode)?;
        let side_to_move = match fields.next() {
            Some(field) => Color::from_fen_field(field)?,
            None => Color::White,
        };
        Ok(Self { grid, side_to_move })
    }

    pub fn to_fen(&self) -> String {
        format!("{} {}", self.grid.to_fen(), self.side_to_move.fen_char())
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}
