use std::fmt;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;
use thiserror::Error;

use crate::board::{Color, DecodeMode, FenError, Grid, Occupant, Position, BOARD_SIZE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("coordinates missing or outside 0..=7")]
    InvalidCoordinates,
    #[error("no piece on the source square")]
    NoPieceAtSource,
    #[error("the piece on the source square belongs to the other side")]
    WrongOwner,
    #[error("not your turn")]
    NotYourTurn,
    #[error("malformed position: {0}")]
    MalformedPosition(#[from] FenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    pub row: usize,
    pub col: usize,
}

impl Square {
    pub fn new(row: i64, col: i64) -> Option<Square> {
        let size = BOARD_SIZE as i64;
        if (0..size).contains(&row) && (0..size).contains(&col) {
            Some(Square {
                row: row as usize,
                col: col as usize,
            })
        } else {
            None
        }
    }

    pub fn from_algebraic(name: &str) -> Option<Square> {
        let mut chars = name.chars();
        let file = chars.next()?;
        let rank = chars.next()?;
        if chars.next().is_some() || !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return None;
        }
        let col = file as i64 - 'a' as i64;
        let row = BOARD_SIZE as i64 - (rank as i64 - '0' as i64);
        Square::new(row, col)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let file = (b'a' + self.col as u8) as char;
        write!(f, "{}{}", file, BOARD_SIZE - self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    #[serde(default, deserialize_with = "board_coordinate")]
    pub from_row: Option<i64>,
    #[serde(default, deserialize_with = "board_coordinate")]
    pub from_col: Option<i64>,
    #[serde(default, deserialize_with = "board_coordinate")]
    pub to_row: Option<i64>,
    #[serde(default, deserialize_with = "board_coordinate")]
    pub to_col: Option<i64>,
}

// Any number is accepted here; one that is not an i64 (too large, fractional)
// is treated as missing so it fails as InvalidCoordinates.
fn board_coordinate<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number: Option<Number> = Option::deserialize(deserializer)?;
    Ok(number.and_then(|n| n.as_i64()))
}

impl Coordinates {
    pub fn new(from_row: i64, from_col: i64, to_row: i64, to_col: i64) -> Self {
        Self {
            from_row: Some(from_row),
            from_col: Some(from_col),
            to_row: Some(to_row),
            to_col: Some(to_col),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
}

impl Move {
    pub fn from_coordinates(coords: &Coordinates) -> Result<Self, MoveError> {
        let square = |row: Option<i64>, col: Option<i64>| Square::new(row?, col?);
        let from = square(coords.from_row, coords.from_col).ok_or(MoveError::InvalidCoordinates)?;
        let to = square(coords.to_row, coords.to_col).ok_or(MoveError::InvalidCoordinates)?;
        Ok(Self { from, to })
    }

    pub fn from_notation(notation: &str) -> Result<Self, MoveError> {
        let notation = notation.trim();
        if notation.len() != 4 || !notation.is_ascii() {
            return Err(MoveError::InvalidCoordinates);
        }
        let from = Square::from_algebraic(&notation[..2]).ok_or(MoveError::InvalidCoordinates)?;
        let to = Square::from_algebraic(&notation[2..]).ok_or(MoveError::InvalidCoordinates)?;
        Ok(Self { from, to })
    }

    pub fn notation(&self) -> String {
        format!("{}{}", self.from, self.to)
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(
            self.from.row as i64,
            self.from.col as i64,
            self.to.row as i64,
            self.to.col as i64,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub grid: Grid,
    pub fen: String,
    pub notation: String,
    pub next_side: Color,
    pub moved: Occupant,
}

// Applies moves after checking coordinates, presence, ownership and turn
// order. Piece movement rules, check and captures are not inspected: the
// mover simply replaces whatever stands on the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveEngine {
    decode_mode: DecodeMode,
}

impl MoveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(decode_mode: DecodeMode) -> Self {
        Self { decode_mode }
    }

    pub fn decode_mode(&self) -> DecodeMode {
        self.decode_mode
    }

    pub fn apply(
        &self,
        grid: &Grid,
        side: Color,
        side_to_move: Color,
        coords: &Coordinates,
    ) -> Result<MoveOutcome, MoveError> {
        let mv = Move::from_coordinates(coords)?;
        let moved = grid
            .get(mv.from.row, mv.from.col)
            .ok_or(MoveError::NoPieceAtSource)?;
        if moved.color != side {
            return Err(MoveError::WrongOwner);
        }
        if side != side_to_move {
            return Err(MoveError::NotYourTurn);
        }

        let mut next = grid.clone();
        next.set(mv.from.row, mv.from.col, None);
        next.set(mv.to.row, mv.to.col, Some(moved));

        let notation = mv.notation();
        debug!("{} plays {} ({:?})", side, notation, moved.piece);

        Ok(MoveOutcome {
            fen: next.to_fen(),
            grid: next,
            notation,
            next_side: side.opposite(),
            moved,
        })
    }

    pub fn apply_fen(
        &self,
        fen: &str,
        side: Color,
        side_to_move: Color,
        coords: &Coordinates,
    ) -> Result<MoveOutcome, MoveError> {
        let grid = Grid::from_fen_with(fen, self.decode_mode)?;
        self.apply(&grid, side, side_to_move, coords)
    }

    pub fn apply_position(
        &self,
        position: &Position,
        side: Color,
        coords: &Coordinates,
    ) -> Result<(Position, MoveOutcome), MoveError> {
        let outcome = self.apply(&position.grid, side, position.side_to_move, coords)?;
        let next = Position {
            grid: outcome.grid.clone(),
            side_to_move: outcome.next_side,
        };
        Ok((next, outcome))
    }
}
