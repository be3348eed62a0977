pub mod board;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod session;

pub use board::{Color, DecodeMode, FenError, Grid, Occupant, Piece, Position};
pub use engine::{Coordinates, Move, MoveEngine, MoveError, MoveOutcome};
pub use session::{GameStatus, MoveRecord, SessionError, SessionStore};
