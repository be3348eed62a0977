use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Color, FenError, Position};
use crate::engine::{Coordinates, MoveEngine, MoveError, MoveOutcome};

pub type GameId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    #[serde(rename = "P")]
    Pending,
    #[serde(rename = "I")]
    InProgress,
    #[serde(rename = "WW")]
    WhiteWon,
    #[serde(rename = "BW")]
    BlackWon,
    #[serde(rename = "D")]
    Draw,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::WhiteWon | GameStatus::BlackWon | GameStatus::Draw
        )
    }
}

impl FromStr for GameStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(GameStatus::Pending),
            "I" => Ok(GameStatus::InProgress),
            "WW" => Ok(GameStatus::WhiteWon),
            "BW" => Ok(GameStatus::BlackWon),
            "D" => Ok(GameStatus::Draw),
            _ => Err(format!("unknown game status: {}", s)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown game {0}")]
    UnknownGame(GameId),
    #[error("{player} is not part of game {game}")]
    NotAParticipant { game: GameId, player: String },
    #[error("game {0} is over")]
    GameOver(GameId),
    #[error("a game needs two distinct, non-empty player names")]
    InvalidPlayers,
    #[error("game {game} cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        game: GameId,
        from: GameStatus,
        to: GameStatus,
    },
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error("invalid starting position: {0}")]
    Position(#[from] FenError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub sequence: u32,
    pub player: String,
    pub side: Color,
    pub fen_after: String,
    pub notation: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: GameId,
    pub white_player: String,
    pub black_player: String,
    pub status: GameStatus,
    pub position: Position,
    pub moves: Vec<MoveRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    fn new(id: GameId, white_player: String, black_player: String, position: Position) -> Self {
        let now = Utc::now();
        Self {
            id,
            white_player,
            black_player,
            status: GameStatus::Pending,
            position,
            moves: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn side_of(&self, player: &str) -> Option<Color> {
        if player == self.white_player {
            Some(Color::White)
        } else if player == self.black_player {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.side_of(player).is_some()
    }

    // Commits an engine result: position and turn are replaced together and
    // the move record is appended with the next sequence number.
    fn commit(&mut self, player: &str, position: Position, outcome: &MoveOutcome) -> MoveRecord {
        let now = Utc::now();
        let record = MoveRecord {
            sequence: self.moves.len() as u32 + 1,
            player: player.to_string(),
            side: outcome.moved.color,
            fen_after: position.to_fen(),
            notation: outcome.notation.clone(),
            created_at: now,
        };
        self.position = position;
        self.moves.push(record.clone());
        if self.status == GameStatus::Pending {
            self.status = GameStatus::InProgress;
        }
        self.updated_at = now;
        record
    }
}

#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub outcome: MoveOutcome,
    pub record: MoveRecord,
    pub status: GameStatus,
}

pub struct SessionStore {
    engine: MoveEngine,
    start: Position,
    next_id: AtomicU64,
    games: RwLock<HashMap<GameId, Arc<Mutex<GameSession>>>>,
}

impl SessionStore {
    pub fn new(engine: MoveEngine) -> Self {
        Self::with_start(engine, Position::new())
    }

    pub fn with_start(engine: MoveEngine, start: Position) -> Self {
        Self {
            engine,
            start,
            next_id: AtomicU64::new(1),
            games: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_start_fen(engine: MoveEngine, fen: &str) -> Result<Self, SessionError> {
        let start = Position::from_fen_with(fen, engine.decode_mode())?;
        Ok(Self::with_start(engine, start))
    }

    pub fn create_game(
        &self,
        white_player: &str,
        black_player: &str,
    ) -> Result<GameId, SessionError> {
        let white_player = white_player.trim();
        let black_player = black_player.trim();
        if white_player.is_empty() || black_player.is_empty() || white_player == black_player {
            return Err(SessionError::InvalidPlayers);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = GameSession::new(
            id,
            white_player.to_string(),
            black_player.to_string(),
            self.start.clone(),
        );
        self.games
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(session)));
        info!("game {} created: {} (white) vs {} (black)", id, white_player, black_player);
        Ok(id)
    }

    fn session(&self, id: GameId) -> Result<Arc<Mutex<GameSession>>, SessionError> {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownGame(id))
    }

    fn lock(session: &Mutex<GameSession>) -> MutexGuard<'_, GameSession> {
        session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Validates and applies a move for `player`, then persists it. The
    // whole read-compute-write runs under the session lock.
    pub fn submit_move(
        &self,
        id: GameId,
        player: &str,
        coords: &Coordinates,
    ) -> Result<AppliedMove, SessionError> {
        let session = self.session(id)?;
        let mut game = Self::lock(&session);

        let side = game.side_of(player).ok_or_else(|| SessionError::NotAParticipant {
            game: id,
            player: player.to_string(),
        })?;
        if game.status.is_terminal() {
            return Err(SessionError::GameOver(id));
        }

        let (position, outcome) = match self.engine.apply_position(&game.position, side, coords) {
            Ok(applied) => applied,
            Err(err) => {
                warn!("game {}: move by {} rejected: {}", id, player, err);
                return Err(err.into());
            }
        };
        let record = game.commit(player, position, &outcome);
        info!(
            "game {}: move {} {} by {}",
            id, record.sequence, record.notation, player
        );

        Ok(AppliedMove {
            outcome,
            record,
            status: game.status,
        })
    }

    // Moves a game into a terminal status. Game-end detection is not done
    // by the engine, so this is the only way a game finishes.
    pub fn declare_result(&self, id: GameId, status: GameStatus) -> Result<(), SessionError> {
        let session = self.session(id)?;
        let mut game = Self::lock(&session);
        if !status.is_terminal() || game.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                game: id,
                from: game.status,
                to: status,
            });
        }
        game.status = status;
        game.updated_at = Utc::now();
        info!("game {} finished: {:?}", id, status);
        Ok(())
    }

    pub fn snapshot(&self, id: GameId) -> Result<GameSession, SessionError> {
        let session = self.session(id)?;
        let game = Self::lock(&session);
        Ok(game.clone())
    }

    // Same as snapshot, but only for someone seated in the game.
    pub fn view(&self, id: GameId, player: &str) -> Result<GameSession, SessionError> {
        let game = self.snapshot(id)?;
        if !game.has_player(player) {
            return Err(SessionError::NotAParticipant {
                game: id,
                player: player.to_string(),
            });
        }
        Ok(game)
    }

    pub fn history(&self, id: GameId, player: &str) -> Result<Vec<MoveRecord>, SessionError> {
        Ok(self.view(id, player)?.moves)
    }

    pub fn games_for(&self, player: &str) -> Vec<GameSession> {
        let sessions: Vec<Arc<Mutex<GameSession>>> = self
            .games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut games: Vec<GameSession> = sessions
            .iter()
            .map(|session| Self::lock(session))
            .filter(|game| game.has_player(player))
            .map(|game| (*game).clone())
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        games
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{DecodeMode, Grid, START_PLACEMENT};
    use std::thread;

    fn store() -> SessionStore {
        SessionStore::new(MoveEngine::new())
    }

    #[test]
    fn test_create_game() {
        let store = store();
        let id = store.create_game("alice", "bob").unwrap();
        let game = store.snapshot(id).unwrap();
        assert_eq!(game.status, GameStatus::Pending);
        assert_eq!(game.position, Position::new());
        assert_eq!(game.side_of("alice"), Some(Color::White));
        assert_eq!(game.side_of("bob"), Some(Color::Black));
        assert!(game.moves.is_empty());

        assert_ne!(store.create_game("alice", "carol").unwrap(), id);
        assert_eq!(store.create_game("alice", "alice"), Err(SessionError::InvalidPlayers));
        assert_eq!(store.create_game(" ", "bob"), Err(SessionError::InvalidPlayers));
    }

    #[test]
    fn test_submit_moves() {
        let store = store();
        let id = store.create_game("alice", "bob").unwrap();

        let applied = store.submit_move(id, "alice", &Coordinates::new(6, 4, 4, 4)).unwrap();
        assert_eq!(applied.record.sequence, 1);
        assert_eq!(applied.record.notation, "e2e4");
        assert_eq!(applied.record.side, Color::White);
        assert_eq!(
            applied.record.fen_after,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"
        );
        assert_eq!(applied.status, GameStatus::InProgress);

        let applied = store.submit_move(id, "bob", &Coordinates::new(1, 4, 3, 4)).unwrap();
        assert_eq!(applied.record.sequence, 2);
        assert_eq!(applied.outcome.next_side, Color::White);

        let game = store.snapshot(id).unwrap();
        assert_eq!(game.position.side_to_move, Color::White);
        assert_eq!(game.position.to_fen(), applied.record.fen_after);
        assert_eq!(game.moves.len(), 2);
    }

    #[test]
    fn test_rejections_do_not_change_state() {
        let store = store();
        let id = store.create_game("alice", "bob").unwrap();

        assert_eq!(
            store.submit_move(id, "bob", &Coordinates::new(1, 4, 3, 4)).unwrap_err(),
            SessionError::Move(MoveError::NotYourTurn)
        );
        assert_eq!(
            store.submit_move(id, "alice", &Coordinates::new(1, 4, 3, 4)).unwrap_err(),
            SessionError::Move(MoveError::WrongOwner)
        );
        assert_eq!(
            store.submit_move(id, "mallory", &Coordinates::new(6, 4, 4, 4)).unwrap_err(),
            SessionError::NotAParticipant {
                game: id,
                player: "mallory".to_string()
            }
        );
        assert_eq!(
            store.submit_move(99, "alice", &Coordinates::new(6, 4, 4, 4)).unwrap_err(),
            SessionError::UnknownGame(99)
        );

        let game = store.snapshot(id).unwrap();
        assert_eq!(game.status, GameStatus::Pending);
        assert_eq!(game.position, Position::new());
        assert!(game.moves.is_empty());
    }

    #[test]
    fn test_view_requires_participant() {
        let store = store();
        let id = store.create_game("alice", "bob").unwrap();
        store.submit_move(id, "alice", &Coordinates::new(6, 4, 4, 4)).unwrap();

        assert_eq!(store.view(id, "bob").unwrap().moves.len(), 1);
        assert_eq!(store.history(id, "alice").unwrap()[0].notation, "e2e4");

        let outsider = SessionError::NotAParticipant {
            game: id,
            player: "mallory".to_string(),
        };
        assert_eq!(store.view(id, "mallory").unwrap_err(), outsider);
        assert_eq!(store.history(id, "mallory").unwrap_err(), outsider);
        assert_eq!(store.view(42, "alice").unwrap_err(), SessionError::UnknownGame(42));
    }

    #[test]
    fn test_declare_result() {
        let store = store();
        let id = store.create_game("alice", "bob").unwrap();
        store.submit_move(id, "alice", &Coordinates::new(6, 4, 4, 4)).unwrap();

        assert_eq!(
            store.declare_result(id, GameStatus::InProgress),
            Err(SessionError::InvalidTransition {
                game: id,
                from: GameStatus::InProgress,
                to: GameStatus::InProgress
            })
        );
        store.declare_result(id, GameStatus::BlackWon).unwrap();
        assert_eq!(store.snapshot(id).unwrap().status, GameStatus::BlackWon);

        assert_eq!(
            store.submit_move(id, "bob", &Coordinates::new(1, 4, 3, 4)).unwrap_err(),
            SessionError::GameOver(id)
        );
        assert!(store.declare_result(id, GameStatus::Draw).is_err());
    }

    #[test]
    fn test_games_for() {
        let store = store();
        let first = store.create_game("alice", "bob").unwrap();
        let second = store.create_game("carol", "alice").unwrap();
        store.create_game("bob", "carol").unwrap();

        let ids: Vec<GameId> = store.games_for("alice").iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(store.games_for("dave").is_empty());
    }

    #[test]
    fn test_custom_start() {
        let store =
            SessionStore::with_start_fen(MoveEngine::new(), "8/8/8/8/8/8/8/4K2k b").unwrap();
        let id = store.create_game("alice", "bob").unwrap();
        let applied = store.submit_move(id, "bob", &Coordinates::new(7, 7, 6, 7)).unwrap();
        assert_eq!(applied.record.fen_after, "8/8/8/8/8/8/7k/4K3 w");

        let strict = MoveEngine::with_mode(DecodeMode::Strict);
        assert!(matches!(
            SessionStore::with_start_fen(strict, "8/8/8/8/8/8/8/8/K"),
            Err(SessionError::Position(FenError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_concurrent_submissions_are_serialized() {
        let store = Arc::new(store());
        let id = store.create_game("alice", "bob").unwrap();

        // every thread races for the same first move; exactly one may win
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.submit_move(id, "alice", &Coordinates::new(6, 0, 5, 0)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert_eq!(
                result.as_ref().unwrap_err(),
                &SessionError::Move(MoveError::NoPieceAtSource)
            );
        }
        let game = store.snapshot(id).unwrap();
        assert_eq!(game.moves.len(), 1);
        assert_eq!(
            Grid::from_fen(&game.moves[0].fen_after).unwrap().to_fen(),
            "rnbqkbnr/pppppppp/8/8/8/P7/1PPPPPPP/RNBQKBNR"
        );
        assert_ne!(game.position.grid.to_fen(), START_PLACEMENT);
    }
}
