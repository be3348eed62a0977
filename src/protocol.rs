use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

use crate::board::{Color, Grid};
use crate::engine::{Coordinates, Move};
use crate::session::{AppliedMove, GameId, GameSession, GameStatus, MoveRecord, SessionStore};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveResponse<'a> {
    success: bool,
    board: Vec<Vec<Option<char>>>,
    fen: &'a str,
    notation: &'a str,
    current_turn: Color,
    status: GameStatus,
    #[serde(rename = "move")]
    record: &'a MoveRecord,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSummary<'a> {
    game: GameId,
    white: &'a str,
    black: &'a str,
    status: GameStatus,
    fen: String,
    current_turn: Color,
    moves: usize,
}

impl<'a> GameSummary<'a> {
    fn of(game: &'a GameSession) -> Self {
        Self {
            game: game.id,
            white: &game.white_player,
            black: &game.black_player,
            status: game.status,
            fen: game.position.to_fen(),
            current_turn: game.position.side_to_move,
            moves: game.moves.len(),
        }
    }
}

fn board_cells(grid: &Grid) -> Vec<Vec<Option<char>>> {
    grid.rows()
        .iter()
        .map(|row| row.iter().map(|sq| sq.map(|o| o.to_char())).collect())
        .collect()
}

fn next_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}

pub struct ProtocolHandler {
    store: SessionStore,
}

impl ProtocolHandler {
    pub fn new(store: SessionStore) -> Self {
        ProtocolHandler { store }
    }

    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut reader = stdin.lock();
        let mut line = String::new();

        while reader.read_line(&mut line).context("failed to read command")? > 0 {
            let command = line.trim();
            if command == "quit" {
                break;
            }
            if !command.is_empty() {
                let response = self.handle_command(command)?;
                writeln!(stdout, "{}", response)?;
                stdout.flush()?;
            }
            line.clear();
        }
        Ok(())
    }

    pub fn handle_command(&mut self, command: &str) -> Result<String> {
        let (name, args) = next_token(command);
        match name {
            "new" => self.handle_new(args),
            "games" => self.handle_games(args),
            "move" => self.handle_move(args),
            "state" => self.handle_state(args),
            "history" => self.handle_history(args),
            "show" => self.handle_show(args),
            "result" => self.handle_result(args),
            "quit" => Ok(String::new()),
            other => error_response(format!("unknown command: {}", other)),
        }
    }

    fn handle_new(&mut self, args: &str) -> Result<String> {
        let (white, rest) = next_token(args);
        let (black, _) = next_token(rest);
        match self.store.create_game(white, black) {
            Ok(id) => {
                let game = self.store.snapshot(id)?;
                Ok(serde_json::to_string(&GameSummary::of(&game))?)
            }
            Err(err) => error_response(err.to_string()),
        }
    }

    fn handle_games(&mut self, args: &str) -> Result<String> {
        let (player, _) = next_token(args);
        let games = self.store.games_for(player);
        let summaries: Vec<GameSummary> = games.iter().map(GameSummary::of).collect();
        Ok(serde_json::to_string(&summaries)?)
    }

    fn handle_move(&mut self, args: &str) -> Result<String> {
        let (game, rest) = next_token(args);
        let (player, body) = next_token(rest);
        let id = match parse_game_id(game) {
            Some(id) => id,
            None => return error_response(format!("invalid game id: {}", game)),
        };

        let coords = if body.starts_with('{') {
            match serde_json::from_str::<Coordinates>(body) {
                Ok(coords) => coords,
                Err(err) => return error_response(format!("invalid move request: {}", err)),
            }
        } else {
            match Move::from_notation(body) {
                Ok(mv) => mv.coordinates(),
                Err(err) => return error_response(err.to_string()),
            }
        };

        match self.store.submit_move(id, player, &coords) {
            Ok(applied) => move_response(&applied),
            Err(err) => error_response(err.to_string()),
        }
    }

    fn handle_state(&mut self, args: &str) -> Result<String> {
        self.with_game(args, |game| Ok(serde_json::to_string(&GameSummary::of(game))?))
    }

    fn handle_history(&mut self, args: &str) -> Result<String> {
        self.with_game(args, |game| Ok(serde_json::to_string(&game.moves)?))
    }

    fn handle_show(&mut self, args: &str) -> Result<String> {
        self.with_game(args, |game| {
            Ok(format!(
                "{}\n{} to move",
                game.position.grid, game.position.side_to_move
            ))
        })
    }

    fn handle_result(&mut self, args: &str) -> Result<String> {
        let (game, rest) = next_token(args);
        let (code, _) = next_token(rest);
        let id = match parse_game_id(game) {
            Some(id) => id,
            None => return error_response(format!("invalid game id: {}", game)),
        };
        let status: GameStatus = match code.parse() {
            Ok(status) => status,
            Err(err) => return error_response(err),
        };
        match self
            .store
            .declare_result(id, status)
            .and_then(|()| self.store.snapshot(id))
        {
            Ok(game) => Ok(serde_json::to_string(&GameSummary::of(&game))?),
            Err(err) => error_response(err.to_string()),
        }
    }

    fn with_game<F>(&self, args: &str, render: F) -> Result<String>
    where
        F: FnOnce(&GameSession) -> Result<String>,
    {
        let (game, rest) = next_token(args);
        let (player, _) = next_token(rest);
        let id = match parse_game_id(game) {
            Some(id) => id,
            None => return error_response(format!("invalid game id: {}", game)),
        };
        match self.store.view(id, player) {
            Ok(session) => render(&session),
            Err(err) => error_response(err.to_string()),
        }
    }
}

fn parse_game_id(token: &str) -> Option<GameId> {
    token.parse().ok()
}

fn move_response(applied: &AppliedMove) -> Result<String> {
    let response = MoveResponse {
        success: true,
        board: board_cells(&applied.outcome.grid),
        fen: &applied.record.fen_after,
        notation: &applied.outcome.notation,
        current_turn: applied.outcome.next_side,
        status: applied.status,
        record: &applied.record,
    };
    Ok(serde_json::to_string(&response)?)
}

fn error_response(error: impl Into<String>) -> Result<String> {
    let error = error.into();
    warn!("request failed: {}", error);
    Ok(serde_json::to_string(&ErrorResponse {
        success: false,
        error,
    })?)
}
