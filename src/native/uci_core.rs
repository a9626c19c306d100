use std::collections::BTreeMap;

use log::debug;
use rand::{Rng, rng};
use shakmaty::{CastlingMode, Chess, Move, Position, Role};
use thiserror::Error;

use super::{Profile, tables};
use crate::{
    channel::Output,
    command::GoParams,
    util::{material_difference, piece_value, play_line},
};

const MATE_SCORE: i32 = 100_000;

/// What the caller's read loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Unknown command: '{0}'. Type help for more information.")]
    Unsupported(String),

    #[error("No such option: {0}")]
    UnknownOption(String),

    #[error("Invalid value '{value}' for option {name}")]
    InvalidOptionValue { name: String, value: String },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Illegal position: {0}")]
    IllegalPosition(String),
}

/// Per-session engine state behind a UCI front end.
#[derive(Debug)]
pub struct UciCore {
    profile: &'static Profile,
    position: Chess,
    options: BTreeMap<&'static str, String>,
    debug: bool,
    /// `bestmove` held back by `go infinite` / `go ponder`
    pending: Option<String>,
}

impl UciCore {
    pub fn new(profile: &'static Profile) -> Self {
        // make sure the process-wide tables exist before the first search
        tables();

        let options = profile
            .options
            .iter()
            .filter_map(|option| option.default_value().map(|v| (option.name, v)))
            .collect();

        Self {
            profile,
            position: Chess::default(),
            options,
            debug: false,
            pending: None,
        }
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        let option = self.profile.find_option(name)?;
        self.options.get(option.name).map(String::as_str)
    }

    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
    }

    pub fn uci(&self, out: &mut dyn Output) {
        out.emit(&format!("id name {} {}", self.profile.name, self.profile.version));
        out.emit(&format!("id author {}", self.profile.author));
        for option in self.profile.options {
            out.emit(&option.to_string());
        }
        out.emit("uciok");
    }

    pub fn is_ready(&self, out: &mut dyn Output) {
        out.emit("readyok");
    }

    pub fn set_option(&mut self, name: &str, value: Option<&str>) -> Result<(), CoreError> {
        let option = self
            .profile
            .find_option(name)
            .ok_or_else(|| CoreError::UnknownOption(name.to_string()))?;
        let accepted = option
            .accept(value)
            .ok_or_else(|| CoreError::InvalidOptionValue {
                name: option.name.to_string(),
                value: value.unwrap_or_default().to_string(),
            })?;

        debug!("{}: option {} = {accepted}", self.profile.name, option.name);
        self.options.insert(option.name, accepted);
        Ok(())
    }

    pub fn new_game(&mut self) {
        self.position = Chess::default();
        self.pending = None;
    }

    /// Replaces the position. The old one is kept if the new one is illegal.
    pub fn set_position(&mut self, fen: Option<&str>, moves: &[String]) -> Result<(), CoreError> {
        self.position =
            play_line(fen, moves).map_err(|e| CoreError::IllegalPosition(e.to_string()))?;
        Ok(())
    }

    /// One-ply search: material and piece-square gain, mate in one first,
    /// random choice among equals.
    pub fn go(&mut self, params: &GoParams, out: &mut dyn Output) {
        let tables = tables();
        let side = self.position.turn();
        let sign = if side.is_white() { 1 } else { -1 };
        let base = material_difference(&self.position) * sign;

        let candidates = self
            .position
            .legal_moves()
            .into_iter()
            .filter(|m| {
                params.searchmoves.is_empty()
                    || params
                        .searchmoves
                        .contains(&m.to_uci(CastlingMode::Standard).to_string())
            })
            .collect::<Vec<Move>>();

        let best_line = if candidates.is_empty() {
            out.emit("info depth 0 score cp 0");
            "bestmove (none)".to_string()
        } else {
            let scored = candidates
                .iter()
                .map(|m| (*m, self.move_gain(m, tables)))
                .collect::<Vec<_>>();
            let best_gain = scored.iter().map(|(_, gain)| *gain).max().unwrap_or(0);
            let best = scored
                .iter()
                .filter(|(_, gain)| *gain == best_gain)
                .map(|(m, _)| *m)
                .collect::<Vec<_>>();
            if self.debug {
                out.emit(&format!(
                    "info string {} candidates, {} tied at gain {best_gain}",
                    candidates.len(),
                    best.len()
                ));
            }
            let chosen = best[rng().random_range(0..best.len())];
            let uci = chosen.to_uci(CastlingMode::Standard);

            let score = if best_gain >= MATE_SCORE {
                "mate 1".to_string()
            } else {
                format!("cp {}", base + best_gain)
            };
            out.emit(&format!(
                "info depth 1 seldepth 1 multipv 1 score {score} nodes {} nps 0 time 0 pv {uci}",
                candidates.len()
            ));
            format!("bestmove {uci}")
        };

        if params.infinite || params.ponder {
            self.pending = Some(best_line);
        } else {
            out.emit(&best_line);
        }
    }

    fn move_gain(&self, m: &Move, tables: &super::Tables) -> i32 {
        let mut after = self.position.clone();
        after.play_unchecked(*m);
        if after.is_checkmate() {
            return MATE_SCORE;
        }

        let side = self.position.turn();
        let capture = m.capture().map_or(0, piece_value);
        let promotion = m
            .promotion()
            .map_or(0, |role| piece_value(role) - piece_value(Role::Pawn));
        let placement = match (m.is_castle(), m.from()) {
            (true, _) => 30,
            (false, Some(from)) => {
                tables.psqt(m.role(), side, m.to()) - tables.psqt(m.role(), side, from)
            }
            (false, None) => 0,
        };

        capture + promotion + placement
    }

    /// Ends a deferred search, releasing its `bestmove`.
    pub fn stop(&mut self, out: &mut dyn Output) {
        if let Some(line) = self.pending.take() {
            out.emit(&line);
        }
    }

    pub fn ponder_hit(&mut self, out: &mut dyn Output) {
        self.stop(out);
    }

    /// Runs one line of UCI text.
    pub fn execute(&mut self, line: &str, out: &mut dyn Output) -> Result<Flow, CoreError> {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        let Some((&name, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };

        match name {
            "uci" => self.uci(out),
            "isready" => self.is_ready(out),
            "debug" => self.set_debug(args.first() != Some(&"off")),
            "setoption" => {
                let (name, value) = split_setoption(args);
                if name.is_empty() {
                    return Err(CoreError::MissingArgument("name"));
                }
                self.set_option(&name, value.as_deref())?;
            }
            "ucinewgame" => self.new_game(),
            "position" => {
                let (fen, moves) = split_position(args)?;
                self.set_position(fen.as_deref(), &moves)?;
            }
            "go" => self.go(&GoParams::parse(args), out),
            "stop" => self.stop(out),
            "ponderhit" => self.ponder_hit(out),
            "quit" => {
                self.stop(out);
                return Ok(Flow::Quit);
            }
            _ => return Err(CoreError::Unsupported(line.trim().to_string())),
        }

        Ok(Flow::Continue)
    }
}

/// `name <id...> [value <x...>]`, both parts may contain spaces.
fn split_setoption(args: &[&str]) -> (String, Option<String>) {
    let name_start = args.iter().position(|t| *t == "name").map_or(0, |i| i + 1);
    let value_at = args.iter().position(|t| *t == "value");
    let name_end = value_at.unwrap_or(args.len()).max(name_start);

    let name = args[name_start..name_end].join(" ");
    let value = value_at.map(|i| args[i + 1..].join(" "));
    (name, value)
}

/// `startpos | fen <fen...>` followed by optional `moves <m...>`.
fn split_position(args: &[&str]) -> Result<(Option<String>, Vec<String>), CoreError> {
    let moves_at = args.iter().position(|t| *t == "moves");
    let setup = &args[..moves_at.unwrap_or(args.len())];
    let moves = moves_at
        .map(|i| args[i + 1..].iter().map(|m| m.to_string()).collect())
        .unwrap_or_default();

    match setup.split_first() {
        Some((&"startpos", _)) => Ok((None, moves)),
        Some((&"fen", fen)) if !fen.is_empty() => Ok((Some(fen.join(" ")), moves)),
        _ => Err(CoreError::MissingArgument("startpos or fen")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::STOCKFISH;

    impl Output for Vec<String> {
        fn emit(&mut self, line: &str) {
            self.push(line.to_string());
        }
    }

    fn run(core: &mut UciCore, line: &str) -> Vec<String> {
        let mut out = Vec::new();
        core.execute(line, &mut out).unwrap();
        out
    }

    #[test]
    fn identifies_itself() {
        let mut core = UciCore::new(&STOCKFISH);
        let out = run(&mut core, "uci");
        assert_eq!(out.first().map(String::as_str), Some("id name Stockfish 16.1"));
        assert_eq!(out.last().map(String::as_str), Some("uciok"));
        assert!(out.iter().any(|l| l.starts_with("option name Threads")));

        assert_eq!(run(&mut core, "isready"), vec!["readyok"]);
    }

    #[test]
    fn options_with_spaces() {
        let mut core = UciCore::new(&STOCKFISH);
        run(&mut core, "setoption name Skill Level value 3");
        assert_eq!(core.option("skill level"), Some("3"));

        let mut out = Vec::new();
        assert_eq!(
            core.execute("setoption name Bogus value 1", &mut out),
            Err(CoreError::UnknownOption("Bogus".to_string()))
        );
        assert_eq!(
            core.execute("setoption value 1", &mut out),
            Err(CoreError::MissingArgument("name"))
        );
    }

    #[test]
    fn finds_mate_in_one() {
        let mut core = UciCore::new(&STOCKFISH);
        // back rank mate with Ra8#
        run(&mut core, "position fen 6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let out = run(&mut core, "go depth 1");
        assert!(out[0].contains("score mate 1"), "{out:?}");
        assert_eq!(out[1], "bestmove a1a8");
    }

    #[test]
    fn prefers_winning_material() {
        let mut core = UciCore::new(&STOCKFISH);
        run(&mut core, "position startpos moves e2e4 d7d5");
        let out = run(&mut core, "go searchmoves e4d5 a2a3");
        assert_eq!(out.last().map(String::as_str), Some("bestmove e4d5"));
    }

    #[test]
    fn infinite_search_waits_for_stop() {
        let mut core = UciCore::new(&STOCKFISH);
        let out = run(&mut core, "go infinite");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("info depth 1"));

        let out = run(&mut core, "stop");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("bestmove "));
        assert!(run(&mut core, "stop").is_empty());
    }

    #[test]
    fn no_moves_means_none() {
        let mut core = UciCore::new(&STOCKFISH);
        run(&mut core, "position fen 7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let out = run(&mut core, "go");
        assert_eq!(out.last().map(String::as_str), Some("bestmove (none)"));
    }

    #[test]
    fn illegal_position_keeps_previous() {
        let mut core = UciCore::new(&STOCKFISH);
        run(&mut core, "position startpos moves e2e4");
        let before = core.position().board().clone();

        let mut out = Vec::new();
        let result = core.execute("position startpos moves e2e4 e2e4", &mut out);
        assert!(matches!(result, Err(CoreError::IllegalPosition(_))));
        assert_eq!(core.position().board(), &before);
    }

    #[test]
    fn unknown_and_quit() {
        let mut core = UciCore::new(&STOCKFISH);
        let mut out = Vec::new();
        assert_eq!(
            core.execute("  xyzzy  ", &mut out),
            Err(CoreError::Unsupported("xyzzy".to_string()))
        );
        assert_eq!(core.execute("", &mut out), Ok(Flow::Continue));
        assert_eq!(core.execute("quit", &mut out), Ok(Flow::Quit));
    }

    #[test]
    fn debug_mode_explains_the_choice() {
        let mut core = UciCore::new(&STOCKFISH);
        run(&mut core, "position fen 7k/8/8/8/8/8/6q1/7K w - - 0 1");
        let quiet = run(&mut core, "go depth 1");
        assert!(!quiet.iter().any(|l| l.starts_with("info string")));

        run(&mut core, "debug on");
        let verbose = run(&mut core, "go depth 1");
        assert!(verbose[0].starts_with("info string 1 candidates, 1 tied"), "{verbose:?}");
        assert_eq!(verbose.last().map(String::as_str), Some("bestmove h1g2"));

        run(&mut core, "debug off");
        assert!(!run(&mut core, "go depth 1").iter().any(|l| l.starts_with("info string")));
    }
}
