//! Typed UCI commands, see <https://backscattering.de/chess/uci/2006-04.txt>.

use std::{fmt, str::FromStr};

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// `debug [ on | off ]`
    Debug(bool),
    Uci,
    IsReady,
    /// `setoption name <id> [value <x>]`
    SetOption { id: String, value: Option<String> },
    UciNewGame,
    /// `position [fen <fenstring> | startpos] moves <move1> ... <movei>`
    Position {
        position: PositionString,
        moves: Vec<String>,
    },
    Go(GoParams),
    Stop,
    PonderHit,
    Quit,
}

impl EngineCommand {
    /// Commands an engine accepts before its handshake completed.
    pub fn is_handshake(&self) -> bool {
        matches!(self, EngineCommand::Uci | EngineCommand::IsReady)
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Debug(on) => write!(f, "debug {}", if *on { "on" } else { "off" }),
            EngineCommand::Uci => f.write_str("uci"),
            EngineCommand::IsReady => f.write_str("isready"),
            EngineCommand::SetOption { id, value } => {
                write!(f, "setoption name {id}")?;
                if let Some(value) = value {
                    write!(f, " value {value}")?;
                }
                Ok(())
            }
            EngineCommand::UciNewGame => f.write_str("ucinewgame"),
            EngineCommand::Position { position, moves } => {
                write!(f, "position {position}")?;
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            EngineCommand::Go(params) => write!(f, "go{params}"),
            EngineCommand::Stop => f.write_str("stop"),
            EngineCommand::PonderHit => f.write_str("ponderhit"),
            EngineCommand::Quit => f.write_str("quit"),
        }
    }
}

/// Position argument of the `position` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionString {
    Fen(String),
    StartPos,
}

impl fmt::Display for PositionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionString::Fen(fen) => write!(f, "fen {fen}"),
            PositionString::StartPos => f.write_str("startpos"),
        }
    }
}

impl FromStr for PositionString {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s.split_whitespace().collect::<Vec<_>>();
        match tokens.as_slice() {
            ["startpos"] => Ok(PositionString::StartPos),
            // a FEN has exactly six fields
            ["fen", fields @ ..] if fields.len() == 6 => Ok(PositionString::Fen(fields.join(" "))),
            _ => Err(ParseError::PositionString(s.to_string())),
        }
    }
}

/// Arguments of the `go` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoParams {
    pub searchmoves: Vec<String>,
    pub ponder: bool,
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u64>,
    pub depth: Option<u64>,
    pub nodes: Option<u64>,
    pub mate: Option<u64>,
    pub movetime: Option<u64>,
    pub infinite: bool,
}

const GO_KEYWORDS: [&str; 12] = [
    "searchmoves",
    "ponder",
    "wtime",
    "btime",
    "winc",
    "binc",
    "movestogo",
    "depth",
    "nodes",
    "mate",
    "movetime",
    "infinite",
];

impl GoParams {
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Default::default()
        }
    }

    pub fn depth(depth: u64) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    /// Reads the tokens following `go`. Unknown tokens and unparsable numbers
    /// are skipped, the way engines tolerate sloppy GUIs.
    pub fn parse(tokens: &[&str]) -> Self {
        let mut params = GoParams::default();
        let mut iter = tokens.iter().copied().peekable();

        while let Some(token) = iter.next() {
            match token {
                "ponder" => params.ponder = true,
                "infinite" => params.infinite = true,
                "wtime" => params.wtime = next_number(&mut iter),
                "btime" => params.btime = next_number(&mut iter),
                "winc" => params.winc = next_number(&mut iter),
                "binc" => params.binc = next_number(&mut iter),
                "movestogo" => params.movestogo = next_number(&mut iter),
                "depth" => params.depth = next_number(&mut iter),
                "nodes" => params.nodes = next_number(&mut iter),
                "mate" => params.mate = next_number(&mut iter),
                "movetime" => params.movetime = next_number(&mut iter),
                "searchmoves" => {
                    while let Some(mv) = iter.next_if(|t| !GO_KEYWORDS.contains(t)) {
                        params.searchmoves.push(mv.to_string());
                    }
                }
                _ => {}
            }
        }

        params
    }
}

fn next_number<'a>(iter: &mut impl Iterator<Item = &'a str>) -> Option<u64> {
    iter.next().and_then(|v| v.parse().ok())
}

impl fmt::Display for GoParams {
    /// Renders the arguments with a leading space each, so `go` + params is
    /// a valid command.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.searchmoves.is_empty() {
            write!(f, " searchmoves {}", self.searchmoves.join(" "))?;
        }
        if self.ponder {
            f.write_str(" ponder")?;
        }
        let numbers = [
            ("wtime", self.wtime),
            ("btime", self.btime),
            ("winc", self.winc),
            ("binc", self.binc),
            ("movestogo", self.movestogo),
            ("depth", self.depth),
            ("nodes", self.nodes),
            ("mate", self.mate),
            ("movetime", self.movetime),
        ];
        for (name, value) in numbers {
            if let Some(value) = value {
                write!(f, " {name} {value}")?;
            }
        }
        if self.infinite {
            f.write_str(" infinite")?;
        }
        Ok(())
    }
}
