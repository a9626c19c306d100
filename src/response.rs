use std::fmt;

/// A parsed line of engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    /// `id name <x>` / `id author <x>`
    Id(Id),
    UciOk,
    ReadyOk,
    /// `bestmove <move> [ponder <move>]`
    BestMove { mv: String, ponder: Option<String> },
    Info(Info),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id {
    Name(String),
    Author(String),
}

/// Arguments of an `info` line. Unset fields were absent or unparsable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Info {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time: Option<u64>,
    pub nodes: Option<u64>,
    pub pv: Option<Vec<String>>,
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub currmove: Option<String>,
    pub currmovenumber: Option<u32>,
    pub hashfull: Option<f64>,
    pub nps: Option<u64>,
    pub tbhits: Option<u64>,
    pub sbhits: Option<u64>,
    pub cpuload: Option<u32>,
    pub string: Option<String>,
    pub refutation: Option<Vec<String>>,
    pub currline: Option<CurrLine>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    /// Centipawns from the engine's point of view.
    pub cp: Option<f64>,
    /// Mate in moves, negative when the engine is getting mated.
    pub mate: Option<i32>,
    pub lowerbound: bool,
    pub upperbound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrLine {
    pub cpunr: Option<u32>,
    pub moves: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Argument {
    Depth,
    Seldepth,
    Time,
    Nodes,
    Pv,
    Multipv,
    Score,
    Currmove,
    Currmovenumber,
    Hashfull,
    Nps,
    Tbhits,
    Sbhits,
    Cpuload,
    String,
    Refutation,
    Currline,
}

/// How the tokens after an argument are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    /// exactly one token
    Single,
    /// tokens up to the next argument
    Multi,
    /// the rest of the line
    Text,
    Score,
    CurrLine,
}

impl Argument {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "depth" => Self::Depth,
            "seldepth" => Self::Seldepth,
            "time" => Self::Time,
            "nodes" => Self::Nodes,
            "pv" => Self::Pv,
            "multipv" => Self::Multipv,
            "score" => Self::Score,
            "currmove" => Self::Currmove,
            "currmovenumber" => Self::Currmovenumber,
            "hashfull" => Self::Hashfull,
            "nps" => Self::Nps,
            "tbhits" => Self::Tbhits,
            "sbhits" => Self::Sbhits,
            "cpuload" => Self::Cpuload,
            "string" => Self::String,
            "refutation" => Self::Refutation,
            "currline" => Self::Currline,
            _ => return None,
        })
    }

    fn kind(self) -> ArgKind {
        match self {
            Self::Pv | Self::Refutation => ArgKind::Multi,
            Self::String => ArgKind::Text,
            Self::Score => ArgKind::Score,
            Self::Currline => ArgKind::CurrLine,
            _ => ArgKind::Single,
        }
    }
}

impl EngineResponse {
    /// Parses one response line. Newlines count as whitespace; unknown
    /// commands yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        match tokens.next()? {
            "id" => {
                let kind = tokens.next()?;
                let value = tokens.collect::<Vec<_>>().join(" ");
                match kind {
                    "name" => Some(Self::Id(Id::Name(value))),
                    "author" => Some(Self::Id(Id::Author(value))),
                    _ => None,
                }
            }
            "uciok" => Some(Self::UciOk),
            "readyok" => Some(Self::ReadyOk),
            "bestmove" => {
                let mv = tokens.next()?.to_string();
                let ponder = match tokens.next() {
                    Some("ponder") => tokens.next().map(String::from),
                    _ => None,
                };
                Some(Self::BestMove { mv, ponder })
            }
            "info" => Some(Self::Info(Info::parse(tokens))),
            _ => None,
        }
    }
}

/// Values still being collected for a multi-token argument.
#[derive(Default)]
struct Pending {
    moves: Vec<String>,
    score: Option<Score>,
    score_key: Option<&'static str>,
    currline: Option<CurrLine>,
}

impl Info {
    fn parse<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Self {
        let mut info = Info::default();
        let mut active: Option<Argument> = None;
        let mut pending = Pending::default();

        while let Some(token) = tokens.next() {
            if let Some(argument) = Argument::from_token(token) {
                if let Some(previous) = active {
                    info.finish(previous, &mut pending);
                }
                active = Some(argument);
                continue;
            }
            let Some(argument) = active else {
                continue;
            };

            match argument.kind() {
                ArgKind::Single => {
                    info.set_single(argument, token);
                    active = None;
                }
                ArgKind::Multi => pending.moves.push(token.to_string()),
                ArgKind::Text => {
                    let rest = std::iter::once(token)
                        .chain(tokens.by_ref())
                        .collect::<Vec<_>>();
                    info.string = Some(rest.join(" "));
                    active = None;
                }
                ArgKind::Score => {
                    let score = pending.score.get_or_insert_with(Score::default);
                    match token {
                        "lowerbound" => score.lowerbound = true,
                        "upperbound" => score.upperbound = true,
                        "cp" => pending.score_key = Some("cp"),
                        "mate" => pending.score_key = Some("mate"),
                        value => match pending.score_key.take() {
                            Some("cp") => score.cp = value.parse().ok(),
                            Some("mate") => score.mate = value.parse().ok(),
                            _ => {}
                        },
                    }
                }
                ArgKind::CurrLine => match pending.currline.as_mut() {
                    Some(line) => line.moves.push(token.to_string()),
                    None => {
                        let cpunr = token.parse().ok();
                        let moves = match cpunr {
                            Some(_) => Vec::new(),
                            None => vec![token.to_string()],
                        };
                        pending.currline = Some(CurrLine { cpunr, moves });
                    }
                },
            }
        }

        if let Some(argument) = active {
            info.finish(argument, &mut pending);
        }
        info
    }

    fn set_single(&mut self, argument: Argument, token: &str) {
        match argument {
            Argument::Depth => self.depth = token.parse().ok(),
            Argument::Seldepth => self.seldepth = token.parse().ok(),
            Argument::Time => self.time = token.parse().ok(),
            Argument::Nodes => self.nodes = token.parse().ok(),
            Argument::Multipv => self.multipv = token.parse().ok(),
            Argument::Currmove => self.currmove = Some(token.to_string()),
            Argument::Currmovenumber => self.currmovenumber = token.parse().ok(),
            Argument::Hashfull => self.hashfull = token.parse().ok(),
            Argument::Nps => self.nps = token.parse().ok(),
            Argument::Tbhits => self.tbhits = token.parse().ok(),
            Argument::Sbhits => self.sbhits = token.parse().ok(),
            Argument::Cpuload => self.cpuload = token.parse().ok(),
            _ => {}
        }
    }

    /// Stores whatever `argument` collected.
    fn finish(&mut self, argument: Argument, pending: &mut Pending) {
        let moves = std::mem::take(&mut pending.moves);
        match argument {
            Argument::Pv if !moves.is_empty() => self.pv = Some(moves),
            Argument::Refutation if !moves.is_empty() => self.refutation = Some(moves),
            Argument::Score => {
                pending.score_key = None;
                if let Some(score) = pending.score.take() {
                    self.score = Some(score);
                }
            }
            Argument::Currline => {
                if let Some(line) = pending.currline.take() {
                    self.currline = Some(line);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for EngineResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineResponse::Id(Id::Name(name)) => write!(f, "id name {name}"),
            EngineResponse::Id(Id::Author(author)) => write!(f, "id author {author}"),
            EngineResponse::UciOk => write!(f, "uciok"),
            EngineResponse::ReadyOk => write!(f, "readyok"),
            EngineResponse::BestMove { mv, ponder } => {
                write!(f, "bestmove {mv}")?;
                if let Some(ponder) = ponder {
                    write!(f, " ponder {ponder}")?;
                }
                Ok(())
            }
            EngineResponse::Info(info) => write!(f, "info{info}"),
        }
    }
}

/// Arguments in protocol order, each with a leading space. `string` comes
/// last since it swallows the rest of the line.
impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(f: &mut fmt::Formatter<'_>, name: &str, value: Option<impl fmt::Display>) -> fmt::Result {
            match value {
                Some(value) => write!(f, " {name} {value}"),
                None => Ok(()),
            }
        }

        field(f, "depth", self.depth)?;
        field(f, "seldepth", self.seldepth)?;
        field(f, "time", self.time)?;
        field(f, "nodes", self.nodes)?;
        field(f, "multipv", self.multipv)?;
        if let Some(score) = &self.score {
            write!(f, " score{score}")?;
        }
        field(f, "currmove", self.currmove.as_ref())?;
        field(f, "currmovenumber", self.currmovenumber)?;
        field(f, "hashfull", self.hashfull)?;
        field(f, "nps", self.nps)?;
        field(f, "tbhits", self.tbhits)?;
        field(f, "sbhits", self.sbhits)?;
        field(f, "cpuload", self.cpuload)?;
        field(f, "pv", self.pv.as_ref().map(|pv| pv.join(" ")))?;
        field(f, "refutation", self.refutation.as_ref().map(|r| r.join(" ")))?;
        if let Some(line) = &self.currline {
            write!(f, " currline")?;
            if let Some(cpunr) = line.cpunr {
                write!(f, " {cpunr}")?;
            }
            for mv in &line.moves {
                write!(f, " {mv}")?;
            }
        }
        field(f, "string", self.string.as_ref())
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cp) = self.cp {
            write!(f, " cp {cp}")?;
        }
        if let Some(mate) = self.mate {
            write!(f, " mate {mate}")?;
        }
        if self.lowerbound {
            write!(f, " lowerbound")?;
        }
        if self.upperbound {
            write!(f, " upperbound")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(line: &str) -> Info {
        match EngineResponse::parse(line) {
            Some(EngineResponse::Info(info)) => info,
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn invalid_responses() {
        assert_eq!(EngineResponse::parse("invalidcommand test"), None);
        assert_eq!(EngineResponse::parse(""), None);
        assert_eq!(EngineResponse::parse("id invalid input"), None);
        assert_eq!(EngineResponse::parse("bestmove"), None);
    }

    #[test]
    fn id_and_handshake() {
        assert_eq!(
            EngineResponse::parse("id name Engine Name"),
            Some(EngineResponse::Id(Id::Name("Engine Name".to_string())))
        );
        assert_eq!(
            EngineResponse::parse("id author Engine Author"),
            Some(EngineResponse::Id(Id::Author("Engine Author".to_string())))
        );
        assert_eq!(EngineResponse::parse("uciok"), Some(EngineResponse::UciOk));
        assert_eq!(EngineResponse::parse("readyok\n"), Some(EngineResponse::ReadyOk));
    }

    #[test]
    fn bestmove_across_newlines() {
        let expected = Some(EngineResponse::BestMove {
            mv: "c8d7".to_string(),
            ponder: Some("e1c1".to_string()),
        });
        assert_eq!(EngineResponse::parse("bestmove\nc8d7 ponder e1c1"), expected);
        assert_eq!(EngineResponse::parse("bestmove \nc8d7 ponder e1c1"), expected);
        assert_eq!(
            EngineResponse::parse("bestmove e2e4"),
            Some(EngineResponse::BestMove {
                mv: "e2e4".to_string(),
                ponder: None
            })
        );
    }

    #[test]
    fn info_with_every_argument_kind() {
        let parsed = info(
            "info depth 1 seldepth 0 score cp 8.37 mate -4 upperbound pv e2e4 e7e5 g1f3 nodes 10 \
             currline 4 d2d4 g8f6 c2c4 e7e6 nps 8 string This is a test string with real tokens \
             inserted such as pv and nodes and score lowerbound.",
        );

        let expected = Info {
            depth: Some(1),
            seldepth: Some(0),
            nodes: Some(10),
            pv: Some(vec!["e2e4".into(), "e7e5".into(), "g1f3".into()]),
            score: Some(Score {
                cp: Some(8.37),
                mate: Some(-4),
                lowerbound: false,
                upperbound: true,
            }),
            nps: Some(8),
            string: Some(
                "This is a test string with real tokens inserted such as pv and nodes and score \
                 lowerbound."
                    .to_string(),
            ),
            currline: Some(CurrLine {
                cpunr: Some(4),
                moves: vec!["d2d4".into(), "g8f6".into(), "c2c4".into(), "e7e6".into()],
            }),
            ..Info::default()
        };
        assert_eq!(parsed, expected);
    }

    #[test]
    fn info_extra_arguments() {
        let parsed = info(
            "info time 1 multipv 2 currmove e2e4 currmovenumber 3 hashfull 4.56 tbhits 7 sbhits 8 \
             cpuload 9 refutation c7c5 d2d4",
        );
        let expected = Info {
            time: Some(1),
            multipv: Some(2),
            currmove: Some("e2e4".to_string()),
            currmovenumber: Some(3),
            hashfull: Some(4.56),
            tbhits: Some(7),
            sbhits: Some(8),
            cpuload: Some(9),
            refutation: Some(vec!["c7c5".into(), "d2d4".into()]),
            ..Info::default()
        };
        assert_eq!(parsed, expected);
    }

    #[test]
    fn unknown_score_kind_leaves_empty_score() {
        assert_eq!(
            info("info score test 5"),
            Info {
                score: Some(Score::default()),
                ..Info::default()
            }
        );
    }

    #[test]
    fn displays_wire_format() {
        let line = "info depth 1 seldepth 1 multipv 1 score cp 35 nodes 20 nps 0 time 0 pv e2e4";
        let parsed = EngineResponse::parse(line).unwrap();
        assert_eq!(
            parsed.to_string(),
            "info depth 1 seldepth 1 time 0 nodes 20 multipv 1 score cp 35 nps 0 pv e2e4"
        );
        assert_eq!(
            EngineResponse::parse("bestmove e2e4 ponder e7e5")
                .unwrap()
                .to_string(),
            "bestmove e2e4 ponder e7e5"
        );
    }
}
