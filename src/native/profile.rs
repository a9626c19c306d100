use std::fmt;

/// Identity and option table of one backend.
#[derive(Debug)]
pub struct Profile {
    pub name: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    pub options: &'static [UciOption],
}

impl Profile {
    pub fn find_option(&self, name: &str) -> Option<&'static UciOption> {
        self.options
            .iter()
            .find(|option| option.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug)]
pub struct UciOption {
    pub name: &'static str,
    pub kind: OptionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Check(bool),
    Spin { default: i64, min: i64, max: i64 },
    Text(&'static str),
    Button,
}

impl UciOption {
    const fn spin(name: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: OptionKind::Spin { default, min, max },
        }
    }

    const fn check(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: OptionKind::Check(default),
        }
    }

    const fn text(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Text(default),
        }
    }

    const fn button(name: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Button,
        }
    }

    pub fn default_value(&self) -> Option<String> {
        match self.kind {
            OptionKind::Check(default) => Some(default.to_string()),
            OptionKind::Spin { default, .. } => Some(default.to_string()),
            OptionKind::Text(default) => Some(default.to_string()),
            OptionKind::Button => None,
        }
    }

    /// Checks `value` against the option type and returns the normalized value.
    pub fn accept(&self, value: Option<&str>) -> Option<String> {
        match (self.kind, value) {
            (OptionKind::Button, _) => Some(String::new()),
            (OptionKind::Check(_), Some(v)) => match v.to_ascii_lowercase().as_str() {
                v @ ("true" | "false") => Some(v.to_string()),
                _ => None,
            },
            (OptionKind::Spin { min, max, .. }, Some(v)) => v
                .parse::<i64>()
                .ok()
                .filter(|n| (min..=max).contains(n))
                .map(|n| n.to_string()),
            (OptionKind::Text(_), Some(v)) => Some(v.to_string()),
            (OptionKind::Text(_), None) => Some(String::new()),
            (_, None) => None,
        }
    }
}

impl fmt::Display for UciOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "option name {} type ", self.name)?;
        match self.kind {
            OptionKind::Check(default) => write!(f, "check default {default}"),
            OptionKind::Spin { default, min, max } => {
                write!(f, "spin default {default} min {min} max {max}")
            }
            OptionKind::Text("") => write!(f, "string default <empty>"),
            OptionKind::Text(default) => write!(f, "string default {default}"),
            OptionKind::Button => write!(f, "button"),
        }
    }
}

pub static STOCKFISH: Profile = Profile {
    name: "Stockfish",
    version: "16.1",
    author: "the Stockfish developers (see AUTHORS file)",
    options: &[
        UciOption::spin("Threads", 1, 1, 1024),
        UciOption::spin("Hash", 16, 1, 33_554_432),
        UciOption::button("Clear Hash"),
        UciOption::check("Ponder", false),
        UciOption::spin("MultiPV", 1, 1, 500),
        UciOption::spin("Skill Level", 20, 0, 20),
        UciOption::text("EvalFile", "nn-b1a57edbea57.nnue"),
        UciOption::text("EvalFileSmall", "nn-baff1ede1f90.nnue"),
    ],
};

pub static LC0: Profile = Profile {
    name: "Lc0",
    version: "v0.29.0",
    author: "The LCZero Authors.",
    options: &[
        UciOption::text("WeightsFile", "<autodiscover>"),
        UciOption::spin("Threads", 2, 1, 128),
        UciOption::spin("MultiPV", 1, 1, 500),
        UciOption::check("Ponder", true),
        UciOption::spin("NNCacheSize", 2_000_000, 0, 999_999_999),
    ],
};

pub static ARASAN: Profile = Profile {
    name: "Arasan",
    version: "24.0",
    author: "Jon Dart",
    options: &[
        UciOption::spin("Hash", 64, 4, 64_000),
        UciOption::spin("Threads", 1, 1, 256),
        UciOption::spin("MultiPV", 1, 1, 10),
        UciOption::check("Ponder", true),
        UciOption::check("OwnBook", true),
        UciOption::text("BookFile", "book.bin"),
        UciOption::text("NNUEFile", "arasan.nnue"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_option_lines() {
        let threads = STOCKFISH.find_option("threads").unwrap();
        assert_eq!(
            threads.to_string(),
            "option name Threads type spin default 1 min 1 max 1024"
        );
        let clear = STOCKFISH.find_option("Clear Hash").unwrap();
        assert_eq!(clear.to_string(), "option name Clear Hash type button");
    }

    #[test]
    fn validates_values() {
        let threads = STOCKFISH.find_option("Threads").unwrap();
        assert_eq!(threads.accept(Some("4")), Some("4".to_string()));
        assert_eq!(threads.accept(Some("0")), None);
        assert_eq!(threads.accept(None), None);

        let ponder = ARASAN.find_option("Ponder").unwrap();
        assert_eq!(ponder.accept(Some("FALSE")), Some("false".to_string()));
        assert_eq!(ponder.accept(Some("maybe")), None);
    }
}
