use std::str::FromStr;

use anyhow::Result;
use shakmaty::{CastlingMode, Chess, Color, Position, Role, fen::Fen, uci::UciMove};

pub fn parse_uci_move(move_str: &str) -> Result<UciMove> {
    let uci_move = UciMove::from_str(move_str.trim())?;

    Ok(uci_move)
}

/// Builds the position described by an optional FEN plus a list of moves.
/// Nothing is applied unless every move is legal.
pub fn play_line(fen: Option<&str>, moves: &[String]) -> Result<Chess> {
    let mut game: Chess = match fen {
        Some(fen) => Fen::from_str(fen.trim())?.into_position(CastlingMode::Standard)?,
        None => Chess::default(),
    };

    for move_str in moves {
        let valid_move = parse_uci_move(move_str)?.to_move(&game)?;
        game.play_unchecked(valid_move);
    }

    Ok(game)
}

pub fn piece_value(role: Role) -> i32 {
    match role {
        Role::Pawn => 100,
        Role::Knight => 320,
        Role::Bishop => 330,
        Role::Rook => 500,
        Role::Queen => 900,
        Role::King => 0,
    }
}

/// Material balance from white's point of view, in centipawns.
pub fn material_difference(game: &Chess) -> i32 {
    game.board()
        .iter()
        .map(|(_, piece)| match piece.color {
            Color::White => piece_value(piece.role),
            Color::Black => -piece_value(piece.role),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_moves_from_startpos() {
        let moves = ["e2e4", "e7e5", "g1f3"].map(String::from);
        let game = play_line(None, &moves).unwrap();
        assert_eq!(game.turn(), Color::Black);
        assert_eq!(material_difference(&game), 0);
    }

    #[test]
    fn rejects_illegal_move() {
        let moves = ["e2e5"].map(String::from);
        assert!(play_line(None, &moves).is_err());
        assert!(parse_uci_move("zz").is_err());
    }

    #[test]
    fn loads_fen() {
        let game = play_line(Some("4k3/8/8/8/8/8/8/3QK3 w - - 0 1"), &[]).unwrap();
        assert_eq!(material_difference(&game), 900);
    }
}
