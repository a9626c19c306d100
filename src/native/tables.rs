use std::sync::{
    OnceLock,
    atomic::{AtomicUsize, Ordering},
};

use log::debug;
use shakmaty::{Color, Role, Square};

static TABLES: OnceLock<Tables> = OnceLock::new();
static BUILDS: AtomicUsize = AtomicUsize::new(0);

/// Piece-square tables shared by every backend in the process.
#[derive(Debug)]
pub struct Tables {
    psqt: [[i32; 64]; 6],
}

/// Returns the process-wide tables, building them on first use.
pub fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        BUILDS.fetch_add(1, Ordering::SeqCst);
        debug!("building piece-square tables");
        Tables::build()
    })
}

/// How many times the tables were built. Stays at one for the process.
pub fn build_count() -> usize {
    BUILDS.load(Ordering::SeqCst)
}

impl Tables {
    fn build() -> Self {
        let mut psqt = [[0; 64]; 6];

        for index in 0..64 {
            let (file, rank) = ((index % 8) as i32, (index / 8) as i32);
            let centrality = file.min(7 - file).min(rank).min(7 - rank);

            psqt[role_index(Role::Pawn)][index] = (rank - 1).max(0) * 8;
            psqt[role_index(Role::Knight)][index] = centrality * 12 - 20;
            psqt[role_index(Role::Bishop)][index] = centrality * 6;
            psqt[role_index(Role::Rook)][index] = if rank == 6 { 20 } else { 0 };
            psqt[role_index(Role::Queen)][index] = centrality * 3;
            psqt[role_index(Role::King)][index] =
                -centrality * 12 + if rank == 0 { 10 } else { 0 };
        }

        Self { psqt }
    }

    /// Bonus for a piece of `color` standing on `square`, mirrored for black.
    pub fn psqt(&self, role: Role, color: Color, square: Square) -> i32 {
        let index = match color {
            Color::White => square as usize,
            Color::Black => square as usize ^ 56,
        };
        self.psqt[role_index(role)][index]
    }
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    }
}
