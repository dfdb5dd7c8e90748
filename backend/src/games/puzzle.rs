//! Falling-block puzzle engine.
//!
//! A 10×20 well with the seven standard tetrominoes. Pieces rotate clockwise
//! (transpose, then reverse each row) and lock when they can no longer fall.
//! Full rows are removed and everything above shifts down.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const WIDTH: usize = 10;
pub const HEIGHT: usize = 20;

/// Lines needed per level.
pub const LINES_PER_LEVEL: u32 = 10;

const BASE_TICK_MS: u64 = 1000;
const TICK_STEP_MS: u64 = 100;
const MIN_TICK_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    pub fn letter(self) -> char {
        match self {
            PieceKind::I => 'I',
            PieceKind::O => 'O',
            PieceKind::T => 'T',
            PieceKind::S => 'S',
            PieceKind::Z => 'Z',
            PieceKind::J => 'J',
            PieceKind::L => 'L',
        }
    }

    /// Spawn orientation.
    pub fn shape(self) -> Shape {
        let rows: &[&[u8]] = match self {
            PieceKind::I => &[&[0, 0, 0, 0], &[1, 1, 1, 1], &[0, 0, 0, 0], &[0, 0, 0, 0]],
            PieceKind::O => &[&[1, 1], &[1, 1]],
            PieceKind::T => &[&[0, 1, 0], &[1, 1, 1], &[0, 0, 0]],
            PieceKind::S => &[&[0, 1, 1], &[1, 1, 0], &[0, 0, 0]],
            PieceKind::Z => &[&[1, 1, 0], &[0, 1, 1], &[0, 0, 0]],
            PieceKind::J => &[&[1, 0, 0], &[1, 1, 1], &[0, 0, 0]],
            PieceKind::L => &[&[0, 0, 1], &[1, 1, 1], &[0, 0, 0]],
        };
        Shape(
            rows.iter()
                .map(|row| row.iter().map(|&c| c == 1).collect())
                .collect(),
        )
    }
}

/// Square occupancy matrix of a piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(Vec<Vec<bool>>);

impl Shape {
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Clockwise rotation: transpose, then reverse each row.
    pub fn rotated(&self) -> Shape {
        let n = self.size();
        let mut out = vec![vec![false; n]; n];
        for (r, row) in self.0.iter().enumerate() {
            for (c, &filled) in row.iter().enumerate() {
                out[c][r] = filled;
            }
        }
        for row in &mut out {
            row.reverse();
        }
        Shape(out)
    }

    /// Offsets `(row, col)` of filled cells.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.0.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(c, _)| (r as i32, c as i32))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePiece {
    pub kind: PieceKind,
    pub shape: Shape,
    pub row: i32,
    pub col: i32,
}

impl ActivePiece {
    fn spawn(kind: PieceKind) -> Self {
        let shape = kind.shape();
        let col = ((WIDTH - shape.size()) / 2) as i32;
        Self {
            kind,
            shape,
            row: 0,
            col,
        }
    }

    fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.shape
            .cells()
            .map(move |(r, c)| (self.row + r, self.col + c))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Input {
    Left,
    Right,
    Rotate,
    SoftDrop,
    HardDrop,
    Tick,
}

pub type Row = [Option<PieceKind>; WIDTH];

/// Tick interval for a level; shortens every level down to a floor.
pub fn tick_interval_ms(level: u32) -> u64 {
    let reduction = u64::from(level.saturating_sub(1)) * TICK_STEP_MS;
    BASE_TICK_MS.saturating_sub(reduction).max(MIN_TICK_MS)
}

/// Points for clearing `lines` rows at once on `level`.
pub fn line_clear_score(lines: u32, level: u32) -> u64 {
    u64::from(lines) * 100 * u64::from(level)
}

/// A running game.
#[derive(Debug, Clone)]
pub struct PuzzleGame {
    board: Vec<Row>,
    active: Option<ActivePiece>,
    next: PieceKind,
    score: u64,
    lines_cleared: u32,
    game_over: bool,
    rng: StdRng,
}

impl PuzzleGame {
    /// Start a game whose piece sequence is fixed by `seed`.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let first = random_kind(&mut rng);
        let mut game = Self {
            board: vec![[None; WIDTH]; HEIGHT],
            active: None,
            next: first,
            score: 0,
            lines_cleared: 0,
            game_over: false,
            rng,
        };
        game.spawn();
        game
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    pub fn level(&self) -> u32 {
        1 + self.lines_cleared / LINES_PER_LEVEL
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    pub fn active(&self) -> Option<&ActivePiece> {
        self.active.as_ref()
    }

    pub fn next(&self) -> PieceKind {
        self.next
    }

    /// Apply one input. Returns false when the input had no effect.
    pub fn apply(&mut self, input: Input) -> bool {
        if self.game_over {
            return false;
        }
        match input {
            Input::Left => self.shift(0, -1),
            Input::Right => self.shift(0, 1),
            Input::Rotate => self.rotate(),
            Input::SoftDrop | Input::Tick => {
                if !self.shift(1, 0) {
                    self.lock();
                }
                true
            }
            Input::HardDrop => {
                while self.shift(1, 0) {}
                self.lock();
                true
            }
        }
    }

    fn collides(&self, shape: &Shape, row: i32, col: i32) -> bool {
        shape.cells().any(|(r, c)| {
            let (y, x) = (row + r, col + c);
            if x < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
                return true;
            }
            // Cells above the well are free while a piece enters.
            y >= 0 && self.board[y as usize][x as usize].is_some()
        })
    }

    fn shift(&mut self, d_row: i32, d_col: i32) -> bool {
        let Some(piece) = &self.active else {
            return false;
        };
        let (row, col) = (piece.row + d_row, piece.col + d_col);
        if self.collides(&piece.shape, row, col) {
            return false;
        }
        if let Some(piece) = &mut self.active {
            piece.row = row;
            piece.col = col;
        }
        true
    }

    fn rotate(&mut self) -> bool {
        let Some(piece) = &self.active else {
            return false;
        };
        let rotated = piece.shape.rotated();
        if self.collides(&rotated, piece.row, piece.col) {
            return false;
        }
        if let Some(piece) = &mut self.active {
            piece.shape = rotated;
        }
        true
    }

    fn lock(&mut self) {
        let Some(piece) = self.active.take() else {
            return;
        };
        for (y, x) in piece.cells() {
            if y < 0 {
                // Locked partly above the well.
                self.game_over = true;
                continue;
            }
            self.board[y as usize][x as usize] = Some(piece.kind);
        }

        let cleared = self.clear_lines();
        if cleared > 0 {
            self.score += line_clear_score(cleared, self.level());
            self.lines_cleared += cleared;
        }

        if !self.game_over {
            self.spawn();
        }
    }

    /// Remove full rows, compacting the rest downward. Returns the count.
    fn clear_lines(&mut self) -> u32 {
        let before = self.board.len();
        self.board.retain(|row| row.iter().any(Option::is_none));
        let cleared = before - self.board.len();
        for _ in 0..cleared {
            self.board.insert(0, [None; WIDTH]);
        }
        cleared as u32
    }

    fn spawn(&mut self) {
        let piece = ActivePiece::spawn(self.next);
        self.next = random_kind(&mut self.rng);
        if self.collides(&piece.shape, piece.row, piece.col) {
            self.game_over = true;
            self.active = None;
        } else {
            self.active = Some(piece);
        }
    }

    /// Board rows with the active piece drawn in, `.` for empty cells.
    pub fn render(&self) -> Vec<String> {
        let mut grid: Vec<Vec<char>> = self
            .board
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or('.', PieceKind::letter))
                    .collect()
            })
            .collect();
        if let Some(piece) = &self.active {
            for (y, x) in piece.cells() {
                if y >= 0 {
                    grid[y as usize][x as usize] = piece.kind.letter();
                }
            }
        }
        grid.into_iter().map(|row| row.into_iter().collect()).collect()
    }
}

fn random_kind(rng: &mut StdRng) -> PieceKind {
    PieceKind::ALL[rng.gen_range(0..PieceKind::ALL.len())]
}

/// Per-user puzzle subtree of the game snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleState {
    #[serde(default)]
    pub high_score: u64,
    #[serde(default)]
    pub last_score: u64,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub total_lines: u64,
}

impl PuzzleState {
    /// Record a finished game. Returns true on a new high score.
    pub fn record_game(&mut self, score: u64, lines: u32) -> bool {
        self.games_played += 1;
        self.last_score = score;
        self.total_lines += u64::from(lines);
        if score > self.high_score {
            self.high_score = score;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl PuzzleGame {
        fn fill(&mut self, row: usize, except: &[usize]) {
            for x in 0..WIDTH {
                if !except.contains(&x) {
                    self.board[row][x] = Some(PieceKind::O);
                }
            }
        }

        fn place(&mut self, kind: PieceKind, rotations: usize, row: i32, col: i32) {
            let mut shape = kind.shape();
            for _ in 0..rotations {
                shape = shape.rotated();
            }
            self.active = Some(ActivePiece {
                kind,
                shape,
                row,
                col,
            });
        }
    }

    fn empty_game() -> PuzzleGame {
        let mut game = PuzzleGame::new(11);
        game.board = vec![[None; WIDTH]; HEIGHT];
        game
    }

    #[test]
    fn test_rotation_is_clockwise() {
        let rotated = PieceKind::T.shape().rotated();
        let expected = Shape(vec![
            vec![false, true, false],
            vec![false, true, true],
            vec![false, true, false],
        ]);
        assert_eq!(rotated, expected);
    }

    #[test]
    fn test_four_rotations_are_identity() {
        for kind in PieceKind::ALL {
            let shape = kind.shape();
            let back = shape.rotated().rotated().rotated().rotated();
            assert_eq!(shape, back, "{:?}", kind);
        }
    }

    #[test]
    fn test_walls_block_movement() {
        let mut game = empty_game();
        game.place(PieceKind::O, 0, 5, 0);
        assert!(!game.apply(Input::Left));
        game.place(PieceKind::O, 0, 5, (WIDTH - 2) as i32);
        assert!(!game.apply(Input::Right));
        assert!(game.apply(Input::Left));
        assert_eq!(game.active().map(|p| p.col), Some((WIDTH - 3) as i32));
    }

    #[test]
    fn test_rotation_rejected_on_collision() {
        let mut game = empty_game();
        // Vertical I against the right wall cannot turn horizontal.
        game.place(PieceKind::I, 1, 5, (WIDTH - 3) as i32);
        let before = game.active().cloned();
        assert!(!game.apply(Input::Rotate));
        assert_eq!(game.active().cloned(), before);
    }

    #[test]
    fn test_full_row_removed_and_rows_above_shift() {
        let mut game = empty_game();
        game.fill(HEIGHT - 1, &[]);
        game.board[HEIGHT - 2][0] = Some(PieceKind::J);

        assert_eq!(game.clear_lines(), 1);
        assert_eq!(game.board[HEIGHT - 1][0], Some(PieceKind::J));
        assert!(game.board[HEIGHT - 1][1..].iter().all(Option::is_none));
        assert!(game.board[0].iter().all(Option::is_none));
        assert_eq!(game.board.len(), HEIGHT);
    }

    #[test]
    fn test_tetris_scores_four_hundred_on_level_one() {
        let mut game = empty_game();
        for row in HEIGHT - 4..HEIGHT {
            game.fill(row, &[0]);
        }
        // A vertical I occupies column `col + 2`.
        game.place(PieceKind::I, 1, 0, -2);

        assert!(game.apply(Input::HardDrop));
        assert_eq!(game.lines_cleared(), 4);
        assert_eq!(game.score(), 400);
        assert!(game.board.iter().all(|row| row.iter().all(Option::is_none)));
    }

    #[test]
    fn test_score_scales_with_level() {
        let mut game = empty_game();
        game.lines_cleared = 10;
        assert_eq!(game.level(), 2);
        for row in HEIGHT - 2..HEIGHT {
            game.fill(row, &[0]);
        }
        game.board[HEIGHT - 3][5] = Some(PieceKind::S);
        game.place(PieceKind::I, 1, 0, -2);

        game.apply(Input::HardDrop);
        assert_eq!(game.score(), 2 * 100 * 2);
        assert_eq!(game.lines_cleared(), 12);
        // The stray block shifted down by two rows.
        assert_eq!(game.board[HEIGHT - 1][5], Some(PieceKind::S));
    }

    #[test]
    fn test_tick_interval_shortens_per_level() {
        assert_eq!(tick_interval_ms(1), 1000);
        assert_eq!(tick_interval_ms(2), 900);
        assert_eq!(tick_interval_ms(10), 100);
        assert_eq!(tick_interval_ms(25), 100);
    }

    #[test]
    fn test_tick_descends_then_locks() {
        let mut game = empty_game();
        game.place(PieceKind::O, 0, (HEIGHT - 3) as i32, 4);

        assert!(game.apply(Input::Tick));
        assert_eq!(game.active().map(|p| p.row), Some((HEIGHT - 2) as i32));

        game.apply(Input::Tick);
        assert_eq!(game.board[HEIGHT - 1][4], Some(PieceKind::O));
        assert_eq!(game.board[HEIGHT - 2][5], Some(PieceKind::O));
        assert_eq!(game.active().map(|p| p.row), Some(0));
    }

    #[test]
    fn test_blocked_spawn_ends_game() {
        let mut game = PuzzleGame::new(5);
        for row in 2..HEIGHT {
            game.fill(row, &[WIDTH - 1]);
        }

        game.apply(Input::HardDrop);
        assert!(game.is_over());
        assert!(game.active().is_none());
        assert!(!game.apply(Input::Left));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = PuzzleGame::new(99);
        let b = PuzzleGame::new(99);
        assert_eq!(a.active().map(|p| p.kind), b.active().map(|p| p.kind));
        assert_eq!(a.next(), b.next());
    }

    #[test]
    fn test_render_overlays_active_piece() {
        let mut game = empty_game();
        game.place(PieceKind::O, 0, 0, 0);
        let rows = game.render();
        assert_eq!(rows.len(), HEIGHT);
        assert_eq!(rows[0], "OO........");
        assert_eq!(rows[HEIGHT - 1], "..........");
    }

    #[test]
    fn test_record_game_tracks_high_score() {
        let mut state = PuzzleState::default();
        assert!(state.record_game(300, 3));
        assert!(!state.record_game(100, 1));
        assert_eq!(state.high_score, 300);
        assert_eq!(state.last_score, 100);
        assert_eq!(state.games_played, 2);
        assert_eq!(state.total_lines, 4);
    }
}
