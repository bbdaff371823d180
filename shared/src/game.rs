//! Board state and rules for a single tic-tac-toe game.

/// A player's mark on the board. X always takes the first turn of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Character used when rendering or wire-encoding a cell.
    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

/// Number of cells on the board, indexed 0..=8 row by row.
pub const BOARD_CELLS: usize = 9;

/// The eight winning triples: three rows, three columns, two diagonals.
const WIN_PATTERNS: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// One running game, jointly referenced by both paired players.
///
/// Move application is deliberately permissive: `apply_move` neither checks
/// that the cell is empty nor that it is the caller's turn. The prompt
/// protocol is what gates client moves (a client only sends MOVE after
/// BEGIN_X or a relayed board), so the server validates connection state,
/// not board state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    board: [Option<Mark>; BOARD_CELLS],
    x_next: bool,
}

impl Game {
    /// Fresh game: all cells empty, X to move.
    pub fn new() -> Self {
        Self {
            board: [None; BOARD_CELLS],
            x_next: true,
        }
    }

    /// Rebuilds a game from its wire representation.
    pub fn from_parts(board: [Option<Mark>; BOARD_CELLS], x_next: bool) -> Self {
        Self { board, x_next }
    }

    pub fn board(&self) -> &[Option<Mark>; BOARD_CELLS] {
        &self.board
    }

    pub fn cell(&self, cell: u8) -> Option<Mark> {
        self.board[cell as usize]
    }

    pub fn x_next(&self) -> bool {
        self.x_next
    }

    /// The mark whose turn it is.
    pub fn next_mark(&self) -> Mark {
        if self.x_next {
            Mark::X
        } else {
            Mark::O
        }
    }

    /// Places `mark` on `cell`, unconditionally overwriting the cell.
    pub fn apply_move(&mut self, cell: u8, mark: Mark) {
        debug_assert!((cell as usize) < BOARD_CELLS);
        self.board[cell as usize] = Some(mark);
    }

    /// True iff some winning triple is fully occupied by `mark`.
    pub fn check_win(&self, mark: Mark) -> bool {
        WIN_PATTERNS
            .iter()
            .any(|pattern| pattern.iter().all(|&cell| self.board[cell] == Some(mark)))
    }

    /// True iff no cell is empty. Callers check for a win first, so a full
    /// board reaching this point is a tie.
    pub fn check_tie(&self) -> bool {
        self.board.iter().all(|cell| cell.is_some())
    }

    /// Flips the turn flag. Called only when the last move neither won nor
    /// tied the game.
    pub fn toggle_turn(&mut self) {
        self.x_next = !self.x_next;
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
