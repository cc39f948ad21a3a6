//! Pure chess rules: board representation, move generation, outcome
//! detection and FEN I/O.
//!
//! Nothing outside this module decides whether a move is legal. The
//! representation is a flat 64-square array rather than bitboards, favoring
//! a straightforward, readable data structure over a micro-optimized one.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    /// Deterministic promotion tie-break order: `Q > R > B > N`.
    pub const PROMOTION_PRIORITY: [Piece; 4] =
        [Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight];

    fn value(self) -> i32 {
        match self {
            Piece::Pawn => 1,
            Piece::Knight => 3,
            Piece::Bishop => 3,
            Piece::Rook => 5,
            Piece::Queen => 9,
            Piece::King => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChessMove {
    pub from: u8,
    pub to: u8,
    pub promotion: Option<Piece>,
}

impl ChessMove {
    pub fn new(from: u8, to: u8, promotion: Option<Piece>) -> Self {
        Self { from, to, promotion }
    }

    /// Action encoding: `from*64+to`, promotions collapsed out of the id.
    pub fn action_id(self) -> u16 {
        self.from as u16 * 64 + self.to as u16
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", square_name(self.from), square_name(self.to))?;
        if let Some(p) = self.promotion {
            let c = match p {
                Piece::Queen => 'q',
                Piece::Rook => 'r',
                Piece::Bishop => 'b',
                Piece::Knight => 'n',
                _ => '?',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

pub fn square_name(sq: u8) -> String {
    let file = (b'a' + (sq % 8)) as char;
    let rank = (b'1' + (sq / 8)) as char;
    format!("{file}{rank}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastlingRights {
    pub white_king: bool,
    pub white_queen: bool,
    pub black_king: bool,
    pub black_queen: bool,
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self {
            white_king: true,
            white_queen: true,
            black_king: true,
            black_queen: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    Repetition,
    FiftyMove,
    InsufficientMaterial,
    Adjudication,
    StepLimit,
    Manual,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ongoing,
    WhiteWins,
    BlackWins,
    Draw(DrawReason),
}

/// The position state owned by an Environment.
#[derive(Debug, Clone)]
pub struct Position {
    pub board: [Option<(Color, Piece)>; 64],
    pub side_to_move: Color,
    pub castling: CastlingRights,
    pub en_passant: Option<u8>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
    /// Simple history of position hashes, used only for local threefold-repetition
    /// detection; not part of the FEN representation.
    history: Vec<u64>,
}

impl Position {
    pub fn initial() -> Self {
        let mut board = [None; 64];
        let back_rank = [
            Piece::Rook,
            Piece::Knight,
            Piece::Bishop,
            Piece::Queen,
            Piece::King,
            Piece::Bishop,
            Piece::Knight,
            Piece::Rook,
        ];
        for (file, piece) in back_rank.iter().enumerate() {
            board[file] = Some((Color::White, *piece));
            board[8 + file] = Some((Color::White, Piece::Pawn));
            board[48 + file] = Some((Color::Black, Piece::Pawn));
            board[56 + file] = Some((Color::Black, *piece));
        }
        let mut pos = Self {
            board,
            side_to_move: Color::White,
            castling: CastlingRights::default(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            history: Vec::new(),
        };
        pos.history.push(pos.zobrist_like());
        pos
    }

    fn zobrist_like(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.board.hash(&mut hasher);
        self.side_to_move.hash(&mut hasher);
        self.castling.hash(&mut hasher);
        self.en_passant.hash(&mut hasher);
        hasher.finish()
    }

    pub fn piece_at(&self, sq: u8) -> Option<(Color, Piece)> {
        self.board[sq as usize]
    }

    fn king_square(&self, color: Color) -> Option<u8> {
        (0..64).find(|&sq| self.board[sq as usize] == Some((color, Piece::King)))
    }

    pub fn in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(sq) => self.is_attacked(sq, color.opposite()),
            None => false,
        }
    }

    fn is_attacked(&self, sq: u8, by: Color) -> bool {
        let (file, rank) = (sq as i32 % 8, sq as i32 / 8);

        // Pawn attacks.
        let pawn_rank_delta = if by == Color::White { -1 } else { 1 };
        for df in [-1, 1] {
            let (f, r) = (file + df, rank + pawn_rank_delta);
            if let Some(s) = square_of(f, r) {
                if self.board[s as usize] == Some((by, Piece::Pawn)) {
                    return true;
                }
            }
        }

        // Knight attacks.
        for (df, dr) in KNIGHT_DELTAS {
            if let Some(s) = square_of(file + df, rank + dr) {
                if self.board[s as usize] == Some((by, Piece::Knight)) {
                    return true;
                }
            }
        }

        // King adjacency.
        for df in -1..=1 {
            for dr in -1..=1 {
                if df == 0 && dr == 0 {
                    continue;
                }
                if let Some(s) = square_of(file + df, rank + dr) {
                    if self.board[s as usize] == Some((by, Piece::King)) {
                        return true;
                    }
                }
            }
        }

        // Sliding pieces: bishop/queen on diagonals, rook/queen on files/ranks.
        for (df, dr, pieces) in [
            (1, 0, [Piece::Rook, Piece::Queen]),
            (-1, 0, [Piece::Rook, Piece::Queen]),
            (0, 1, [Piece::Rook, Piece::Queen]),
            (0, -1, [Piece::Rook, Piece::Queen]),
            (1, 1, [Piece::Bishop, Piece::Queen]),
            (1, -1, [Piece::Bishop, Piece::Queen]),
            (-1, 1, [Piece::Bishop, Piece::Queen]),
            (-1, -1, [Piece::Bishop, Piece::Queen]),
        ] {
            let mut f = file + df;
            let mut r = rank + dr;
            while let Some(s) = square_of(f, r) {
                if let Some((c, p)) = self.board[s as usize] {
                    if c == by && pieces.contains(&p) {
                        return true;
                    }
                    break;
                }
                f += df;
                r += dr;
            }
        }

        false
    }

    /// All legal moves for the side to move.
    pub fn legal_moves(&self) -> Vec<ChessMove> {
        let side = self.side_to_move;
        self.pseudo_legal_moves(side)
            .into_iter()
            .filter(|mv| {
                let next = self.apply_unchecked(*mv);
                !next.in_check(side)
            })
            .collect()
    }

    fn pseudo_legal_moves(&self, side: Color) -> Vec<ChessMove> {
        let mut moves = Vec::new();
        for sq in 0..64u8 {
            if let Some((c, piece)) = self.board[sq as usize] {
                if c != side {
                    continue;
                }
                match piece {
                    Piece::Pawn => self.pawn_moves(sq, side, &mut moves),
                    Piece::Knight => self.stepper_moves(sq, side, &KNIGHT_DELTAS, &mut moves),
                    Piece::King => {
                        self.stepper_moves(sq, side, &KING_DELTAS, &mut moves);
                        self.castling_moves(sq, side, &mut moves);
                    }
                    Piece::Bishop => self.slider_moves(sq, side, &DIAG_DIRS, &mut moves),
                    Piece::Rook => self.slider_moves(sq, side, &ORTHO_DIRS, &mut moves),
                    Piece::Queen => self.slider_moves(sq, side, &ALL_DIRS, &mut moves),
                }
            }
        }
        moves
    }

    fn pawn_moves(&self, sq: u8, side: Color, out: &mut Vec<ChessMove>) {
        let (file, rank) = (sq as i32 % 8, sq as i32 / 8);
        let forward = if side == Color::White { 1 } else { -1 };
        let start_rank = if side == Color::White { 1 } else { 6 };
        let promo_rank = if side == Color::White { 7 } else { 0 };

        let push_one = square_of(file, rank + forward);
        if let Some(s1) = push_one {
            if self.board[s1 as usize].is_none() {
                self.push_pawn_move(sq, s1, rank + forward == promo_rank, out);
                if rank == start_rank {
                    if let Some(s2) = square_of(file, rank + 2 * forward) {
                        if self.board[s2 as usize].is_none() {
                            out.push(ChessMove::new(sq, s2, None));
                        }
                    }
                }
            }
        }

        for df in [-1, 1] {
            if let Some(s) = square_of(file + df, rank + forward) {
                let is_capture = self
                    .board[s as usize]
                    .map(|(c, _)| c != side)
                    .unwrap_or(false);
                let is_ep = self.en_passant == Some(s);
                if is_capture {
                    self.push_pawn_move(sq, s, rank + forward == promo_rank, out);
                } else if is_ep {
                    out.push(ChessMove::new(sq, s, None));
                }
            }
        }
    }

    fn push_pawn_move(&self, from: u8, to: u8, promotes: bool, out: &mut Vec<ChessMove>) {
        if promotes {
            for p in Piece::PROMOTION_PRIORITY {
                out.push(ChessMove::new(from, to, Some(p)));
            }
        } else {
            out.push(ChessMove::new(from, to, None));
        }
    }

    fn stepper_moves(&self, sq: u8, side: Color, deltas: &[(i32, i32)], out: &mut Vec<ChessMove>) {
        let (file, rank) = (sq as i32 % 8, sq as i32 / 8);
        for (df, dr) in deltas {
            if let Some(s) = square_of(file + df, rank + dr) {
                if self.board[s as usize].map(|(c, _)| c != side).unwrap_or(true) {
                    out.push(ChessMove::new(sq, s, None));
                }
            }
        }
    }

    fn slider_moves(&self, sq: u8, side: Color, dirs: &[(i32, i32)], out: &mut Vec<ChessMove>) {
        let (file, rank) = (sq as i32 % 8, sq as i32 / 8);
        for (df, dr) in dirs {
            let mut f = file + df;
            let mut r = rank + dr;
            while let Some(s) = square_of(f, r) {
                match self.board[s as usize] {
                    None => out.push(ChessMove::new(sq, s, None)),
                    Some((c, _)) => {
                        if c != side {
                            out.push(ChessMove::new(sq, s, None));
                        }
                        break;
                    }
                }
                f += df;
                r += dr;
            }
        }
    }

    fn castling_moves(&self, king_sq: u8, side: Color, out: &mut Vec<ChessMove>) {
        if self.in_check(side) {
            return;
        }
        let (king_side, queen_side) = match side {
            Color::White => (self.castling.white_king, self.castling.white_queen),
            Color::Black => (self.castling.black_king, self.castling.black_queen),
        };
        let home_rank = if side == Color::White { 0 } else { 7 };

        if king_side {
            let f = square_of(5, home_rank as i32).unwrap();
            let g = square_of(6, home_rank as i32).unwrap();
            if self.board[f as usize].is_none()
                && self.board[g as usize].is_none()
                && !self.is_attacked(f, side.opposite())
                && !self.is_attacked(g, side.opposite())
            {
                out.push(ChessMove::new(king_sq, g, None));
            }
        }
        if queen_side {
            let d = square_of(3, home_rank as i32).unwrap();
            let c = square_of(2, home_rank as i32).unwrap();
            let b = square_of(1, home_rank as i32).unwrap();
            if self.board[d as usize].is_none()
                && self.board[c as usize].is_none()
                && self.board[b as usize].is_none()
                && !self.is_attacked(d, side.opposite())
                && !self.is_attacked(c, side.opposite())
            {
                out.push(ChessMove::new(king_sq, c, None));
            }
        }
    }

    /// Apply a move without legality verification; used internally by
    /// `legal_moves` (to test for self-check) and by `apply`.
    fn apply_unchecked(&self, mv: ChessMove) -> Position {
        let mut next = self.clone();
        let side = next.side_to_move;
        let (_, moved_piece) = next.board[mv.from as usize].expect("apply_unchecked: empty from-square");

        let is_capture = next.board[mv.to as usize].is_some();
        let is_en_passant = moved_piece == Piece::Pawn && Some(mv.to) == next.en_passant
            && next.board[mv.to as usize].is_none();

        next.board[mv.to as usize] = Some((side, mv.promotion.unwrap_or(moved_piece)));
        next.board[mv.from as usize] = None;

        if is_en_passant {
            let capture_sq = if side == Color::White { mv.to - 8 } else { mv.to + 8 };
            next.board[capture_sq as usize] = None;
        }

        // Castling: move the rook too.
        if moved_piece == Piece::King && (mv.from as i32 - mv.to as i32).abs() == 2 {
            let home_rank = mv.from / 8;
            if mv.to % 8 == 6 {
                let rook_from = home_rank * 8 + 7;
                let rook_to = home_rank * 8 + 5;
                next.board[rook_to as usize] = next.board[rook_from as usize];
                next.board[rook_from as usize] = None;
            } else if mv.to % 8 == 2 {
                let rook_from = home_rank * 8;
                let rook_to = home_rank * 8 + 3;
                next.board[rook_to as usize] = next.board[rook_from as usize];
                next.board[rook_from as usize] = None;
            }
        }

        // Castling rights.
        if moved_piece == Piece::King {
            match side {
                Color::White => {
                    next.castling.white_king = false;
                    next.castling.white_queen = false;
                }
                Color::Black => {
                    next.castling.black_king = false;
                    next.castling.black_queen = false;
                }
            }
        }
        for sq in [mv.from, mv.to] {
            match sq {
                0 => next.castling.white_queen = false,
                7 => next.castling.white_king = false,
                56 => next.castling.black_queen = false,
                63 => next.castling.black_king = false,
                _ => {}
            }
        }

        // En passant target.
        next.en_passant = if moved_piece == Piece::Pawn && (mv.from as i32 - mv.to as i32).abs() == 16 {
            Some((mv.from + mv.to) / 2)
        } else {
            None
        };

        // Halfmove clock.
        if moved_piece == Piece::Pawn || is_capture || is_en_passant {
            next.halfmove_clock = 0;
        } else {
            next.halfmove_clock += 1;
        }

        if side == Color::Black {
            next.fullmove_number += 1;
        }
        next.side_to_move = side.opposite();
        next
    }

    /// Apply a legal move, returning the resulting position. Callers (the
    /// Environment) MUST only pass moves returned by `legal_moves`.
    pub fn apply(&self, mv: ChessMove) -> Position {
        let mut next = self.apply_unchecked(mv);
        let h = next.zobrist_like();
        next.history.push(h);
        next
    }

    fn repetition_count(&self) -> usize {
        let last = *self.history.last().unwrap_or(&0);
        self.history.iter().filter(|&&h| h == last).count()
    }

    pub fn material_diff(&self) -> i32 {
        let mut diff = 0;
        for sq in self.board.iter().flatten() {
            let v = sq.1.value();
            diff += if sq.0 == Color::White { v } else { -v };
        }
        diff
    }

    fn insufficient_material(&self) -> bool {
        let mut minor_pieces: Vec<(Color, Piece, u8)> = Vec::new();
        for (i, sq) in self.board.iter().enumerate() {
            if let Some((c, p)) = sq {
                match p {
                    Piece::King => {}
                    Piece::Pawn | Piece::Rook | Piece::Queen => return false,
                    Piece::Knight | Piece::Bishop => minor_pieces.push((*c, *p, i as u8)),
                }
            }
        }
        match minor_pieces.len() {
            0 => true,
            1 => true,
            2 => {
                let (c0, p0, sq0) = minor_pieces[0];
                let (c1, p1, sq1) = minor_pieces[1];
                if c0 == c1 {
                    return false;
                }
                if p0 == Piece::Bishop && p1 == Piece::Bishop {
                    let color0 = (sq0 % 8 + sq0 / 8) % 2;
                    let color1 = (sq1 % 8 + sq1 / 8) % 2;
                    color0 == color1
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Terminal outcome from the rules alone, not
    /// including adjudication, which is an Environment-level concern.
    pub fn status(&self) -> Outcome {
        // Checkmate/stalemate must be classified before any counter-based
        // draw, since a mating move delivered on e.g. the 100th half-move
        // is a win, not a fifty-move draw.
        let moves = self.legal_moves();
        if moves.is_empty() {
            if self.in_check(self.side_to_move) {
                return match self.side_to_move {
                    Color::White => Outcome::BlackWins,
                    Color::Black => Outcome::WhiteWins,
                };
            }
            return Outcome::Draw(DrawReason::Stalemate);
        }
        if self.halfmove_clock >= 100 {
            return Outcome::Draw(DrawReason::FiftyMove);
        }
        if self.repetition_count() >= 3 {
            return Outcome::Draw(DrawReason::Repetition);
        }
        if self.insufficient_material() {
            return Outcome::Draw(DrawReason::InsufficientMaterial);
        }
        Outcome::Ongoing
    }

    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let sq = rank * 8 + file;
                match self.board[sq as usize] {
                    None => empty += 1,
                    Some((c, p)) => {
                        if empty > 0 {
                            placement.push_str(&empty.to_string());
                            empty = 0;
                        }
                        placement.push(piece_char(c, p));
                    }
                }
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
            if rank > 0 {
                placement.push('/');
            }
        }
        let side = if self.side_to_move == Color::White { "w" } else { "b" };
        let mut castling = String::new();
        if self.castling.white_king {
            castling.push('K');
        }
        if self.castling.white_queen {
            castling.push('Q');
        }
        if self.castling.black_king {
            castling.push('k');
        }
        if self.castling.black_queen {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }
        let ep = self
            .en_passant
            .map(square_name)
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{placement} {side} {castling} {ep} {} {}",
            self.halfmove_clock, self.fullmove_number
        )
    }

    pub fn from_fen(fen: &str) -> crate::Result<Position> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(crate::ChessRlError::Adapter(format!(
                "malformed FEN: expected at least 4 fields, got {}",
                fields.len()
            )));
        }
        let mut board = [None; 64];
        let mut rank = 7i32;
        let mut file = 0i32;
        for ch in fields[0].chars() {
            match ch {
                '/' => {
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += ch.to_digit(10).unwrap() as i32,
                c => {
                    let (color, piece) = char_piece(c).ok_or_else(|| {
                        crate::ChessRlError::Adapter(format!("malformed FEN piece char {c:?}"))
                    })?;
                    let sq = square_of(file, rank).ok_or_else(|| {
                        crate::ChessRlError::Adapter("malformed FEN: square out of range".into())
                    })?;
                    board[sq as usize] = Some((color, piece));
                    file += 1;
                }
            }
        }
        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(crate::ChessRlError::Adapter(format!(
                    "malformed FEN side to move {other:?}"
                )))
            }
        };
        let castling = CastlingRights {
            white_king: fields[2].contains('K'),
            white_queen: fields[2].contains('Q'),
            black_king: fields[2].contains('k'),
            black_queen: fields[2].contains('q'),
        };
        let en_passant = if fields.len() > 3 && fields[3] != "-" {
            parse_square(fields[3])
        } else {
            None
        };
        let halfmove_clock = fields.get(4).and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove_number = fields.get(5).and_then(|s| s.parse().ok()).unwrap_or(1);

        let mut pos = Position {
            board,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
            history: Vec::new(),
        };
        pos.history.push(pos.zobrist_like());
        Ok(pos)
    }

    pub fn to_ascii(&self) -> String {
        let mut s = String::new();
        for rank in (0..8).rev() {
            for file in 0..8 {
                let sq = rank * 8 + file;
                let c = match self.board[sq as usize] {
                    None => '.',
                    Some((color, piece)) => piece_char(color, piece),
                };
                s.push(c);
                s.push(' ');
            }
            s.push('\n');
        }
        s
    }
}

fn piece_char(color: Color, piece: Piece) -> char {
    let c = match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    };
    if color == Color::White {
        c.to_ascii_uppercase()
    } else {
        c
    }
}

fn char_piece(c: char) -> Option<(Color, Piece)> {
    let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
    let piece = match c.to_ascii_lowercase() {
        'p' => Piece::Pawn,
        'n' => Piece::Knight,
        'b' => Piece::Bishop,
        'r' => Piece::Rook,
        'q' => Piece::Queen,
        'k' => Piece::King,
        _ => return None,
    };
    Some((color, piece))
}

/// Parse an algebraic square like `"e4"` into a `0..64` index (`a1`=0, `h8`=63).
pub fn parse_square(s: &str) -> Option<u8> {
    let mut chars = s.chars();
    let file = chars.next()?;
    let rank = chars.next()?;
    if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
        return None;
    }
    Some((file as u8 - b'a') + (rank as u8 - b'1') * 8)
}

fn square_of(file: i32, rank: i32) -> Option<u8> {
    if (0..8).contains(&file) && (0..8).contains(&rank) {
        Some((rank * 8 + file) as u8)
    } else {
        None
    }
}

const KNIGHT_DELTAS: [(i32, i32); 8] = [
    (1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2),
];
const KING_DELTAS: [(i32, i32); 8] = [
    (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1),
];
const DIAG_DIRS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const ORTHO_DIRS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const ALL_DIRS: [(i32, i32); 8] = [
    (1, 0), (-1, 0), (0, 1), (0, -1), (1, 1), (1, -1), (-1, 1), (-1, -1),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_has_twenty_legal_moves() {
        let pos = Position::initial();
        assert_eq!(pos.legal_moves().len(), 20);
        assert_eq!(pos.status(), Outcome::Ongoing);
    }

    #[test]
    fn fen_roundtrip_from_initial() {
        let pos = Position::initial();
        let fen = pos.to_fen();
        assert_eq!(
            fen,
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        let parsed = Position::from_fen(&fen).unwrap();
        assert_eq!(parsed.to_fen(), fen);
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let mut pos = Position::initial();
        for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
            let from = parse_square(from).unwrap();
            let to = parse_square(to).unwrap();
            let mv = pos
                .legal_moves()
                .into_iter()
                .find(|m| m.from == from && m.to == to)
                .expect("expected move to be legal");
            pos = pos.apply(mv);
        }
        assert_eq!(pos.status(), Outcome::BlackWins);
        assert!(pos.legal_moves().is_empty());
    }

    #[test]
    fn stalemate_detected() {
        // Classic K+Q vs K stalemate position (white to move, no legal moves, not in check).
        let pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(pos.status(), Outcome::Draw(DrawReason::Stalemate));
    }

    #[test]
    fn insufficient_material_kk_is_draw() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(pos.status(), Outcome::Draw(DrawReason::InsufficientMaterial));
    }

    #[test]
    fn white_kingside_castle_available_when_clear() {
        let pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let e1 = parse_square("e1").unwrap();
        let g1 = parse_square("g1").unwrap();
        assert!(pos.legal_moves().iter().any(|m| m.from == e1 && m.to == g1));
    }

    #[test]
    fn promotion_generates_all_four_pieces() {
        let pos = Position::from_fen("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        let a7 = parse_square("a7").unwrap();
        let a8 = parse_square("a8").unwrap();
        let promos: Vec<_> = pos
            .legal_moves()
            .into_iter()
            .filter(|m| m.from == a7 && m.to == a8)
            .collect();
        assert_eq!(promos.len(), 4);
    }

    #[test]
    fn material_diff_zero_at_start() {
        assert_eq!(Position::initial().material_diff(), 0);
    }
}
