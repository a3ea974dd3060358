// This file is part of the shakmaty-tb library.
// Copyright (C) 2017-2022 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::marker::PhantomData;

use arrayvec::ArrayVec;
use bit_vec::BitVec;
use itertools::Itertools as _;
use num_integer::binomial;
use shakmaty::{Bitboard, Color, File, Piece, Position, Rank, Role, Square};

use crate::{
    errors::{ensure, throw, u, SyzygyResult},
    filesystem::Mapping,
    material::Material,
    types::{Pieces, Syzygy, Wdl, MAX_PIECES},
};

/// Metric stored in a table: WDL or DTZ.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Metric {
    Wdl,
    Dtz,
}

/// Marker type selecting the metric of a table.
pub trait TableTag {
    const METRIC: Metric;
}

#[derive(Debug)]
pub enum WdlTag {}

impl TableTag for WdlTag {
    const METRIC: Metric = Metric::Wdl;
}

#[derive(Debug)]
pub enum DtzTag {}

impl TableTag for DtzTag {
    const METRIC: Metric = Metric::Dtz;
}

bitflags::bitflags! {
    /// Table layout flags.
    struct Layout: u8 {
        /// Two-sided table for a non-symmetrical material configuration.
        const SPLIT = 1;
        /// Table with pawns, with sub-tables per leading pawn file (a-d).
        const HAS_PAWNS = 2;
    }
}

bitflags::bitflags! {
    /// Sub-table format flags.
    struct Flag: u8 {
        /// DTZ table stores black to move.
        const STM = 1;
        /// Use `DtzMap`.
        const MAPPED = 2;
        /// DTZ table has winning positions on the edge of the 50-move rule
        /// and therefore stores exact plies rather than just full moves.
        const WIN_PLIES = 4;
        /// DTZ table has losing positions on the edge of the 50-move rule
        /// and therefore stores exact plies rather than just full moves.
        const LOSS_PLIES = 8;
        /// DTZ table contains very long endgames, so that values require
        /// 16 bits rather than just 8.
        const WIDE_DTZ = 16;
        /// Table stores only a single value.
        const SINGLE_VALUE = 128;
    }
}

/// Maximum size in bytes of a compressed block.
const MAX_BLOCK_SIZE: u32 = 1024;

/// Maps squares into the a1-d1-d4 triangle.
#[rustfmt::skip]
const TRIANGLE: [u64; 64] = [
    6, 0, 1, 2, 2, 1, 0, 6,
    0, 7, 3, 4, 4, 3, 7, 0,
    1, 3, 8, 5, 5, 8, 3, 1,
    2, 4, 5, 9, 9, 5, 4, 2,
    2, 4, 5, 9, 9, 5, 4, 2,
    1, 3, 8, 5, 5, 8, 3, 1,
    0, 7, 3, 4, 4, 3, 7, 0,
    6, 0, 1, 2, 2, 1, 0, 6,
];

/// Inverse of `TRIANGLE`.
const INV_TRIANGLE: [usize; 10] = [1, 2, 3, 10, 11, 19, 0, 9, 18, 27];

/// Maps the b1-h1-h7 triangle to `0..=27`, diagonal squares to `28..=35`.
#[rustfmt::skip]
const LOWER: [u64; 64] = [
    28,  0,  1,  2,  3,  4,  5,  6,
     0, 29,  7,  8,  9, 10, 11, 12,
     1,  7, 30, 13, 14, 15, 16, 17,
     2,  8, 13, 31, 18, 19, 20, 21,
     3,  9, 14, 18, 32, 22, 23, 24,
     4, 10, 15, 19, 22, 33, 25, 26,
     5, 11, 16, 20, 23, 25, 34, 27,
     6, 12, 17, 21, 24, 26, 27, 35,
];

/// Used to initialize `Consts::mult_idx` and `Consts::mult_factor`.
#[rustfmt::skip]
const MULT_TWIST: [u64; 64] = [
    15, 63, 55, 47, 40, 48, 56, 12,
    62, 11, 39, 31, 24, 32,  8, 57,
    54, 38,  7, 23, 16,  4, 33, 49,
    46, 30, 22,  3,  0, 17, 25, 41,
    45, 29, 21,  2,  1, 18, 26, 42,
    53, 37,  6, 20, 19,  5, 34, 50,
    61, 10, 36, 28, 27, 35,  9, 58,
    14, 60, 52, 44, 43, 51, 59, 13,
];

/// Unused entry.
const Z0: u64 = u64::MAX;

/// Encoding of all 462 configurations of two not-connected kings.
#[rustfmt::skip]
const KK_IDX: [[u64; 64]; 10] = [[
     Z0,  Z0,  Z0,   0,   1,   2,   3,   4,
     Z0,  Z0,  Z0,   5,   6,   7,   8,   9,
     10,  11,  12,  13,  14,  15,  16,  17,
     18,  19,  20,  21,  22,  23,  24,  25,
     26,  27,  28,  29,  30,  31,  32,  33,
     34,  35,  36,  37,  38,  39,  40,  41,
     42,  43,  44,  45,  46,  47,  48,  49,
     50,  51,  52,  53,  54,  55,  56,  57,
], [
     58,  Z0,  Z0,  Z0,  59,  60,  61,  62,
     63,  Z0,  Z0,  Z0,  64,  65,  66,  67,
     68,  69,  70,  71,  72,  73,  74,  75,
     76,  77,  78,  79,  80,  81,  82,  83,
     84,  85,  86,  87,  88,  89,  90,  91,
     92,  93,  94,  95,  96,  97,  98,  99,
    100, 101, 102, 103, 104, 105, 106, 107,
    108, 109, 110, 111, 112, 113, 114, 115,
], [
    116, 117,  Z0,  Z0,  Z0, 118, 119, 120,
    121, 122,  Z0,  Z0,  Z0, 123, 124, 125,
    126, 127, 128, 129, 130, 131, 132, 133,
    134, 135, 136, 137, 138, 139, 140, 141,
    142, 143, 144, 145, 146, 147, 148, 149,
    150, 151, 152, 153, 154, 155, 156, 157,
    158, 159, 160, 161, 162, 163, 164, 165,
    166, 167, 168, 169, 170, 171, 172, 173,
], [
    174,  Z0,  Z0,  Z0, 175, 176, 177, 178,
    179,  Z0,  Z0,  Z0, 180, 181, 182, 183,
    184,  Z0,  Z0,  Z0, 185, 186, 187, 188,
    189, 190, 191, 192, 193, 194, 195, 196,
    197, 198, 199, 200, 201, 202, 203, 204,
    205, 206, 207, 208, 209, 210, 211, 212,
    213, 214, 215, 216, 217, 218, 219, 220,
    221, 222, 223, 224, 225, 226, 227, 228,
], [
    229, 230,  Z0,  Z0,  Z0, 231, 232, 233,
    234, 235,  Z0,  Z0,  Z0, 236, 237, 238,
    239, 240,  Z0,  Z0,  Z0, 241, 242, 243,
    244, 245, 246, 247, 248, 249, 250, 251,
    252, 253, 254, 255, 256, 257, 258, 259,
    260, 261, 262, 263, 264, 265, 266, 267,
    268, 269, 270, 271, 272, 273, 274, 275,
    276, 277, 278, 279, 280, 281, 282, 283,
], [
    284, 285, 286, 287, 288, 289, 290, 291,
    292, 293,  Z0,  Z0,  Z0, 294, 295, 296,
    297, 298,  Z0,  Z0,  Z0, 299, 300, 301,
    302, 303,  Z0,  Z0,  Z0, 304, 305, 306,
    307, 308, 309, 310, 311, 312, 313, 314,
    315, 316, 317, 318, 319, 320, 321, 322,
    323, 324, 325, 326, 327, 328, 329, 330,
    331, 332, 333, 334, 335, 336, 337, 338,
], [
     Z0,  Z0, 339, 340, 341, 342, 343, 344,
     Z0,  Z0, 345, 346, 347, 348, 349, 350,
     Z0,  Z0, 441, 351, 352, 353, 354, 355,
     Z0,  Z0,  Z0, 442, 356, 357, 358, 359,
     Z0,  Z0,  Z0,  Z0, 443, 360, 361, 362,
     Z0,  Z0,  Z0,  Z0,  Z0, 444, 363, 364,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 445, 365,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 446,
], [
     Z0,  Z0,  Z0, 366, 367, 368, 369, 370,
     Z0,  Z0,  Z0, 371, 372, 373, 374, 375,
     Z0,  Z0,  Z0, 376, 377, 378, 379, 380,
     Z0,  Z0,  Z0, 447, 381, 382, 383, 384,
     Z0,  Z0,  Z0,  Z0, 448, 385, 386, 387,
     Z0,  Z0,  Z0,  Z0,  Z0, 449, 388, 389,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 450, 390,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 451,
], [
    452, 391, 392, 393, 394, 395, 396, 397,
     Z0,  Z0,  Z0,  Z0, 398, 399, 400, 401,
     Z0,  Z0,  Z0,  Z0, 402, 403, 404, 405,
     Z0,  Z0,  Z0,  Z0, 406, 407, 408, 409,
     Z0,  Z0,  Z0,  Z0, 453, 410, 411, 412,
     Z0,  Z0,  Z0,  Z0,  Z0, 454, 413, 414,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 455, 415,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 456,
], [
    457, 416, 417, 418, 419, 420, 421, 422,
     Z0, 458, 423, 424, 425, 426, 427, 428,
     Z0,  Z0,  Z0,  Z0,  Z0, 429, 430, 431,
     Z0,  Z0,  Z0,  Z0,  Z0, 432, 433, 434,
     Z0,  Z0,  Z0,  Z0,  Z0, 435, 436, 437,
     Z0,  Z0,  Z0,  Z0,  Z0, 459, 438, 439,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 460, 440,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 461,
]];

/// Encoding of a pair of identical pieces.
#[rustfmt::skip]
const PP_IDX: [[u64; 64]; 10] = [[
      0,  Z0,   1,   2,   3,   4,   5,   6,
      7,   8,   9,  10,  11,  12,  13,  14,
     15,  16,  17,  18,  19,  20,  21,  22,
     23,  24,  25,  26,  27,  28,  29,  30,
     31,  32,  33,  34,  35,  36,  37,  38,
     39,  40,  41,  42,  43,  44,  45,  46,
     Z0,  47,  48,  49,  50,  51,  52,  53,
     54,  55,  56,  57,  58,  59,  60,  61,
], [
     62,  Z0,  Z0,  63,  64,  65,  Z0,  66,
     Z0,  67,  68,  69,  70,  71,  72,  Z0,
     73,  74,  75,  76,  77,  78,  79,  80,
     81,  82,  83,  84,  85,  86,  87,  88,
     89,  90,  91,  92,  93,  94,  95,  96,
     Z0,  97,  98,  99, 100, 101, 102, 103,
     Z0, 104, 105, 106, 107, 108, 109,  Z0,
    110,  Z0, 111, 112, 113, 114,  Z0, 115,
], [
    116,  Z0,  Z0,  Z0, 117,  Z0,  Z0, 118,
     Z0, 119, 120, 121, 122, 123, 124,  Z0,
     Z0, 125, 126, 127, 128, 129, 130,  Z0,
    131, 132, 133, 134, 135, 136, 137, 138,
     Z0, 139, 140, 141, 142, 143, 144, 145,
     Z0, 146, 147, 148, 149, 150, 151,  Z0,
     Z0, 152, 153, 154, 155, 156, 157,  Z0,
    158,  Z0,  Z0, 159, 160,  Z0,  Z0, 161,
], [
    162,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 163,
     Z0, 164,  Z0, 165, 166, 167, 168,  Z0,
     Z0, 169, 170, 171, 172, 173, 174,  Z0,
     Z0, 175, 176, 177, 178, 179, 180,  Z0,
     Z0, 181, 182, 183, 184, 185, 186,  Z0,
     Z0,  Z0, 187, 188, 189, 190, 191,  Z0,
     Z0, 192, 193, 194, 195, 196, 197,  Z0,
    198,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 199,
], [
    200,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 201,
     Z0, 202,  Z0,  Z0, 203,  Z0, 204,  Z0,
     Z0,  Z0, 205, 206, 207, 208,  Z0,  Z0,
     Z0, 209, 210, 211, 212, 213, 214,  Z0,
     Z0,  Z0, 215, 216, 217, 218, 219,  Z0,
     Z0,  Z0, 220, 221, 222, 223,  Z0,  Z0,
     Z0, 224,  Z0, 225, 226,  Z0, 227,  Z0,
    228,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 229,
], [
    230,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 231,
     Z0, 232,  Z0,  Z0,  Z0,  Z0, 233,  Z0,
     Z0,  Z0, 234,  Z0, 235, 236,  Z0,  Z0,
     Z0,  Z0, 237, 238, 239, 240,  Z0,  Z0,
     Z0,  Z0,  Z0, 241, 242, 243,  Z0,  Z0,
     Z0,  Z0, 244, 245, 246, 247,  Z0,  Z0,
     Z0, 248,  Z0,  Z0,  Z0,  Z0, 249,  Z0,
    250,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 251,
], [
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 259,
     Z0, 252,  Z0,  Z0,  Z0,  Z0, 260,  Z0,
     Z0,  Z0, 253,  Z0,  Z0, 261,  Z0,  Z0,
     Z0,  Z0,  Z0, 254, 262,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0, 255,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0, 256,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 257,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 258,
], [
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 268,  Z0,
     Z0,  Z0, 263,  Z0,  Z0, 269,  Z0,  Z0,
     Z0,  Z0,  Z0, 264, 270,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0, 265,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0, 266,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0, 267,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
], [
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0, 274,  Z0,  Z0,
     Z0,  Z0,  Z0, 271, 275,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0, 272,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0, 273,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
], [
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0, 277,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0, 276,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,
     Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0,  Z0
]];

/// The a5-a7-c5 triangle.
const TEST45: Bitboard = Bitboard(0x1_0307_0000_0000);

lazy_static::lazy_static! {
    static ref CONSTS: Consts = Consts::new();
}

struct Consts {
    mult_idx: [[u64; 10]; 5],
    mult_factor: [u64; 5],

    map_pawns: [u64; 64],
    lead_pawn_idx: [[u64; 64]; 6],
    lead_pawns_size: [[u64; 4]; 6],
}

impl Consts {
    fn new() -> Consts {
        let mut mult_idx = [[0; 10]; 5];
        let mut mult_factor = [0; 5];

        for i in 0..5 {
            let mut s = 0;
            for j in 0..10 {
                mult_idx[i][j] = s;
                s += if i == 0 {
                    1
                } else {
                    binomial(MULT_TWIST[INV_TRIANGLE[j]], i as u64)
                };
            }
            mult_factor[i] = s;
        }

        let mut available_squares = 48;

        let mut map_pawns = [0; 64];
        let mut lead_pawn_idx = [[0; 64]; 6];
        let mut lead_pawns_size = [[0; 4]; 6];

        for lead_pawns_cnt in 1..=5 {
            for file in 0..4 {
                let mut idx = 0;

                for rank in 1..7 {
                    let sq = file + 8 * rank;
                    if lead_pawns_cnt == 1 {
                        available_squares -= 1;
                        map_pawns[sq] = available_squares;
                        available_squares -= 1;
                        map_pawns[sq ^ 0x7] = available_squares; // horizontal mirror
                    }
                    lead_pawn_idx[lead_pawns_cnt][sq] = idx;
                    idx += binomial(map_pawns[sq], lead_pawns_cnt as u64 - 1);
                }

                lead_pawns_size[lead_pawns_cnt][file] = idx;
            }
        }

        Consts {
            mult_idx,
            mult_factor,
            map_pawns,
            lead_pawn_idx,
            lead_pawns_size,
        }
    }
}

/// Checks if a square is off the a1-h8 diagonal.
fn offdiag(sq: Square) -> bool {
    sq.file() as u32 != sq.rank() as u32
}

/// Header nibble to piece.
fn byte_to_piece(p: u8) -> Option<Piece> {
    let color = Color::from_white(p & 8 == 0);
    Some(match p & !8 {
        1 => Role::Pawn.of(color),
        2 => Role::Knight.of(color),
        3 => Role::Bishop.of(color),
        4 => Role::Rook.of(color),
        5 => Role::Queen.of(color),
        6 => Role::King.of(color),
        _ => return None,
    })
}

/// Parses a piece list from the table header. Each byte holds the piece
/// code of one side in the low nibble and of the other side in the high
/// nibble.
fn parse_pieces(mapping: &Mapping, ptr: u64, count: usize, side: Color) -> SyzygyResult<Pieces> {
    let mut buffer = [0; MAX_PIECES];
    let bytes = &mut buffer[..count];
    mapping.read_into(ptr, bytes)?;

    let mut pieces = Pieces::new();
    for p in bytes {
        pieces.push(u!(byte_to_piece(side.fold_wb(*p & 0xf, *p >> 4))));
    }

    Ok(pieces)
}

/// Group pieces that will be encoded together.
fn group_pieces(pieces: &Pieces, material: &Material) -> ArrayVec<usize, MAX_PIECES> {
    let mut result = ArrayVec::new();

    // For positions without pawns: If there are at least 3 unique pieces
    // then 3 unique pieces form the leading group. Otherwise the two kings
    // (or a pair of like pieces) do.
    let first_len = if material.has_pawns() {
        0
    } else if material.unique_pieces() >= 3 {
        3
    } else if material.unique_pieces() == 2 {
        2
    } else {
        usize::from(material.min_like_man())
    };

    if first_len > 0 {
        result.push(first_len);
    }

    // The remaining identical pieces are grouped together.
    result.extend(
        pieces
            .iter()
            .skip(first_len)
            .group_by(|p| **p)
            .into_iter()
            .map(|(_, g)| g.count()),
    );

    result
}

/// Description of the encoding used for a piece configuration.
#[derive(Debug, Clone)]
struct GroupData {
    pieces: Pieces,
    material: Material,
    lens: ArrayVec<usize, MAX_PIECES>,
    factors: ArrayVec<u64, { MAX_PIECES + 1 }>,
}

impl GroupData {
    fn new<S: Syzygy>(pieces: Pieces, order: [u8; 2], file: usize) -> SyzygyResult<GroupData> {
        ensure!(pieces.len() >= 2);

        let material = Material::from_iter(pieces.iter().copied());

        // Compute group lengths.
        let lens = group_pieces(&pieces, &material);

        // Compute a factor for each group. If the pieces in a group g can
        // be combined on the board in N(g) different ways, the encoding is
        // the Horner evaluation g1 * N(g2) * N(g3) + g2 * N(g3) + g3. The
        // order of the groups is a per-table parameter: the leading group
        // sits at order[0] and the remaining pawns, when present, at
        // order[1].
        let pp = material.white.has_pawns() && material.black.has_pawns();
        let mut factors = ArrayVec::from([0; MAX_PIECES + 1]);
        factors.truncate(lens.len() + 1);
        let mut free_squares = 64 - lens[0] - if pp { lens[1] } else { 0 };
        let mut next = if pp { 2 } else { 1 };
        let mut idx = 1;
        let mut k = 0;

        while next < lens.len() || k == order[0] || k == order[1] {
            if k == order[0] {
                // Leading pawns or pieces.
                factors[0] = idx;

                if material.has_pawns() {
                    idx *= u!(CONSTS.lead_pawns_size.get(lens[0]))[file];
                } else if material.unique_pieces() >= 3 {
                    idx *= 31_332;
                } else if material.unique_pieces() == 2 {
                    idx *= if S::CONNECTED_KINGS { 518 } else { 462 };
                } else if material.min_like_man() == 2 {
                    idx *= 278;
                } else {
                    idx *= u!(CONSTS
                        .mult_factor
                        .get(usize::from(material.min_like_man()).wrapping_sub(1)));
                }
            } else if k == order[1] {
                // Remaining pawns.
                factors[1] = idx;
                idx *= binomial(48 - lens[0] as u64, lens[1] as u64);
            } else {
                // Remaining pieces.
                factors[next] = idx;
                idx *= binomial(free_squares as u64, lens[next] as u64);
                free_squares -= lens[next];
                next += 1;
            }
            k += 1;
        }

        factors[lens.len()] = idx;

        Ok(GroupData {
            pieces,
            material,
            lens,
            factors,
        })
    }
}

/// Indexes into the table of remapped DTZ values.
#[derive(Debug)]
enum DtzMap {
    /// Normal 8-bit DTZ map.
    Normal { map_ptr: u64, by_wdl: [u16; 4] },
    /// Wide 16-bit DTZ map for very long endgames.
    Wide { map_ptr: u64, by_wdl: [u16; 4] },
}

impl DtzMap {
    fn read(&self, mapping: &Mapping, wdl: Wdl, value: u16) -> SyzygyResult<u16> {
        let wdl = match wdl {
            Wdl::Win => 0,
            Wdl::Loss => 1,
            Wdl::CursedWin => 2,
            Wdl::BlessedLoss => 3,
            Wdl::Draw => throw!(),
        };

        Ok(match *self {
            DtzMap::Normal { map_ptr, by_wdl } => {
                let offset = map_ptr + u64::from(by_wdl[wdl]) + u64::from(value);
                u16::from(mapping.read_u8(offset)?)
            }
            DtzMap::Wide { map_ptr, by_wdl } => {
                let offset = map_ptr + 2 * (u64::from(by_wdl[wdl]) + u64::from(value));
                mapping.read_u16_le(offset)?
            }
        })
    }
}

/// Description of the encoding and compression of one sub-table.
#[derive(Debug)]
struct PairsData {
    /// Encoding flags.
    flags: Flag,
    /// Piece configuration encoding info.
    groups: GroupData,

    /// Block size in bytes.
    block_size: u32,
    /// About every span values there is a sparse index entry.
    span: u32,
    /// Number of blocks in the table.
    blocks_num: u32,

    /// Offset of the symbol table.
    btree: u64,
    /// Minimum length in bits of the Huffman symbols. For single-value
    /// tables this holds the value instead.
    min_symlen: u8,
    /// Offset of the lowest symbols for each length.
    lowest_sym: u64,
    /// 64-bit padded lowest symbols for each length.
    base: Vec<u64>,
    /// Number of values (minus one) represented by a given Huffman symbol.
    symlen: Vec<u8>,

    /// Offset of the sparse index.
    sparse_index: u64,
    /// Size of the sparse index.
    sparse_index_size: u32,

    /// Offset of the block length table.
    block_lengths: u64,
    /// Size of the block length table, padded to be bigger than
    /// `blocks_num`.
    block_length_size: u32,

    /// Start of compressed data.
    data: u64,

    /// DTZ mapping.
    dtz_map: Option<DtzMap>,
}

impl PairsData {
    fn parse<S: Syzygy, T: TableTag>(
        mapping: &Mapping,
        mut ptr: u64,
        groups: GroupData,
    ) -> SyzygyResult<(PairsData, u64)> {
        let flags = Flag::from_bits_truncate(mapping.read_u8(ptr)?);

        if flags.contains(Flag::SINGLE_VALUE) {
            let single_value = if T::METRIC == Metric::Wdl {
                mapping.read_u8(ptr + 1)?
            } else if S::CAPTURES_COMPULSORY {
                1 // Losing captures are still forced in antichess.
            } else {
                0
            };

            return Ok((
                PairsData {
                    flags,
                    min_symlen: single_value,
                    groups,
                    base: Vec::new(),
                    block_lengths: 0,
                    block_length_size: 0,
                    block_size: 0,
                    blocks_num: 0,
                    btree: 0,
                    data: 0,
                    lowest_sym: 0,
                    span: 0,
                    sparse_index: 0,
                    sparse_index_size: 0,
                    symlen: Vec::new(),
                    dtz_map: None,
                },
                ptr + 2,
            ));
        }

        // Read header.
        let mut header = [0; 10];
        mapping.read_into(ptr, &mut header)?;

        let tb_size = groups.factors[groups.lens.len()];
        let block_size = u!(1u32.checked_shl(u32::from(header[1])));
        ensure!(block_size <= MAX_BLOCK_SIZE);
        let span = u!(1u32.checked_shl(u32::from(header[2])));
        let sparse_index_size = ((tb_size + u64::from(span) - 1) / u64::from(span)) as u32;
        let padding = header[3];
        let blocks_num = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let block_length_size = u!(blocks_num.checked_add(u32::from(padding)));

        let max_symlen = header[8];
        let min_symlen = header[9];
        ensure!(max_symlen >= min_symlen);
        ensure!(max_symlen <= 32);
        let h = usize::from(max_symlen - min_symlen + 1);

        let lowest_sym = ptr + 10;

        // The canonical Huffman code is ordered such that longer symbols
        // (in terms of the number of bits of their code) have lower numeric
        // value, so lowest_sym[i] >= lowest_sym[i + 1]. From this, compute
        // base[], indexed by symbol length, so that for any symbol s64 of
        // length l right-padded to 64 bits base[l - 1] >= s64 >= base[l].
        let mut base = vec![0u64; h];
        for i in (0..h - 1).rev() {
            let ptr = lowest_sym + i as u64 * 2;

            base[i] = u!(u!(base[i + 1]
                .checked_add(u64::from(mapping.read_u16_le(ptr)?)))
            .checked_sub(u64::from(mapping.read_u16_le(ptr + 2)?)))
                / 2;

            ensure!(base[i] * 2 >= base[i + 1]);
        }

        for i in 0..h {
            base[i] = u!(base[i].checked_shl(64 - (u32::from(min_symlen) + i as u32)));
        }

        // Initialize symlen by recursively expanding the symbol pairs.
        ptr += 10 + h as u64 * 2;
        let sym = mapping.read_u16_le(ptr)?;
        ptr += 2;
        let btree = ptr;
        let mut symlen = vec![0; usize::from(sym)];
        let mut visited = BitVec::from_elem(symlen.len(), false);
        for s in 0..sym {
            read_symlen(mapping, btree, &mut symlen, &mut visited, s, 256)?;
        }
        ptr += symlen.len() as u64 * 3 + (symlen.len() as u64 & 1);

        Ok((
            PairsData {
                flags,
                groups,

                block_size,
                span,
                blocks_num,

                btree,
                min_symlen,
                lowest_sym,
                base,
                symlen,

                sparse_index: 0, // to be initialized later
                sparse_index_size,

                block_lengths: 0, // to be initialized later
                block_length_size,

                data: 0, // to be initialized later

                dtz_map: None, // to be initialized later
            },
            ptr,
        ))
    }
}

/// Builds the symlen table. In recursive pairing each symbol represents a
/// pair of child symbols, expanded until the leaves that carry the values.
/// The tree in a valid table is acyclic; the depth limit keeps corrupt
/// tables from overflowing the stack.
fn read_symlen(
    mapping: &Mapping,
    btree: u64,
    symlen: &mut Vec<u8>,
    visited: &mut BitVec,
    sym: u16,
    depth: u16,
) -> SyzygyResult<()> {
    if u!(visited.get(usize::from(sym))) {
        return Ok(());
    }

    visited.set(usize::from(sym), true);
    ensure!(depth > 0);

    let (left, right) = mapping.read_lr(btree + 3 * u64::from(sym))?;

    if right == 0xfff {
        symlen[usize::from(sym)] = 0;
    } else {
        ensure!(usize::from(left) < symlen.len());
        ensure!(usize::from(right) < symlen.len());
        read_symlen(mapping, btree, symlen, visited, left, depth - 1)?;
        read_symlen(mapping, btree, symlen, visited, right, depth - 1)?;
        symlen[usize::from(sym)] = u!(symlen[usize::from(left)]
            .checked_add(symlen[usize::from(right)])
            .and_then(|s| s.checked_add(1)));
    }

    Ok(())
}

/// Description of the encoding and compression for both sides of a table.
#[derive(Debug)]
struct FileData {
    sides: ArrayVec<PairsData, 2>,
}

/// A Syzygy table.
#[derive(Debug)]
pub struct Table<T: TableTag, S: Position + Syzygy> {
    metric: PhantomData<T>,
    syzygy: PhantomData<S>,

    mapping: Mapping,

    num_unique_pieces: u8,
    min_like_man: u8,
    files: ArrayVec<FileData, 4>,
}

impl<T: TableTag, S: Position + Syzygy> Table<T, S> {
    /// Parses the table header, the headers of the sub-tables and prepares
    /// the metadata required for decompression. The magic bytes have
    /// already been validated by the mapper.
    pub fn new(mapping: Mapping, material: &Material) -> SyzygyResult<Table<T, S>> {
        ensure!(material.count() <= MAX_PIECES);

        // Read layout flags.
        let layout = Layout::from_bits_truncate(mapping.read_u8(4)?);
        let has_pawns = layout.contains(Layout::HAS_PAWNS);
        let split = layout.contains(Layout::SPLIT);

        // Check consistency of layout and material key.
        ensure!(has_pawns == material.has_pawns());
        ensure!(split != material.is_symmetric());

        // Read group data.
        let pp = material.white.has_pawns() && material.black.has_pawns();
        let num_files = if has_pawns { 4 } else { 1 };
        let num_sides = if T::METRIC == Metric::Wdl && !material.is_symmetric() {
            2
        } else {
            1
        };

        let mut groups: ArrayVec<ArrayVec<GroupData, 2>, 4> = ArrayVec::new();
        let mut ptr = 5;

        for file in 0..num_files {
            let mut sides = ArrayVec::new();

            let order = [
                [
                    mapping.read_u8(ptr)? & 0xf,
                    if pp { mapping.read_u8(ptr + 1)? & 0xf } else { 0xf },
                ],
                [
                    mapping.read_u8(ptr)? >> 4,
                    if pp { mapping.read_u8(ptr + 1)? >> 4 } else { 0xf },
                ],
            ];

            ptr += 1 + u64::from(pp);

            for side in [Color::White, Color::Black].into_iter().take(num_sides) {
                let pieces = parse_pieces(&mapping, ptr, material.count(), side)?;
                let key = Material::from_iter(pieces.iter().copied());
                ensure!(key == *material || key.flipped() == *material);

                let group = GroupData::new::<S>(pieces, order[side.fold_wb(0, 1)], file)?;
                sides.push(group);
            }

            ptr += material.count() as u64;

            groups.push(sides);
        }

        ptr += ptr & 1;

        // Ensure the reference pawn goes first.
        ensure!((groups[0][0].pieces[0].role == Role::Pawn) == has_pawns);

        // Setup pairs.
        let mut files: ArrayVec<FileData, 4> = ArrayVec::new();

        for f in 0..num_files {
            let mut sides = ArrayVec::new();

            for side in 0..num_sides {
                let group = groups[f][side].clone();
                let (pairs, next_ptr) = PairsData::parse::<S, T>(&mapping, ptr, group)?;

                sides.push(pairs);
                ptr = next_ptr;
            }

            files.push(FileData { sides });
        }

        // Setup DTZ map.
        if T::METRIC == Metric::Dtz {
            let map_ptr = ptr;

            for file in &mut files {
                if file.sides[0].flags.contains(Flag::MAPPED) {
                    let mut by_wdl = [0; 4];
                    if file.sides[0].flags.contains(Flag::WIDE_DTZ) {
                        ptr += ptr & 1; // Word alignment. Tables may be mixed.
                        for idx in &mut by_wdl {
                            *idx = u!(u16::try_from((ptr - map_ptr + 2) / 2).ok());
                            ptr += u64::from(mapping.read_u16_le(ptr)?) * 2 + 2;
                        }
                        file.sides[0].dtz_map = Some(DtzMap::Wide { map_ptr, by_wdl });
                    } else {
                        for idx in &mut by_wdl {
                            *idx = u!(u16::try_from(ptr - map_ptr + 1).ok());
                            ptr += u64::from(mapping.read_u8(ptr)?) + 1;
                        }
                        file.sides[0].dtz_map = Some(DtzMap::Normal { map_ptr, by_wdl });
                    }
                }
            }

            ptr += ptr & 1;
        }

        // Setup sparse index.
        for file in &mut files {
            for side in &mut file.sides {
                side.sparse_index = ptr;
                ptr += u64::from(side.sparse_index_size) * 6;
            }
        }

        for file in &mut files {
            for side in &mut file.sides {
                side.block_lengths = ptr;
                ptr += u64::from(side.block_length_size) * 2;
            }
        }

        for file in &mut files {
            for side in &mut file.sides {
                ptr = (ptr + 0x3f) & !0x3f; // 64 byte alignment
                side.data = ptr;
                ptr = u!(ptr.checked_add(
                    u64::from(side.blocks_num) * u64::from(side.block_size)
                ));
            }
        }

        // The data regions must not extend beyond the mapping.
        ensure!(ptr <= mapping.len() as u64 + 0x3f);

        Ok(Table {
            metric: PhantomData,
            syzygy: PhantomData,
            mapping,
            num_unique_pieces: material.unique_pieces(),
            min_like_man: material.min_like_man(),
            files,
        })
    }

    /// Retrieves the value stored for `idx` by decompressing the Huffman
    /// coded symbols stored in the corresponding block of the table.
    fn decompress_pairs(&self, d: &PairsData, idx: u64) -> SyzygyResult<u8> {
        // Special case: The table stores only a single value.
        if d.flags.contains(Flag::SINGLE_VALUE) {
            return Ok(d.min_symlen);
        }

        // Use the sparse index to jump very close to the correct block.
        let k = idx / u64::from(d.span);

        let mut block = u64::from(self.mapping.read_u32_le(d.sparse_index + 6 * k)?);
        let mut offset = i64::from(self.mapping.read_u16_le(d.sparse_index + 6 * k + 4)?);

        let diff = idx as i64 % i64::from(d.span) - i64::from(d.span) / 2;
        offset += diff;

        // Now move backwards/forwards to find the correct block.
        while offset < 0 {
            block = u!(block.checked_sub(1));
            offset += i64::from(self.mapping.read_u16_le(d.block_lengths + block * 2)?) + 1;
        }

        while offset > i64::from(self.mapping.read_u16_le(d.block_lengths + block * 2)?) {
            offset -= i64::from(self.mapping.read_u16_le(d.block_lengths + block * 2)?) + 1;
            block += 1;
        }

        let mut ptr = d.data + block * u64::from(d.block_size);

        // Read the first 64 bits of the block. This is a truncated
        // sequence of symbols of unknown lengths, but the first one starts
        // at the beginning of those 64 bits.
        let mut buf = self.mapping.read_u64_be(ptr)?;
        ptr += 8;
        let mut buf_size = 64;

        let mut sym;

        loop {
            let mut len = 0;

            // For any symbol of length l (in excess of the minimum length)
            // right-padded to 64 bits, base[l - 1] >= symbol >= base[l].
            while buf < *u!(d.base.get(len)) {
                len += 1;
            }

            // Symbols of a given length are consecutive integers, so the
            // value above the lowest symbol of this length identifies it.
            sym = ((buf - d.base[len]) >> (64 - len - usize::from(d.min_symlen))) as u16;
            sym += self.mapping.read_u16_le(d.lowest_sym + 2 * len as u64)?;

            // If the offset is within the number of values represented by
            // this symbol, we are done.
            if offset < i64::from(*u!(d.symlen.get(usize::from(sym)))) + 1 {
                break;
            }

            // Otherwise, skip the symbol and continue.
            offset -= i64::from(d.symlen[usize::from(sym)]) + 1;
            len += usize::from(d.min_symlen);
            buf <<= len;
            buf_size -= len;

            // Refill the buffer.
            if buf_size <= 32 {
                buf_size += 32;
                buf |= u64::from(self.mapping.read_u32_be(ptr)?) << (64 - buf_size);
                ptr += 4;
            }
        }

        // Expand the symbol by binary search over its children until
        // reaching the leaf that stores the value.
        while *u!(d.symlen.get(usize::from(sym))) != 0 {
            let (left, right) = self.mapping.read_lr(d.btree + 3 * u64::from(sym))?;

            if offset < i64::from(*u!(d.symlen.get(usize::from(left)))) + 1 {
                sym = left;
            } else {
                offset -= i64::from(d.symlen[usize::from(left)]) + 1;
                sym = right;
            }
        }

        self.mapping.read_u8(d.btree + 3 * u64::from(sym))
    }

    /// Given a position, determines the sub-table and the unique (modulo
    /// symmetries) index into it. Returns `None` when a DTZ table stores
    /// the other side to move.
    fn encode(&self, pos: &S) -> SyzygyResult<Option<(&PairsData, u64)>> {
        let key = Material::from_board(pos.board());
        let material = &self.files[0].sides[0].groups.material;
        ensure!(key == *material || key == material.flipped());

        let symmetric_btm = material.is_symmetric() && pos.turn() == Color::Black;
        let black_stronger = key != *material;
        let flip = symmetric_btm || black_stronger;
        let bside = (pos.turn() == Color::Black) ^ flip;

        let mut squares: ArrayVec<Square, MAX_PIECES> = ArrayVec::new();
        let mut used = Bitboard(0);

        // For pawns there are sub-tables for each file (a, b, c, d) the
        // leading pawn can be placed on. The leading pawn is the one with
        // maximum map_pawns value, the pawn nearest the edge and, among
        // pawns of the same file, the one with the lowest rank.
        let file = if material.has_pawns() {
            let reference_pawn = self.files[0].sides[0].groups.pieces[0];
            ensure!(reference_pawn.role == Role::Pawn);
            let color = if flip {
                !reference_pawn.color
            } else {
                reference_pawn.color
            };

            let lead_pawns = pos.board().pawns() & pos.board().by_color(color);
            used |= lead_pawns;
            squares.extend(
                lead_pawns
                    .into_iter()
                    .map(|sq| if flip { sq.flip_vertical() } else { sq }),
            );

            // Ensure squares[0] is the maximum with regard to map_pawns.
            for i in 1..squares.len() {
                if CONSTS.map_pawns[squares[0] as usize] < CONSTS.map_pawns[squares[i] as usize] {
                    squares.swap(0, i);
                }
            }

            if squares[0].file() >= File::E {
                7 - squares[0].file() as usize
            } else {
                squares[0].file() as usize
            }
        } else {
            0
        };

        // WDL tables have sub-tables for each side to move.
        let side = &self.files[file].sides[if bside {
            self.files[file].sides.len() - 1
        } else {
            0
        }];

        // DTZ tables store only one side to move. It is possible that we
        // have to check the other side (by doing a 1-ply search).
        if T::METRIC == Metric::Dtz
            && side.flags.contains(Flag::STM) != bside
            && (!material.is_symmetric() || material.has_pawns())
        {
            return Ok(None);
        }

        // The sub-table has been determined. Add the remaining pieces in
        // the order prescribed by the sub-table's piece sequence.
        let lead_pawns_count = squares.len();

        for piece in side.groups.pieces.iter().skip(lead_pawns_count) {
            let color = if flip { !piece.color } else { piece.color };
            let square = u!((pos.board().by_piece(piece.role.of(color)) & !used).first());
            squares.push(if flip { square.flip_vertical() } else { square });
            used |= Bitboard::from(square);
        }

        ensure!(squares.len() >= 2);

        // Now map the squares such that the leading square is in the
        // a1-d1-d4 triangle (pawn tables: the a-d files).
        if squares[0].file() >= File::E {
            for square in &mut squares {
                *square = square.flip_horizontal();
            }
        }

        let mut idx = if material.has_pawns() {
            let mut idx = CONSTS.lead_pawn_idx[lead_pawns_count][squares[0] as usize];

            squares[1..lead_pawns_count].sort_unstable_by_key(|sq| CONSTS.map_pawns[*sq as usize]);

            for i in 1..lead_pawns_count {
                idx += binomial(CONSTS.map_pawns[squares[i] as usize], i as u64);
            }

            idx
        } else {
            // Flip the squares to ensure the leading piece is below rank 5.
            if squares[0].rank() >= Rank::Fifth {
                for square in &mut squares {
                    *square = square.flip_vertical();
                }
            }

            // Look for the first piece of the leading group off the a1-h8
            // diagonal and ensure it is mapped below the diagonal.
            for i in 0..side.groups.lens[0] {
                if !offdiag(squares[i]) {
                    continue;
                }

                if squares[i].rank() as u32 > squares[i].file() as u32 {
                    for square in &mut squares[i..] {
                        *square = square.flip_diagonal();
                    }
                }

                break;
            }

            if self.num_unique_pieces > 2 {
                let adjust1 = u64::from(squares[1] > squares[0]);
                let adjust2 =
                    u64::from(squares[2] > squares[0]) + u64::from(squares[2] > squares[1]);

                // MapA1D1D4 (the triangle table) maps the b1-d1-d3 wedge to
                // 0..=5 and the a1-d4 diagonal to 6..=9. Bigger indices are
                // the remaining squares mapped down by the pieces that come
                // earlier.
                if offdiag(squares[0]) {
                    TRIANGLE[squares[0] as usize] * 63 * 62
                        + (squares[1] as u64 - adjust1) * 62
                        + (squares[2] as u64 - adjust2)
                } else if offdiag(squares[1]) {
                    6 * 63 * 62
                        + squares[0].rank() as u64 * 28 * 62
                        + LOWER[squares[1] as usize] * 62
                        + squares[2] as u64
                        - adjust2
                } else if offdiag(squares[2]) {
                    6 * 63 * 62
                        + 4 * 28 * 62
                        + squares[0].rank() as u64 * 7 * 28
                        + (squares[1].rank() as u64 - adjust1) * 28
                        + LOWER[squares[2] as usize]
                } else {
                    6 * 63 * 62
                        + 4 * 28 * 62
                        + 4 * 7 * 28
                        + squares[0].rank() as u64 * 7 * 6
                        + (squares[1].rank() as u64 - adjust1) * 6
                        + (squares[2].rank() as u64 - adjust2)
                }
            } else if self.num_unique_pieces == 2 {
                if S::CONNECTED_KINGS {
                    let adjust = u64::from(squares[1] > squares[0]);

                    if offdiag(squares[0]) {
                        TRIANGLE[squares[0] as usize] * 63 + (squares[1] as u64 - adjust)
                    } else if offdiag(squares[1]) {
                        6 * 63 + squares[0].rank() as u64 * 28 + LOWER[squares[1] as usize]
                    } else {
                        6 * 63
                            + 4 * 28
                            + squares[0].rank() as u64 * 7
                            + (squares[1].rank() as u64 - adjust)
                    }
                } else {
                    KK_IDX[TRIANGLE[squares[0] as usize] as usize][squares[1] as usize]
                }
            } else if self.min_like_man == 2 {
                if TRIANGLE[squares[0] as usize] > TRIANGLE[squares[1] as usize] {
                    squares.swap(0, 1);
                }

                if squares[0].file() >= File::E {
                    for square in &mut squares {
                        *square = square.flip_horizontal();
                    }
                }

                if squares[0].rank() >= Rank::Fifth {
                    for square in &mut squares {
                        *square = square.flip_vertical();
                    }
                }

                if squares[0].rank() as u32 > squares[0].file() as u32
                    || (!offdiag(squares[0])
                        && squares[1].rank() as u32 > squares[1].file() as u32)
                {
                    for square in &mut squares {
                        *square = square.flip_diagonal();
                    }
                }

                if TEST45.contains(squares[1])
                    && TRIANGLE[squares[0] as usize] == TRIANGLE[squares[1] as usize]
                {
                    squares.swap(0, 1);

                    for square in &mut squares {
                        *square = square.flip_vertical().flip_diagonal();
                    }
                }

                PP_IDX[TRIANGLE[squares[0] as usize] as usize][squares[1] as usize]
            } else {
                for i in 1..side.groups.lens[0] {
                    if TRIANGLE[squares[0] as usize] > TRIANGLE[squares[i] as usize] {
                        squares.swap(0, i);
                    }
                }

                if squares[0].file() >= File::E {
                    for square in &mut squares {
                        *square = square.flip_horizontal();
                    }
                }

                if squares[0].rank() >= Rank::Fifth {
                    for square in &mut squares {
                        *square = square.flip_vertical();
                    }
                }

                if squares[0].rank() as u32 > squares[0].file() as u32 {
                    for square in &mut squares {
                        *square = square.flip_diagonal();
                    }
                }

                for i in 1..side.groups.lens[0] {
                    for j in (i + 1)..side.groups.lens[0] {
                        if MULT_TWIST[squares[i] as usize] > MULT_TWIST[squares[j] as usize] {
                            squares.swap(i, j);
                        }
                    }
                }

                let mut idx = CONSTS.mult_idx[side.groups.lens[0] - 1]
                    [TRIANGLE[squares[0] as usize] as usize];
                for i in 1..side.groups.lens[0] {
                    idx += binomial(MULT_TWIST[squares[i] as usize], i as u64);
                }

                idx
            }
        };

        idx *= side.groups.factors[0];

        // Encode remaining pawns, then the other pieces, in ascending
        // square order per group. A square is mapped down when it comes
        // later than a square of a previous group.
        let mut remaining_pawns =
            material.white.has_pawns() && material.black.has_pawns();
        let mut next = 1;
        let mut group_sq = side.groups.lens[0];
        for lens in side.groups.lens.iter().copied().skip(1) {
            let (prev_squares, group_squares) = squares.split_at_mut(group_sq);
            let group_squares = &mut group_squares[..lens];
            group_squares.sort_unstable();

            let mut n = 0;

            for i in 0..lens {
                let adjust = prev_squares[..group_sq]
                    .iter()
                    .filter(|sq| group_squares[i] > **sq)
                    .count() as u64;
                n += binomial(
                    group_squares[i] as u64 - adjust - if remaining_pawns { 8 } else { 0 },
                    i as u64 + 1,
                );
            }

            remaining_pawns = false;
            idx += n * side.groups.factors[next];
            group_sq += side.groups.lens[next];
            next += 1;
        }

        ensure!(idx < side.groups.factors[side.groups.lens.len()]);

        Ok(Some((side, idx)))
    }
}

impl<S: Position + Syzygy> Table<WdlTag, S> {
    /// Probes a WDL table.
    pub fn probe_wdl(&self, pos: &S) -> SyzygyResult<Wdl> {
        let (side, idx) = u!(self.encode(pos)?);

        Ok(match self.decompress_pairs(side, idx)? {
            0 => Wdl::Loss,
            1 => Wdl::BlessedLoss,
            2 => Wdl::Draw,
            3 => Wdl::CursedWin,
            4 => Wdl::Win,
            _ => throw!(),
        })
    }
}

impl<S: Position + Syzygy> Table<DtzTag, S> {
    /// Probes a DTZ table, given the WDL value of the position.
    ///
    /// Returns the (always positive) number of plies to the next zeroing
    /// move, or `None` when the table stores the other side to move.
    pub fn probe_dtz(&self, pos: &S, wdl: Wdl) -> SyzygyResult<Option<i32>> {
        let (side, idx) = match self.encode(pos)? {
            Some(found) => found,
            None => return Ok(None), // check other side
        };

        let value = self.decompress_pairs(side, idx)?;

        // DTZ values are remapped by frequency of occurrence per WDL class.
        let value = i32::from(match side.dtz_map {
            Some(ref map) => map.read(&self.mapping, wdl, u16::from(value))?,
            None => u16::from(value),
        });

        // The table may store the distance in full moves. Return plies.
        let stores_plies = match wdl {
            Wdl::Win => side.flags.contains(Flag::WIN_PLIES),
            Wdl::Loss => side.flags.contains(Flag::LOSS_PLIES),
            Wdl::CursedWin | Wdl::BlessedLoss => false,
            Wdl::Draw => false,
        };

        Ok(Some(if stores_plies { value } else { value * 2 } + 1))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use shakmaty::Chess;

    use super::*;
    use crate::filesystem::TbFile;

    pub const KNVK_RTBW: &[u8] = &[
        0x71, 0xe8, 0x23, 0x5d, 0x31, 0x00, 0xee, 0x66, 0x22, 0x00, 0x80, 0x02, 0x80, 0x02, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0xb9, 0xec, 0xcb, 0xff, 0x19, 0xc6, 0x77, 0x15, 0x8e, 0x92, 0x8b,
        0x1b, 0x64, 0x12, 0x48, 0xb7,
    ];

    pub const KNVKN_RTBZ: &[u8] = &[
        0xd7, 0x66, 0x0c, 0xa5, 0x40, 0x01, 0x0e, 0x0a, 0x06, 0x02, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x2d, 0xa6, 0x2b, 0xda, 0x60, 0xbf, 0xb9, 0x2c, 0xbd, 0x46, 0x72,
        0xdb, 0x2c, 0xd6, 0xb6, 0xc5,
    ];

    /// Table files are padded so that their size is congruent to 16 modulo
    /// 64.
    fn padded(data: &[u8]) -> Vec<u8> {
        let mut data = data.to_vec();
        while data.len() % 64 != 16 {
            data.push(0);
        }
        data
    }

    fn mapped(name: &str, data: &[u8], magic: &[u8; 4]) -> (tempfile::TempDir, Mapping) {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join(name);
        std::fs::File::create(&path)
            .expect("create")
            .write_all(&padded(data))
            .expect("write");

        let paths = tmp.path().display().to_string();
        let mapping = TbFile::find(&paths, name)
            .expect("found")
            .map(magic)
            .expect("valid magic");
        (tmp, mapping)
    }

    #[test]
    fn test_triangle_inverse() {
        for (code, &sq) in INV_TRIANGLE.iter().enumerate() {
            assert_eq!(TRIANGLE[sq], code as u64);
        }
    }

    #[test]
    fn test_kk_idx_counts_all_king_pairs() {
        let mut seen = 0;
        let mut max = 0;
        for board in &KK_IDX {
            for &entry in board.iter() {
                if entry != Z0 {
                    seen += 1;
                    max = max.max(entry);
                }
            }
        }
        assert_eq!(seen, 462);
        assert_eq!(max, 461);
    }

    #[test]
    fn test_pp_idx_counts_all_pair_configurations() {
        let mut seen = 0;
        let mut max = 0;
        for board in &PP_IDX {
            for &entry in board.iter() {
                if entry != Z0 {
                    seen += 1;
                    max = max.max(entry);
                }
            }
        }
        assert_eq!(seen, 278);
        assert_eq!(max, 277);
    }

    #[test]
    fn test_lead_pawn_consts() {
        // A single leading pawn has 6 possible ranks on each of the four
        // files.
        assert_eq!(CONSTS.lead_pawns_size[1], [6, 6, 6, 6]);

        // All 48 pawn squares have distinct map_pawns values below 48.
        let mut values: Vec<u64> = (8..56).map(|sq| CONSTS.map_pawns[sq]).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 48);
        assert!(values.iter().all(|&v| v < 48));
    }

    #[test]
    fn test_group_data_factors() {
        // Three unique pieces form a single leading group encoded in
        // 31332 ways.
        let pieces: Pieces = [
            Role::King.of(Color::White),
            Role::Rook.of(Color::White),
            Role::King.of(Color::Black),
        ]
        .into_iter()
        .collect();

        let group = GroupData::new::<Chess>(pieces, [0, 0xf], 0).expect("valid group");
        assert_eq!(group.lens.as_slice(), &[3]);
        assert_eq!(group.factors.as_slice(), &[1, 31_332]);

        // KRvKN: three unique pieces lead, the knight is encoded on the 61
        // remaining squares.
        let pieces: Pieces = [
            Role::King.of(Color::White),
            Role::Rook.of(Color::White),
            Role::King.of(Color::Black),
            Role::Knight.of(Color::Black),
        ]
        .into_iter()
        .collect();

        let group = GroupData::new::<Chess>(pieces, [0, 0xf], 0).expect("valid group");
        assert_eq!(group.lens.as_slice(), &[3, 1]);
        assert_eq!(group.factors.as_slice(), &[1, 31_332, 31_332 * 61]);
    }

    #[test]
    fn test_parse_single_value_wdl() {
        let (_tmp, mapping) = mapped("KNvK.rtbw", KNVK_RTBW, &[0x71, 0xe8, 0x23, 0x5d]);
        let material: Material = "KNvK".parse().expect("valid material");

        let table = Table::<WdlTag, Chess>::new(mapping, &material).expect("parse");

        assert_eq!(table.files.len(), 1);
        assert_eq!(table.files[0].sides.len(), 2);
        for side in &table.files[0].sides {
            assert!(side.flags.contains(Flag::SINGLE_VALUE));
            assert_eq!(side.min_symlen, 2); // Draw
        }

        let value = table
            .decompress_pairs(&table.files[0].sides[0], 0)
            .expect("single value");
        assert_eq!(value, 2);
    }

    #[test]
    fn test_parse_single_value_dtz() {
        let (_tmp, mapping) = mapped("KNvKN.rtbz", KNVKN_RTBZ, &[0xd7, 0x66, 0x0c, 0xa5]);
        let material: Material = "KNvKN".parse().expect("valid material");

        let table = Table::<DtzTag, Chess>::new(mapping, &material).expect("parse");

        assert_eq!(table.files.len(), 1);
        assert_eq!(table.files[0].sides.len(), 1);
        assert!(table.files[0].sides[0].flags.contains(Flag::SINGLE_VALUE));
    }

    #[test]
    fn test_layout_mismatch_is_corrupt() {
        // A pawnless material key does not match a table claiming pawns.
        let (_tmp, mapping) = mapped("KNvK.rtbw", KNVK_RTBW, &[0x71, 0xe8, 0x23, 0x5d]);
        let material: Material = "KPvK".parse().expect("valid material");
        assert!(Table::<WdlTag, Chess>::new(mapping, &material).is_err());
    }
}
