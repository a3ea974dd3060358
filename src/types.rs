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

use std::ops::Neg;

use arrayvec::ArrayVec;
use shakmaty::{Chess, Color, Outcome, Piece};

/// Syzygy tables are available for up to 7 pieces.
pub const MAX_PIECES: usize = 7;

/// List of up to [`MAX_PIECES`] pieces.
pub type Pieces = ArrayVec<Piece, MAX_PIECES>;

/// File extension and magic header bytes of a table type.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TableFormat {
    /// File extension, e.g. `rtbw`.
    pub ext: &'static str,
    /// Magic initial bytes of a table file.
    pub magic: [u8; 4],
}

/// A chess variant with Syzygy support.
pub trait Syzygy {
    /// WDL table format.
    const TBW: TableFormat;
    /// DTZ table format.
    const TBZ: TableFormat;
    /// Alternative WDL table format for pawnless endgames.
    const PAWNLESS_TBW: Option<TableFormat> = None;
    /// Alternative DTZ table format for pawnless endgames.
    const PAWNLESS_TBZ: Option<TableFormat> = None;

    /// Whether both players will have exactly one king unless the game
    /// is over.
    const ONE_KING: bool;
    /// Whether kings are allowed to be on adjacent squares.
    const CONNECTED_KINGS: bool;
    /// Whether captures are compulsory.
    const CAPTURES_COMPULSORY: bool;

    /// Catalog hash size in bits. Sized so that occupancy stays below 50%.
    const CATALOG_BITS: u32 = 12;
}

impl Syzygy for Chess {
    const TBW: TableFormat = TableFormat {
        ext: "rtbw",
        magic: [0x71, 0xe8, 0x23, 0x5d],
    };
    const TBZ: TableFormat = TableFormat {
        ext: "rtbz",
        magic: [0xd7, 0x66, 0x0c, 0xa5],
    };

    const ONE_KING: bool = true;
    const CONNECTED_KINGS: bool = false;
    const CAPTURES_COMPULSORY: bool = false;
}

#[cfg(feature = "variant")]
impl Syzygy for shakmaty::variant::Atomic {
    const TBW: TableFormat = TableFormat {
        ext: "atbw",
        magic: [0x55, 0x8d, 0xa4, 0x49],
    };
    const TBZ: TableFormat = TableFormat {
        ext: "atbz",
        magic: [0x91, 0xa9, 0x5e, 0xeb],
    };

    const ONE_KING: bool = true;
    const CONNECTED_KINGS: bool = true;
    const CAPTURES_COMPULSORY: bool = false;
}

#[cfg(feature = "variant")]
impl Syzygy for shakmaty::variant::Antichess {
    const TBW: TableFormat = TableFormat {
        ext: "gtbw",
        magic: [0xbc, 0x55, 0xbc, 0x21],
    };
    const TBZ: TableFormat = TableFormat {
        ext: "gtbz",
        magic: [0xd6, 0xf5, 0x1b, 0x50],
    };
    const PAWNLESS_TBW: Option<TableFormat> = Some(TableFormat {
        ext: "stbw",
        magic: [0x7b, 0xf6, 0x93, 0x15],
    });
    const PAWNLESS_TBZ: Option<TableFormat> = Some(TableFormat {
        ext: "stbz",
        magic: [0xe4, 0xcf, 0xe7, 0x23],
    });

    const ONE_KING: bool = false;
    const CONNECTED_KINGS: bool = true;
    const CAPTURES_COMPULSORY: bool = true;

    const CATALOG_BITS: u32 = 15;
}

/// 5-valued evaluation of a position in the context of the 50-move drawing
/// rule.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(i8)]
pub enum Wdl {
    /// Unconditional loss for the side to move.
    Loss = -2,
    /// Loss that can be saved by the 50-move rule.
    BlessedLoss = -1,
    /// Unconditional draw.
    Draw = 0,
    /// Win that can be frustrated by the 50-move rule.
    CursedWin = 1,
    /// Unconditional win.
    Win = 2,
}

impl Wdl {
    /// Converts `outcome` to a `Wdl` from the given point of view.
    pub fn from_outcome(outcome: Outcome, pov: Color) -> Wdl {
        match outcome {
            Outcome::Draw => Wdl::Draw,
            Outcome::Decisive { winner } if winner == pov => Wdl::Win,
            Outcome::Decisive { .. } => Wdl::Loss,
        }
    }

    /// The sign of the value: -1 for losses, 0 for draws, 1 for wins.
    pub fn signum(self) -> i32 {
        i32::from(self as i8).signum()
    }
}

impl Neg for Wdl {
    type Output = Wdl;

    fn neg(self) -> Wdl {
        match self {
            Wdl::Loss => Wdl::Win,
            Wdl::BlessedLoss => Wdl::CursedWin,
            Wdl::Draw => Wdl::Draw,
            Wdl::CursedWin => Wdl::BlessedLoss,
            Wdl::Win => Wdl::Loss,
        }
    }
}

macro_rules! from_wdl_impl {
    ($($t:ty)+) => {
        $(impl From<Wdl> for $t {
            #[inline]
            fn from(wdl: Wdl) -> $t {
                wdl as $t
            }
        })+
    }
}

from_wdl_impl! { i8 i16 i32 i64 }

/// Distance to zeroing of the half-move clock, in plies.
///
/// The sign follows the WDL sign. A magnitude in `1..=100` is precise;
/// larger magnitudes belong to positions that are drawn by the 50-move
/// rule. The value can be off by one: `Dtz(-n)` can mean a loss in `n + 1`
/// plies and `Dtz(n)` a win in `n + 1` plies. This does not happen for
/// positions exactly on the edge of the 50-move rule, so it never changes
/// the outcome of optimal play.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Dtz(pub i32);

impl Dtz {
    /// The DTZ of the position before a zeroing move into a position with
    /// the given `wdl`.
    pub fn before_zeroing(wdl: Wdl) -> Dtz {
        match wdl {
            Wdl::Loss => Dtz(-1),
            Wdl::BlessedLoss => Dtz(-101),
            Wdl::Draw => Dtz(0),
            Wdl::CursedWin => Dtz(101),
            Wdl::Win => Dtz(1),
        }
    }

    /// Increases the magnitude by `plies`, keeping the sign.
    pub fn add_plies(self, plies: i32) -> Dtz {
        Dtz(self.0.signum() * (self.0.abs() + plies))
    }

    /// The sign of the value: -1, 0 or 1.
    pub fn signum(self) -> i32 {
        self.0.signum()
    }
}

impl Neg for Dtz {
    type Output = Dtz;

    #[inline]
    fn neg(self) -> Dtz {
        Dtz(-self.0)
    }
}

macro_rules! from_dtz_impl {
    ($($t:ty)+) => {
        $(impl From<Dtz> for $t {
            #[inline]
            fn from(dtz: Dtz) -> $t {
                dtz.0.into()
            }
        })+
    }
}

from_dtz_impl! { i32 i64 }

macro_rules! dtz_from_impl {
    ($($t:ty)+) => {
        $(impl From<$t> for Dtz {
            #[inline]
            fn from(dtz: $t) -> Dtz {
                Dtz(i32::from(dtz))
            }
        })+
    }
}

dtz_from_impl! { u8 i8 u16 i16 i32 }

/// Additional outcome flag of a probe.
///
/// Tables store a "don't care" value wherever a zeroing capture already
/// settles the outcome, and DTZ tables store positions for one side to move
/// only, so probes report how the value was obtained.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProbeState {
    /// Probe successful, value read from a table.
    Normal,
    /// Best move is zeroing. The value was recovered from the zeroing-move
    /// search instead of the (possibly "don't care") stored value.
    ZeroingBestMove,
    /// The DTZ table stores the other side to move. The value was recovered
    /// by a 1-ply search.
    ChangeStm,
    /// Threatening to force a capture. Only with compulsory captures.
    Threat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wdl_negation() {
        for wdl in [
            Wdl::Loss,
            Wdl::BlessedLoss,
            Wdl::Draw,
            Wdl::CursedWin,
            Wdl::Win,
        ] {
            assert_eq!(-(-wdl), wdl);
            assert_eq!((-wdl).signum(), -wdl.signum());
        }
        assert_eq!(-Wdl::Win, Wdl::Loss);
        assert_eq!(-Wdl::CursedWin, Wdl::BlessedLoss);
        assert_eq!(-Wdl::Draw, Wdl::Draw);
    }

    #[test]
    fn test_wdl_ordering() {
        assert!(Wdl::Loss < Wdl::BlessedLoss);
        assert!(Wdl::BlessedLoss < Wdl::Draw);
        assert!(Wdl::Draw < Wdl::CursedWin);
        assert!(Wdl::CursedWin < Wdl::Win);
    }

    #[test]
    fn test_dtz_before_zeroing() {
        assert_eq!(Dtz::before_zeroing(Wdl::Win), Dtz(1));
        assert_eq!(Dtz::before_zeroing(Wdl::CursedWin), Dtz(101));
        assert_eq!(Dtz::before_zeroing(Wdl::Draw), Dtz(0));
        assert_eq!(Dtz::before_zeroing(Wdl::BlessedLoss), Dtz(-101));
        assert_eq!(Dtz::before_zeroing(Wdl::Loss), Dtz(-1));
    }

    #[test]
    fn test_dtz_add_plies() {
        assert_eq!(Dtz(5).add_plies(3), Dtz(8));
        assert_eq!(Dtz(-5).add_plies(3), Dtz(-8));
        assert_eq!(Dtz(0).add_plies(3), Dtz(0));
    }
}
