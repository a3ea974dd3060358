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

use std::{cmp::Ordering, fmt, str::FromStr};

use shakmaty::{Board, Color, Piece, Role};

/// Roles in the order they appear in table names.
const ROLES: [Role; 6] = [
    Role::King,
    Role::Queen,
    Role::Rook,
    Role::Bishop,
    Role::Knight,
    Role::Pawn,
];

/// Error when parsing an invalid material key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseMaterialError;

impl fmt::Display for ParseMaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid material key")
    }
}

impl std::error::Error for ParseMaterialError {}

/// The material configuration of one side.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct MaterialSide {
    pub pawns: u8,
    pub knights: u8,
    pub bishops: u8,
    pub rooks: u8,
    pub queens: u8,
    pub kings: u8,
}

impl MaterialSide {
    pub fn new() -> MaterialSide {
        MaterialSide::default()
    }

    pub fn by_role(&self, role: Role) -> u8 {
        match role {
            Role::Pawn => self.pawns,
            Role::Knight => self.knights,
            Role::Bishop => self.bishops,
            Role::Rook => self.rooks,
            Role::Queen => self.queens,
            Role::King => self.kings,
        }
    }

    pub fn by_role_mut(&mut self, role: Role) -> &mut u8 {
        match role {
            Role::Pawn => &mut self.pawns,
            Role::Knight => &mut self.knights,
            Role::Bishop => &mut self.bishops,
            Role::Rook => &mut self.rooks,
            Role::Queen => &mut self.queens,
            Role::King => &mut self.kings,
        }
    }

    pub fn count(&self) -> usize {
        ROLES.iter().map(|&r| usize::from(self.by_role(r))).sum()
    }

    pub fn has_pawns(&self) -> bool {
        self.pawns > 0
    }

    /// Number of roles of which this side has exactly one piece.
    fn unique_roles(&self) -> u8 {
        ROLES
            .iter()
            .map(|&r| self.by_role(r))
            .filter(|&c| c == 1)
            .count() as u8
    }

    pub fn from_ascii(s: &[u8]) -> Result<MaterialSide, ParseMaterialError> {
        if s.len() > 64 {
            return Err(ParseMaterialError);
        }

        let mut side = MaterialSide::new();
        for &ch in s {
            let role = match ch {
                b'K' => Role::King,
                b'Q' => Role::Queen,
                b'R' => Role::Rook,
                b'B' => Role::Bishop,
                b'N' => Role::Knight,
                b'P' => Role::Pawn,
                _ => return Err(ParseMaterialError),
            };
            *side.by_role_mut(role) += 1;
        }

        Ok(side)
    }
}

impl fmt::Display for MaterialSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &role in &ROLES {
            for _ in 0..self.by_role(role) {
                write!(f, "{}", role.upper_char())?;
            }
        }
        Ok(())
    }
}

impl Ord for MaterialSide {
    fn cmp(&self, other: &MaterialSide) -> Ordering {
        self.count()
            .cmp(&other.count())
            .then_with(|| self.kings.cmp(&other.kings))
            .then_with(|| self.queens.cmp(&other.queens))
            .then_with(|| self.rooks.cmp(&other.rooks))
            .then_with(|| self.bishops.cmp(&other.bishops))
            .then_with(|| self.knights.cmp(&other.knights))
            .then_with(|| self.pawns.cmp(&other.pawns))
    }
}

impl PartialOrd for MaterialSide {
    fn partial_cmp(&self, other: &MaterialSide) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Extend<Role> for MaterialSide {
    fn extend<T: IntoIterator<Item = Role>>(&mut self, iter: T) {
        for role in iter {
            *self.by_role_mut(role) += 1;
        }
    }
}

impl FromIterator<Role> for MaterialSide {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> MaterialSide {
        let mut side = MaterialSide::new();
        side.extend(iter);
        side
    }
}

/// The material configuration of both sides.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Material {
    pub white: MaterialSide,
    pub black: MaterialSide,
}

impl Material {
    pub fn new() -> Material {
        Material::default()
    }

    /// Gets the material configuration of a board.
    pub fn from_board(board: &Board) -> Material {
        let mut material = Material::new();
        for &role in &ROLES {
            *material.white.by_role_mut(role) = board.by_piece(role.of(Color::White)).count() as u8;
            *material.black.by_role_mut(role) = board.by_piece(role.of(Color::Black)).count() as u8;
        }
        material
    }

    pub fn by_piece(&self, piece: Piece) -> u8 {
        piece
            .color
            .fold_wb(&self.white, &self.black)
            .by_role(piece.role)
    }

    pub fn by_piece_mut(&mut self, piece: Piece) -> &mut u8 {
        match piece.color {
            Color::White => self.white.by_role_mut(piece.role),
            Color::Black => self.black.by_role_mut(piece.role),
        }
    }

    pub fn count(&self) -> usize {
        self.white.count() + self.black.count()
    }

    pub fn has_pawns(&self) -> bool {
        self.white.has_pawns() || self.black.has_pawns()
    }

    /// Both sides have the same material.
    pub fn is_symmetric(&self) -> bool {
        self.white == self.black
    }

    /// Total number of roles of which either side has exactly one piece.
    pub fn unique_pieces(&self) -> u8 {
        self.white.unique_roles() + self.black.unique_roles()
    }

    /// Smallest count of like pieces (at least two) of either side.
    pub fn min_like_man(&self) -> u8 {
        ROLES
            .iter()
            .map(|&r| self.white.by_role(r))
            .chain(ROLES.iter().map(|&r| self.black.by_role(r)))
            .filter(|&c| c >= 2)
            .min()
            .unwrap_or(0)
    }

    /// Swaps the material of the two sides.
    pub fn flipped(&self) -> Material {
        Material {
            white: self.black.clone(),
            black: self.white.clone(),
        }
    }

    /// Brings the stronger side to white, the canonical orientation used
    /// for table names.
    pub fn normalized(&self) -> Material {
        if self.white >= self.black {
            self.clone()
        } else {
            self.flipped()
        }
    }

    /// A 64-bit hash of the material configuration. Sensitive to which side
    /// owns which pieces, so a configuration and its flipped counterpart
    /// hash differently.
    pub fn key(&self) -> u64 {
        let mut hash = 0xcbf2_9ce4_8422_2325;
        for side in [&self.white, &self.black] {
            for &role in &ROLES {
                hash ^= u64::from(side.by_role(role));
                hash = hash.wrapping_mul(0x100_0000_01b3);
            }
        }
        hash
    }

    pub fn from_ascii(s: &[u8]) -> Result<Material, ParseMaterialError> {
        let mut parts = s.splitn(2, |&ch| ch == b'v');
        Ok(Material {
            white: MaterialSide::from_ascii(parts.next().ok_or(ParseMaterialError)?)?,
            black: MaterialSide::from_ascii(parts.next().ok_or(ParseMaterialError)?)?,
        })
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.white, self.black)
    }
}

impl FromStr for Material {
    type Err = ParseMaterialError;

    fn from_str(s: &str) -> Result<Material, ParseMaterialError> {
        Material::from_ascii(s.as_bytes())
    }
}

impl Extend<Piece> for Material {
    fn extend<T: IntoIterator<Item = Piece>>(&mut self, iter: T) {
        for piece in iter {
            *self.by_piece_mut(piece) += 1;
        }
    }
}

impl FromIterator<Piece> for Material {
    fn from_iter<T: IntoIterator<Item = Piece>>(iter: T) -> Material {
        let mut material = Material::new();
        material.extend(iter);
        material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let material: Material = "KQPvKR".parse().expect("valid material");
        assert_eq!(material.white.queens, 1);
        assert_eq!(material.white.pawns, 1);
        assert_eq!(material.black.rooks, 1);
        assert_eq!(material.count(), 5);
        assert_eq!(material.to_string(), "KQPvKR");

        assert!("KQvX".parse::<Material>().is_err());
    }

    #[test]
    fn test_normalized() {
        let material: Material = "KvKQ".parse().expect("valid material");
        assert_eq!(material.normalized().to_string(), "KQvK");
        assert_eq!(material.normalized(), material.flipped());

        let symmetric: Material = "KRvKR".parse().expect("valid material");
        assert_eq!(symmetric.normalized(), symmetric);
    }

    #[test]
    fn test_unique_pieces_and_min_like_man() {
        let material: Material = "KRvKN".parse().expect("valid material");
        assert_eq!(material.unique_pieces(), 4);
        assert_eq!(material.min_like_man(), 0);

        let material: Material = "KNNvKNN".parse().expect("valid material");
        assert_eq!(material.unique_pieces(), 2);
        assert_eq!(material.min_like_man(), 2);

        let material: Material = "KPPPvK".parse().expect("valid material");
        assert_eq!(material.unique_pieces(), 3);
        assert_eq!(material.min_like_man(), 3);
    }

    #[test]
    fn test_key_orientation() {
        let material: Material = "KQvKR".parse().expect("valid material");
        assert_ne!(material.key(), material.flipped().key());
        assert_eq!(material.key(), material.clone().key());

        let symmetric: Material = "KPvKP".parse().expect("valid material");
        assert_eq!(symmetric.key(), symmetric.flipped().key());
    }

    #[test]
    fn test_from_board() {
        let board = Board::new();
        let material = Material::from_board(&board);
        assert_eq!(material.to_string(), "KQRRBBNNPPPPPPPPvKQRRBBNNPPPPPPPP");
        assert!(material.is_symmetric());
    }
}
