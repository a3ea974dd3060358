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

use std::cmp::min;

use shakmaty::{Move, Position, Role};

use crate::{
    errors::{SyzygyError, SyzygyResult},
    filesystem::TbFile,
    lazy::Lazy,
    material::Material,
    table::{DtzTag, Metric, Table, TableTag, WdlTag},
    types::{Dtz, ProbeState, Syzygy, Wdl, MAX_PIECES},
};

const VALUE_MATE: i32 = 32_000;
const VALUE_DRAW: i32 = 0;
const MAX_PLY: i32 = 246;
const PAWN_VALUE_EG: i32 = 208;

/// Rotates through the roles, wrapping from king back to pawn.
fn rotate_role(role: Role) -> Role {
    match role {
        Role::Pawn => Role::Knight,
        Role::Knight => Role::Bishop,
        Role::Bishop => Role::Rook,
        Role::Rook => Role::Queen,
        Role::Queen => Role::King,
        Role::King => Role::Pawn,
    }
}

/// Iterator over a range of roles, used to enumerate piece multisets.
struct RoleRange {
    from: Role,
    to: Role,
}

impl RoleRange {
    fn excl(from: Role, to: Role) -> RoleRange {
        RoleRange { from, to }
    }

    fn incl(from: Role, to: Role) -> RoleRange {
        RoleRange {
            from,
            to: rotate_role(to),
        }
    }
}

impl Iterator for RoleRange {
    type Item = Role;

    fn next(&mut self) -> Option<Role> {
        if self.from != self.to {
            let from = self.from;
            self.from = rotate_role(from);
            Some(from)
        } else {
            None
        }
    }
}

/// Open-addressed hash from material keys to catalog entries.
///
/// Robin-Hood insertion: when probing past an element whose home bucket
/// comes later than ours, it takes the bucket and the probe continues with
/// the displaced element. The last bucket is reserved empty so lookups
/// always terminate.
#[derive(Debug)]
struct TbHashTable {
    buckets: Vec<Option<(u64, u32)>>,
    mask: usize,
}

impl TbHashTable {
    fn new(bits: u32) -> TbHashTable {
        let size = 1 << bits;
        TbHashTable {
            buckets: vec![None; size + 1],
            mask: size - 1,
        }
    }

    fn insert(&mut self, key: u64, index: u32) {
        let size = self.mask + 1;
        let mut entry = (key, index);
        let mut home = entry.0 as usize & self.mask;

        for bucket in home..size {
            match self.buckets[bucket] {
                Some((other_key, other_index)) if other_key != entry.0 => {
                    let other_home = other_key as usize & self.mask;
                    if other_home > home {
                        self.buckets[bucket] = Some(entry);
                        entry = (other_key, other_index);
                        home = other_home;
                    }
                }
                _ => {
                    self.buckets[bucket] = Some(entry);
                    return;
                }
            }
        }

        panic!("tablebase hash table too small");
    }

    fn get(&self, key: u64) -> Option<u32> {
        let mut bucket = key as usize & self.mask;
        loop {
            match self.buckets[bucket]? {
                (other_key, index) if other_key == key => return Some(index),
                _ => bucket += 1,
            }
        }
    }
}

/// Opens and parses a table file. Failures are remembered by the caller,
/// so probes for the same table never retry the mapping.
fn open_table<T: TableTag, S: Position + Syzygy>(
    paths: &str,
    name: &str,
    material: &Material,
) -> Option<Table<T, S>> {
    let format = match T::METRIC {
        Metric::Wdl => S::TBW,
        Metric::Dtz => S::TBZ,
    };
    let pawnless_format = match T::METRIC {
        Metric::Wdl => S::PAWNLESS_TBW,
        Metric::Dtz => S::PAWNLESS_TBZ,
    };

    let mapping = if let Some(file) = TbFile::find(paths, &format!("{}.{}", name, format.ext)) {
        file.map(&format.magic)?
    } else if !material.has_pawns() {
        let format = pawnless_format?;
        let file = TbFile::find(paths, &format!("{}.{}", name, format.ext))?;
        file.map(&format.magic)?
    } else {
        return None;
    };

    match Table::new(mapping, material) {
        Ok(table) => Some(table),
        Err(error) => {
            log::error!("failed to parse table {name}: {error}");
            None
        }
    }
}

/// A catalog entry for one table file. The file is located, mapped and
/// parsed at first access.
#[derive(Debug)]
struct TbTable<T: TableTag, S: Position + Syzygy> {
    name: String,
    material: Material,
    table: Lazy<Option<Table<T, S>>>,
}

impl<T: TableTag, S: Position + Syzygy> TbTable<T, S> {
    fn new(name: String, material: Material) -> TbTable<T, S> {
        TbTable {
            name,
            material,
            table: Lazy::new(),
        }
    }

    fn get(&self, paths: &str) -> SyzygyResult<&Table<T, S>> {
        self.table
            .get_or_init(|| open_table(paths, &self.name, &self.material))
            .as_ref()
            .ok_or_else(|| SyzygyError::MissingTable {
                material: self.material.clone(),
            })
    }
}

/// WDL and DTZ tables of one material configuration.
#[derive(Debug)]
struct TbEntry<S: Position + Syzygy> {
    wdl: TbTable<WdlTag, S>,
    dtz: TbTable<DtzTag, S>,
}

/// A root move with its tablebase-based ranking.
#[derive(Debug, Clone)]
pub struct RootMove {
    /// The move.
    pub mv: Move,
    /// Ranking value: better moves are ranked higher. Certain wins are
    /// ranked equally; losing moves are ranked equally unless a 50-move
    /// draw is in sight.
    pub tb_rank: i32,
    /// A centipawn-like score mapped from the rank. Cursed wins get at
    /// least 1 cp and grow to 49 cp the closer the position gets to a real
    /// win.
    pub tb_score: i32,
}

/// A collection of tables, lazily memory mapped and probed through a
/// search-based driver.
///
/// The catalog is populated by [`Tablebase::init`] and immutable
/// afterwards, so probing is thread-safe.
#[derive(Debug)]
pub struct Tablebase<S: Position + Clone + Syzygy> {
    paths: String,
    entries: Vec<TbEntry<S>>,
    hash: TbHashTable,
    max_cardinality: usize,
}

impl<S: Position + Clone + Syzygy> Default for Tablebase<S> {
    fn default() -> Tablebase<S> {
        Tablebase::new()
    }
}

impl<S: Position + Clone + Syzygy> Tablebase<S> {
    /// Creates an empty catalog.
    pub fn new() -> Tablebase<S> {
        Tablebase {
            paths: String::new(),
            entries: Vec::new(),
            hash: TbHashTable::new(S::CATALOG_BITS),
            max_cardinality: 0,
        }
    }

    /// Largest piece count of any discovered table.
    pub fn max_cardinality(&self) -> usize {
        self.max_cardinality
    }

    /// Number of discovered tables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (Re)creates the catalog by enumerating all piece multisets up to
    /// 7 pieces and probing `paths` (directories separated by `;` on
    /// Windows and by `:` otherwise) for the corresponding files. Only
    /// file existence is checked; mapping happens lazily at probe time.
    ///
    /// An empty or literal `"<empty>"` path list disables tablebases.
    /// Returns the number of discovered tables.
    pub fn init(&mut self, paths: &str) -> usize {
        use Role::*;

        self.paths = paths.to_owned();
        self.entries = Vec::new();
        self.hash = TbHashTable::new(S::CATALOG_BITS);
        self.max_cardinality = 0;

        if paths.is_empty() || paths == "<empty>" {
            return 0;
        }

        if S::ONE_KING {
            for a in RoleRange::excl(Pawn, King) {
                self.add(&[King, a], &[King]);

                for b in RoleRange::incl(Pawn, a) {
                    self.add(&[King, a, b], &[King]);
                    self.add(&[King, a], &[King, b]);

                    for c in RoleRange::excl(Pawn, King) {
                        self.add(&[King, a, b], &[King, c]);
                    }

                    for c in RoleRange::incl(Pawn, b) {
                        self.add(&[King, a, b, c], &[King]);

                        for d in RoleRange::incl(Pawn, c) {
                            self.add(&[King, a, b, c, d], &[King]);

                            for e in RoleRange::incl(Pawn, d) {
                                self.add(&[King, a, b, c, d, e], &[King]);
                            }

                            for e in RoleRange::excl(Pawn, King) {
                                self.add(&[King, a, b, c, d], &[King, e]);
                            }
                        }

                        for d in RoleRange::excl(Pawn, King) {
                            self.add(&[King, a, b, c], &[King, d]);

                            for e in RoleRange::incl(Pawn, d) {
                                self.add(&[King, a, b, c], &[King, d, e]);
                            }
                        }
                    }

                    for c in RoleRange::incl(Pawn, a) {
                        for d in RoleRange::incl(Pawn, if a == c { b } else { c }) {
                            self.add(&[King, a, b], &[King, c, d]);
                        }
                    }
                }
            }
        } else {
            for a in RoleRange::incl(Pawn, King) {
                for b in RoleRange::incl(Pawn, a) {
                    self.add(&[a], &[b]);

                    for c in RoleRange::incl(Pawn, King) {
                        self.add(&[a, b], &[c]);
                    }

                    for c in RoleRange::incl(Pawn, b) {
                        for d in RoleRange::incl(Pawn, King) {
                            self.add(&[a, b, c], &[d]);

                            for e in RoleRange::incl(Pawn, d) {
                                self.add(&[a, b, c], &[d, e]);
                            }
                        }

                        for d in RoleRange::incl(Pawn, c) {
                            for e in RoleRange::incl(Pawn, King) {
                                self.add(&[a, b, c, d], &[e]);

                                for f in RoleRange::incl(Pawn, e) {
                                    self.add(&[a, b, c, d], &[e, f]);
                                }
                            }

                            for e in RoleRange::incl(Pawn, d) {
                                for f in RoleRange::incl(Pawn, King) {
                                    self.add(&[a, b, c, d, e], &[f]);
                                }
                            }
                        }

                        for d in RoleRange::incl(Pawn, a) {
                            for e in RoleRange::incl(Pawn, if a == d { b } else { d }) {
                                for f in RoleRange::incl(Pawn, if a == d && b == e { c } else { e })
                                {
                                    self.add(&[a, b, c], &[d, e, f]);
                                }
                            }
                        }
                    }

                    for c in RoleRange::incl(Pawn, a) {
                        for d in RoleRange::incl(Pawn, if a == c { b } else { c }) {
                            self.add(&[a, b], &[c, d]);
                        }
                    }
                }
            }
        }

        log::info!("found {} tablebases", self.entries.len());
        self.entries.len()
    }

    /// Like [`Tablebase::init`], but additionally reports the table count
    /// on the given info channel, e.g. for `info string` output.
    pub fn init_with_info<F>(&mut self, paths: &str, mut info: F) -> usize
    where
        F: FnMut(&str),
    {
        let found = self.init(paths);
        info(&format!("Found {found} tablebases"));
        found
    }

    /// If the corresponding WDL file exists, creates catalog entries for
    /// the material configuration and registers them under both
    /// orientations of the material key.
    fn add(&mut self, white: &[Role], black: &[Role]) {
        let material = Material {
            white: white.iter().copied().collect(),
            black: black.iter().copied().collect(),
        };
        let name = material.to_string();

        // Only the existence of the WDL file is checked.
        if TbFile::find(&self.paths, &format!("{}.{}", name, S::TBW.ext)).is_none() {
            let pawnless = match S::PAWNLESS_TBW {
                Some(format) if !material.has_pawns() => format,
                _ => return,
            };
            if TbFile::find(&self.paths, &format!("{}.{}", name, pawnless.ext)).is_none() {
                return;
            }
        }

        self.max_cardinality = self.max_cardinality.max(material.count());

        let index = self.entries.len() as u32;
        self.entries.push(TbEntry {
            wdl: TbTable::new(name.clone(), material.clone()),
            dtz: TbTable::new(name, material.clone()),
        });

        // Insert under both orientations: KRvK is also found as KvKR.
        self.hash.insert(material.key(), index);
        self.hash.insert(material.flipped().key(), index);
    }

    fn entry(&self, material: &Material) -> SyzygyResult<&TbEntry<S>> {
        match self.hash.get(material.key()) {
            Some(index) => Ok(&self.entries[index as usize]),
            None => Err(SyzygyError::MissingTable {
                material: material.normalized(),
            }),
        }
    }

    fn probe_wdl_table(&self, pos: &S) -> SyzygyResult<Wdl> {
        // Variant game end.
        if let Some(outcome) = pos.variant_outcome() {
            return Ok(Wdl::from_outcome(outcome, pos.turn()));
        }

        // Test for KvK.
        if S::ONE_KING && pos.board().kings() == pos.board().occupied() {
            return Ok(Wdl::Draw);
        }

        let material = Material::from_board(pos.board());
        self.entry(&material)?.wdl.get(&self.paths)?.probe_wdl(pos)
    }

    fn probe_dtz_table(&self, pos: &S, wdl: Wdl) -> SyzygyResult<Option<i32>> {
        let material = Material::from_board(pos.board());
        self.entry(&material)?
            .dtz
            .get(&self.paths)?
            .probe_dtz(pos, wdl)
    }

    /// The generator treats positions with a winning zeroing capture as
    /// "don't cares" and stores whatever value compresses best, so the true
    /// value must be recovered by searching the zeroing moves and taking
    /// the best of their values and the stored one. DTZ tables additionally
    /// store nothing useful when the best move is zeroing, which
    /// `check_zeroing` detects by also searching quiet pawn moves.
    fn search(&self, pos: &S, check_zeroing: bool) -> SyzygyResult<(Wdl, ProbeState)> {
        if S::CAPTURES_COMPULSORY {
            if let Some(outcome) = pos.variant_outcome() {
                return Ok((
                    Wdl::from_outcome(outcome, pos.turn()),
                    ProbeState::ZeroingBestMove,
                ));
            }

            return self.sprobe_ab(pos, Wdl::Loss, Wdl::Win, check_zeroing);
        }

        let mut best_value = Wdl::Loss;

        let moves = pos.legal_moves();
        let total_count = moves.len();
        let mut move_count = 0;

        for m in &moves {
            if !m.is_capture() && (!check_zeroing || m.role() != Role::Pawn) {
                continue;
            }

            move_count += 1;

            let mut after = pos.clone();
            after.play_unchecked(m);
            let (value, _) = self.search(&after, false)?;
            let value = -value;

            if value > best_value {
                best_value = value;

                if value >= Wdl::Win {
                    // Winning zeroing move.
                    return Ok((value, ProbeState::ZeroingBestMove));
                }
            }
        }

        // If all legal moves have been searched, the stored value cannot be
        // trusted at all (for instance in positions with only capture
        // moves), so do not probe.
        let no_more_moves = move_count > 0 && move_count == total_count;

        let value = if no_more_moves {
            best_value
        } else {
            self.probe_wdl_table(pos)?
        };

        if best_value >= value {
            Ok((
                best_value,
                if best_value > Wdl::Draw || no_more_moves {
                    ProbeState::ZeroingBestMove
                } else {
                    ProbeState::Normal
                },
            ))
        } else {
            Ok((value, ProbeState::Normal))
        }
    }

    /// Probe with compulsory captures. If captures exist they are the only
    /// legal moves.
    fn sprobe_captures(&self, pos: &S, mut alpha: Wdl, beta: Wdl) -> SyzygyResult<(Wdl, ProbeState)> {
        let captures = pos.capture_moves();
        let captures_found = !captures.is_empty();

        for m in &captures {
            let mut after = pos.clone();
            after.play_unchecked(m);

            let (value, _) = self.sprobe_ab(&after, -beta, -alpha, false)?;
            let value = -value;

            if value > alpha {
                alpha = value;
                if alpha >= beta {
                    break;
                }
            }
        }

        Ok((
            alpha,
            if captures_found {
                ProbeState::ZeroingBestMove
            } else {
                ProbeState::Normal
            },
        ))
    }

    fn sprobe_ab(
        &self,
        pos: &S,
        mut alpha: Wdl,
        beta: Wdl,
        threats: bool,
    ) -> SyzygyResult<(Wdl, ProbeState)> {
        let mut threat_found = false;

        if pos.them().count() > 1 {
            let (value, state) = self.sprobe_captures(pos, alpha, beta)?;
            if state == ProbeState::ZeroingBestMove {
                return Ok((value, state));
            }
        } else {
            // The opponent has only one piece left. If it can be captured,
            // this immediately ends the game as a loss.
            if !pos.capture_moves().is_empty() {
                return Ok((Wdl::Loss, ProbeState::ZeroingBestMove));
            }
        }

        // For large endgames (or when indicated by the caller), also look
        // for threat moves that force a capture on the following move.
        if threats || pos.board().occupied().count() >= 6 {
            for threat in pos.legal_moves() {
                if threat.role() != Role::Pawn {
                    let mut after = pos.clone();
                    after.play_unchecked(&threat);

                    let (value, state) = self.sprobe_captures(&after, -beta, -alpha)?;
                    let value = -value;

                    if state == ProbeState::ZeroingBestMove && value > alpha {
                        threat_found = true;
                        alpha = value;
                        if alpha >= beta {
                            return Ok((value, ProbeState::Threat));
                        }
                    }
                }
            }
        }

        let value = self.probe_wdl_table(pos)?;
        if value > alpha {
            Ok((value, ProbeState::Normal))
        } else {
            Ok((
                alpha,
                if threat_found {
                    ProbeState::Threat
                } else {
                    ProbeState::Normal
                },
            ))
        }
    }

    /// Probes the WDL value of a position.
    ///
    /// The value is from the point of view of the side to move, assuming
    /// the 50-move counter is zero.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions. Any error means
    /// the probe failed as a whole.
    pub fn probe_wdl(&self, pos: &S) -> SyzygyResult<(Wdl, ProbeState)> {
        if pos.board().occupied().count() > MAX_PIECES {
            return Err(SyzygyError::TooManyPieces);
        }
        if pos.castles().any() {
            return Err(SyzygyError::Castling);
        }

        self.search(pos, false)
    }

    /// Probes the DTZ value of a position: the signed number of plies to
    /// the next zeroing move under optimal play.
    ///
    /// The value can be off by one: `Dtz(-n)` can mean a loss in `n + 1`
    /// plies and `Dtz(n)` a win in `n + 1` plies. A mated position yields
    /// `Dtz(-1)`.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_dtz(&self, pos: &S) -> SyzygyResult<(Dtz, ProbeState)> {
        if pos.board().occupied().count() > MAX_PIECES {
            return Err(SyzygyError::TooManyPieces);
        }
        if pos.castles().any() {
            return Err(SyzygyError::Castling);
        }

        let (wdl, state) = self.search(pos, true)?;

        // DTZ tables do not store draws.
        if wdl == Wdl::Draw {
            return Ok((Dtz(0), state));
        }

        // DTZ tables store a "don't care" value (or even a plain wrong one,
        // as when the best move is a losing en passant capture) when the
        // best move is zeroing.
        if state == ProbeState::ZeroingBestMove {
            return Ok((Dtz::before_zeroing(wdl), state));
        }

        if S::CAPTURES_COMPULSORY {
            if pos.us() == pos.our(Role::Pawn) {
                return Ok((Dtz::before_zeroing(wdl), state));
            }

            if state == ProbeState::Threat && wdl > Wdl::Draw {
                // The position is a win or a cursed win by a threat move.
                return Ok((
                    Dtz(if wdl == Wdl::Win { 2 } else { 102 }),
                    ProbeState::Threat,
                ));
            }
        }

        if let Some(plies) = self.probe_dtz_table(pos, wdl)? {
            let stretch = if wdl == Wdl::BlessedLoss || wdl == Wdl::CursedWin {
                100
            } else {
                0
            };
            return Ok((Dtz((plies + stretch) * wdl.signum()), ProbeState::Normal));
        }

        // The DTZ table stores results for the other side to move, so do a
        // 1-ply search for the move that minimizes DTZ while keeping the
        // sign of the WDL value.
        let mut min_dtz = 0xffff;

        for m in pos.legal_moves() {
            let zeroing = m.is_zeroing();

            let mut after = pos.clone();
            after.play_unchecked(&m);

            // For zeroing moves take the DTZ of the position before the
            // move. The position after the move is searched to get the
            // score sign, because even a winning position can have losing
            // captures.
            let mut dtz = if zeroing {
                i32::from(-Dtz::before_zeroing(self.search(&after, false)?.0))
            } else {
                i32::from(-self.probe_dtz(&after)?.0)
            };

            // If the move mates, use it.
            if dtz == 1 && after.is_checkmate() {
                min_dtz = 1;
            }

            // Convert the result of the 1-ply search. Zeroing moves are
            // already accounted for by taking the value before the move.
            if !zeroing {
                dtz += dtz.signum();
            }

            // Skip draws, and when winning pick only positive DTZ.
            if dtz < min_dtz && dtz.signum() == wdl.signum() {
                min_dtz = dtz;
            }
        }

        // When there are no legal moves the position is mate.
        Ok((
            Dtz(if min_dtz == 0xffff { -1 } else { min_dtz }),
            ProbeState::ChangeStm,
        ))
    }

    /// Uses the DTZ tables to rank all root moves.
    ///
    /// `has_repeated` tells whether a position was repeated since the last
    /// zeroing move; repeated winning positions are no longer ranked as
    /// certain wins. With `rule50` disabled, cursed wins and blessed
    /// losses count as wins and losses.
    ///
    /// # Errors
    ///
    /// Fails closed: any failed probe fails the whole ranking.
    pub fn root_probe(
        &self,
        pos: &S,
        rule50: bool,
        has_repeated: bool,
    ) -> SyzygyResult<Vec<RootMove>> {
        // The 50-move counter of the root position.
        let cnt50 = pos.halfmoves() as i32;

        let bound = if rule50 { 900 } else { 1 };

        let mut root_moves = Vec::new();

        for m in pos.legal_moves() {
            let mut after = pos.clone();
            after.play_unchecked(&m);

            // The DTZ of the move, counting from the root position.
            let mut dtz = if after.halfmoves() == 0 {
                // In case of a zeroing move, DTZ is one of -101/-1/0/1/101.
                let (wdl_after, _) = self.probe_wdl(&after)?;
                i32::from(Dtz::before_zeroing(-wdl_after))
            } else if after.halfmoves() >= 100 {
                // The move leads to a draw by the 50-move rule.
                0
            } else {
                // Otherwise, take the DTZ of the new position, corrected by
                // 1 ply.
                let (dtz_after, _) = self.probe_dtz(&after)?;
                let dtz = i32::from(-dtz_after);
                dtz + dtz.signum()
            };

            // Make sure that a mating move gets a DTZ value of 1.
            if dtz == 2 && after.is_checkmate() {
                dtz = 1;
            }

            // Better moves are ranked higher. Certain wins are ranked
            // equally. Losing moves are ranked equally unless a 50-move
            // draw is in sight.
            let tb_rank = if dtz > 0 {
                if dtz + cnt50 <= 99 && !has_repeated {
                    1000
                } else {
                    1000 - (dtz + cnt50)
                }
            } else if dtz < 0 {
                if -dtz * 2 + cnt50 < 100 {
                    -1000
                } else {
                    -1000 + (-dtz + cnt50)
                }
            } else {
                0
            };

            // The score displayed for the move. Cursed wins get at least
            // 1 cp and grow to 49 cp as the position gets closer to a real
            // win.
            let tb_score = if tb_rank >= bound {
                VALUE_MATE - MAX_PLY - 1
            } else if tb_rank > 0 {
                std::cmp::max(3, tb_rank - 800) * PAWN_VALUE_EG / 200
            } else if tb_rank == 0 {
                VALUE_DRAW
            } else if tb_rank > -bound {
                min(-3, tb_rank + 800) * PAWN_VALUE_EG / 200
            } else {
                -VALUE_MATE + MAX_PLY + 1
            };

            root_moves.push(RootMove {
                mv: m,
                tb_rank,
                tb_score,
            });
        }

        Ok(root_moves)
    }

    /// Uses the WDL tables to rank all root moves. This is the fallback
    /// for when some or all DTZ tables are missing.
    ///
    /// # Errors
    ///
    /// Fails closed: any failed probe fails the whole ranking.
    pub fn root_probe_wdl(&self, pos: &S, rule50: bool) -> SyzygyResult<Vec<RootMove>> {
        const WDL_TO_RANK: [i32; 5] = [-1000, -899, 0, 899, 1000];
        const WDL_TO_VALUE: [i32; 5] = [
            -VALUE_MATE + MAX_PLY + 1,
            VALUE_DRAW - 2,
            VALUE_DRAW,
            VALUE_DRAW + 2,
            VALUE_MATE - MAX_PLY - 1,
        ];

        let mut root_moves = Vec::new();

        for m in pos.legal_moves() {
            let mut after = pos.clone();
            after.play_unchecked(&m);

            let wdl = if after.halfmoves() >= 100 {
                Wdl::Draw
            } else {
                let (wdl_after, _) = self.probe_wdl(&after)?;
                -wdl_after
            };

            let tb_rank = WDL_TO_RANK[(i32::from(wdl) + 2) as usize];

            // Without the 50-move rule, cursed wins are wins.
            let wdl = if rule50 {
                wdl
            } else if wdl > Wdl::Draw {
                Wdl::Win
            } else if wdl < Wdl::Draw {
                Wdl::Loss
            } else {
                Wdl::Draw
            };
            let tb_score = WDL_TO_VALUE[(i32::from(wdl) + 2) as usize];

            root_moves.push(RootMove {
                mv: m,
                tb_rank,
                tb_score,
            });
        }

        Ok(root_moves)
    }
}

#[cfg(test)]
mod tests {
    use shakmaty::Chess;

    use super::*;

    #[test]
    fn test_send_sync() {
        fn assert_send<T: Send>(_: T) {}
        fn assert_sync<T: Sync>(_: T) {}

        assert_send(Tablebase::<Chess>::new());
        assert_sync(Tablebase::<Chess>::new());
    }

    #[test]
    fn test_role_range() {
        let range: Vec<Role> = RoleRange::excl(Role::Pawn, Role::King).collect();
        assert_eq!(
            range,
            vec![
                Role::Pawn,
                Role::Knight,
                Role::Bishop,
                Role::Rook,
                Role::Queen
            ]
        );

        let range: Vec<Role> = RoleRange::incl(Role::Pawn, Role::Knight).collect();
        assert_eq!(range, vec![Role::Pawn, Role::Knight]);
    }

    #[test]
    fn test_hash_insert_and_get() {
        let mut hash = TbHashTable::new(4);

        // All three keys share the same home bucket.
        hash.insert(0x10, 1);
        hash.insert(0x20, 2);
        hash.insert(0x30, 3);
        hash.insert(0x13, 4);

        assert_eq!(hash.get(0x10), Some(1));
        assert_eq!(hash.get(0x20), Some(2));
        assert_eq!(hash.get(0x30), Some(3));
        assert_eq!(hash.get(0x13), Some(4));
        assert_eq!(hash.get(0x40), None);
    }

    #[test]
    fn test_hash_robin_hood_displacement() {
        let mut hash = TbHashTable::new(4);

        // 0x12 has home bucket 2. The chain starting at bucket 0 reaches
        // it, and robin hood displacement keeps every entry at most a
        // short, fair distance from its home bucket.
        hash.insert(0x10, 1);
        hash.insert(0x20, 2);
        hash.insert(0x12, 3);
        hash.insert(0x30, 4);

        for key in [0x10, 0x20, 0x12, 0x30] {
            let index = hash.get(key).expect("present");
            let mut bucket = key as usize & hash.mask;
            loop {
                match hash.buckets[bucket] {
                    Some((k, i)) if k == key => {
                        assert_eq!(i, index);
                        // Home bucket of a stored key is at most its
                        // current bucket.
                        assert!(key as usize & hash.mask <= bucket);
                        break;
                    }
                    _ => bucket += 1,
                }
            }
        }
    }

    #[test]
    fn test_hash_updates_existing_key() {
        let mut hash = TbHashTable::new(4);
        hash.insert(0x10, 1);
        hash.insert(0x10, 7);
        assert_eq!(hash.get(0x10), Some(7));
    }

    #[test]
    #[should_panic(expected = "tablebase hash table too small")]
    fn test_hash_overflow_panics() {
        let mut hash = TbHashTable::new(1);
        hash.insert(0, 0);
        hash.insert(2, 1);
        hash.insert(4, 2);
    }

    #[test]
    fn test_init_empty_paths() {
        let mut tables = Tablebase::<Chess>::new();
        assert_eq!(tables.init(""), 0);
        assert_eq!(tables.init("<empty>"), 0);
        assert_eq!(tables.max_cardinality(), 0);
        assert!(tables.is_empty());
    }
}
