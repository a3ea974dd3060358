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

use std::{fs::File, io::Write as _, path::Path};

use shakmaty::{fen::Fen, CastlingMode, Chess};
use shakmaty_tb::{Dtz, ProbeState, SyzygyError, Tablebase, Wdl};
use tempfile::TempDir;

/// A complete KNvK WDL table. Both sub-tables store the single value 2
/// (draw).
const KNVK_RTBW: &[u8] = &[
    0x71, 0xe8, 0x23, 0x5d, 0x31, 0x00, 0xee, 0x66, 0x22, 0x00, 0x80, 0x02, 0x80, 0x02, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0xb9, 0xec, 0xcb, 0xff, 0x19, 0xc6, 0x77, 0x15, 0x8e, 0x92, 0x8b,
    0x1b, 0x64, 0x12, 0x48, 0xb7,
];

/// A complete KNvKN DTZ table, storing a single value.
const KNVKN_RTBZ: &[u8] = &[
    0xd7, 0x66, 0x0c, 0xa5, 0x40, 0x01, 0x0e, 0x0a, 0x06, 0x02, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x2d, 0xa6, 0x2b, 0xda, 0x60, 0xbf, 0xb9, 0x2c, 0xbd, 0x46, 0x72,
    0xdb, 0x2c, 0xd6, 0xb6, 0xc5,
];

/// Pads table data so that its size is congruent to 16 modulo 64, as
/// required of table files.
fn write_table(dir: &Path, name: &str, data: &[u8]) {
    let mut data = data.to_vec();
    while data.len() % 64 != 16 {
        data.push(0);
    }
    File::create(dir.join(name))
        .expect("create")
        .write_all(&data)
        .expect("write");
}

fn pos(fen: &str) -> Chess {
    fen.parse::<Fen>()
        .expect("valid fen")
        .into_position(CastlingMode::Standard)
        .expect("legal position")
}

fn knvk_tables() -> (TempDir, Tablebase<Chess>) {
    let tmp = TempDir::new().expect("tempdir");
    write_table(tmp.path(), "KNvK.rtbw", KNVK_RTBW);

    let mut tables = Tablebase::new();
    assert_eq!(tables.init(&tmp.path().display().to_string()), 1);
    (tmp, tables)
}

#[test]
fn test_discovery() {
    let (_tmp, tables) = knvk_tables();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables.max_cardinality(), 3);
}

#[test]
fn test_discovery_requires_wdl_file() {
    let tmp = TempDir::new().expect("tempdir");
    write_table(tmp.path(), "KNvKN.rtbz", KNVKN_RTBZ);

    let mut tables = Tablebase::<Chess>::new();
    assert_eq!(tables.init(&tmp.path().display().to_string()), 0);
    assert_eq!(tables.max_cardinality(), 0);
}

#[test]
fn test_discovery_checks_existence_only() {
    let tmp = TempDir::new().expect("tempdir");
    write_table(tmp.path(), "KNvK.rtbw", KNVK_RTBW);
    // Discovery does not open the file contents.
    File::create(tmp.path().join("KNvKN.rtbw")).expect("create");

    let mut tables = Tablebase::<Chess>::new();
    assert_eq!(tables.init(&tmp.path().display().to_string()), 2);
    assert_eq!(tables.max_cardinality(), 4);
}

#[test]
fn test_discovery_across_path_list() {
    let tmp = TempDir::new().expect("tempdir");
    let first = tmp.path().join("wdl");
    let second = tmp.path().join("more");
    std::fs::create_dir_all(&first).expect("mkdir");
    std::fs::create_dir_all(&second).expect("mkdir");
    write_table(&second, "KNvK.rtbw", KNVK_RTBW);

    let separator = if cfg!(windows) { ';' } else { ':' };
    let paths = format!("{}{}{}", first.display(), separator, second.display());

    let mut tables = Tablebase::<Chess>::new();
    assert_eq!(tables.init(&paths), 1);
}

#[test]
fn test_init_with_info() {
    let (tmp, _) = knvk_tables();

    let mut messages = Vec::new();
    let mut tables = Tablebase::<Chess>::new();
    tables.init_with_info(&tmp.path().display().to_string(), |line| {
        messages.push(line.to_owned())
    });

    assert_eq!(messages, vec!["Found 1 tablebases".to_owned()]);
}

#[test]
fn test_kvk_is_drawn_without_any_table() {
    let mut tables = Tablebase::<Chess>::new();
    tables.init("");

    let kvk = pos("4k3/8/8/8/8/8/8/4K3 w - - 0 1");

    let (wdl, state) = tables.probe_wdl(&kvk).expect("kvk needs no table");
    assert_eq!(wdl, Wdl::Draw);
    assert_eq!(state, ProbeState::Normal);

    let (dtz, _) = tables.probe_dtz(&kvk).expect("kvk needs no table");
    assert_eq!(dtz, Dtz(0));
}

#[test]
fn test_probe_wdl_knvk() {
    let (_tmp, tables) = knvk_tables();

    for fen in [
        "4k3/8/8/8/8/8/8/NK6 w - - 0 1",
        "4k3/8/8/8/8/8/8/NK6 b - - 0 1",
        "8/8/8/3k4/8/8/5N2/1K6 w - - 0 1",
    ] {
        let (wdl, _) = tables.probe_wdl(&pos(fen)).expect("probe");
        assert_eq!(wdl, Wdl::Draw, "{fen}");
    }
}

#[test]
fn test_probe_wdl_flipped_colors() {
    // The stronger side is black; the lookup uses the mirrored key.
    let (_tmp, tables) = knvk_tables();

    let (wdl, _) = tables
        .probe_wdl(&pos("4K3/8/8/8/8/8/8/nk6 b - - 0 1"))
        .expect("probe");
    assert_eq!(wdl, Wdl::Draw);

    let (wdl, _) = tables
        .probe_wdl(&pos("4K3/8/8/8/8/8/8/nk6 w - - 0 1"))
        .expect("probe");
    assert_eq!(wdl, Wdl::Draw);
}

#[test]
fn test_probe_wdl_with_capture() {
    let (_tmp, tables) = knvk_tables();

    // Black can capture the knight, leading to KvK.
    let (wdl, state) = tables
        .probe_wdl(&pos("8/8/8/8/8/1Nk5/8/1K6 b - - 0 1"))
        .expect("probe");
    assert_eq!(wdl, Wdl::Draw);
    assert_eq!(state, ProbeState::Normal);
}

#[test]
fn test_probe_dtz_knvk() {
    let (_tmp, tables) = knvk_tables();

    let (dtz, _) = tables
        .probe_dtz(&pos("4k3/8/8/8/8/8/8/NK6 w - - 0 1"))
        .expect("probe");
    assert_eq!(dtz, Dtz(0));
}

#[test]
fn test_missing_table() {
    let (_tmp, tables) = knvk_tables();

    let result = tables.probe_wdl(&pos("4k3/8/8/8/8/8/8/QK6 w - - 0 1"));
    match result {
        Err(SyzygyError::MissingTable { material }) => {
            assert_eq!(material.to_string(), "KQvK");
        }
        _ => panic!("expected missing table, got {result:?}"),
    }
}

#[test]
fn test_too_many_pieces() {
    let (_tmp, tables) = knvk_tables();

    let result = tables.probe_wdl(&pos("4k3/8/8/8/8/8/8/R3K3 w Q - 0 1"));
    assert!(matches!(result, Err(SyzygyError::Castling)));

    let result = tables.probe_wdl(&pos(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1",
    ));
    assert!(matches!(result, Err(SyzygyError::TooManyPieces)));
}

#[test]
fn test_bad_magic_is_treated_as_missing() {
    let tmp = TempDir::new().expect("tempdir");
    // A WDL file that actually starts with the DTZ magic.
    write_table(tmp.path(), "KNvK.rtbw", KNVKN_RTBZ);

    let mut tables = Tablebase::<Chess>::new();
    assert_eq!(tables.init(&tmp.path().display().to_string()), 1);

    let result = tables.probe_wdl(&pos("4k3/8/8/8/8/8/8/NK6 w - - 0 1"));
    assert!(matches!(result, Err(SyzygyError::MissingTable { .. })));
}

#[test]
fn test_root_probe_ranks_draws() {
    let (_tmp, tables) = knvk_tables();

    let root = pos("4k3/8/8/8/8/8/8/NK6 w - - 0 1");
    let root_moves = tables.root_probe(&root, true, false).expect("probe");

    assert!(!root_moves.is_empty());
    for root_move in &root_moves {
        assert_eq!(root_move.tb_rank, 0, "{:?}", root_move.mv);
        assert_eq!(root_move.tb_score, 0, "{:?}", root_move.mv);
    }
}

#[test]
fn test_root_probe_wdl_ranks_draws() {
    let (_tmp, tables) = knvk_tables();

    let root = pos("4k3/8/8/8/8/8/8/NK6 b - - 0 1");
    let root_moves = tables.root_probe_wdl(&root, true).expect("probe");

    assert!(!root_moves.is_empty());
    for root_move in &root_moves {
        assert_eq!(root_move.tb_rank, 0, "{:?}", root_move.mv);
    }
}

#[test]
fn test_root_probe_fails_closed() {
    let (_tmp, tables) = knvk_tables();

    // No KQvK table is present, so no move can be ranked.
    let root = pos("4k3/8/8/8/8/8/8/QK6 w - - 0 1");
    assert!(tables.root_probe(&root, true, false).is_err());
    assert!(tables.root_probe_wdl(&root, true).is_err());
}

#[test]
fn test_concurrent_probes() {
    let (_tmp, tables) = knvk_tables();

    // The first probes race to map the table.
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let (wdl, _) = tables
                    .probe_wdl(&pos("4k3/8/8/8/8/8/8/NK6 w - - 0 1"))
                    .expect("probe");
                assert_eq!(wdl, Wdl::Draw);
            });
        }
    });
}
