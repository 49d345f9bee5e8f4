use chess::{Board, ChessMove};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opening_tactics::{filter_top_moves, ExplorerParams, MoveStat, PositionKey};
use std::str::FromStr;

fn bench_position_key(c: &mut Criterion) {
    let test_positions = vec![
        ("Starting Position", "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
        ("Italian", "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3"),
        ("Complex Position", "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1"),
        ("Endgame", "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1"),
    ];

    let mut group = c.benchmark_group("position_key");

    for (name, fen) in test_positions {
        let board = Board::from_str(fen).unwrap();

        group.bench_with_input(BenchmarkId::new("from_board", name), &board, |b, board| {
            b.iter(|| black_box(PositionKey::of(board)))
        });
        group.bench_with_input(BenchmarkId::new("from_fen", name), fen, |b, fen| {
            b.iter(|| black_box(PositionKey::from_fen(fen)))
        });
    }

    group.finish();
}

fn bench_filter_top_moves(c: &mut Criterion) {
    let board = Board::default();
    let mut legal: Vec<ChessMove> = chess::MoveGen::new_legal(&board).collect();
    legal.sort_by_key(|mv| mv.to_string());

    // Popularity falls off geometrically like real opening statistics
    let stats: Vec<MoveStat> = legal
        .iter()
        .enumerate()
        .map(|(i, &mv)| {
            let games = 1_000_000u64 >> i.min(20);
            MoveStat::new(mv, games / 3, games / 3, games - 2 * (games / 3))
        })
        .collect();

    let mut group = c.benchmark_group("filter_top_moves");

    for percent in [50u32, 80, 95] {
        let params = ExplorerParams {
            max_depth: 6,
            min_games: Some(100),
            top_percent: Some(percent),
            top_n: None,
        };
        group.bench_with_input(BenchmarkId::new("top_percent", percent), &params, |b, params| {
            b.iter(|| black_box(filter_top_moves(&stats, params)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_position_key, bench_filter_top_moves);
criterion_main!(benches);
