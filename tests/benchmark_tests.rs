//! Performance benchmarks for the hot paths of a round

use server::rooms::RoomRegistry;
use shared::{find_set, is_valid_set, new_deck, update_board, Card, GameState, BOARD_SIZE};
use std::sync::Arc;
use std::time::Instant;

/// Benchmarks set validation over every ordered triple of the deck
#[test]
fn benchmark_set_validation() {
    let cards = Card::all();
    let start = Instant::now();
    let mut valid = 0usize;

    for a in &cards {
        for b in &cards {
            for c in &cards {
                if is_valid_set(&[*a, *b, *c]) {
                    valid += 1;
                }
            }
        }
    }

    let duration = start.elapsed();
    let iterations = cards.len().pow(3);
    println!(
        "Set validation: {} triples in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // 1080 unordered sets, each counted in all 6 orders
    assert_eq!(valid, 1080 * 6);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks playing whole rounds through the board manager
#[test]
fn benchmark_full_rounds() {
    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut state = GameState::deal(new_deck(), BOARD_SIZE);
        while let Some(found) = find_set(&state.board) {
            state = update_board(
                state.deck,
                state.board,
                state.number_of_sets + 1,
                &found,
                BOARD_SIZE,
            );
        }
        assert!(state.number_of_sets <= 27);
    }

    let duration = start.elapsed();
    println!(
        "Full rounds: {} rounds in {:?} ({:.2} μs/round)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Benchmarks contended submissions in a single room
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn benchmark_contended_room() {
    let registry = Arc::new(RoomRegistry::default());
    let players = 32u32;
    for id in 1..=players {
        registry.join("bench", id, &format!("p{}", id)).await;
    }
    registry.start_game("bench").await.unwrap();

    let start = Instant::now();
    let mut handles = Vec::new();
    for id in 1..=players {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let mut accepted = 0u32;
            for _ in 0..50 {
                let Some(state) = registry.game_state("bench").await.unwrap() else {
                    break;
                };
                let Some(set) = find_set(&state.board) else {
                    break;
                };
                let selected: Vec<String> = set.iter().map(Card::id).collect();
                if registry.verify_selection("bench", id, &selected).await.is_ok() {
                    accepted += 1;
                }
            }
            accepted
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        accepted += handle.await.unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Contended room: {} accepted sets across {} players in {:?}",
        accepted, players, duration
    );

    let state = registry.game_state("bench").await.unwrap().unwrap();
    assert_eq!(state.number_of_sets, accepted);
    let total: i64 = registry
        .users("bench")
        .await
        .unwrap()
        .iter()
        .map(|u| u.points)
        .sum();
    assert_eq!(total, accepted as i64);
    assert!(duration.as_secs() < 10);
}
