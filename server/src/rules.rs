//! Static game balance tables and role assignment.
//!
//! Every function here is pure: roster size and round number in, numbers
//! out. Randomness is always supplied by the caller so that games can be
//! replayed from a seed in tests.

use rand::seq::index;
use rand::Rng;
use shared::{PlayerId, MAX_PLAYERS, MIN_PLAYERS, MISSIONS_TO_WIN, NUM_ROUNDS};

/// Mission team size, indexed by `[player_count - 5][round]`.
const MISSION_SIZES: [[usize; NUM_ROUNDS]; MAX_PLAYERS - MIN_PLAYERS + 1] = [
    [2, 3, 2, 3, 3],
    [2, 3, 4, 3, 4],
    [2, 3, 3, 4, 4],
    [3, 4, 4, 5, 5],
    [3, 4, 4, 5, 5],
    [3, 4, 4, 5, 5],
];

/// Number of spies, indexed by `player_count - 5`.
const SPY_COUNTS: [usize; MAX_PLAYERS - MIN_PLAYERS + 1] = [2, 2, 3, 3, 4, 4];

/// Returns true if a game can be played with `count` players.
pub fn valid_player_count(count: usize) -> bool {
    (MIN_PLAYERS..=MAX_PLAYERS).contains(&count)
}

fn table_row(count: usize) -> usize {
    count.clamp(MIN_PLAYERS, MAX_PLAYERS) - MIN_PLAYERS
}

/// Number of players sent on the mission of `round` (0-based).
///
/// Counts outside 5..=10 and rounds past the last are clamped to the table.
pub fn mission_size(count: usize, round: usize) -> usize {
    MISSION_SIZES[table_row(count)][round.min(NUM_ROUNDS - 1)]
}

/// The full mission size row for a roster, as sent to clients at game start.
pub fn agents_per_round(count: usize) -> Vec<usize> {
    MISSION_SIZES[table_row(count)].to_vec()
}

/// Fail votes a mission may absorb and still succeed.
///
/// Large games tolerate a single fail on the fourth mission.
pub fn max_fails(count: usize, round: usize) -> usize {
    if count >= 7 && round == 3 {
        1
    } else {
        0
    }
}

pub fn mission_succeeds(count: usize, round: usize, num_fails: usize) -> bool {
    num_fails <= max_fails(count, round)
}

/// A nomination passes on a strict majority of the whole roster.
pub fn mission_approved(count: usize, num_approve: usize) -> bool {
    num_approve * 2 > count
}

pub fn num_spies(count: usize) -> usize {
    SPY_COUNTS[table_row(count)]
}

/// Picks the spies uniformly at random without replacement.
///
/// The result keeps the roster's order.
pub fn assign_spies<R: Rng + ?Sized>(rng: &mut R, players: &[PlayerId]) -> Vec<PlayerId> {
    let amount = num_spies(players.len()).min(players.len());
    let mut picked = index::sample(rng, players.len(), amount).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| players[i].clone()).collect()
}

/// Index of the first mission leader, uniform over the roster.
pub fn choose_mission_leader<R: Rng + ?Sized>(rng: &mut R, count: usize) -> usize {
    rng.gen_range(0..count)
}

pub fn next_mission_leader(leader: usize, count: usize) -> usize {
    (leader + 1) % count
}

/// Checks whether the game ends after the mission of `round` resolved,
/// with `successes` already counting that mission.
pub fn game_over(round: usize, successes: u32) -> bool {
    let failures = (round as u32 + 1).saturating_sub(successes);
    round == NUM_ROUNDS - 1 || successes == MISSIONS_TO_WIN || failures == MISSIONS_TO_WIN
}

pub fn resistance_won(successes: u32) -> bool {
    successes == MISSIONS_TO_WIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn roster(count: usize) -> Vec<PlayerId> {
        (0..count).map(|i| format!("player{}", i)).collect()
    }

    #[test]
    fn test_mission_size_table() {
        let expected: [(usize, [usize; 5]); 6] = [
            (5, [2, 3, 2, 3, 3]),
            (6, [2, 3, 4, 3, 4]),
            (7, [2, 3, 3, 4, 4]),
            (8, [3, 4, 4, 5, 5]),
            (9, [3, 4, 4, 5, 5]),
            (10, [3, 4, 4, 5, 5]),
        ];

        for (count, sizes) in expected {
            for (round, size) in sizes.iter().enumerate() {
                assert_eq!(mission_size(count, round), *size, "{} players, round {}", count, round);
            }
            assert_eq!(agents_per_round(count), sizes.to_vec());
        }
    }

    #[test]
    fn test_max_fails_table() {
        for count in MIN_PLAYERS..=MAX_PLAYERS {
            for round in 0..NUM_ROUNDS {
                let expected = if count >= 7 && round == 3 { 1 } else { 0 };
                assert_eq!(max_fails(count, round), expected);
            }
        }
    }

    #[test]
    fn test_mission_success_threshold() {
        assert!(mission_succeeds(5, 0, 0));
        assert!(!mission_succeeds(5, 0, 1));

        // Fourth mission of a large game tolerates one fail
        assert!(mission_succeeds(7, 3, 1));
        assert!(!mission_succeeds(7, 3, 2));
        assert!(!mission_succeeds(6, 3, 1));
    }

    #[test]
    fn test_strict_majority() {
        for count in MIN_PLAYERS..=MAX_PLAYERS {
            assert!(mission_approved(count, count / 2 + 1));
            assert!(!mission_approved(count, count / 2));
        }

        assert!(mission_approved(6, 4));
        assert!(!mission_approved(6, 3));
        assert!(mission_approved(6, 6));
        assert!(!mission_approved(6, 1));
    }

    #[test]
    fn test_spy_counts() {
        let expected = [(5, 2), (6, 2), (7, 3), (8, 3), (9, 4), (10, 4)];
        for (count, spies) in expected {
            assert_eq!(num_spies(count), spies);
        }
    }

    #[test]
    fn test_assign_spies_is_subset_of_roster() {
        let mut rng = StdRng::seed_from_u64(7);

        for count in MIN_PLAYERS..=MAX_PLAYERS {
            let players = roster(count);
            for _ in 0..20 {
                let spies = assign_spies(&mut rng, &players);
                let distinct: HashSet<_> = spies.iter().collect();

                assert_eq!(spies.len(), num_spies(count));
                assert_eq!(distinct.len(), spies.len());
                assert!(spies.iter().all(|spy| players.contains(spy)));
            }
        }
    }

    #[test]
    fn test_assign_spies_covers_everyone_eventually() {
        let mut rng = StdRng::seed_from_u64(99);
        let players = roster(5);
        let mut seen = HashSet::new();

        for _ in 0..200 {
            seen.extend(assign_spies(&mut rng, &players));
        }

        assert_eq!(seen.len(), players.len());
    }

    #[test]
    fn test_leader_choice_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for count in MIN_PLAYERS..=MAX_PLAYERS {
            for _ in 0..50 {
                assert!(choose_mission_leader(&mut rng, count) < count);
            }
        }
    }

    #[test]
    fn test_leader_rotation_is_cyclic() {
        for count in MIN_PLAYERS..=MAX_PLAYERS {
            let mut leader = count - 2;
            let mut visited = HashSet::new();

            for _ in 0..count {
                visited.insert(leader);
                leader = next_mission_leader(leader, count);
                assert!(leader < count);
            }

            assert_eq!(visited.len(), count);
            assert_eq!(leader, count - 2);
        }
    }

    #[test]
    fn test_game_over_conditions() {
        // Round 0 with one success or one failure is never terminal
        assert!(!game_over(0, 0));
        assert!(!game_over(0, 1));

        // Three failures end the game regardless of round
        assert!(game_over(2, 0));
        assert!(game_over(3, 1));
        assert!(!game_over(2, 1));

        // Three successes end the game
        assert!(game_over(2, 3));
        assert!(game_over(3, 3));

        // Last round always ends the game
        assert!(game_over(4, 2));
    }

    #[test]
    fn test_resistance_won() {
        assert!(resistance_won(3));
        assert!(!resistance_won(2));
        assert!(!resistance_won(0));
    }
}
