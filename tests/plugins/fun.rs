use aether::core::error::AetherError;
use aether::plugins::fun::{
    CoinFace, DEFAULT_SIDES, EIGHT_BALL_ANSWERS, eight_ball, flip_coin, roll_die,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

#[test]
fn default_die_stays_within_its_faces() {
    let mut rng = StdRng::seed_from_u64(11);
    let seen: HashSet<i64> = (0..500)
        .map(|_| roll_die(DEFAULT_SIDES, &mut rng).unwrap())
        .collect();
    assert_eq!(seen, (1..=6).collect::<HashSet<i64>>());
}

#[test]
fn die_outside_two_to_one_hundred_sides_is_rejected() {
    let mut rng = StdRng::seed_from_u64(0);
    for sides in [-3, 0, 1, 101, 1_000] {
        let err = roll_die(sides, &mut rng).unwrap_err();
        assert!(matches!(err, AetherError::ValidationError(_)), "sides {sides}");
    }
    let two = roll_die(2, &mut rng).unwrap();
    assert!((1..=2).contains(&two));
    let hundred = roll_die(100, &mut rng).unwrap();
    assert!((1..=100).contains(&hundred));
}

#[test]
fn same_seed_gives_same_rolls() {
    let a: Vec<i64> = {
        let mut rng = StdRng::seed_from_u64(42);
        (0..10).map(|_| roll_die(20, &mut rng).unwrap()).collect()
    };
    let b: Vec<i64> = {
        let mut rng = StdRng::seed_from_u64(42);
        (0..10).map(|_| roll_die(20, &mut rng).unwrap()).collect()
    };
    assert_eq!(a, b);
}

#[test]
fn coin_lands_on_both_faces() {
    let mut rng = StdRng::seed_from_u64(5);
    let faces: HashSet<CoinFace> = (0..100).map(|_| flip_coin(&mut rng)).collect();
    assert_eq!(faces.len(), 2);
    assert_eq!(CoinFace::Heads.to_string(), "Heads");
    assert_eq!(serde_json::to_value(CoinFace::Tails).unwrap(), "tails");
}

#[test]
fn eight_ball_answers_come_from_the_fixed_list() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut seen = HashSet::new();
    for _ in 0..1_000 {
        let answer = eight_ball(&mut rng);
        assert!(EIGHT_BALL_ANSWERS.contains(&answer));
        seen.insert(answer);
    }
    assert_eq!(seen.len(), EIGHT_BALL_ANSWERS.len());
}
