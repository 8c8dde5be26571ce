//! Chat games with no stored state: dice, coin flips and the magic 8-ball.
//!
//! Every function takes the RNG from the caller so outcomes can be pinned in tests.

use crate::core::error::AetherError;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SIDES: i64 = 6;
pub const MIN_SIDES: i64 = 2;
pub const MAX_SIDES: i64 = 100;

pub const EIGHT_BALL_ANSWERS: [&str; 20] = [
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

/// Roll a die with `sides` faces, returning a value in `[1, sides]`.
pub fn roll_die<R: Rng + ?Sized>(sides: i64, rng: &mut R) -> Result<i64, AetherError> {
    if !(MIN_SIDES..=MAX_SIDES).contains(&sides) {
        return Err(AetherError::ValidationError(format!(
            "dice must have between {MIN_SIDES} and {MAX_SIDES} sides, got {sides}"
        )));
    }
    Ok(rng.gen_range(1..=sides))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinFace {
    Heads,
    Tails,
}

impl fmt::Display for CoinFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoinFace::Heads => "Heads",
            CoinFace::Tails => "Tails",
        })
    }
}

pub fn flip_coin<R: Rng + ?Sized>(rng: &mut R) -> CoinFace {
    if rng.gen_bool(0.5) {
        CoinFace::Heads
    } else {
        CoinFace::Tails
    }
}

/// Pick one of the classic 8-ball answers. The question does not affect the draw.
pub fn eight_ball<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    EIGHT_BALL_ANSWERS.choose(rng).copied().unwrap_or(EIGHT_BALL_ANSWERS[0])
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "fun",
        "version": "0.1.0",
        "description": "Dice, coin flips and the magic 8-ball",
        "commands": [
            { "name": "roll", "parameters": ["sides"] },
            { "name": "flip", "parameters": [] },
            { "name": "8ball", "parameters": ["question"] }
        ],
        "storage": []
    })
}
