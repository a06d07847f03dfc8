//! Card model for the Set deck
//!
//! A card has four attributes, each taking one of three values. The deck is
//! the full cartesian product of the attribute alphabets, so every distinct
//! card appears exactly once in the 81-card universe.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of attributes on every card
pub const ATTRIBUTE_COUNT: usize = 4;
/// Number of distinct values each attribute can take
pub const VALUES_PER_ATTRIBUTE: u8 = 3;
/// Size of the full deck (3^4)
pub const DECK_SIZE: usize = 81;

macro_rules! attribute {
    ($(#[$meta:meta])* $name:ident { $a:ident, $b:ident, $c:ident }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $a,
            $b,
            $c,
        }

        impl $name {
            pub const ALL: [$name; 3] = [$name::$a, $name::$b, $name::$c];

            pub fn index(self) -> u8 {
                self as u8
            }

            pub fn from_index(index: u8) -> Option<Self> {
                Self::ALL.get(index as usize).copied()
            }
        }
    };
}

attribute!(
    /// How many symbols are printed on the card
    Number { One, Two, Three }
);
attribute!(Color { Red, Green, Purple });
attribute!(Shape { Oval, Squiggle, Diamond });
attribute!(Shading { Solid, Striped, Open });

/// A single card. Identity is structural: two cards with equal attributes are
/// the same card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Card {
    pub number: Number,
    pub color: Color,
    pub shape: Shape,
    pub shading: Shading,
}

impl Card {
    pub fn new(number: Number, color: Color, shape: Shape, shading: Shading) -> Self {
        Self {
            number,
            color,
            shape,
            shading,
        }
    }

    /// Attribute values as indices, in the order number, color, shape, shading
    pub fn attributes(&self) -> [u8; ATTRIBUTE_COUNT] {
        [
            self.number.index(),
            self.color.index(),
            self.shape.index(),
            self.shading.index(),
        ]
    }

    pub fn from_attributes(values: [u8; ATTRIBUTE_COUNT]) -> Option<Self> {
        Some(Self {
            number: Number::from_index(values[0])?,
            color: Color::from_index(values[1])?,
            shape: Shape::from_index(values[2])?,
            shading: Shading::from_index(values[3])?,
        })
    }

    /// Wire identifier, one digit per attribute (e.g. `"0120"`)
    pub fn id(&self) -> String {
        self.attributes()
            .iter()
            .map(|value| char::from(b'0' + value))
            .collect()
    }

    /// Parses a wire identifier. Returns None for anything that is not
    /// exactly four digits in `0..=2`.
    pub fn from_id(id: &str) -> Option<Self> {
        let bytes = id.as_bytes();
        if bytes.len() != ATTRIBUTE_COUNT {
            return None;
        }

        let mut values = [0u8; ATTRIBUTE_COUNT];
        for (slot, byte) in values.iter_mut().zip(bytes) {
            *slot = byte.checked_sub(b'0')?;
        }
        Self::from_attributes(values)
    }

    /// Every card in canonical order, shading varying fastest
    pub fn all() -> Vec<Card> {
        let mut cards = Vec::with_capacity(DECK_SIZE);
        for number in Number::ALL {
            for color in Color::ALL {
                for shape in Shape::ALL {
                    for shading in Shading::ALL {
                        cards.push(Card::new(number, color, shape, shading));
                    }
                }
            }
        }
        cards
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Builds a freshly shuffled 81-card deck
pub fn build_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = Card::all();
    deck.shuffle(rng);
    deck
}

pub fn new_deck() -> Vec<Card> {
    build_deck(&mut rand::thread_rng())
}

/// Decides whether three cards form a set
///
/// Returns false unless exactly three pairwise distinct cards are given. For
/// each attribute the three values must be all equal or all different.
pub fn is_valid_set(cards: &[Card]) -> bool {
    let (a, b, c) = match cards {
        [a, b, c] => (a, b, c),
        _ => return false,
    };

    if a == b || b == c || a == c {
        return false;
    }

    let (a, b, c) = (a.attributes(), b.attributes(), c.attributes());
    (0..ATTRIBUTE_COUNT).all(|i| {
        let all_same = a[i] == b[i] && b[i] == c[i];
        let all_different = a[i] != b[i] && b[i] != c[i] && a[i] != c[i];
        all_same || all_different
    })
}

/// The unique card that completes a set with `a` and `b`
pub fn third_card(a: &Card, b: &Card) -> Card {
    let (a, b) = (a.attributes(), b.attributes());
    let mut values = [0u8; ATTRIBUTE_COUNT];
    for i in 0..ATTRIBUTE_COUNT {
        values[i] = if a[i] == b[i] {
            a[i]
        } else {
            // 0 + 1 + 2 == 3, so the missing value is whatever remains
            VALUES_PER_ATTRIBUTE - a[i] - b[i]
        };
    }

    Card {
        number: Number::ALL[values[0] as usize],
        color: Color::ALL[values[1] as usize],
        shape: Shape::ALL[values[2] as usize],
        shading: Shading::ALL[values[3] as usize],
    }
}

/// Finds the first valid set on a board, if any
pub fn find_set(board: &[Card]) -> Option<[Card; 3]> {
    for i in 0..board.len() {
        for j in (i + 1)..board.len() {
            let wanted = third_card(&board[i], &board[j]);
            if board[(j + 1)..].contains(&wanted) {
                return Some([board[i], board[j], wanted]);
            }
        }
    }
    None
}
