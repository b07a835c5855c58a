//! Random password generation by strength policy.
//!
//! Each strength level fixes an output length and a set of character
//! classes.  Every included class appears at least once, and positions are
//! shuffled afterwards so the guaranteed characters are not predictable.
//! All randomness comes from `rand::rng()`, a ChaCha-based CSPRNG seeded
//! from the operating system.

use rand::seq::{IndexedRandom, SliceRandom};
use zeroize::Zeroize;

use crate::vault::PasswordStrength;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.?";

/// A character class a policy may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Lowercase,
    Uppercase,
    Digit,
    Symbol,
}

impl CharClass {
    fn alphabet(self) -> &'static [u8] {
        match self {
            Self::Lowercase => LOWERCASE,
            Self::Uppercase => UPPERCASE,
            Self::Digit => DIGITS,
            Self::Symbol => SYMBOLS,
        }
    }

    pub fn contains(self, c: char) -> bool {
        c.is_ascii() && self.alphabet().contains(&(c as u8))
    }
}

/// Length and class composition for one strength level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: usize,
    pub classes: &'static [CharClass],
}

impl PasswordPolicy {
    pub fn for_strength(strength: PasswordStrength) -> Self {
        match strength {
            PasswordStrength::Low => Self {
                length: 8,
                classes: &[CharClass::Lowercase, CharClass::Digit],
            },
            PasswordStrength::Medium => Self {
                length: 12,
                classes: &[CharClass::Lowercase, CharClass::Uppercase, CharClass::Digit],
            },
            PasswordStrength::High => Self {
                length: 16,
                classes: &[
                    CharClass::Lowercase,
                    CharClass::Uppercase,
                    CharClass::Digit,
                    CharClass::Symbol,
                ],
            },
        }
    }

    /// Does `password` have this policy's length, use only its classes,
    /// and use each of them at least once?
    pub fn is_satisfied_by(&self, password: &str) -> bool {
        if password.chars().count() != self.length {
            return false;
        }
        let only_allowed = password
            .chars()
            .all(|c| self.classes.iter().any(|class| class.contains(c)));
        let all_present = self
            .classes
            .iter()
            .all(|class| password.chars().any(|c| class.contains(c)));
        only_allowed && all_present
    }
}

/// Generate a password for `strength`.
pub fn generate(strength: PasswordStrength) -> String {
    generate_with_policy(&PasswordPolicy::for_strength(strength))
}

/// Generate a password satisfying `policy`.
pub fn generate_with_policy(policy: &PasswordPolicy) -> String {
    let mut rng = rand::rng();

    let pool: Vec<u8> = policy
        .classes
        .iter()
        .flat_map(|class| class.alphabet().iter().copied())
        .collect();

    let mut chars: Vec<u8> = Vec::with_capacity(policy.length);

    // One from each class first, so every class is guaranteed.
    for class in policy.classes.iter().take(policy.length) {
        if let Some(&c) = class.alphabet().choose(&mut rng) {
            chars.push(c);
        }
    }
    while chars.len() < policy.length {
        if let Some(&c) = pool.choose(&mut rng) {
            chars.push(c);
        }
    }
    chars.shuffle(&mut rng);

    let password = chars.iter().map(|&b| b as char).collect();
    chars.zeroize();
    password
}
