//! Allocation of short, unique room codes.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use strumline_protocol::RoomCode;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_LEN: usize = 4;

/// The set of room codes currently in use, shared by every room.
#[derive(Debug, Default)]
pub struct RoomCodeRegistry {
    codes: Mutex<HashSet<RoomCode>>,
}

impl RoomCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws random codes until one is free, then claims it.
    pub fn allocate(&self) -> RoomCode {
        let mut rng = rand::rng();
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let code = random_code(&mut rng);
            if codes.insert(code.clone()) {
                tracing::debug!(%code, "room code allocated");
                return code;
            }
        }
    }

    /// Returns a code to the pool. Unknown codes are ignored.
    pub fn release(&self, code: &RoomCode) {
        let removed = self
            .codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(code);
        if removed {
            tracing::debug!(%code, "room code released");
        }
    }

    pub fn contains(&self, code: &RoomCode) -> bool {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn random_code(rng: &mut impl Rng) -> RoomCode {
    let code = (0..CODE_LEN)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect();
    RoomCode(code)
}
