//! Pseudo-random port allocation in `[1024, 65535]`.

use std::collections::HashSet;

use rand::Rng;

use gymgate_core::types::{MAX_PORT, MIN_PORT};

/// Draws before giving up on avoiding registered ports.
const MAX_DRAWS: usize = 64;

pub fn in_range(port: u16) -> bool {
    (MIN_PORT..=MAX_PORT).contains(&port)
}

/// Pick a random port, skipping ports already held by other origins.
///
/// Collision avoidance is best-effort: after [`MAX_DRAWS`] collisions the
/// last draw is returned and the OS decides at bind time.
pub fn allocate<R: Rng + ?Sized>(taken: &HashSet<u16>, rng: &mut R) -> u16 {
    let mut port = rng.gen_range(MIN_PORT..=MAX_PORT);
    for _ in 1..MAX_DRAWS {
        if !taken.contains(&port) {
            break;
        }
        port = rng.gen_range(MIN_PORT..=MAX_PORT);
    }
    port
}
