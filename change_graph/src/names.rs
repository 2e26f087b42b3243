use anyhow::Result;
use pogo_types::{ChangeName, CHANGE_NAME_ALPHABET, CHANGE_NAME_LEN};
use rand::RngCore;

const MAX_ATTEMPTS: usize = 16;

/// Draws 10 random bytes and encodes them against the 32-symbol alphabet,
/// retrying on collision. 10 bytes = 80 bits = exactly 16 lookups of 5 bits
/// each against a 32-entry table, so no bit is wasted or reused.
pub fn generate<E>(mut name_exists: impl FnMut(&str) -> Result<bool, E>) -> Result<ChangeName>
where
    anyhow::Error: From<E>,
{
    for _ in 0..MAX_ATTEMPTS {
        let candidate = random_name();
        if !name_exists(&candidate)? {
            return Ok(ChangeName::new(candidate).expect("generated name satisfies its own alphabet"));
        }
    }
    anyhow::bail!(
        "could not generate a unique change name in {} attempts",
        MAX_ATTEMPTS
    )
}

fn random_name() -> String {
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode(&bytes)
}

/// 10 bytes (80 bits) packed 5 bits at a time into 16 alphabet symbols.
fn encode(bytes: &[u8; 10]) -> String {
    let mut bits = 0u128;
    for &b in bytes {
        bits = (bits << 8) | b as u128;
    }
    let mut out = String::with_capacity(CHANGE_NAME_LEN);
    for i in (0..CHANGE_NAME_LEN).rev() {
        let shift = i * 5;
        let idx = ((bits >> shift) & 0b11111) as usize;
        out.push(CHANGE_NAME_ALPHABET[idx] as char);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_produces_valid_name() {
        let name = random_name();
        assert_eq!(name.len(), CHANGE_NAME_LEN);
        assert!(ChangeName::new(&name).is_ok());
    }

    #[test]
    fn generate_retries_on_collision() {
        let mut calls = 0;
        let result = generate::<anyhow::Error>(|_name| {
            calls += 1;
            Ok(calls < 3)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn generate_gives_up_after_max_attempts() {
        let result = generate::<anyhow::Error>(|_name| Ok(true));
        assert!(result.is_err());
    }
}
