//! Display name validation and deduplication.

use strumline_protocol::JoinErrorCode;

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 14;

/// Checks a join request's name and protocol version.
///
/// Checks run in a fixed order and the first failure wins: length floor,
/// characters, protocol version, length ceiling.
pub fn validate_join(name: &str, protocol: u32, expected: u32) -> Result<(), JoinErrorCode> {
    let trimmed = name.trim();
    if trimmed.chars().count() < MIN_NAME_LEN {
        return Err(JoinErrorCode::NameTooShort);
    }
    if trimmed != name || name.chars().any(|c| c.is_control() || c == '<' || c == '>') {
        return Err(JoinErrorCode::InvalidNameCharacters);
    }
    if protocol != expected {
        return Err(JoinErrorCode::ProtocolMismatch);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(JoinErrorCode::NameTooLong);
    }
    Ok(())
}

/// Returns `name`, or `name (n)` with the smallest `n >= 2` not in `taken`.
pub fn dedupe_name<'a, I>(name: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();
    if !taken.contains(&name) {
        return name.to_owned();
    }
    // At most `taken.len()` suffixes can collide.
    for n in 2..=taken.len() + 1 {
        let candidate = format!("{name} ({n})");
        if !taken.contains(&candidate.as_str()) {
            return candidate;
        }
    }
    format!("{name} ({})", taken.len() + 2)
}
