//! Artist whitelist canonicalization, name standardization, and title tag
//! parsing (base spec §3, §4.4).

pub mod normalize;
pub mod title;
pub mod whitelist;

pub use normalize::{split, standardize, suggest};
pub use whitelist::{canonicalize, Whitelist};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtistError {
    #[error("artist {0:?} is not on the whitelist")]
    NotWhitelisted(String),
    #[error("artist name {0:?} collides with {1} existing whitelist entries")]
    Collision(String, usize),
}

/// Split a raw credit into a whitelisted head and an optional guest, failing
/// if the head can't be resolved to the whitelist at all.
pub fn split_and_standardize(
    whitelist: &Whitelist,
    raw: &str,
) -> Result<(String, Option<String>), ArtistError> {
    let (head, guest) = split(whitelist, raw);
    let standardized = standardize(whitelist, &head).ok_or_else(|| ArtistError::NotWhitelisted(head.clone()))?;
    Ok((standardized, guest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_standardize_resolves_a_whitelisted_head_with_guest() {
        let wl = Whitelist::from_names(["John Lee Hooker".to_string()].into_iter());
        let (head, guest) = split_and_standardize(&wl, "John Lee Hooker feat. Some Guest").unwrap();
        assert_eq!(head, "John Lee Hooker");
        assert_eq!(guest.as_deref(), Some("Some Guest"));
    }

    #[test]
    fn split_and_standardize_fails_on_an_unresolvable_head() {
        let wl = Whitelist::from_names(["John Lee Hooker".to_string()].into_iter());
        assert!(split_and_standardize(&wl, "Someone Else Entirely").is_err());
    }
}
