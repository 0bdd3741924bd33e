//! The canonical artist-name store: a flat text file, one name per line,
//! loaded once at startup and passed by reference everywhere — the Rust
//! answer to the source's "globals + lock" pattern (see design notes).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Canonicalize a raw artist name for whitelist lookup/collision purposes.
///
/// lowercase -> strip a leading/trailing "the" word -> map " and " to "&"
/// -> strip everything that isn't a letter, digit, or "&" -> (if that left
/// nothing) fall back to stripping only control/whitespace characters ->
/// NFD-decompose and drop combining marks so diacritics fold to their base
/// letter.
pub fn canonicalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let trimmed = strip_leading_trailing_the(&words);
    let mapped = trimmed.replace(" and ", "&");

    let filtered: String = mapped
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '&')
        .collect();

    let base = if filtered.is_empty() {
        mapped.chars().filter(|c| !c.is_control() && !c.is_whitespace()).collect()
    } else {
        filtered
    };

    base.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

fn strip_leading_trailing_the(words: &[&str]) -> String {
    let mut words = words.to_vec();
    if words.first() == Some(&"the") {
        words.remove(0);
    }
    if words.last() == Some(&"the") {
        words.pop();
    }
    words.join(" ")
}

/// The artist whitelist: canonical form -> the raw display name(s) sharing it.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    by_canonical: HashMap<String, Vec<String>>,
}

impl Whitelist {
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut by_canonical: HashMap<String, Vec<String>> = HashMap::new();
        for name in names {
            by_canonical.entry(canonicalize(&name)).or_default().push(name);
        }
        Whitelist { by_canonical }
    }

    /// UTF-8 text file, one canonical name per line; `#`-prefixed and blank
    /// lines are ignored.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let names = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string);
        Ok(Self::from_names(names))
    }

    /// Atomically rewrite the whitelist file: write to a sibling temp file
    /// then rename over the target.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut names: Vec<&str> = self
            .by_canonical
            .values()
            .flat_map(|v| v.iter().map(String::as_str))
            .collect();
        names.sort_unstable();
        let contents = names.join("\n") + "\n";

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Every stored display name whose canonical form matches `name`'s.
    /// More than one means the whitelist has an unresolved collision.
    pub fn check_collisions(&self, name: &str) -> &[String] {
        self.by_canonical
            .get(&canonicalize(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resolve_canonical(&self, canonical: &str) -> Option<&str> {
        self.by_canonical
            .get(canonical)
            .and_then(|names| names.first())
            .map(String::as_str)
    }

    pub fn contains_canonical(&self, canonical: &str) -> bool {
        self.by_canonical.contains_key(canonical)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.by_canonical.values().flat_map(|v| v.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_leading_the_and_folds_case() {
        assert_eq!(canonicalize("The Fall"), canonicalize("fall, the"));
    }

    #[test]
    fn canonicalize_collapses_internal_whitespace_runs() {
        assert_eq!(canonicalize("john  lee hooker"), canonicalize("John Lee Hooker"));
    }

    #[test]
    fn canonicalize_maps_and_to_ampersand() {
        assert_eq!(
            canonicalize("Tom Petty and the Heartbreakers"),
            canonicalize("Tom Petty & the Heartbreakers")
        );
    }

    #[test]
    fn canonicalize_folds_diacritics_to_base_letters() {
        assert_eq!(canonicalize("Mot\u{f6}rhead"), canonicalize("Motorhead"));
    }

    #[test]
    fn collisions_group_distinct_raw_names_sharing_a_canonical_form() {
        let wl = Whitelist::from_names(
            ["The Fall".to_string(), "fall, the".to_string()].into_iter(),
        );
        assert_eq!(wl.check_collisions("THE FALL").len(), 2);
    }
}
