/// NameGenerator: unique resource names for ephemeral containers and blobs
///
/// Every name is a fixed prefix followed by 8 random lowercase letters, so
/// repeated or concurrent runs against the same account do not collide.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SUFFIX_LEN: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for reproducible runs and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `prefix` followed by a fresh random suffix
    pub fn generate(&self, prefix: &str) -> String {
        let mut name = String::with_capacity(prefix.len() + SUFFIX_LEN);
        name.push_str(prefix);
        name.push_str(&self.suffix());
        name
    }

    /// A bare random suffix (8 lowercase letters)
    pub fn suffix(&self) -> String {
        let mut rng = self.rng.lock();
        (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Whether `name` looks like `prefix` + suffix produced by this module.
    /// Trailing ASCII digits after the suffix are accepted for names that
    /// were derived from a generated stem (e.g. `stem0`, `stem1`).
    pub fn is_generated(prefix: &str, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(prefix) else {
            return false;
        };
        let rest = rest.as_bytes();
        if rest.len() < SUFFIX_LEN {
            return false;
        }
        let (suffix, tail) = rest.split_at(SUFFIX_LEN);
        suffix.iter().all(u8::is_ascii_lowercase) && tail.iter().all(u8::is_ascii_digit)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_shape() {
        let names = NameGenerator::new();
        let name = names.generate("pageblobs");

        assert_eq!(name.len(), "pageblobs".len() + SUFFIX_LEN);
        assert!(name.starts_with("pageblobs"));
        assert!(name["pageblobs".len()..].bytes().all(|b| b.is_ascii_lowercase()));
    }

    #[test]
    fn test_no_collisions_in_a_run() {
        let names = NameGenerator::new();
        let generated: HashSet<String> = (0..1000).map(|_| names.generate("c")).collect();
        assert_eq!(generated.len(), 1000);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = NameGenerator::seeded(7);
        let b = NameGenerator::seeded(7);
        assert_eq!(a.generate("x"), b.generate("x"));
        assert_eq!(a.suffix(), b.suffix());
    }

    #[test]
    fn test_is_generated() {
        assert!(NameGenerator::is_generated("blobcontainer", "blobcontainerabcdefgh"));
        assert!(NameGenerator::is_generated("containersample", "containersampleabcdefgh3"));
        assert!(!NameGenerator::is_generated("blobcontainer", "blobcontainerabc"));
        assert!(!NameGenerator::is_generated("blobcontainer", "blobcontainerABCDEFGH"));
        assert!(!NameGenerator::is_generated("blobcontainer", "blobcontainerabcdefgh-prod"));
        assert!(!NameGenerator::is_generated("pageblobs", "blockblobsabcdefgh"));
    }

    #[test]
    fn test_is_generated_rejects_multibyte_names() {
        assert!(!NameGenerator::is_generated("pageblobs", "pageblobsabcdefgéx"));
        assert!(!NameGenerator::is_generated("pageblobs", "pageblobsabcdefgé"));
        assert!(!NameGenerator::is_generated("pageblobs", "pageblobsabcdefgh١"));
    }
}
