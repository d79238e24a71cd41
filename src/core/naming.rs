//! Collision-free short names for device entries
//!
//! Device names are at most twelve characters. Every save gets a private
//! prefix followed by a random four-character suffix drawn from digits and
//! uppercase letters, e.g. `VMUSAVE_K3Q9`.

use crate::core::error::{Result, SaveError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::OnceLock;

/// Longest name the device directory can store
pub const MAX_DEVICE_NAME: usize = 12;

/// Number of random characters after the prefix
pub const SUFFIX_LEN: usize = 4;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Pattern for a valid private prefix
const PREFIX_PATTERN: &str = r"^[A-Z0-9_]+$";
static PREFIX_RE: OnceLock<std::result::Result<Regex, String>> = OnceLock::new();

/// Check that `prefix` leaves room for the suffix and uses device-safe characters
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.len() + SUFFIX_LEN > MAX_DEVICE_NAME {
        return Err(SaveError::Config(format!(
            "short name prefix must be 1..={} characters, got {:?}",
            MAX_DEVICE_NAME - SUFFIX_LEN,
            prefix
        )));
    }

    let re = PREFIX_RE
        .get_or_init(|| Regex::new(PREFIX_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| SaveError::Config(e.clone()))?;
    if !re.is_match(prefix) {
        return Err(SaveError::Config(format!(
            "short name prefix {:?} may only contain A-Z, 0-9 and '_'",
            prefix
        )));
    }

    Ok(())
}

/// Rejection-sampling short name generator
pub struct ShortNameGenerator {
    prefix: String,
    rng: StdRng,
    max_attempts: usize,
}

impl ShortNameGenerator {
    /// Create a generator; a `seed` makes the sequence reproducible
    pub fn new(prefix: &str, seed: Option<u64>, max_attempts: usize) -> Result<Self> {
        validate_prefix(prefix)?;
        if max_attempts == 0 {
            return Err(SaveError::Config(
                "max_name_attempts must be at least 1".to_string(),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(ShortNameGenerator {
            prefix: prefix.to_string(),
            rng,
            max_attempts,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `name` lives in this generator's private namespace
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// Draw names until one is not taken
    ///
    /// `is_taken` must reflect a fully reconciled view of the device.
    pub fn generate<F>(&mut self, is_taken: F) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        for _ in 0..self.max_attempts {
            let candidate = self.candidate();
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(SaveError::NameSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    fn candidate(&mut self) -> String {
        let mut name = String::with_capacity(self.prefix.len() + SUFFIX_LEN);
        name.push_str(&self.prefix);
        for _ in 0..SUFFIX_LEN {
            let idx = self.rng.gen_range(0..ALPHABET.len());
            name.push(ALPHABET[idx] as char);
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_name_shape() {
        let mut names = ShortNameGenerator::new("VMUSAVE_", Some(7), 16).unwrap();
        let name = names.generate(|_| false).unwrap();

        assert_eq!(name.len(), MAX_DEVICE_NAME);
        assert!(name.starts_with("VMUSAVE_"));
        assert!(name[8..].bytes().all(|b| ALPHABET.contains(&b)));
        assert!(names.owns(&name));
        assert!(!names.owns("ICONDATA_VMS"));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = ShortNameGenerator::new("SV_", Some(42), 16).unwrap();
        let mut b = ShortNameGenerator::new("SV_", Some(42), 16).unwrap();
        for _ in 0..10 {
            assert_eq!(a.generate(|_| false).unwrap(), b.generate(|_| false).unwrap());
        }
    }

    #[test]
    fn test_skips_taken_names() {
        let mut names = ShortNameGenerator::new("SV_", Some(1), 10_000).unwrap();
        let mut taken = HashSet::new();
        for _ in 0..500 {
            let name = names.generate(|n| taken.contains(n)).unwrap();
            assert!(taken.insert(name));
        }
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut names = ShortNameGenerator::new("SV_", Some(1), 32).unwrap();
        assert!(matches!(
            names.generate(|_| true),
            Err(SaveError::NameSpaceExhausted { attempts: 32 })
        ));
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_prefix("VMUSAVE_").is_ok());
        assert!(validate_prefix("A").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("TOOLONGNAME").is_err());
        assert!(validate_prefix("lower_").is_err());
        assert!(validate_prefix("DOT.").is_err());
    }
}
