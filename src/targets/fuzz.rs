//! Variant Expander
//!
//! Turns one base word into the set of search prefixes handed to the worker:
//! the word itself, a few short prefixes, leetspeak substitutions and
//! numeric decorations. Every stage only ever produces alphabet-valid strings.

use std::collections::BTreeSet;

use super::alphabet::{is_member, is_valid, normalize};
use crate::config::FuzzConfig;

/// Words at or below this length get no prefix variants.
const MIN_PREFIXABLE_LEN: usize = 4;

/// Leetspeak stand-ins keyed on the lowercase character.
fn leet_substitutes(c: char) -> &'static [char] {
    match c.to_ascii_lowercase() {
        'a' => &['4'],
        'b' => &['8'],
        'e' => &['3'],
        'g' => &['9', '6'],
        'i' => &['1'],
        's' => &['5', 'Z'],
        't' => &['7'],
        'z' => &['2'],
        'l' => &['L', '1'],
        'o' => &['c', 'D'],
        _ => &[],
    }
}

/// The original character first, then every valid substitute once.
fn position_options(c: char) -> Vec<char> {
    let mut options = vec![c];
    for &sub in leet_substitutes(c) {
        if is_member(sub) && !options.contains(&sub) {
            options.push(sub);
        }
    }
    options
}

/// Cartesian product of per-position substitutions, produced one string at a
/// time. The last position varies fastest, so the first item is always the
/// unmodified word. Nothing beyond the current odometer state is held.
pub struct Substitutions {
    options: Vec<Vec<char>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl Substitutions {
    pub fn new(word: &str) -> Self {
        let options: Vec<Vec<char>> = word.chars().map(position_options).collect();
        Self {
            indices: vec![0; options.len()],
            exhausted: options.is_empty(),
            options,
        }
    }

    fn advance(&mut self) {
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.options[pos].len() {
                return;
            }
            self.indices[pos] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for Substitutions {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }
        let current = self
            .indices
            .iter()
            .zip(&self.options)
            .map(|(&i, opts)| opts[i])
            .collect();
        self.advance();
        Some(current)
    }
}

/// Upper bound on `expand(..).len()` for a given configuration.
pub fn variant_bound(config: &FuzzConfig) -> usize {
    1 + config.prefix_lengths.len()
        + config.max_substitutions
        + 3 * config.decoration_sample * config.decorations.len()
}

/// Expand a base word into its alphabet-valid variants.
///
/// An unmappable word (empty after normalization) yields an empty set.
pub fn expand(word: &str, config: &FuzzConfig) -> BTreeSet<String> {
    let base = normalize(word);
    let mut variants = BTreeSet::new();
    if base.is_empty() {
        return variants;
    }

    // Normalized words are pure ASCII, so byte offsets are char offsets.
    let len = base.len();
    variants.insert(base.clone());

    if len > MIN_PREFIXABLE_LEN {
        for &n in &config.prefix_lengths {
            if n > 0 && n < len && is_valid(&base[..n]) {
                variants.insert(base[..n].to_string());
            }
        }
    }

    variants.extend(
        Substitutions::new(&base)
            .filter(|candidate| is_valid(candidate))
            .take(config.max_substitutions),
    );

    let decorated = decorate(&variants, config);
    variants.extend(decorated);
    variants
}

/// Numeric decorations over the first `decoration_sample` variants in sorted
/// order: suffix, prefix and (for words over three chars) a midpoint insert.
fn decorate(variants: &BTreeSet<String>, config: &FuzzConfig) -> Vec<String> {
    let max_len = config.max_decorated_len;
    let mut out = Vec::new();
    let mut keep = |candidate: String| {
        if candidate.len() <= max_len {
            out.push(candidate);
        }
    };

    for v in variants.iter().take(config.decoration_sample) {
        for token in config.decorations.iter().filter(|t| is_valid(t)) {
            keep(format!("{v}{token}"));
            keep(format!("{token}{v}"));
            if v.len() > 3 {
                let mid = v.len() / 2;
                keep(format!("{}{}{}", &v[..mid], token, &v[mid..]));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> FuzzConfig {
        FuzzConfig {
            prefix_lengths: vec![],
            decorations: vec![],
            ..FuzzConfig::default()
        }
    }

    #[test]
    fn test_empty_word_expands_to_nothing() {
        let config = FuzzConfig::default();
        assert!(expand("", &config).is_empty());
        assert!(expand("__--__", &config).is_empty());
    }

    #[test]
    fn test_substitutions_start_with_original() {
        let mut subs = Substitutions::new("Cat");
        assert_eq!(subs.next().as_deref(), Some("Cat"));
        let rest: Vec<String> = subs.collect();
        assert_eq!(rest, vec!["Ca7", "C4t", "C47"]);
    }

    #[test]
    fn test_substitution_options_are_valid_and_unique() {
        // 'L' maps to itself through the lowercase table
        assert_eq!(position_options('L'), vec!['L', '1']);
        assert_eq!(position_options('s'), vec!['s', '5', 'Z']);
        assert_eq!(position_options('k'), vec!['k']);
    }

    #[test]
    fn test_substitution_cap_boundary() {
        // 3^8 = 6561 possible products
        assert_eq!(Substitutions::new("ssssssss").count(), 6561);

        let mut config = bare();
        assert_eq!(expand("ssssssss", &config).len(), 100);

        config.max_substitutions = 99;
        assert_eq!(expand("ssssssss", &config).len(), 99);

        config.max_substitutions = 1;
        let only = expand("ssssssss", &config);
        assert_eq!(only.into_iter().collect::<Vec<_>>(), vec!["ssssssss".to_string()]);
    }

    #[test]
    fn test_long_word_stops_lazily() {
        // 3^40 products would never finish if materialized
        let word = "s".repeat(40);
        let variants = expand(&word, &FuzzConfig::default());
        assert!(variants.len() <= variant_bound(&FuzzConfig::default()));
        assert!(variants.contains(&word));
    }

    #[test]
    fn test_prefix_variants() {
        let config = bare();
        let variants = expand("ElonMusk", &config);
        for p in ["ELon", "ELonM", "ELonMu", "ELonMusk"] {
            assert!(variants.contains(p), "missing {p}");
        }
        // four chars or fewer: no prefixes at all
        let short = expand("Munc", &config);
        assert_eq!(short.len(), 1);
    }

    #[test]
    fn test_decorations() {
        let variants = expand("Moon", &FuzzConfig::default());
        assert!(variants.contains("Moon69"));
        assert!(variants.contains("69Moon"));
        assert!(variants.contains("Mo69on"));
        assert!(variants.contains("Moon247"));

        // midpoint insert only for words longer than three chars
        let cat = expand("Cat", &FuzzConfig::default());
        assert!(cat.contains("Cat69"));
        assert!(cat.contains("247Cat"));
        assert!(!cat.contains("C69at"));
    }

    #[test]
    fn test_decorated_length_boundary() {
        let variants = expand("Munchy", &FuzzConfig::default());
        assert!(variants.contains("Munchy6"));
        assert!(variants.contains("6Munchy"));
        assert!(variants.contains("Mun6chy"));
        assert!(variants.contains("Munch69"));
        assert!(!variants.contains("Munchy69"));
        assert!(!variants.contains("Munch369"));
    }

    #[test]
    fn test_decoration_sample_is_sorted_prefix() {
        let config = FuzzConfig {
            decoration_sample: 1,
            decorations: vec!["9".to_string()],
            prefix_lengths: vec![],
            ..FuzzConfig::default()
        };
        // "C47" sorts first among {Cat, Ca7, C4t, C47}
        let variants = expand("Cat", &config);
        assert!(variants.contains("C479"));
        assert!(!variants.contains("Cat9"));
    }

    #[test]
    fn test_expansion_invariants() {
        let config = FuzzConfig::default();
        let bound = variant_bound(&config);
        assert_eq!(bound, 644);
        for word in ["ElonMusk", "CryptoRap", "Savage", "MemeGod", "a", "Sol", "GigaChadLord"] {
            let base_len = normalize(word).len();
            let variants = expand(word, &config);
            assert!(!variants.is_empty());
            assert!(variants.len() <= bound, "{word}: {} > {bound}", variants.len());
            for v in &variants {
                assert!(is_valid(v), "{v} is not base58");
                assert!(v.len() <= base_len.max(config.max_decorated_len), "{v} too long");
            }
        }
    }
}
