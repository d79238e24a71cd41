//! Save name pattern matching
//!
//! Supports wildcards:
//! - `*` - Matches any run of characters, including none (e.g., `monkey.s*`)
//! - `?` - Matches exactly one character (e.g., `slot?`)
//! - `#` - Matches exactly one ASCII digit (e.g., `game.s##`)
//!
//! Matching ignores ASCII case, like the save names themselves.

/// Pattern matcher for save names
pub struct PatternMatcher;

impl PatternMatcher {
    /// Check if a save name matches a pattern
    ///
    /// # Examples
    /// ```
    /// use vmu_saves::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("monkey.s##", "MONKEY.S01"));
    /// assert!(PatternMatcher::matches("*", "anything"));
    /// assert!(!PatternMatcher::matches("slot?", "slot10"));
    /// ```
    pub fn matches(pattern: &str, name: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
        let name: Vec<char> = name.chars().map(|c| c.to_ascii_lowercase()).collect();

        Self::match_chars(&pattern, &name)
    }

    /// Greedy match with backtracking to the most recent `*`
    fn match_chars(pattern: &[char], name: &[char]) -> bool {
        let (mut p, mut n) = (0, 0);
        let mut star: Option<(usize, usize)> = None;

        while n < name.len() {
            match pattern.get(p) {
                Some('*') => {
                    star = Some((p, n));
                    p += 1;
                }
                Some(&c) if Self::single(c, name[n]) => {
                    p += 1;
                    n += 1;
                }
                _ => match star {
                    // Let the last star swallow one more character
                    Some((star_p, star_n)) => {
                        p = star_p + 1;
                        n = star_n + 1;
                        star = Some((star_p, star_n + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }

    fn single(pattern: char, c: char) -> bool {
        match pattern {
            '?' => true,
            '#' => c.is_ascii_digit(),
            literal => literal == c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(PatternMatcher::matches("save.000", "save.000"));
        assert!(!PatternMatcher::matches("save.000", "save.001"));
        assert!(!PatternMatcher::matches("save", "save.000"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(PatternMatcher::matches("SAVE.*", "save.001"));
        assert!(PatternMatcher::matches("save.*", "SAVE.001"));
    }

    #[test]
    fn test_star() {
        assert!(PatternMatcher::matches("*", ""));
        assert!(PatternMatcher::matches("*", "anything at all"));
        assert!(PatternMatcher::matches("loom.*", "loom.s01"));
        assert!(PatternMatcher::matches("*.s01", "loom.s01"));
        assert!(PatternMatcher::matches("a*b*c", "axxbyyc"));
        assert!(!PatternMatcher::matches("a*b*c", "axxbyy"));
        assert!(PatternMatcher::matches("**", "x"));
    }

    #[test]
    fn test_question_mark() {
        assert!(PatternMatcher::matches("slot?", "slot1"));
        assert!(!PatternMatcher::matches("slot?", "slot"));
        assert!(!PatternMatcher::matches("slot?", "slot12"));
    }

    #[test]
    fn test_digit() {
        assert!(PatternMatcher::matches("game.s##", "game.s42"));
        assert!(!PatternMatcher::matches("game.s##", "game.sx2"));
        assert!(PatternMatcher::matches("*.###", "tentacle.007"));
    }

    #[test]
    fn test_backtracking() {
        assert!(PatternMatcher::matches("*ab", "aab"));
        assert!(PatternMatcher::matches("*a?c", "abzabc"));
        assert!(!PatternMatcher::matches("*a#", "abab"));
    }
}
