//! Ordering and delivery checks.

use std::collections::BTreeMap;

/// Checks that values arrive as a gap-free increasing run
#[derive(Debug)]
pub struct SequenceChecker {
    expected: u64,
    count: u64,
    errors: Vec<(u64, u64)>,
}

impl SequenceChecker {
    pub fn new(start: u64) -> Self {
        Self {
            expected: start,
            count: 0,
            errors: Vec::new(),
        }
    }

    /// Returns false and records `(expected, got)` on a mismatch
    pub fn check(&mut self, value: u64) -> bool {
        self.count += 1;
        if value == self.expected {
            self.expected += 1;
            true
        } else {
            self.errors.push((self.expected, value));
            self.expected = value + 1;
            false
        }
    }

    pub fn check_all(&mut self, values: impl IntoIterator<Item = u64>) -> bool {
        values.into_iter().fold(true, |ok, value| self.check(value) && ok)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn errors(&self) -> &[(u64, u64)] {
        &self.errors
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Values in `0..total` never seen, and values seen more than once
pub fn missing_and_duplicates(values: &[u64], total: u64) -> (Vec<u64>, Vec<u64>) {
    let mut seen: BTreeMap<u64, usize> = BTreeMap::new();
    for value in values {
        *seen.entry(*value).or_default() += 1;
    }
    let missing = (0..total).filter(|v| !seen.contains_key(v)).collect();
    let duplicates = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(value, _)| value)
        .collect();
    (missing, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_detects_gap() {
        let mut checker = SequenceChecker::new(0);
        assert!(checker.check_all([0, 1, 2]));
        assert!(!checker.check(4));
        assert!(checker.check(5));
        assert_eq!(checker.errors(), &[(3, 4)]);
        assert_eq!(checker.count(), 5);
    }

    #[test]
    fn test_missing_and_duplicates() {
        let (missing, duplicates) = missing_and_duplicates(&[0, 1, 1, 3], 5);
        assert_eq!(missing, vec![2, 4]);
        assert_eq!(duplicates, vec![1]);
    }
}
