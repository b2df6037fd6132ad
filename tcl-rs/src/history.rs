//! Numbered command history for interactive sessions.
//!
//! [`crate::Interp::parse_line`] records each line that evaluates without
//! error; the `history` builtin lists the entries.  Entry numbers start at
//! 1 and keep rising even after old entries are dropped.

use std::collections::VecDeque;

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 100;

/// Ring of past command lines, oldest first.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<(u64, String)>,
    next_id: u64,
    max_size: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CommandHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            max_size: max_size.max(1),
        }
    }

    /// Append `line` with the next entry number.  Empty lines are skipped.
    pub fn record(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.entries.push_back((self.next_id, line.to_owned()));
        self.next_id += 1;
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
    }

    /// Entries oldest first, as (number, line).
    pub fn entries(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries.iter().map(|(id, line)| (*id, line.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_from_one() {
        let mut h = CommandHistory::new(10);
        h.record("set a 1");
        h.record("puts $a");
        let got: Vec<(u64, String)> = h.entries().map(|(n, s)| (n, s.to_owned())).collect();
        assert_eq!(
            got,
            vec![(1, "set a 1".to_owned()), (2, "puts $a".to_owned())]
        );
    }

    #[test]
    fn capped_but_numbers_keep_rising() {
        let mut h = CommandHistory::new(2);
        h.record("one");
        h.record("two");
        h.record("three");
        let got: Vec<u64> = h.entries().map(|(n, _)| n).collect();
        assert_eq!(got, vec![2, 3]);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn empty_lines_skipped() {
        let mut h = CommandHistory::new(10);
        h.record("");
        h.record("real");
        assert_eq!(h.len(), 1);
        assert_eq!(h.entries().next(), Some((1, "real")));
    }
}
