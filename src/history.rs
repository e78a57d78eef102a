//! Bounded in-memory history of captured lines.

use std::collections::VecDeque;

use crate::capture::CapturedLine;

/// Append-only ordered history with drop-oldest eviction.
///
/// Offsets index retained entries, 0 being the oldest still held. When the
/// cap is reached the oldest entry is evicted; evicted lines are excluded
/// from `len()` and from subsequent windows and never reappear.
pub struct HistoryBuffer {
    lines: VecDeque<CapturedLine>,
    max_lines: usize,
    dropped: u64,
}

impl HistoryBuffer {
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            lines: VecDeque::with_capacity(max_lines.min(4096)),
            max_lines,
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: CapturedLine) {
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    /// Number of retained lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines evicted so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Total lines ever pushed, including evicted ones
    pub fn total_seen(&self) -> u64 {
        self.dropped + self.lines.len() as u64
    }

    /// Up to `count` lines starting at `offset` (oldest-first), clamped to
    /// the retained range. Returns fewer than `count` near either end.
    pub fn window(&self, offset: usize, count: usize) -> Vec<&CapturedLine> {
        if offset >= self.lines.len() {
            return Vec::new();
        }
        self.lines.iter().skip(offset).take(count).collect()
    }

    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = &CapturedLine> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StreamOrigin;
    use chrono::Local;

    fn line(sequence: u64, text: &str) -> CapturedLine {
        CapturedLine {
            sequence,
            origin: StreamOrigin::Stdout,
            text: text.to_string(),
            at: Local::now(),
            tags: Vec::new(),
        }
    }

    fn filled(count: u64, cap: usize) -> HistoryBuffer {
        let mut buf = HistoryBuffer::new(cap);
        for i in 0..count {
            buf.push(line(i, &format!("line {i}")));
        }
        buf
    }

    #[test]
    fn test_window_returns_requested_slice() {
        let buf = filled(10, 100);
        let window = buf.window(2, 3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].sequence, 2);
        assert_eq!(window[2].sequence, 4);
    }

    #[test]
    fn test_window_never_exceeds_count_or_bounds() {
        let buf = filled(5, 100);
        assert_eq!(buf.window(0, 3).len(), 3);
        assert_eq!(buf.window(3, 10).len(), 2);
        assert!(buf.window(5, 1).is_empty());
        assert!(buf.window(100, 10).is_empty());
    }

    #[test]
    fn test_window_on_empty_buffer() {
        let buf = HistoryBuffer::new(10);
        assert!(buf.window(0, 5).is_empty());
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_eviction_drops_oldest_and_keeps_offsets_consistent() {
        let buf = filled(8, 5);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.dropped(), 3);
        assert_eq!(buf.total_seen(), 8);
        // Offset 0 is now the oldest retained line
        assert_eq!(buf.window(0, 1)[0].sequence, 3);
        assert_eq!(buf.window(4, 1)[0].sequence, 7);
    }

    #[test]
    fn test_order_is_preserved() {
        let buf = filled(20, 100);
        let sequences: Vec<u64> = buf.iter().map(|l| l.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }
}
