use px_data::SeqNo;
use std::collections::BTreeSet;

/// At most this many missing slots are reported in one `Accepted`.
pub const MAX_MISSING_REPORT: usize = 1024;

/// Tracks which slots have seen a `Success`.
///
/// Everything `<= watermark` has been received; `received` holds the
/// sparse slots above it.
#[derive(Debug, Default)]
pub struct MissingMessagesTracker {
    watermark: SeqNo,
    received: BTreeSet<SeqNo>,
}

impl MissingMessagesTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&mut self, seq_no: SeqNo) {
        if seq_no <= self.watermark {
            return;
        }
        self.received.insert(seq_no);
        while self.received.remove(&(self.watermark + 1)) {
            self.watermark += 1;
        }
    }

    /// Slots in `(watermark, up_to)` without a `Success`, lowest first.
    pub fn missing(&self, up_to: SeqNo) -> BTreeSet<SeqNo> {
        (self.watermark + 1..up_to)
            .filter(|s| !self.received.contains(s))
            .take(MAX_MISSING_REPORT)
            .collect()
    }

    #[inline]
    pub fn watermark(&self) -> SeqNo {
        self.watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing() {
        let mut t = MissingMessagesTracker::new();
        assert!(t.missing(1).is_empty());
        assert_eq!(t.missing(3), vec![1, 2].into_iter().collect());

        t.received(2);
        t.received(4);
        assert_eq!(t.watermark(), 0);
        assert_eq!(t.missing(6), vec![1, 3, 5].into_iter().collect());

        t.received(1);
        assert_eq!(t.watermark(), 2);
        t.received(3);
        assert_eq!(t.watermark(), 4);
        assert!(t.missing(5).is_empty());

        // duplicates below the watermark are ignored
        t.received(2);
        assert_eq!(t.watermark(), 4);
    }

    #[test]
    fn test_report_is_bounded() {
        let t = MissingMessagesTracker::new();
        let m = t.missing(100_000);
        assert_eq!(m.len(), MAX_MISSING_REPORT);
        assert_eq!(m.iter().next(), Some(&1));
    }
}
