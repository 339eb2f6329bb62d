use log::trace;
use px_data::{Payload, SeqNo};
use std::collections::BTreeMap;

use crate::traits::Receiver;

/// Hands committed messages to the inner receiver in slot order, each
/// exactly once, starting from slot 1.
pub struct BufferedReceiver {
    inner: Box<dyn Receiver>,
    next: SeqNo,
    pending: BTreeMap<SeqNo, Payload>,
}

impl BufferedReceiver {
    pub fn new(inner: Box<dyn Receiver>) -> Self {
        Self {
            inner,
            next: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Returns false for a slot already delivered or buffered.
    pub fn receive(&mut self, seq_no: SeqNo, message: &Payload) -> bool {
        if seq_no < self.next || self.pending.contains_key(&seq_no) {
            trace!("duplicate commit for slot {}", seq_no);
            return false;
        }
        self.pending.insert(seq_no, message.clone());

        while let Some(msg) = self.pending.remove(&self.next) {
            self.inner.receive(self.next, &msg);
            self.next += 1;
        }
        true
    }

    /// Highest slot handed to the inner receiver; 0 if none.
    #[inline]
    pub fn delivered_up_to(&self) -> SeqNo {
        self.next - 1
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocker::MockReceiver;

    #[test]
    fn test_in_order_exactly_once() {
        let (recv, log) = MockReceiver::new();
        let mut br = BufferedReceiver::new(Box::new(recv));

        assert!(br.receive(2, &Payload::app("b")));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(br.buffered(), 1);

        assert!(br.receive(1, &Payload::app("a")));
        assert!(!br.receive(2, &Payload::app("b")));
        assert!(!br.receive(1, &Payload::app("a")));
        assert!(br.receive(3, &Payload::NoOp));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (1, Payload::app("a")),
                (2, Payload::app("b")),
                (3, Payload::NoOp)
            ]
        );
        assert_eq!(br.delivered_up_to(), 3);
        assert_eq!(br.buffered(), 0);
    }
}
