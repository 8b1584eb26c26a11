use std::sync::atomic::{ AtomicU64, Ordering };

use crate::disruptor::Sequence;

/// Cache-line padded sequence to prevent false sharing.
///
/// Producer cursors and every processor's gating sequence are updated by
/// different threads at high frequency. Padding each one to a full cache line
/// (128 bytes covers Apple Silicon as well as x86) keeps one thread's progress
/// from invalidating the line another thread is spinning on.
#[repr(align(128))]
pub struct PaddedSequence {
    value: AtomicU64,
    _padding: [u8; 120], // 128 - 8 bytes for AtomicU64
}

impl PaddedSequence {
    pub fn new(initial: Sequence) -> Self {
        Self {
            value: AtomicU64::new(initial),
            _padding: [0; 120],
        }
    }

    #[inline(always)]
    pub fn get(&self) -> Sequence {
        self.value.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn set(&self, value: Sequence) {
        self.value.store(value, Ordering::Release);
    }

    #[inline(always)]
    pub fn compare_and_set(&self, current: Sequence, new: Sequence) -> bool {
        self.value.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed).is_ok()
    }
}

impl Default for PaddedSequence {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for PaddedSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PaddedSequence").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_layout() {
        assert_eq!(std::mem::align_of::<PaddedSequence>(), 128);
        assert_eq!(std::mem::size_of::<PaddedSequence>(), 128);
    }

    #[test]
    fn test_get_set_cas() {
        let seq = PaddedSequence::new(3);
        assert_eq!(seq.get(), 3);
        seq.set(7);
        assert_eq!(seq.get(), 7);
        while !seq.compare_and_set(7, 8) {}
        assert_eq!(seq.get(), 8);
        assert!(!seq.compare_and_set(7, 9));
    }
}
