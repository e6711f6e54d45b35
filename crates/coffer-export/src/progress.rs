//! Combined progress of an export's attachment downloads.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Slot {
    downloaded: AtomicU64,
    total: u64,
}

/// Byte counters of every attachment in one export.
///
/// An attachment contributes at most its own size to the combined count, and
/// an attachment of unknown size counts as zero bytes.
#[derive(Debug)]
pub(crate) struct AttachmentProgress {
    slots: Vec<Slot>,
    total: u64,
}

impl AttachmentProgress {
    pub(crate) fn new(sizes: impl IntoIterator<Item = Option<u64>>) -> Self {
        let slots: Vec<Slot> = sizes
            .into_iter()
            .map(|size| Slot {
                downloaded: AtomicU64::new(0),
                total: size.unwrap_or(0),
            })
            .collect();
        let total = slots.iter().map(|slot| slot.total).sum();
        Self { slots, total }
    }

    /// Records that attachment `index` has `downloaded` bytes. Counters never
    /// go backwards.
    pub(crate) fn update(&self, index: usize, downloaded: u64) {
        if let Some(slot) = self.slots.get(index) {
            slot.downloaded.fetch_max(downloaded, Ordering::Relaxed);
        }
    }

    /// Marks attachment `index` as fully downloaded.
    pub(crate) fn complete(&self, index: usize) {
        if let Some(slot) = self.slots.get(index) {
            self.update(index, slot.total);
        }
    }

    pub(crate) fn downloaded(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.downloaded.load(Ordering::Relaxed).min(slot.total))
            .sum()
    }

    pub(crate) const fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_partial_downloads_sum() {
        let progress = AttachmentProgress::new([Some(5 * MB), Some(15 * MB)]);
        assert_eq!(progress.total(), 20 * MB);

        progress.update(0, 5 * MB);
        progress.update(1, 5 * MB);
        assert_eq!(progress.downloaded(), 10 * MB);
    }

    #[test]
    fn test_counts_are_capped_and_monotonic() {
        let progress = AttachmentProgress::new([Some(100), None]);
        progress.update(0, 250);
        progress.update(1, 40);
        assert_eq!(progress.downloaded(), 100);
        assert_eq!(progress.total(), 100);

        progress.update(0, 10);
        assert_eq!(progress.downloaded(), 100);
    }

    #[test]
    fn test_complete_fills_slot() {
        let progress = AttachmentProgress::new([Some(30), Some(70)]);
        progress.complete(1);
        assert_eq!(progress.downloaded(), 70);
        progress.update(7, 1);
        assert_eq!(progress.len(), 2);
    }
}
