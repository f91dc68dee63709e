//! Together flow control: N scripted branches rendezvous before continuing.

use super::BarrierCallback;

/// Fixed-size checklist with an optional completion callback.
///
/// A barrier is discarded by its dispatcher as soon as the last slot is
/// checked, so the next entry under the same node starts a fresh checklist.
/// Overlapping epochs must use distinct node ids.
pub struct Barrier {
    checklist: Vec<bool>,
    pub(crate) on_complete: Option<BarrierCallback>,
}

impl Barrier {
    pub fn new(participants: usize) -> Self {
        Self {
            checklist: vec![false; participants],
            on_complete: None,
        }
    }

    pub(crate) fn from_checklist(checklist: Vec<bool>) -> Self {
        Self {
            checklist,
            on_complete: None,
        }
    }

    /// Resizes the checklist if a caller disagrees about the participant
    /// count; the last caller wins. Returns whether the size changed.
    pub(crate) fn resize(&mut self, participants: usize) -> bool {
        if self.checklist.len() == participants {
            return false;
        }
        self.checklist.resize(participants, false);
        true
    }

    /// Checks slot `index` and returns whether every slot is now checked.
    pub fn check(&mut self, index: usize) -> bool {
        self.checklist[index] = true;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.checklist.iter().all(|&checked| checked)
    }

    pub fn checklist(&self) -> &[bool] {
        &self.checklist
    }

    pub fn participants(&self) -> usize {
        self.checklist.len()
    }
}

impl std::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier")
            .field("checklist", &self.checklist)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_only_when_every_slot_is_checked() {
        let mut barrier = Barrier::new(3);
        assert!(!barrier.check(2));
        assert!(!barrier.check(0));
        // Checking a slot twice is harmless.
        assert!(!barrier.check(0));
        assert!(barrier.check(1));
    }

    #[test]
    fn resize_keeps_checked_slots() {
        let mut barrier = Barrier::new(2);
        barrier.check(0);
        assert!(barrier.resize(3));
        assert!(!barrier.resize(3));
        assert_eq!(barrier.checklist(), &[true, false, false]);
    }
}
