//! Depth counting over raw drag events.
//!
//! Drag sources emit one enter/leave pair per element boundary they cross. Counting
//! depth collapses those into a single logical drag that starts on the first counted
//! enter and ends when the count returns to zero.

use crate::file::IncomingFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    Enter {
        has_files: bool,
    },
    Over {
        has_files: bool,
    },
    Leave {
        has_files: bool,
        /// Whether the pointer moved onto another element rather than out of the window.
        has_related_target: bool,
    },
    Drop {
        files: Vec<IncomingFile>,
    },
    /// Drag ended or the window lost focus.
    HardReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DragOutcome {
    /// New value of `is_dragging`, when it changed.
    pub dragging_changed: Option<bool>,
    /// Whether the platform's default handling should be suppressed.
    pub prevent_default: bool,
    /// First file of a drop, to be handed on for processing.
    pub dropped: Option<IncomingFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragTracker {
    depth: u32,
    dragging: bool,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn handle(&mut self, event: DragEvent) -> DragOutcome {
        match event {
            DragEvent::Enter { has_files } => {
                if !has_files {
                    return DragOutcome::default();
                }
                self.depth += 1;
                DragOutcome {
                    dragging_changed: self.sync(),
                    prevent_default: true,
                    dropped: None,
                }
            }
            DragEvent::Over { has_files } => DragOutcome {
                prevent_default: has_files,
                ..DragOutcome::default()
            },
            DragEvent::Leave {
                has_files,
                has_related_target,
            } => {
                if has_related_target && !has_files {
                    return DragOutcome::default();
                }
                if has_related_target {
                    self.depth = self.depth.saturating_sub(1);
                } else {
                    self.depth = 0;
                }
                DragOutcome {
                    dragging_changed: self.sync(),
                    prevent_default: has_files,
                    dropped: None,
                }
            }
            DragEvent::Drop { files } => DragOutcome {
                dragging_changed: self.reset(),
                prevent_default: true,
                dropped: files.into_iter().next(),
            },
            DragEvent::HardReset => DragOutcome {
                dragging_changed: self.reset(),
                ..DragOutcome::default()
            },
        }
    }

    fn reset(&mut self) -> Option<bool> {
        self.depth = 0;
        self.sync()
    }

    /// Bring `dragging` in line with `depth`, reporting a change.
    fn sync(&mut self) -> Option<bool> {
        let dragging = self.depth > 0;
        if dragging == self.dragging {
            None
        } else {
            self.dragging = dragging;
            Some(dragging)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn enter() -> DragEvent {
        DragEvent::Enter { has_files: true }
    }

    fn leave(has_related_target: bool) -> DragEvent {
        DragEvent::Leave {
            has_files: true,
            has_related_target,
        }
    }

    #[test]
    fn test_nested_crossings_are_one_drag() {
        let mut tracker = DragTracker::new();
        assert_eq!(tracker.handle(enter()).dragging_changed, Some(true));
        assert_eq!(tracker.handle(enter()).dragging_changed, None);
        assert_eq!(tracker.handle(leave(true)).dragging_changed, None);
        assert!(tracker.is_dragging());
        assert_eq!(tracker.handle(leave(true)).dragging_changed, Some(false));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_enter_without_files_is_ignored() {
        let mut tracker = DragTracker::new();
        let outcome = tracker.handle(DragEvent::Enter { has_files: false });
        assert_eq!(outcome, DragOutcome::default());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_false_leave_is_ignored() {
        let mut tracker = DragTracker::new();
        tracker.handle(enter());
        tracker.handle(DragEvent::Leave {
            has_files: false,
            has_related_target: true,
        });
        assert_eq!(tracker.depth(), 1);
        assert!(tracker.is_dragging());
    }

    #[test]
    fn test_leaving_window_resets_depth() {
        let mut tracker = DragTracker::new();
        tracker.handle(enter());
        tracker.handle(enter());
        tracker.handle(enter());
        assert_eq!(tracker.handle(leave(false)).dragging_changed, Some(false));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_over_only_prevents_default() {
        let mut tracker = DragTracker::new();
        let outcome = tracker.handle(DragEvent::Over { has_files: true });
        assert!(outcome.prevent_default);
        assert_eq!(outcome.dragging_changed, None);
        assert!(!tracker.handle(DragEvent::Over { has_files: false }).prevent_default);
    }

    #[test]
    fn test_drop_resets_and_takes_first_file() {
        let mut tracker = DragTracker::new();
        tracker.handle(enter());
        tracker.handle(enter());

        let first = IncomingFile::from_bytes("a.png", "image/png", vec![1]);
        let second = IncomingFile::from_bytes("b.png", "image/png", vec![2]);
        let outcome = tracker.handle(DragEvent::Drop {
            files: vec![first.clone(), second],
        });

        assert_eq!(outcome.dragging_changed, Some(false));
        assert_eq!(outcome.dropped, Some(first));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_hard_reset_emits_only_when_dragging() {
        let mut tracker = DragTracker::new();
        assert_eq!(tracker.handle(DragEvent::HardReset).dragging_changed, None);
        tracker.handle(enter());
        assert_eq!(tracker.handle(DragEvent::HardReset).dragging_changed, Some(false));
    }

    fn any_event() -> impl Strategy<Value = DragEvent> {
        prop_oneof![
            any::<bool>().prop_map(|has_files| DragEvent::Enter { has_files }),
            any::<bool>().prop_map(|has_files| DragEvent::Over { has_files }),
            (any::<bool>(), any::<bool>()).prop_map(|(has_files, has_related_target)| {
                DragEvent::Leave {
                    has_files,
                    has_related_target,
                }
            }),
            Just(DragEvent::Drop { files: Vec::new() }),
            Just(DragEvent::HardReset),
        ]
    }

    proptest! {
        #[test]
        fn test_dragging_iff_depth_positive(events in prop::collection::vec(any_event(), 0..64)) {
            let mut tracker = DragTracker::new();
            let mut observed = false;
            for event in events {
                let outcome = tracker.handle(event);
                if let Some(dragging) = outcome.dragging_changed {
                    prop_assert_ne!(dragging, observed);
                    observed = dragging;
                }
                prop_assert_eq!(tracker.is_dragging(), tracker.depth() > 0);
                prop_assert_eq!(observed, tracker.is_dragging());
            }
        }
    }
}
