//! Debug view selection
//!
//! At most one debug view replaces or overlays the final image. The state is a single
//! enum value, so two views can never be active together.

use crate::render_target::Attachment;

/// Debug view shown instead of, or on top of, the post-processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugView {
    #[default]
    None,
    Albedo,
    Normal,
    Position,
    CoverageMask,
    Occlusion,
    DeferredLit,
}

/// Where a debug view takes its image from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSource {
    /// G-buffer attachment, blended additively over the presented frame.
    GBuffer(Attachment),
    /// Single-sampled pipeline texture presented in place of the frame.
    CoverageMask,
    Occlusion,
    DeferredLit,
}

impl DebugView {
    /// Selectable views in key-slot order, slot 1 first.
    pub const SELECTABLE: [DebugView; 6] = [
        DebugView::Albedo,
        DebugView::Normal,
        DebugView::Position,
        DebugView::CoverageMask,
        DebugView::Occlusion,
        DebugView::DeferredLit,
    ];

    /// View bound to key slot `slot` (1-based).
    pub fn from_slot(slot: usize) -> Option<Self> {
        slot.checked_sub(1)
            .and_then(|i| Self::SELECTABLE.get(i))
            .copied()
    }

    pub fn is_active(&self) -> bool {
        *self != DebugView::None
    }

    pub fn source(&self) -> Option<DebugSource> {
        match self {
            DebugView::None => None,
            DebugView::Albedo => Some(DebugSource::GBuffer(Attachment::Albedo)),
            DebugView::Normal => Some(DebugSource::GBuffer(Attachment::Normal)),
            DebugView::Position => Some(DebugSource::GBuffer(Attachment::Position)),
            DebugView::CoverageMask => Some(DebugSource::CoverageMask),
            DebugView::Occlusion => Some(DebugSource::Occlusion),
            DebugView::DeferredLit => Some(DebugSource::DeferredLit),
        }
    }
}

/// Debug view state machine: select a view, select it again to turn it off.
#[derive(Debug, Clone, Default)]
pub struct DebugViewSelector {
    active: DebugView,
}

impl DebugViewSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly selected view.
    pub fn active(&self) -> DebugView {
        self.active
    }

    /// Select `view`, or return to [`DebugView::None`] if it is already selected.
    /// Selecting a view replaces whichever view was active before.
    pub fn select(&mut self, view: DebugView) -> DebugView {
        self.active = if self.active == view {
            DebugView::None
        } else {
            view
        };
        self.active
    }

    pub fn clear(&mut self) {
        self.active = DebugView::None;
    }

    /// View presented this frame. Wireframe mode forces the albedo view when nothing
    /// else is selected.
    pub fn effective(&self, wireframe: bool) -> DebugView {
        if wireframe && self.active == DebugView::None {
            DebugView::Albedo
        } else {
            self.active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_none() {
        assert_eq!(DebugViewSelector::new().active(), DebugView::None);
    }

    #[test]
    fn test_select_twice_returns_to_none() {
        let mut selector = DebugViewSelector::new();
        for view in DebugView::SELECTABLE {
            assert_eq!(selector.select(view), view);
            assert_eq!(selector.select(view), DebugView::None);
        }
    }

    #[test]
    fn test_select_replaces_previous_view() {
        let mut selector = DebugViewSelector::new();
        selector.select(DebugView::Normal);
        selector.select(DebugView::Occlusion);
        assert_eq!(selector.active(), DebugView::Occlusion);
        // Occlusion is off again after the second press, Normal does not come back
        selector.select(DebugView::Occlusion);
        assert_eq!(selector.active(), DebugView::None);
    }

    #[test]
    fn test_wireframe_forces_albedo() {
        let mut selector = DebugViewSelector::new();
        assert_eq!(selector.effective(true), DebugView::Albedo);
        selector.select(DebugView::Position);
        assert_eq!(selector.effective(true), DebugView::Position);
        assert_eq!(selector.effective(false), DebugView::Position);
    }

    #[test]
    fn test_slots() {
        assert_eq!(DebugView::from_slot(0), None);
        assert_eq!(DebugView::from_slot(1), Some(DebugView::Albedo));
        assert_eq!(DebugView::from_slot(6), Some(DebugView::DeferredLit));
        assert_eq!(DebugView::from_slot(7), None);
    }

    #[test]
    fn test_sources() {
        assert_eq!(
            DebugView::Normal.source(),
            Some(DebugSource::GBuffer(Attachment::Normal))
        );
        assert_eq!(DebugView::Occlusion.source(), Some(DebugSource::Occlusion));
        assert_eq!(DebugView::None.source(), None);
    }
}
