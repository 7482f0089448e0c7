//! Key edges, key bindings and toggle handling
//!
//! Toggles flip on the press edge of a key only, so holding a key or an OS key repeat
//! flips a toggle exactly once whatever the frame rate.

use std::collections::HashSet;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::config::FeatureToggles;
use crate::debug_view::{DebugView, DebugViewSelector};

/// Discrete key-edge query of an input system
pub trait InputState {
    /// `true` only in the frame the key went down.
    fn is_key_pushed(&self, key: KeyCode) -> bool;
}

/// Turns winit keyboard events into per-frame press edges.
///
/// Feed events during the frame, query with [`InputState::is_key_pushed`], then call
/// [`KeyEdgeTracker::end_frame`] once the renderer has run its update.
#[derive(Debug, Default)]
pub struct KeyEdgeTracker {
    held: HashSet<KeyCode>,
    pushed: HashSet<KeyCode>,
}

impl KeyEdgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.held.insert(key) {
                    self.pushed.insert(key);
                }
            }
            ElementState::Released => {
                self.held.remove(&key);
            }
        }
    }

    /// Returns `true` if the event was a keyboard event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.handle_key(code, event.state);
                }
                true
            }
            WindowEvent::Focused(false) => {
                self.held.clear();
                false
            }
            _ => false,
        }
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// Forget this frame's edges.
    pub fn end_frame(&mut self) {
        self.pushed.clear();
    }
}

impl InputState for KeyEdgeTracker {
    fn is_key_pushed(&self, key: KeyCode) -> bool {
        self.pushed.contains(&key)
    }
}

/// Key table for the renderer's debug and feature toggles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    pub toggle_wireframe: KeyCode,
    /// Keys for debug view slots 1 to 6, see [`DebugView::SELECTABLE`]
    pub debug_views: [KeyCode; 6],
    pub toggle_fxaa: KeyCode,
    pub toggle_ambient_occlusion: KeyCode,
    pub toggle_post_processing: KeyCode,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            toggle_wireframe: KeyCode::KeyG,
            debug_views: [
                KeyCode::Numpad1,
                KeyCode::Numpad2,
                KeyCode::Numpad3,
                KeyCode::Numpad4,
                KeyCode::Numpad5,
                KeyCode::Numpad6,
            ],
            toggle_fxaa: KeyCode::Numpad7,
            toggle_ambient_occlusion: KeyCode::Numpad8,
            toggle_post_processing: KeyCode::Numpad9,
        }
    }
}

/// A state change caused by one key edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleEvent {
    Wireframe(bool),
    DebugView(DebugView),
    Fxaa(bool),
    AmbientOcclusion(bool),
    PostProcessing(bool),
}

impl KeyBindings {
    /// Apply this frame's key edges to the toggles and the debug view selector.
    pub fn apply(
        &self,
        input: &dyn InputState,
        toggles: &mut FeatureToggles,
        debug: &mut DebugViewSelector,
    ) -> Vec<ToggleEvent> {
        let mut events = Vec::new();

        if input.is_key_pushed(self.toggle_wireframe) {
            toggles.wireframe = !toggles.wireframe;
            events.push(ToggleEvent::Wireframe(toggles.wireframe));
        }

        for (key, view) in self.debug_views.iter().zip(DebugView::SELECTABLE) {
            if input.is_key_pushed(*key) {
                events.push(ToggleEvent::DebugView(debug.select(view)));
            }
        }

        if input.is_key_pushed(self.toggle_fxaa) {
            toggles.fxaa = !toggles.fxaa;
            events.push(ToggleEvent::Fxaa(toggles.fxaa));
        }
        if input.is_key_pushed(self.toggle_ambient_occlusion) {
            toggles.ambient_occlusion = !toggles.ambient_occlusion;
            events.push(ToggleEvent::AmbientOcclusion(toggles.ambient_occlusion));
        }
        if input.is_key_pushed(self.toggle_post_processing) {
            toggles.post_processing = !toggles.post_processing;
            events.push(ToggleEvent::PostProcessing(toggles.post_processing));
        }

        for event in &events {
            log::debug!("toggle: {:?}", event);
        }
        events
    }
}
