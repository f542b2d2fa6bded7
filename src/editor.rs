//! Pointer-driven region drawing and selection.
//!
//! Pointer positions arrive in device pixels relative to whatever surface the
//! working image is displayed on. They are converted to percentages of that
//! surface right away, so nothing here depends on the rendered resolution.

use serde::{Deserialize, Serialize};

use crate::region::{PercentPoint, PercentRect, RegionId};
use crate::sequencing::RegionSet;

/// On-screen rectangle of the displayed image, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Converts a device position to a percentage position, which may lie
    /// outside [0,100] when the pointer is off the image. A surface with no
    /// area has no positions.
    pub fn position(&self, client_x: f32, client_y: f32) -> Option<PercentPoint> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return None;
        }
        let x = (client_x - self.left) * 100.0 / self.width;
        let y = (client_y - self.top) * 100.0 / self.height;
        Some(PercentPoint::new(x, y))
    }

    /// Like [`SurfaceRect::position`], clamped onto the image.
    pub fn to_percent(&self, client_x: f32, client_y: f32) -> Option<PercentPoint> {
        self.position(client_x, client_y).map(PercentPoint::clamped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorState {
    Idle,
    Drawing {
        start: PercentPoint,
        pending: PercentRect,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditorEvent {
    SelectionChanged { selected: Option<RegionId> },
    RegionCreated { id: RegionId },
}

#[derive(Debug, Clone)]
pub struct RegionEditor {
    state: EditorState,
    selected: Option<RegionId>,
}

impl Default for RegionEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionEditor {
    pub fn new() -> Self {
        Self {
            state: EditorState::Idle,
            selected: None,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, EditorState::Drawing { .. })
    }

    pub fn pending(&self) -> Option<PercentRect> {
        match self.state {
            EditorState::Drawing { pending, .. } => Some(pending),
            EditorState::Idle => None,
        }
    }

    pub fn selected(&self) -> Option<RegionId> {
        self.selected
    }

    pub fn select(&mut self, id: Option<RegionId>) -> Option<EditorEvent> {
        if self.selected == id {
            return None;
        }
        self.selected = id;
        Some(EditorEvent::SelectionChanged { selected: id })
    }

    /// Drops the selection when it points at a region that no longer exists.
    pub fn region_removed(&mut self, id: RegionId) {
        if self.selected == Some(id) {
            self.selected = None;
        }
    }

    pub fn reset(&mut self) {
        self.state = EditorState::Idle;
        self.selected = None;
    }

    pub fn pointer_down(
        &mut self,
        surface: &SurfaceRect,
        client_x: f32,
        client_y: f32,
        regions: &RegionSet,
    ) -> Option<EditorEvent> {
        if self.is_drawing() {
            return None;
        }
        // Only a press on the image itself can select; the drawing anchor is
        // clamped onto it.
        let raw = surface.position(client_x, client_y)?;
        if let Some(hit) = hit_test(regions, raw) {
            self.selected = Some(hit);
            return Some(EditorEvent::SelectionChanged {
                selected: Some(hit),
            });
        }

        let event = self.select(None);
        let start = raw.clamped();
        self.state = EditorState::Drawing {
            start,
            pending: PercentRect::at(start),
        };
        event
    }

    pub fn pointer_move(&mut self, surface: &SurfaceRect, client_x: f32, client_y: f32) {
        let EditorState::Drawing { start, .. } = self.state else {
            return;
        };
        let Some(point) = surface.to_percent(client_x, client_y) else {
            return;
        };
        self.state = EditorState::Drawing {
            start,
            pending: PercentRect::from_corners(start, point),
        };
    }

    /// Ends the gesture. The pending rectangle becomes a region only when it
    /// is larger than [`crate::region::MIN_REGION_SIZE`] on both axes.
    pub fn pointer_up(&mut self, regions: &mut RegionSet) -> Option<EditorEvent> {
        let state = std::mem::replace(&mut self.state, EditorState::Idle);
        let EditorState::Drawing { pending, .. } = state else {
            return None;
        };
        if !pending.exceeds_min_size() {
            return None;
        }
        let id = regions.add(pending);
        Some(EditorEvent::RegionCreated { id })
    }

    /// Leaving the surface finishes the gesture exactly like releasing it.
    pub fn pointer_leave(&mut self, regions: &mut RegionSet) -> Option<EditorEvent> {
        self.pointer_up(regions)
    }
}

/// Topmost region under the point; higher `order` wins on overlap.
pub fn hit_test(regions: &RegionSet, point: PercentPoint) -> Option<RegionId> {
    regions
        .sorted_by_order()
        .into_iter()
        .rev()
        .find(|region| region.rect.contains(point))
        .map(|region| region.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_surface() -> SurfaceRect {
        SurfaceRect::new(0.0, 0.0, 100.0, 100.0)
    }

    fn drag(
        editor: &mut RegionEditor,
        regions: &mut RegionSet,
        surface: &SurfaceRect,
        from: (f32, f32),
        to: (f32, f32),
    ) -> Option<EditorEvent> {
        editor.pointer_down(surface, from.0, from.1, regions);
        editor.pointer_move(surface, to.0, to.1);
        editor.pointer_up(regions)
    }

    #[test]
    fn drag_creates_region_with_drawn_bounds() {
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        let event = drag(
            &mut editor,
            &mut regions,
            &unit_surface(),
            (10.0, 10.0),
            (30.0, 20.0),
        );
        let Some(EditorEvent::RegionCreated { id }) = event else {
            panic!("expected a region, got {:?}", event);
        };
        let region = regions.get(id).unwrap();
        assert_eq!(region.rect, PercentRect::new(10.0, 10.0, 20.0, 10.0));
        assert_eq!(region.order, 1);
        assert!(!editor.is_drawing());
        assert_eq!(editor.pending(), None);
    }

    #[test]
    fn percentages_follow_the_displayed_surface() {
        let surface = SurfaceRect::new(40.0, 100.0, 300.0, 700.0);
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        drag(
            &mut editor,
            &mut regions,
            &surface,
            (70.0, 170.0),
            (130.0, 240.0),
        );
        let region = &regions.as_slice()[0];
        assert!((region.rect.x - 10.0).abs() < 1e-4);
        assert!((region.rect.y - 10.0).abs() < 1e-4);
        assert!((region.rect.width - 20.0).abs() < 1e-4);
        assert!((region.rect.height - 10.0).abs() < 1e-4);
    }

    #[test]
    fn dragging_up_and_left_normalizes_the_box() {
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        let surface = unit_surface();
        editor.pointer_down(&surface, 30.0, 20.0, &regions);
        editor.pointer_move(&surface, 25.0, 18.0);
        assert_eq!(
            editor.pending(),
            Some(PercentRect::new(25.0, 18.0, 5.0, 2.0))
        );
        editor.pointer_move(&surface, 10.0, 10.0);
        editor.pointer_leave(&mut regions);
        assert_eq!(
            regions.as_slice()[0].rect,
            PercentRect::new(10.0, 10.0, 20.0, 10.0)
        );
    }

    #[test]
    fn tiny_rectangles_are_discarded() {
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        let surface = unit_surface();
        assert_eq!(
            drag(&mut editor, &mut regions, &surface, (10.0, 10.0), (10.04, 40.0)),
            None
        );
        assert_eq!(
            drag(&mut editor, &mut regions, &surface, (10.0, 10.0), (40.0, 10.03)),
            None
        );
        editor.pointer_down(&surface, 50.0, 50.0, &regions);
        assert_eq!(editor.pointer_up(&mut regions), None);
        assert!(regions.is_empty());
        assert!(!editor.is_drawing());

        let created = drag(&mut editor, &mut regions, &surface, (10.0, 10.0), (10.06, 10.06));
        assert!(matches!(created, Some(EditorEvent::RegionCreated { .. })));
    }

    #[test]
    fn overlapping_hit_selects_higher_order() {
        let mut regions = RegionSet::new();
        let lower = regions.add(PercentRect::new(10.0, 10.0, 30.0, 30.0));
        let upper = regions.add(PercentRect::new(20.0, 20.0, 30.0, 30.0));
        let mut editor = RegionEditor::new();

        let event = editor.pointer_down(&unit_surface(), 25.0, 25.0, &regions);
        assert_eq!(
            event,
            Some(EditorEvent::SelectionChanged {
                selected: Some(upper)
            })
        );
        assert!(!editor.is_drawing());

        editor.pointer_down(&unit_surface(), 12.0, 12.0, &regions);
        assert_eq!(editor.selected(), Some(lower));
    }

    #[test]
    fn pressing_empty_space_clears_selection_and_starts_drawing() {
        let mut regions = RegionSet::new();
        let id = regions.add(PercentRect::new(10.0, 10.0, 10.0, 10.0));
        let mut editor = RegionEditor::new();
        editor.select(Some(id));

        let event = editor.pointer_down(&unit_surface(), 80.0, 80.0, &regions);
        assert_eq!(event, Some(EditorEvent::SelectionChanged { selected: None }));
        assert!(editor.is_drawing());
        assert_eq!(
            editor.pending(),
            Some(PercentRect::new(80.0, 80.0, 0.0, 0.0))
        );
    }

    #[test]
    fn drag_outside_surface_is_clipped_to_edge() {
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        drag(
            &mut editor,
            &mut regions,
            &unit_surface(),
            (90.0, 90.0),
            (140.0, 120.0),
        );
        assert_eq!(
            regions.as_slice()[0].rect,
            PercentRect::new(90.0, 90.0, 10.0, 10.0)
        );
    }

    #[test]
    fn press_beside_the_image_does_not_select_an_edge_region() {
        let mut regions = RegionSet::new();
        regions.add(PercentRect::new(0.0, 40.0, 20.0, 20.0));
        let mut editor = RegionEditor::new();
        let surface = SurfaceRect::new(100.0, 0.0, 100.0, 100.0);

        let event = editor.pointer_down(&surface, 90.0, 50.0, &regions);
        assert_eq!(event, None);
        assert_eq!(editor.selected(), None);
        assert!(editor.is_drawing());
        assert_eq!(
            editor.pending(),
            Some(PercentRect::new(0.0, 50.0, 0.0, 0.0))
        );
    }

    #[test]
    fn idle_moves_and_zero_surfaces_are_ignored() {
        let mut editor = RegionEditor::new();
        let mut regions = RegionSet::new();
        editor.pointer_move(&unit_surface(), 10.0, 10.0);
        assert_eq!(editor.pointer_leave(&mut regions), None);
        let flat = SurfaceRect::new(0.0, 0.0, 0.0, 100.0);
        assert_eq!(editor.pointer_down(&flat, 1.0, 1.0, &regions), None);
        assert!(!editor.is_drawing());
    }

    #[test]
    fn removing_selected_region_clears_selection() {
        let mut editor = RegionEditor::new();
        editor.select(Some(RegionId(3)));
        editor.region_removed(RegionId(4));
        assert_eq!(editor.selected(), Some(RegionId(3)));
        editor.region_removed(RegionId(3));
        assert_eq!(editor.selected(), None);
    }
}
