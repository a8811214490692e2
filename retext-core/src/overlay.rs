use tracing::debug;

use crate::error::EditorError;
use crate::extract::Extraction;
use crate::geometry::{NativeDelta, NativePoint, PageGeometry, Rgb, ViewportDelta, ViewportPoint};
use crate::run::{RunId, RunStyle, TextRun};
use crate::viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum StyleChange {
    FontFamily(String),
    Color(Rgb),
    FontSize(f32),
}

/// Editable run set of the current page. Single owner, no internal locking.
#[derive(Debug, Clone)]
pub struct OverlayStore {
    runs: Vec<TextRun>,
    geometry: PageGeometry,
    selection: Option<RunId>,
    editing: Option<RunId>,
}

impl OverlayStore {
    pub fn new(extraction: Extraction) -> Self {
        Self {
            runs: extraction.runs,
            geometry: extraction.geometry,
            selection: None,
            editing: None,
        }
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn get(&self, id: RunId) -> Option<&TextRun> {
        self.runs.iter().find(|run| run.id() == id)
    }

    pub fn by_order(&self, order: u32) -> Option<&TextRun> {
        self.runs.iter().find(|run| run.order() == order)
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn selection(&self) -> Option<RunId> {
        self.selection
    }

    pub fn is_dirty(&self) -> bool {
        self.runs.iter().any(TextRun::is_dirty)
    }

    fn run_mut(&mut self, id: RunId) -> Result<&mut TextRun, EditorError> {
        self.runs
            .iter_mut()
            .find(|run| run.id() == id)
            .ok_or(EditorError::UnknownRun(id))
    }

    /// Accepts any string; nothing is sanitized.
    pub fn set_content(&mut self, id: RunId, text: impl Into<String>) -> Result<(), EditorError> {
        self.run_mut(id)?.set_content(text.into());
        Ok(())
    }

    pub fn set_style(&mut self, id: RunId, change: StyleChange) -> Result<(), EditorError> {
        let geometry = self.geometry;
        let run = self.run_mut(id)?;
        match change {
            StyleChange::FontFamily(family) => run.set_font_family(family),
            StyleChange::Color(color) => run.set_color(color),
            StyleChange::FontSize(size) => {
                run.set_font_size(size);
                viewport::map_run(run, &geometry);
            }
        }
        Ok(())
    }

    /// `delta` must already be in native units.
    pub fn move_run(&mut self, id: RunId, delta: NativeDelta) -> Result<(), EditorError> {
        let geometry = self.geometry;
        let run = self.run_mut(id)?;
        run.translate(delta);
        viewport::map_run(run, &geometry);
        Ok(())
    }

    pub fn select(&mut self, id: Option<RunId>) -> Result<(), EditorError> {
        if let Some(id) = id {
            self.run_mut(id)?;
        }
        self.selection = id;
        Ok(())
    }

    pub fn add_run(
        &mut self,
        content: impl Into<String>,
        position: NativePoint,
        style: RunStyle,
    ) -> RunId {
        let order = self
            .runs
            .iter()
            .map(|run| run.order() + 1)
            .max()
            .unwrap_or(0);
        let mut run = TextRun::added(content.into(), position, style, order);
        viewport::map_run(&mut run, &self.geometry);
        let id = run.id();
        debug!(%id, order, "added text run");
        self.runs.push(run);
        id
    }

    pub fn remove_run(&mut self, id: RunId) -> Result<TextRun, EditorError> {
        let index = self
            .runs
            .iter()
            .position(|run| run.id() == id)
            .ok_or(EditorError::UnknownRun(id))?;
        if self.selection == Some(id) {
            self.selection = None;
        }
        if self.editing == Some(id) {
            self.editing = None;
        }
        Ok(self.runs.remove(index))
    }

    pub fn begin_edit(&mut self, id: RunId) -> Result<(), EditorError> {
        self.select(Some(id))?;
        self.editing = Some(id);
        Ok(())
    }

    /// Applies the final text of an edit session and clears the selection.
    /// Committing unchanged text leaves the run clean.
    pub fn commit_edit(&mut self, id: RunId, text: impl Into<String>) -> Result<(), EditorError> {
        let text = text.into();
        let run = self.run_mut(id)?;
        if run.content() != text {
            run.set_content(text);
        }
        self.editing = None;
        self.selection = None;
        Ok(())
    }

    pub fn editing(&self) -> Option<RunId> {
        self.editing
    }

    pub fn commit_move(&mut self, gesture: MoveGesture, release: ViewportPoint) -> Result<(), EditorError> {
        let delta = gesture.commit(release, self.geometry.scale);
        if delta.is_zero() {
            return Ok(());
        }
        self.move_run(gesture.run, delta)
    }

    /// Re-derives every viewport field for a new scale.
    pub fn rescale(&mut self, scale: f32) {
        self.geometry = self.geometry.with_scale(scale);
        viewport::remap(&mut self.runs, &self.geometry);
    }

    /// Runs in redraw order, independent of storage order.
    pub fn draw_order(&self) -> Vec<TextRun> {
        let mut runs = self.runs.clone();
        runs.sort_by_key(TextRun::order);
        runs
    }
}

/// A drag of one run. Intermediate updates are display-only; the native delta
/// is derived once, at commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveGesture {
    run: RunId,
    origin: ViewportPoint,
}

impl MoveGesture {
    pub fn start(run: RunId, origin: ViewportPoint) -> Self {
        Self { run, origin }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn update(&self, pointer: ViewportPoint) -> ViewportDelta {
        ViewportDelta {
            dx: pointer.x - self.origin.x,
            dy: pointer.y - self.origin.y,
        }
    }

    pub fn commit(self, release: ViewportPoint, scale: f32) -> NativeDelta {
        self.update(release).to_native(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_runs;
    use crate::geometry::Transform;
    use crate::run::TextRecord;

    fn store() -> OverlayStore {
        let records = vec![
            TextRecord::new("Heading", Transform::new(12.0, 0.0, 0.0, 12.0, 72.0, 700.0), 50.0, 12.0),
            TextRecord::new("Hello", Transform::new(12.0, 0.0, 0.0, 12.0, 72.0, 650.0), 30.0, 12.0),
            TextRecord::new("Footer", Transform::new(12.0, 0.0, 0.0, 12.0, 72.0, 600.0), 40.0, 12.0),
        ];
        OverlayStore::new(extract_runs(
            records,
            PageGeometry::new(612.0, 792.0, 1.5),
            &RunStyle::default(),
        ))
    }

    #[test]
    fn each_edit_kind_marks_run_dirty() {
        let mut store = store();
        let ids: Vec<_> = store.runs().iter().map(|r| r.id()).collect();
        assert!(!store.is_dirty());

        store.set_content(ids[0], "Changed").unwrap();
        store
            .set_style(ids[1], StyleChange::Color(Rgb::new(255, 0, 0)))
            .unwrap();
        store.move_run(ids[2], NativeDelta::new(5.0, 0.0)).unwrap();

        assert!(store.runs().iter().all(|r| r.is_dirty()));
    }

    #[test]
    fn dirty_flag_never_reverts() {
        let mut store = store();
        let id = store.by_order(1).unwrap().id();
        store.set_content(id, "Goodbye").unwrap();
        store.set_content(id, "Hello").unwrap();
        assert!(store.get(id).unwrap().is_dirty());
    }

    #[test]
    fn set_content_accepts_any_string() {
        let mut store = store();
        let id = store.by_order(0).unwrap().id();
        store.set_content(id, "").unwrap();
        store.set_content(id, "<b>\u{1F600}\n\t").unwrap();
        assert_eq!(store.get(id).unwrap().content(), "<b>\u{1F600}\n\t");
    }

    #[test]
    fn move_updates_native_and_viewport_together() {
        let mut store = store();
        let id = store.by_order(1).unwrap().id();
        let before = store.get(id).unwrap().viewport_position();
        store.move_run(id, NativeDelta::new(10.0, -20.0)).unwrap();
        let run = store.get(id).unwrap();
        assert_eq!(run.native_position(), NativePoint::new(82.0, 630.0));
        assert!((run.viewport_position().x - (before.x + 15.0)).abs() < 1e-3);
        assert!((run.viewport_position().y - (before.y + 30.0)).abs() < 1e-3);
    }

    #[test]
    fn added_runs_sort_after_existing_and_are_dirty() {
        let mut store = store();
        let id = store.add_run("New", NativePoint::new(100.0, 100.0), RunStyle::default());
        let run = store.get(id).unwrap();
        assert_eq!(run.order(), 3);
        assert!(run.is_dirty());
        assert_eq!(store.draw_order().last().unwrap().id(), id);
    }

    #[test]
    fn removed_runs_are_gone_and_unknown_ids_error() {
        let mut store = store();
        let id = store.by_order(2).unwrap().id();
        store.select(Some(id)).unwrap();
        store.remove_run(id).unwrap();
        assert_eq!(store.runs().len(), 2);
        assert_eq!(store.selection(), None);
        assert_eq!(store.set_content(id, "x"), Err(EditorError::UnknownRun(id)));
        assert_eq!(store.remove_run(id).unwrap_err(), EditorError::UnknownRun(id));
    }

    #[test]
    fn edit_session_commits_and_clears_selection() {
        let mut store = store();
        let id = store.by_order(1).unwrap().id();
        store.begin_edit(id).unwrap();
        assert_eq!(store.selection(), Some(id));
        assert_eq!(store.editing(), Some(id));

        store.commit_edit(id, "Hello").unwrap();
        assert!(!store.get(id).unwrap().is_dirty());
        assert_eq!(store.selection(), None);

        store.begin_edit(id).unwrap();
        store.commit_edit(id, "Goodbye").unwrap();
        assert_eq!(store.get(id).unwrap().content(), "Goodbye");
        assert!(store.get(id).unwrap().is_dirty());
    }

    #[test]
    fn move_gesture_converts_once_at_commit() {
        let mut store = store();
        let id = store.by_order(0).unwrap().id();
        let origin = store.get(id).unwrap().viewport_position();
        let gesture = MoveGesture::start(id, origin);

        for step in 1..=7 {
            let preview = gesture.update(ViewportPoint::new(origin.x + step as f32, origin.y));
            assert_eq!(preview.dx, step as f32);
        }

        store
            .commit_move(gesture, ViewportPoint::new(origin.x + 15.0, origin.y + 30.0))
            .unwrap();
        let run = store.get(id).unwrap();
        assert_eq!(run.native_position(), NativePoint::new(82.0, 680.0));
    }

    #[test]
    fn rescale_keeps_native_fields() {
        let mut store = store();
        let native: Vec<_> = store.runs().iter().map(|r| r.native_position()).collect();
        store.rescale(2.0);
        store.rescale(0.5);
        store.rescale(1.5);
        let after: Vec<_> = store.runs().iter().map(|r| r.native_position()).collect();
        assert_eq!(native, after);
        assert_eq!(store.geometry().scale, 1.5);
    }

    #[test]
    fn font_size_edit_changes_drawn_size_only() {
        let mut store = store();
        let id = store.by_order(0).unwrap().id();
        store.set_style(id, StyleChange::FontSize(20.0)).unwrap();
        let run = store.get(id).unwrap();
        assert_eq!(run.native_font_size(), 12.0);
        assert_eq!(run.effective_font_size(), 20.0);
        assert!((run.viewport_font_size() - 30.0).abs() < 1e-4);
    }
}
