//! Mode controller: routes pointer events to the rectangle or measurement model
//! and writes the snapshot after every completed mutation.
//!
//! Events are handled one at a time and each handler finishes its store write
//! before returning, so a failed write shows up in the handler's return value.
//! Intermediate drag updates are never written.

use crate::catalog::LabelCatalog;
use crate::geometry::{self, Bounds, Corner, DragMode, Point};
use crate::measurement::{MeasurementModel, MeasurementState, Placement};
use crate::reconcile::{self, ExternalInput};
use crate::rectangle::{Finalized, RectId, RectangleModel};
use crate::snapshot::Snapshot;
use crate::store::{SnapshotStore, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Drawing,
    Measuring,
}

impl Mode {
    pub fn title(self) -> &'static str {
        match self {
            Self::Drawing => "Draw Bounding Boxes",
            Self::Measuring => "Measure TN",
        }
    }
}

/// Result of the store write a handler performed, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persisted {
    /// Nothing durable changed.
    Skipped,
    Written,
    /// The write failed; state lives on in memory only.
    Failed,
}

/// What the pointer would do at a position; the shell maps this to a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hover {
    Crosshair,
    Move,
    Resize(Corner),
    Delete,
    Grab,
    /// No label left to draw with.
    Unavailable,
}

/// A drag in progress. Only exists between a press and its release, and is
/// dropped by mode switches and clears.
#[derive(Clone, Debug, PartialEq)]
enum Gesture {
    Create {
        anchor: Point,
    },
    Edit {
        id: RectId,
        mode: DragMode,
        origin: Point,
        start: Bounds,
    },
    Endpoint {
        index: usize,
        origin: Point,
        start: Point,
    },
}

pub struct AnnotationSession<S: SnapshotStore> {
    store: S,
    mode: Mode,
    rectangles: RectangleModel,
    measurement: MeasurementModel,
    catalog: LabelCatalog,
    gesture: Option<Gesture>,
    last_error: Option<StoreError>,
}

impl<S: SnapshotStore> AnnotationSession<S> {
    /// Reconciles `input` against whatever `store` holds and seeds the models.
    pub fn open(mut store: S, catalog: LabelCatalog, clear: bool, input: &ExternalInput) -> Self {
        let seed = reconcile::reconcile(&mut store, clear, input);
        let rectangles =
            RectangleModel::from_rectangles(seed.rectangles.iter().map(|r| r.to_rectangle()));
        let measurement = MeasurementModel::new(seed.pixel_mm_ratio)
            .with_endpoints(&seed.endpoint_points());
        let mut session = Self {
            store,
            mode: Mode::default(),
            rectangles,
            measurement,
            catalog,
            gesture: None,
            last_error: None,
        };
        session.refresh_catalog();
        tracing::info!(
            rectangles = session.rectangles.len(),
            endpoints = session.measurement.endpoints().len(),
            "annotation session opened"
        );
        session
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn rectangles(&self) -> &RectangleModel {
        &self.rectangles
    }

    pub fn measurement(&self) -> &MeasurementModel {
        &self.measurement
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Most recent write failure, cleared by the next successful write.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn has_active_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.rectangles, &self.measurement)
    }

    pub fn measurement_state(&self) -> MeasurementState {
        self.measurement.state()
    }

    pub fn can_clear_all(&self) -> bool {
        !self.rectangles.is_empty()
    }

    pub fn select_label(&mut self, label: &str) -> bool {
        self.catalog.select(label)
    }

    /// Switches mode, force-finishing any drag of the old mode first.
    pub fn set_mode(&mut self, mode: Mode) -> Persisted {
        if mode == self.mode {
            return Persisted::Skipped;
        }
        let persisted = self.finish_gesture();
        if self.mode == Mode::Measuring {
            self.measurement.clear_preview();
        }
        self.mode = mode;
        tracing::debug!(?mode, status = self.measurement.state().status_text(), "mode changed");
        persisted
    }

    pub fn pointer_down(&mut self, p: Point) -> Persisted {
        // A press without a matching release ends the stale drag first.
        let stale = self.finish_gesture();
        let persisted = match self.mode {
            Mode::Drawing => self.press_drawing(p),
            Mode::Measuring => self.press_measuring(p),
        };
        if persisted == Persisted::Skipped {
            stale
        } else {
            persisted
        }
    }

    pub fn pointer_move(&mut self, p: Point) {
        match self.gesture.clone() {
            Some(Gesture::Create { anchor }) => self.rectangles.update_create(anchor, p),
            Some(Gesture::Edit {
                id,
                mode,
                origin,
                start,
            }) => self.rectangles.update_edit(id, mode, start, origin.delta_to(p)),
            Some(Gesture::Endpoint {
                index,
                origin,
                start,
            }) => {
                self.measurement.drag_endpoint(index, start, origin.delta_to(p));
            }
            None => {
                if self.mode == Mode::Measuring {
                    self.measurement.preview_to(p);
                }
            }
        }
    }

    pub fn pointer_up(&mut self, p: Point) -> Persisted {
        if self.gesture.is_none() {
            return Persisted::Skipped;
        }
        self.pointer_move(p);
        self.finish_gesture()
    }

    pub fn hover(&self, p: Point) -> Hover {
        match &self.gesture {
            Some(Gesture::Create { .. }) => return Hover::Crosshair,
            Some(Gesture::Edit { mode, .. }) => return hover_for(*mode),
            Some(Gesture::Endpoint { .. }) => return Hover::Grab,
            None => {}
        }
        match self.mode {
            Mode::Drawing => {
                if self.rectangles.hit_delete_mark(p).is_some() {
                    Hover::Delete
                } else if let Some(rect) = self.rectangles.hit_test(p) {
                    hover_for(geometry::drag_mode(&rect.bounds, p))
                } else if self.catalog.is_exhausted() {
                    Hover::Unavailable
                } else {
                    Hover::Crosshair
                }
            }
            Mode::Measuring => {
                if self.measurement.hit_endpoint(p).is_some() {
                    Hover::Grab
                } else {
                    Hover::Crosshair
                }
            }
        }
    }

    pub fn delete(&mut self, id: RectId) -> Persisted {
        if matches!(&self.gesture, Some(Gesture::Edit { id: active, .. }) if *active == id) {
            self.gesture = None;
        }
        let Some(removed) = self.rectangles.delete(id) else {
            return Persisted::Skipped;
        };
        tracing::info!(label = %removed.label, "rectangle deleted");
        self.refresh_catalog();
        self.commit()
    }

    /// Removes every rectangle. Always written, even when nothing was there.
    pub fn clear_all(&mut self) -> Persisted {
        if matches!(
            self.gesture,
            Some(Gesture::Create { .. } | Gesture::Edit { .. })
        ) {
            self.gesture = None;
        }
        let removed = self.rectangles.clear_all();
        tracing::info!(removed, "cleared all rectangles");
        self.refresh_catalog();
        self.commit()
    }

    /// Removes both endpoints. Always written, even when nothing was there.
    pub fn clear_measurement(&mut self) -> Persisted {
        if matches!(self.gesture, Some(Gesture::Endpoint { .. })) {
            self.gesture = None;
        }
        self.measurement.clear();
        tracing::info!("cleared TN measurement");
        self.commit()
    }

    pub fn set_pixel_mm_ratio(&mut self, ratio: f64) -> Persisted {
        #[allow(clippy::float_cmp)]
        let unchanged = ratio == self.measurement.pixel_mm_ratio();
        if unchanged || !self.measurement.set_pixel_mm_ratio(ratio) {
            return Persisted::Skipped;
        }
        self.commit()
    }

    fn press_drawing(&mut self, p: Point) -> Persisted {
        if let Some(id) = self.rectangles.hit_delete_mark(p) {
            return self.delete(id);
        }
        if let Some(rect) = self.rectangles.hit_test(p) {
            self.gesture = Some(Gesture::Edit {
                id: rect.id,
                mode: geometry::drag_mode(&rect.bounds, p),
                origin: p,
                start: rect.bounds,
            });
            return Persisted::Skipped;
        }
        let label = self.catalog.selected().map(str::to_owned);
        if self.rectangles.begin_create(p, label.as_deref()).is_some() {
            self.gesture = Some(Gesture::Create { anchor: p });
        }
        Persisted::Skipped
    }

    fn press_measuring(&mut self, p: Point) -> Persisted {
        match self.measurement.place_endpoint(p) {
            Placement::Placed(index) => {
                tracing::debug!(index, x = p.x, y = p.y, "endpoint placed");
                self.commit()
            }
            Placement::OnHandle(index) => {
                self.gesture = Some(Gesture::Endpoint {
                    index,
                    origin: p,
                    start: self.measurement.endpoints()[index],
                });
                Persisted::Skipped
            }
            Placement::Full => Persisted::Skipped,
        }
    }

    /// Ends the active drag, committing it. No-op without one.
    fn finish_gesture(&mut self) -> Persisted {
        let Some(gesture) = self.gesture.take() else {
            return Persisted::Skipped;
        };
        match gesture {
            Gesture::Create { .. } => {
                if let Finalized::Committed(id) = self.rectangles.finalize() {
                    if let Some(rect) = self.rectangles.get(id) {
                        tracing::info!(label = %rect.label, ?rect.bounds, "rectangle committed");
                    }
                    self.refresh_catalog();
                }
            }
            Gesture::Edit { id, .. } => {
                if let Some(rect) = self.rectangles.get(id) {
                    tracing::debug!(label = %rect.label, ?rect.bounds, "rectangle edited");
                }
            }
            Gesture::Endpoint { index, .. } => {
                tracing::debug!(index, "endpoint moved");
            }
        }
        self.commit()
    }

    fn refresh_catalog(&mut self) {
        self.catalog.refresh(self.rectangles.used_labels());
    }

    fn commit(&mut self) -> Persisted {
        let snapshot = self.snapshot();
        match self.store.write(&snapshot) {
            Ok(()) => {
                tracing::debug!(
                    rectangles = snapshot.rectangles.len(),
                    endpoints = snapshot.endpoints.len(),
                    "snapshot written"
                );
                self.last_error = None;
                Persisted::Written
            }
            Err(e) => {
                tracing::warn!(error = %e, "snapshot write failed, continuing in memory");
                self.last_error = Some(e);
                Persisted::Failed
            }
        }
    }
}

fn hover_for(mode: DragMode) -> Hover {
    match mode {
        DragMode::Move => Hover::Move,
        DragMode::Resize(corner) => Hover::Resize(corner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SavedRectangle;
    use crate::store::MemoryStore;

    fn session(labels: &[&str]) -> AnnotationSession<MemoryStore> {
        AnnotationSession::open(
            MemoryStore::new(),
            LabelCatalog::new(labels.iter().copied()),
            false,
            &ExternalInput::default(),
        )
    }

    fn drag(s: &mut AnnotationSession<MemoryStore>, from: Point, to: Point) -> Persisted {
        s.pointer_down(from);
        s.pointer_move(Point::new((from.x + to.x) / 2.0, (from.y + to.y) / 2.0));
        s.pointer_up(to)
    }

    fn stored(s: &AnnotationSession<MemoryStore>) -> Snapshot {
        s.store().read().unwrap().unwrap()
    }

    fn assert_labels_consistent(s: &AnnotationSession<MemoryStore>) {
        let mut used: Vec<&str> = s.rectangles().used_labels().collect();
        let before = used.len();
        used.sort_unstable();
        used.dedup();
        assert_eq!(before, used.len(), "duplicate labels");
        for label in s.catalog().available() {
            assert!(!used.contains(&label.as_str()));
        }
        assert_eq!(used.len() + s.catalog().available().len(), s.catalog().all().len());
    }

    #[test]
    fn draw_rectangle_scenario() {
        let mut s = session(&["A", "B"]);
        let persisted = drag(&mut s, Point::new(10.0, 10.0), Point::new(50.0, 40.0));
        assert_eq!(persisted, Persisted::Written);
        let r = s.rectangles().iter().next().unwrap();
        assert_eq!(r.bounds, Bounds::new(10.0, 10.0, 40.0, 30.0));
        assert_eq!(r.label, "A");
        assert_eq!(s.catalog().available(), ["B"]);
        assert_eq!(s.catalog().selected(), Some("B"));
        assert_eq!(stored(&s).rectangles.len(), 1);
    }

    #[test]
    fn drag_updates_do_not_write() {
        let mut s = session(&["A"]);
        s.pointer_down(Point::new(10.0, 10.0));
        for i in 0..10 {
            s.pointer_move(Point::new(20.0 + i as f32, 30.0));
        }
        assert_eq!(s.store().writes(), 0);
        s.pointer_up(Point::new(60.0, 60.0));
        assert_eq!(s.store().writes(), 1);
        assert!(!s.has_active_gesture());
    }

    #[test]
    fn tiny_rectangle_never_persists() {
        let mut s = session(&["A"]);
        drag(&mut s, Point::new(10.0, 10.0), Point::new(12.0, 80.0));
        assert!(s.rectangles().is_empty());
        assert!(stored(&s).rectangles.is_empty());
        assert_eq!(s.catalog().selected(), Some("A"));
    }

    #[test]
    fn exhausted_catalog_ignores_new_draws() {
        let mut s = session(&["A"]);
        drag(&mut s, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        assert!(s.catalog().is_exhausted());
        assert_eq!(s.hover(Point::new(200.0, 200.0)), Hover::Unavailable);
        let persisted = drag(&mut s, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        assert_eq!(persisted, Persisted::Skipped);
        assert_eq!(s.rectangles().len(), 1);
    }

    #[test]
    fn resize_south_east_handle() {
        let mut s = session(&["A"]);
        drag(&mut s, Point::new(50.0, 50.0), Point::new(70.0, 70.0));
        assert_eq!(s.hover(Point::new(68.0, 68.0)), Hover::Resize(Corner::SouthEast));
        drag(&mut s, Point::new(68.0, 68.0), Point::new(78.0, 78.0));
        let r = s.rectangles().iter().next().unwrap();
        assert_eq!(r.bounds, Bounds::new(50.0, 50.0, 30.0, 30.0));
        assert_eq!(stored(&s).rectangles[0].width, 30);
    }

    #[test]
    fn move_keeps_size() {
        let mut s = session(&["A"]);
        drag(&mut s, Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        drag(&mut s, Point::new(40.0, 50.0), Point::new(60.0, 45.0));
        let r = s.rectangles().iter().next().unwrap();
        assert_eq!(r.bounds, Bounds::new(20.0, -5.0, 100.0, 100.0));
    }

    #[test]
    fn delete_mark_frees_label() {
        let mut s = session(&["A", "B"]);
        drag(&mut s, Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        assert_eq!(s.hover(Point::new(92.0, 8.0)), Hover::Delete);
        assert_eq!(s.pointer_down(Point::new(92.0, 8.0)), Persisted::Written);
        assert!(!s.has_active_gesture());
        assert!(s.rectangles().is_empty());
        assert_eq!(s.catalog().available(), ["A", "B"]);
        assert!(stored(&s).rectangles.is_empty());
    }

    #[test]
    fn clear_all_with_two_rectangles() {
        let mut s = session(&["A", "B", "C"]);
        drag(&mut s, Point::new(0.0, 0.0), Point::new(20.0, 20.0));
        drag(&mut s, Point::new(50.0, 50.0), Point::new(80.0, 80.0));
        assert_eq!(s.rectangles().len(), 2);
        assert!(s.can_clear_all());
        assert_eq!(s.clear_all(), Persisted::Written);
        assert!(s.rectangles().is_empty());
        assert!(!s.can_clear_all());
        assert!(stored(&s).rectangles.is_empty());
        assert_eq!(s.catalog().available().len(), 3);
    }

    #[test]
    fn label_bookkeeping_holds_through_mixed_edits() {
        let mut s = session(&["A", "B", "C"]);
        drag(&mut s, Point::new(0.0, 0.0), Point::new(30.0, 30.0));
        assert_labels_consistent(&s);
        drag(&mut s, Point::new(100.0, 100.0), Point::new(102.0, 102.0));
        assert_labels_consistent(&s);
        drag(&mut s, Point::new(200.0, 0.0), Point::new(260.0, 40.0));
        assert_labels_consistent(&s);
        drag(&mut s, Point::new(15.0, 15.0), Point::new(150.0, 150.0));
        assert_labels_consistent(&s);
        assert!(s.select_label("C"));
        let first = s.rectangles().iter().next().unwrap().id;
        s.delete(first);
        assert_labels_consistent(&s);
        drag(&mut s, Point::new(300.0, 300.0), Point::new(340.0, 340.0));
        assert_labels_consistent(&s);
        let labels: Vec<_> = s.rectangles().used_labels().collect();
        assert_eq!(labels, ["B", "C"]);
    }

    #[test]
    fn measurement_scenario() {
        let mut s = session(&["A"]);
        s.set_mode(Mode::Measuring);
        assert_eq!(s.measurement_state().status_text(), "Click to place first endpoint");
        assert_eq!(s.pointer_down(Point::new(0.0, 0.0)), Persisted::Written);
        s.pointer_up(Point::new(0.0, 0.0));
        s.pointer_move(Point::new(10.0, 10.0));
        assert!(s.measurement().preview_segment().is_some());
        s.pointer_down(Point::new(30.0, 40.0));
        let d = s.measurement().distance().unwrap();
        assert_eq!(d.pixels, 50.0);
        assert!((d.millimeters - 9.0).abs() < 1e-9);
        assert_eq!(stored(&s).endpoints.len(), 2);

        s.pointer_down(Point::new(200.0, 200.0));
        assert_eq!(s.measurement().endpoints().len(), 2);
    }

    #[test]
    fn endpoint_drag_writes_on_release() {
        let mut s = session(&["A"]);
        s.set_mode(Mode::Measuring);
        s.pointer_down(Point::new(0.0, 0.0));
        s.pointer_down(Point::new(30.0, 0.0));
        let writes = s.store().writes();
        assert_eq!(s.pointer_down(Point::new(31.0, 1.0)), Persisted::Skipped);
        assert!(s.has_active_gesture());
        s.pointer_move(Point::new(31.0, 21.0));
        assert_eq!(s.store().writes(), writes);
        assert_eq!(s.pointer_up(Point::new(31.0, 41.0)), Persisted::Written);
        assert_eq!(s.measurement().endpoints()[1], Point::new(30.0, 40.0));
        assert_eq!(stored(&s).endpoints[1].y, 40);
    }

    #[test]
    fn clear_measurement_is_always_written() {
        let mut s = session(&["A"]);
        assert_eq!(s.clear_measurement(), Persisted::Written);
        assert_eq!(s.store().writes(), 1);
        assert!(stored(&s).endpoints.is_empty());
    }

    #[test]
    fn mode_switch_finalizes_active_draw() {
        let mut s = session(&["A"]);
        s.pointer_down(Point::new(10.0, 10.0));
        s.pointer_move(Point::new(60.0, 60.0));
        assert_eq!(s.set_mode(Mode::Measuring), Persisted::Written);
        assert!(!s.has_active_gesture());
        assert_eq!(s.rectangles().len(), 1);
        // The stale release belongs to the finished drag and does nothing.
        assert_eq!(s.pointer_up(Point::new(90.0, 90.0)), Persisted::Skipped);
        assert_eq!(s.rectangles().iter().next().unwrap().bounds.width, 50.0);
    }

    #[test]
    fn leaving_measure_mode_drops_preview() {
        let mut s = session(&["A"]);
        s.set_mode(Mode::Measuring);
        s.pointer_down(Point::new(0.0, 0.0));
        s.pointer_move(Point::new(40.0, 0.0));
        s.set_mode(Mode::Drawing);
        assert!(s.measurement().preview_segment().is_none());
        assert_eq!(s.set_mode(Mode::Drawing), Persisted::Skipped);
    }

    #[test]
    fn clear_all_ends_active_edit() {
        let mut s = session(&["A"]);
        drag(&mut s, Point::new(0.0, 0.0), Point::new(50.0, 50.0));
        s.pointer_down(Point::new(25.0, 25.0));
        assert!(s.has_active_gesture());
        s.clear_all();
        assert!(!s.has_active_gesture());
        s.pointer_move(Point::new(90.0, 90.0));
        assert!(s.rectangles().is_empty());
    }

    #[test]
    fn ratio_edits_persist() {
        let mut s = session(&["A"]);
        assert_eq!(s.set_pixel_mm_ratio(0.25), Persisted::Written);
        assert_eq!(s.set_pixel_mm_ratio(0.25), Persisted::Skipped);
        assert_eq!(s.set_pixel_mm_ratio(0.001), Persisted::Skipped);
        assert_eq!(stored(&s).pixel_mm_ratio, 0.25);
    }

    #[test]
    fn write_failure_is_reported_and_state_kept() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        let mut s = AnnotationSession::open(
            store,
            LabelCatalog::new(["A"]),
            false,
            &ExternalInput::default(),
        );
        let persisted = drag(&mut s, Point::new(0.0, 0.0), Point::new(30.0, 30.0));
        assert_eq!(persisted, Persisted::Failed);
        assert!(s.last_error().is_some());
        assert_eq!(s.rectangles().len(), 1);
    }

    #[test]
    fn reopening_with_same_input_is_stable() {
        let input = ExternalInput {
            rectangles: Some(vec![SavedRectangle {
                label: "A".into(),
                x: 5,
                y: 5,
                width: 40,
                height: 40,
                color: None,
                timestamp: Some("2024-05-01T10:00:00+00:00".into()),
            }]),
            ..ExternalInput::default()
        };
        let catalog = LabelCatalog::new(["A", "B"]);
        let first = AnnotationSession::open(MemoryStore::new(), catalog.clone(), false, &input);
        let snap1 = first.snapshot();
        let second = AnnotationSession::open(first.into_store(), catalog, false, &input);
        assert_eq!(second.snapshot(), snap1);
        assert_eq!(second.catalog().available(), ["B"]);
    }

    #[test]
    fn reopening_with_unstamped_input_keeps_first_timestamp() {
        let input = ExternalInput {
            rectangles: Some(vec![SavedRectangle {
                label: "A".into(),
                x: 5,
                y: 5,
                width: 40,
                height: 40,
                color: None,
                timestamp: None,
            }]),
            ..ExternalInput::default()
        };
        let catalog = LabelCatalog::new(["A", "B"]);
        let first = AnnotationSession::open(MemoryStore::new(), catalog.clone(), false, &input);
        let snap1 = first.snapshot();
        let second = AnnotationSession::open(first.into_store(), catalog, false, &input);
        assert_eq!(second.snapshot(), snap1);
    }

    #[test]
    fn oversized_cached_coordinates_open_empty() {
        let store = MemoryStore::with_raw(
            r#"{"rectangles":[{"label":"A","x":9e18,"y":0,"width":9e18,"height":10}]}"#,
        );
        let s = AnnotationSession::open(store, LabelCatalog::new(["A"]), false, &ExternalInput::default());
        assert!(s.rectangles().is_empty());
        assert_eq!(s.catalog().selected(), Some("A"));
    }
}
