//! Labeled bounding boxes and the mutations pointer gestures apply to them.

use std::fmt;

use uuid::Uuid;

use crate::geometry::{self, Bounds, Corner, Delta, DragMode, Point, DELETE_MARK_RADIUS};
use crate::palette;

/// Rectangles narrower or shorter than this at the end of a draw are dropped.
pub const MIN_SIZE: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RectId(Uuid);

impl RectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rect_{}", self.0.simple())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rectangle {
    pub id: RectId,
    pub bounds: Bounds,
    pub label: String,
    /// `#RRGGBB`
    pub color: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl Rectangle {
    pub fn new(label: impl Into<String>, bounds: Bounds) -> Self {
        let label = label.into();
        Self {
            id: RectId::new(),
            bounds,
            color: palette::color_for_label(&label).to_string(),
            label,
            timestamp: now_rfc3339(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn is_undersized(&self) -> bool {
        self.bounds.width < MIN_SIZE || self.bounds.height < MIN_SIZE
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Outcome of releasing the pointer after drawing a new rectangle.
#[derive(Clone, Debug, PartialEq)]
pub enum Finalized {
    Committed(RectId),
    /// Too small to be intentional; nothing was kept.
    Discarded,
    NoDraft,
}

/// Committed rectangles in insertion order plus at most one rectangle being drawn.
///
/// The draft never counts toward used labels and never reaches the store.
#[derive(Clone, Debug, Default)]
pub struct RectangleModel {
    rects: Vec<Rectangle>,
    draft: Option<Rectangle>,
}

impl RectangleModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model from already-validated rectangles, dropping duplicate labels.
    pub fn from_rectangles(rects: impl IntoIterator<Item = Rectangle>) -> Self {
        let mut model = Self::new();
        for rect in rects {
            if !model.insert(rect.clone()) {
                tracing::warn!(label = %rect.label, "dropping rectangle with duplicate label");
            }
        }
        model
    }

    /// Adds a committed rectangle unless its label is already taken.
    pub fn insert(&mut self, rect: Rectangle) -> bool {
        if self.contains_label(&rect.label) {
            return false;
        }
        self.rects.push(rect);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rectangle> {
        self.rects.iter()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn get(&self, id: RectId) -> Option<&Rectangle> {
        self.rects.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: RectId) -> Option<&mut Rectangle> {
        self.rects.iter_mut().find(|r| r.id == id)
    }

    pub fn draft(&self) -> Option<&Rectangle> {
        self.draft.as_ref()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.rects.iter().any(|r| r.label == label)
    }

    pub fn used_labels(&self) -> impl Iterator<Item = &str> {
        self.rects.iter().map(|r| r.label.as_str())
    }

    /// First committed rectangle containing `p`. Overlaps resolve to the
    /// earliest inserted one, not the one painted on top.
    pub fn hit_test(&self, p: Point) -> Option<&Rectangle> {
        geometry::first_hit(self.rects.iter(), |r| r.bounds, p)
    }

    /// Rectangle whose delete mark sits under `p`.
    pub fn hit_delete_mark(&self, p: Point) -> Option<RectId> {
        self.rects
            .iter()
            .find(|r| geometry::within(p, r.bounds.delete_mark(), DELETE_MARK_RADIUS))
            .map(|r| r.id)
    }

    /// Starts drawing a zero-sized rectangle at `p`.
    ///
    /// Returns `None` without touching the model when no label is available or
    /// the label is already in use.
    pub fn begin_create(&mut self, p: Point, label: Option<&str>) -> Option<RectId> {
        let label = label?;
        if self.contains_label(label) {
            return None;
        }
        let rect = Rectangle::new(label, Bounds::new(p.x, p.y, 0.0, 0.0));
        let id = rect.id;
        self.draft = Some(rect);
        Some(id)
    }

    /// Stretches the draft between the press point and the pointer.
    pub fn update_create(&mut self, anchor: Point, current: Point) {
        if let Some(draft) = self.draft.as_mut() {
            draft.bounds = Bounds::from_corners(anchor, current);
        }
    }

    /// Applies a move or resize computed from the geometry captured at drag start.
    pub fn update_edit(&mut self, id: RectId, mode: DragMode, start: Bounds, delta: Delta) {
        let Some(rect) = self.get_mut(id) else {
            return;
        };
        rect.bounds = match mode {
            DragMode::Move => start.translated(delta),
            DragMode::Resize(corner) => resized(start, corner, delta),
        };
    }

    /// Commits the draft, or drops it if it is smaller than [`MIN_SIZE`].
    pub fn finalize(&mut self) -> Finalized {
        let Some(draft) = self.draft.take() else {
            return Finalized::NoDraft;
        };
        if draft.is_undersized() || self.contains_label(&draft.label) {
            tracing::debug!(
                label = %draft.label,
                width = draft.bounds.width,
                height = draft.bounds.height,
                "discarding undersized rectangle"
            );
            return Finalized::Discarded;
        }
        let id = draft.id;
        self.rects.push(draft);
        Finalized::Committed(id)
    }

    /// Drops the draft without committing it.
    pub fn cancel_create(&mut self) -> bool {
        self.draft.take().is_some()
    }

    pub fn delete(&mut self, id: RectId) -> Option<Rectangle> {
        let index = self.rects.iter().position(|r| r.id == id)?;
        Some(self.rects.remove(index))
    }

    /// Removes every rectangle, including a draft. Returns how many were committed.
    pub fn clear_all(&mut self) -> usize {
        self.draft = None;
        let n = self.rects.len();
        self.rects.clear();
        n
    }
}

/// Bounds after dragging `corner` of `start` by `delta`.
///
/// The opposite corner stays fixed and the box renormalizes if the pointer
/// crosses it. Each side is held at [`MIN_SIZE`] so a committed rectangle can
/// never be shrunk out of existence.
pub fn resized(start: Bounds, corner: Corner, delta: Delta) -> Bounds {
    let anchor = start.corner(corner.opposite());
    let moving = start.corner(corner).offset(delta);
    let mut b = Bounds::from_corners(anchor, moving);
    if b.width < MIN_SIZE {
        b.width = MIN_SIZE;
        b.x = if moving.x >= anchor.x { anchor.x } else { anchor.x - MIN_SIZE };
    }
    if b.height < MIN_SIZE {
        b.height = MIN_SIZE;
        b.y = if moving.y >= anchor.y { anchor.y } else { anchor.y - MIN_SIZE };
    }
    b
}
