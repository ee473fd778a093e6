//! Render-ready overlay shapes kept apart from the annotation data.
//!
//! The scene maps each rectangle id to its drawn handles and is brought up to
//! date by [`Scene::sync`] after every mutation. Text is measured synchronously
//! through [`TextMeasure`] and cached per label.

use std::collections::HashMap;

use crate::geometry::{Bounds, Point};
use crate::palette::{self, Rgb};
use crate::rectangle::{RectId, Rectangle};
use crate::session::AnnotationSession;
use crate::store::SnapshotStore;

pub const LABEL_FONT_SIZE: f32 = 12.0;
pub const DELETE_FONT_SIZE: f32 = 14.0;
pub const ENDPOINT_HALF_SIZE: f32 = 8.0;
pub const ENDPOINT_STROKE: f32 = 3.0;
pub const RECT_STROKE: f32 = 2.0;
pub const SEGMENT_STROKE: f32 = 2.0;
pub const DASH: f32 = 5.0;

const CHIP_PAD_X: f32 = 10.0;
const CHIP_PAD_Y: f32 = 4.0;
const LABEL_OFFSET: f32 = 5.0;

/// Synchronous text layout provided by the rendering surface.
pub trait TextMeasure {
    /// Width and height of `text` laid out on one line.
    fn measure(&self, text: &str, font_size: f32) -> (f32, f32);
}

/// Fixed-width guess for surfaces that cannot lay out text.
#[derive(Clone, Copy, Debug, Default)]
pub struct EstimatedText;

impl TextMeasure for EstimatedText {
    #[allow(clippy::cast_precision_loss)]
    fn measure(&self, text: &str, _font_size: f32) -> (f32, f32) {
        (text.chars().count() as f32 * 8.0, 14.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RectVisual {
    pub outline: Bounds,
    pub stroke: Rgb,
    pub label: String,
    /// Top-left of the label text.
    pub label_pos: Point,
    /// Dark background behind the label.
    pub chip: Bounds,
    /// `None` while the rectangle is still being drawn.
    pub delete_mark: Option<Point>,
    pub delete_color: Rgb,
}

impl RectVisual {
    fn build(rect: &Rectangle, text_size: (f32, f32), is_draft: bool) -> Self {
        let b = rect.bounds;
        let stroke = palette::resolve(&rect.color, &rect.label);
        let (tw, th) = text_size;
        let baseline = b.y - LABEL_OFFSET;
        let chip = Bounds::new(b.x, baseline - th, tw + CHIP_PAD_X, th + CHIP_PAD_Y);
        Self {
            outline: b,
            stroke,
            label: rect.label.clone(),
            label_pos: Point::new(b.x + LABEL_OFFSET, chip.y + CHIP_PAD_Y / 2.0),
            chip,
            delete_mark: (!is_draft).then(|| b.delete_mark()),
            delete_color: stroke.inverse(),
        }
    }

    fn text_size(&self) -> (f32, f32) {
        (self.chip.width - CHIP_PAD_X, self.chip.height - CHIP_PAD_Y)
    }
}

/// How many handles the last sync touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    rects: HashMap<RectId, RectVisual>,
    order: Vec<RectId>,
    pub endpoints: Vec<Point>,
    pub segment: Option<(Point, Point)>,
    pub preview: Option<(Point, Point)>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rectangle visuals in paint order (insertion order, draft last).
    pub fn rects(&self) -> impl Iterator<Item = (RectId, &RectVisual)> {
        self.order
            .iter()
            .filter_map(|id| self.rects.get(id).map(|v| (*id, v)))
    }

    pub fn get(&self, id: RectId) -> Option<&RectVisual> {
        self.rects.get(&id)
    }

    pub fn sync<S: SnapshotStore>(
        &mut self,
        session: &AnnotationSession<S>,
        text: &dyn TextMeasure,
    ) -> SyncStats {
        let model = session.rectangles();
        let live = model
            .iter()
            .map(|r| (r, false))
            .chain(model.draft().map(|r| (r, true)));

        let mut stats = SyncStats::default();
        let mut order = Vec::with_capacity(model.len() + 1);
        for (rect, is_draft) in live {
            order.push(rect.id);
            let cached = self
                .rects
                .get(&rect.id)
                .filter(|v| v.label == rect.label)
                .map(RectVisual::text_size);
            let size = cached.unwrap_or_else(|| text.measure(&rect.label, LABEL_FONT_SIZE));
            let visual = RectVisual::build(rect, size, is_draft);
            match self.rects.insert(rect.id, visual.clone()) {
                None => stats.added += 1,
                Some(old) if old != visual => stats.updated += 1,
                Some(_) => {}
            }
        }

        let before = self.rects.len();
        self.rects.retain(|id, _| order.contains(id));
        stats.removed = before - self.rects.len();
        self.order = order;

        let measurement = session.measurement();
        self.endpoints = measurement.endpoints().to_vec();
        self.segment = measurement.segment();
        self.preview = measurement.preview_segment();
        stats
    }
}
