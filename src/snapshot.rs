//! The serialized annotation state shared with the host.

use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::{Bounds, Point};
use crate::measurement::{self, MeasurementModel, DEFAULT_PIXEL_MM_RATIO};
use crate::palette;
use crate::rectangle::{self, Rectangle, RectangleModel};

/// Key the snapshot lives under in the shared store.
pub const STORE_KEY: &str = "tn_annotations";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub rectangles: Vec<SavedRectangle>,
    /// Zero or two entries.
    #[serde(default)]
    pub endpoints: Vec<SavedEndpoint>,
    #[serde(default = "default_ratio")]
    pub pixel_mm_ratio: f64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            rectangles: Vec::new(),
            endpoints: Vec::new(),
            pixel_mm_ratio: DEFAULT_PIXEL_MM_RATIO,
        }
    }
}

fn default_ratio() -> f64 {
    DEFAULT_PIXEL_MM_RATIO
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedRectangle {
    pub label: String,
    #[serde(deserialize_with = "rounded")]
    pub x: i64,
    #[serde(deserialize_with = "rounded")]
    pub y: i64,
    #[serde(deserialize_with = "rounded")]
    pub width: i64,
    #[serde(deserialize_with = "rounded")]
    pub height: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEndpoint {
    #[serde(deserialize_with = "rounded")]
    pub x: i64,
    #[serde(deserialize_with = "rounded")]
    pub y: i64,
}

const MIN_COORD: f64 = i32::MIN as f64;
const MAX_COORD: f64 = i32::MAX as f64;

/// Accepts integer or fractional JSON numbers and rounds to the nearest pixel.
fn rounded<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?.round();
    if !(MIN_COORD..=MAX_COORD).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "coordinate out of range: {value}"
        )));
    }
    Ok(round(value))
}

#[allow(clippy::cast_possible_truncation)]
fn round(v: f64) -> i64 {
    v.round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn to_f32(v: i64) -> f32 {
    v as f32
}

impl SavedRectangle {
    pub fn from_rectangle(rect: &Rectangle) -> Self {
        let b = rect.bounds;
        Self {
            label: rect.label.clone(),
            x: round(f64::from(b.x)),
            y: round(f64::from(b.y)),
            width: round(f64::from(b.width)),
            height: round(f64::from(b.height)),
            color: Some(rect.color.clone()),
            timestamp: Some(rect.timestamp.clone()),
        }
    }

    /// Builds a live rectangle with a fresh id, filling in the label color and
    /// the current time when they were not saved.
    pub fn to_rectangle(&self) -> Rectangle {
        let origin = Point::new(to_f32(self.x), to_f32(self.y));
        let far = Point::new(
            to_f32(self.x.saturating_add(self.width)),
            to_f32(self.y.saturating_add(self.height)),
        );
        let mut rect = Rectangle::new(self.label.clone(), Bounds::from_corners(origin, far));
        if let Some(color) = self.color.as_ref().filter(|c| palette::Rgb::from_hex(c).is_some()) {
            rect = rect.with_color(color.clone());
        }
        rect.with_timestamp(
            self.timestamp
                .clone()
                .unwrap_or_else(rectangle::now_rfc3339),
        )
    }
}

impl SavedEndpoint {
    pub fn from_point(p: Point) -> Self {
        Self {
            x: round(f64::from(p.x)),
            y: round(f64::from(p.y)),
        }
    }

    pub fn to_point(self) -> Point {
        Point::new(to_f32(self.x), to_f32(self.y))
    }
}

impl Snapshot {
    /// Serializable view of the models. A half-placed measurement is left out.
    pub fn capture(rects: &RectangleModel, measurement: &MeasurementModel) -> Self {
        let endpoints = match measurement.endpoints() {
            pair @ [_, _] => pair.iter().copied().map(SavedEndpoint::from_point).collect(),
            _ => Vec::new(),
        };
        Self {
            rectangles: rects.iter().map(SavedRectangle::from_rectangle).collect(),
            endpoints,
            pixel_mm_ratio: measurement.pixel_mm_ratio(),
        }
    }

    pub fn endpoint_points(&self) -> Vec<Point> {
        self.endpoints.iter().map(|e| e.to_point()).collect()
    }

    /// Repairs what a hand-edited or older snapshot may get wrong: duplicate
    /// labels (first wins), endpoint lists that are not a pair, bad ratios.
    pub fn normalized(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.rectangles.retain(|r| {
            let fresh = seen.insert(r.label.clone());
            if !fresh {
                tracing::warn!(label = %r.label, "dropping duplicate label from snapshot");
            }
            fresh
        });
        if !matches!(self.endpoints.len(), 0 | 2) {
            tracing::warn!(count = self.endpoints.len(), "dropping incomplete endpoint list");
            self.endpoints.clear();
        }
        if !measurement::is_valid_ratio(self.pixel_mm_ratio) {
            tracing::warn!(ratio = self.pixel_mm_ratio, "replacing invalid pixel/mm ratio");
            self.pixel_mm_ratio = DEFAULT_PIXEL_MM_RATIO;
        }
        self
    }
}
