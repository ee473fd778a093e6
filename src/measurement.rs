//! Two-endpoint TN measurement with pixel → millimeter conversion.

use crate::geometry::{self, Delta, Point, ENDPOINT_HANDLE_RADIUS};

pub const DEFAULT_PIXEL_MM_RATIO: f64 = 0.18;
pub const MIN_PIXEL_MM_RATIO: f64 = 0.01;
pub const PIXEL_MM_RATIO_STEP: f64 = 0.01;

pub fn is_valid_ratio(ratio: f64) -> bool {
    ratio.is_finite() && ratio >= MIN_PIXEL_MM_RATIO
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Distance {
    pub pixels: f64,
    pub millimeters: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasurementState {
    Empty,
    One,
    Complete,
}

impl MeasurementState {
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Empty => "Click to place first endpoint",
            Self::One => "Click to place second endpoint",
            Self::Complete => "TN measurement complete",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Placed(usize),
    /// The press landed on an existing endpoint; it starts a drag instead.
    OnHandle(usize),
    Full,
}

#[derive(Clone, Debug)]
pub struct MeasurementModel {
    endpoints: Vec<Point>,
    preview: Option<Point>,
    pixel_mm_ratio: f64,
    last_pixels: Option<f64>,
}

impl Default for MeasurementModel {
    fn default() -> Self {
        Self::new(DEFAULT_PIXEL_MM_RATIO)
    }
}

impl MeasurementModel {
    pub fn new(pixel_mm_ratio: f64) -> Self {
        Self {
            endpoints: Vec::with_capacity(2),
            preview: None,
            pixel_mm_ratio: if is_valid_ratio(pixel_mm_ratio) {
                pixel_mm_ratio
            } else {
                DEFAULT_PIXEL_MM_RATIO
            },
            last_pixels: None,
        }
    }

    /// Seeds the model. Anything other than zero or two endpoints is ignored.
    pub fn with_endpoints(mut self, endpoints: &[Point]) -> Self {
        if let [a, b] = endpoints {
            self.endpoints = vec![*a, *b];
            self.remeasure();
        } else if !endpoints.is_empty() {
            tracing::warn!(count = endpoints.len(), "ignoring incomplete endpoint list");
        }
        self
    }

    pub fn endpoints(&self) -> &[Point] {
        &self.endpoints
    }

    pub fn state(&self) -> MeasurementState {
        match self.endpoints.len() {
            0 => MeasurementState::Empty,
            1 => MeasurementState::One,
            _ => MeasurementState::Complete,
        }
    }

    pub fn pixel_mm_ratio(&self) -> f64 {
        self.pixel_mm_ratio
    }

    /// Index of the endpoint whose handle covers `p`.
    pub fn hit_endpoint(&self, p: Point) -> Option<usize> {
        self.endpoints
            .iter()
            .position(|e| geometry::within(p, *e, ENDPOINT_HANDLE_RADIUS))
    }

    pub fn place_endpoint(&mut self, p: Point) -> Placement {
        if let Some(index) = self.hit_endpoint(p) {
            return Placement::OnHandle(index);
        }
        if self.endpoints.len() >= 2 {
            return Placement::Full;
        }
        self.endpoints.push(p);
        if self.endpoints.len() == 2 {
            self.preview = None;
            self.remeasure();
        }
        Placement::Placed(self.endpoints.len() - 1)
    }

    /// Moves the dashed preview segment's free end. Only valid with one endpoint.
    pub fn preview_to(&mut self, p: Point) -> bool {
        if self.endpoints.len() != 1 {
            return false;
        }
        self.preview = Some(p);
        true
    }

    pub fn clear_preview(&mut self) {
        self.preview = None;
    }

    pub fn preview_segment(&self) -> Option<(Point, Point)> {
        match (self.endpoints.as_slice(), self.preview) {
            ([first], Some(p)) => Some((*first, p)),
            _ => None,
        }
    }

    pub fn segment(&self) -> Option<(Point, Point)> {
        match self.endpoints.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }

    /// Places endpoint `index` at `start` shifted by `delta`.
    pub fn drag_endpoint(&mut self, index: usize, start: Point, delta: Delta) -> bool {
        let Some(endpoint) = self.endpoints.get_mut(index) else {
            return false;
        };
        *endpoint = start.offset(delta);
        self.remeasure();
        true
    }

    /// Removes both endpoints and any preview.
    pub fn clear(&mut self) {
        self.endpoints.clear();
        self.preview = None;
        self.last_pixels = None;
    }

    pub fn set_pixel_mm_ratio(&mut self, ratio: f64) -> bool {
        if !is_valid_ratio(ratio) {
            return false;
        }
        self.pixel_mm_ratio = ratio;
        true
    }

    pub fn distance(&self) -> Option<Distance> {
        let pixels = self.last_pixels?;
        Some(Distance {
            pixels,
            millimeters: pixels * self.pixel_mm_ratio,
        })
    }

    fn remeasure(&mut self) {
        self.last_pixels = self.segment().map(|(a, b)| a.distance(b));
    }
}
