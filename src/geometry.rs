//! Pure hit-testing helpers in image-pixel space.

use serde::{Deserialize, Serialize};

/// Distance from a corner inside which a press grabs a resize handle.
pub const EDGE_THRESHOLD: f32 = 10.0;

/// Radius around an endpoint cross that counts as grabbing it.
pub const ENDPOINT_HANDLE_RADIUS: f32 = 8.0;

/// Offset of the delete mark from the rectangle's top-right corner.
pub const DELETE_MARK_INSET: f32 = 8.0;

/// Radius of the delete mark's clickable area.
pub const DELETE_MARK_RADIUS: f32 = 7.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, delta: Delta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
        }
    }

    /// Displacement from `self` to `other`.
    pub fn delta_to(self, other: Point) -> Delta {
        Delta {
            dx: other.x - self.x,
            dy: other.y - self.y,
        }
    }

    /// Euclidean distance, computed in f64 so integer inputs give exact results.
    pub fn distance(self, other: Point) -> f64 {
        let dx = f64::from(other.x) - f64::from(self.x);
        let dy = f64::from(other.y) - f64::from(self.y);
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Delta {
    pub dx: f32,
    pub dy: f32,
}

/// Axis-aligned box with its origin at the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalized box spanned by two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Inclusive on every edge.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn corner(&self, corner: Corner) -> Point {
        match corner {
            Corner::NorthWest => Point::new(self.x, self.y),
            Corner::NorthEast => Point::new(self.right(), self.y),
            Corner::SouthWest => Point::new(self.x, self.bottom()),
            Corner::SouthEast => Point::new(self.right(), self.bottom()),
        }
    }

    pub fn translated(&self, delta: Delta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
            ..*self
        }
    }

    /// Center of the delete mark drawn inside the top-right corner.
    pub fn delete_mark(&self) -> Point {
        Point::new(self.right() - DELETE_MARK_INSET, self.y + DELETE_MARK_INSET)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Corner {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Corner {
    pub fn opposite(self) -> Self {
        match self {
            Self::NorthWest => Self::SouthEast,
            Self::NorthEast => Self::SouthWest,
            Self::SouthWest => Self::NorthEast,
            Self::SouthEast => Self::NorthWest,
        }
    }
}

/// What a press on an existing rectangle does once the pointer starts moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(Corner),
}

/// Picks the drag mode for a press at `p` on `bounds`.
///
/// Corners are checked in the order se, sw, ne, nw so that overlapping
/// threshold zones on small rectangles resolve the same way every time.
pub fn drag_mode(bounds: &Bounds, p: Point) -> DragMode {
    let near_left = p.x < bounds.x + EDGE_THRESHOLD;
    let near_right = p.x > bounds.right() - EDGE_THRESHOLD;
    let near_top = p.y < bounds.y + EDGE_THRESHOLD;
    let near_bottom = p.y > bounds.bottom() - EDGE_THRESHOLD;

    if near_right && near_bottom {
        DragMode::Resize(Corner::SouthEast)
    } else if near_left && near_bottom {
        DragMode::Resize(Corner::SouthWest)
    } else if near_right && near_top {
        DragMode::Resize(Corner::NorthEast)
    } else if near_left && near_top {
        DragMode::Resize(Corner::NorthWest)
    } else {
        DragMode::Move
    }
}

/// First box (in iteration order) containing `p`.
pub fn first_hit<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a T>,
    bounds: impl Fn(&T) -> Bounds,
    p: Point,
) -> Option<&'a T> {
    items.into_iter().find(|item| bounds(item).contains(p))
}

pub fn within(p: Point, center: Point, radius: f32) -> bool {
    p.distance(center) <= f64::from(radius)
}
