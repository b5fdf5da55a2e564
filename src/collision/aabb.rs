use crate::math::Vec2;

/// An axis-aligned bounding box defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    /// Creates an AABB, reordering the corners if needed.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        AABB {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Overlap test. Boxes that only share an edge count as overlapping.
    pub fn overlaps(&self, other: &AABB) -> bool {
        !(self.max.x < other.min.x
            || self.min.x > other.max.x
            || self.max.y < other.min.y
            || self.min.y > other.max.y)
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Smallest box containing both.
    pub fn combine(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows this box to contain `other`.
    pub fn merge(&mut self, other: &AABB) {
        *self = self.combine(other);
    }

    /// Perimeter, the tree's surface-area proxy.
    pub fn perimeter(&self) -> f64 {
        2.0 * ((self.max.x - self.min.x) + (self.max.y - self.min.y))
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Box enlarged by `margin` on every side.
    pub fn fatten(&self, margin: f64) -> AABB {
        let m = Vec2::new(margin, margin);
        AABB {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Box stretched along `d`: only the side the displacement points to moves.
    pub fn extrude(&self, d: Vec2) -> AABB {
        let mut out = *self;
        if d.x < 0.0 {
            out.min.x += d.x;
        } else {
            out.max.x += d.x;
        }
        if d.y < 0.0 {
            out.min.y += d.y;
        } else {
            out.max.y += d.y;
        }
        out
    }

    /// Creates an AABB that encompasses a set of points.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = AABB {
            min: *first,
            max: *first,
        };
        for point in rest {
            aabb.min = aabb.min.min(*point);
            aabb.max = aabb.max.max(*point);
        }
        Some(aabb)
    }
}
