use crate::{Attachment, Skeleton};

/// World-space polygon of one bounding-box attachment.
#[derive(Clone, Debug)]
pub struct BoundsPolygon {
    pub slot_index: usize,
    pub attachment_name: String,
    /// `(x, y)` pairs.
    pub vertices: Vec<f32>,
}

impl BoundsPolygon {
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        let vertices = &self.vertices;
        let count = vertices.len() / 2;
        if count < 3 {
            return false;
        }

        let mut inside = false;
        let mut prev = count - 1;
        for i in 0..count {
            let vx = vertices[i * 2];
            let vy = vertices[i * 2 + 1];
            let px = vertices[prev * 2];
            let py = vertices[prev * 2 + 1];
            if (vy < y && py >= y) || (py < y && vy >= y) {
                if vx + (y - vy) / (py - vy) * (px - vx) < x {
                    inside = !inside;
                }
            }
            prev = i;
        }
        inside
    }

    pub fn intersects_segment(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let vertices = &self.vertices;
        let count = vertices.len() / 2;
        if count < 2 {
            return false;
        }

        let width = x2 - x1;
        let height = y2 - y1;
        let det1 = x1 * y2 - y1 * x2;

        let mut bx = vertices[count * 2 - 2];
        let mut by = vertices[count * 2 - 1];
        for i in 0..count {
            let vx = vertices[i * 2];
            let vy = vertices[i * 2 + 1];
            let det2 = bx * vy - by * vx;
            let seg_width = bx - vx;
            let seg_height = by - vy;
            let det3 = width * seg_height - height * seg_width;
            let x = (det1 * seg_width - width * det2) / det3;
            if ((x >= bx && x <= vx) || (x >= vx && x <= bx))
                && ((x >= x1 && x <= x2) || (x >= x2 && x <= x1))
            {
                let y = (det1 * seg_height - height * det2) / det3;
                if ((y >= by && y <= vy) || (y >= vy && y <= by))
                    && ((y >= y1 && y <= y2) || (y >= y2 && y <= y1))
                {
                    return true;
                }
            }
            bx = vx;
            by = vy;
        }
        false
    }
}

/// Axis-aligned bounds plus per-attachment polygons for hit-testing a posed
/// skeleton's bounding boxes.
#[derive(Clone, Debug, Default)]
pub struct SkeletonBounds {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
    pub polygons: Vec<BoundsPolygon>,
}

impl SkeletonBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects world-space polygons from every slot showing a bounding-box
    /// attachment. Call after `update_world_transform`.
    pub fn update(&mut self, skeleton: &Skeleton, update_aabb: bool) {
        self.polygons.clear();
        self.min_x = f32::MAX;
        self.min_y = f32::MAX;
        self.max_x = f32::MIN;
        self.max_y = f32::MIN;

        for slot_index in 0..skeleton.slots.len() {
            let Some(Attachment::BoundingBox(bounding_box)) = skeleton.slot_attachment(slot_index)
            else {
                continue;
            };

            let mut vertices = vec![0.0; bounding_box.vertex_data.world_vertices_count * 2];
            let count = vertices.len();
            skeleton.compute_vertex_world(
                &bounding_box.vertex_data,
                slot_index,
                0,
                count,
                &mut vertices,
                0,
            );

            if update_aabb {
                for point in vertices.chunks_exact(2) {
                    self.min_x = self.min_x.min(point[0]);
                    self.min_y = self.min_y.min(point[1]);
                    self.max_x = self.max_x.max(point[0]);
                    self.max_y = self.max_y.max(point[1]);
                }
            }

            self.polygons.push(BoundsPolygon {
                slot_index,
                attachment_name: bounding_box.name.clone(),
                vertices,
            });
        }
    }

    pub fn min(&self) -> (f32, f32) {
        (self.min_x, self.min_y)
    }

    pub fn max(&self) -> (f32, f32) {
        (self.max_x, self.max_y)
    }

    pub fn aabb_contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn aabb_intersects_segment(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        if (x1 <= self.min_x && x2 <= self.min_x)
            || (y1 <= self.min_y && y2 <= self.min_y)
            || (x1 >= self.max_x && x2 >= self.max_x)
            || (y1 >= self.max_y && y2 >= self.max_y)
        {
            return false;
        }

        let m = (y2 - y1) / (x2 - x1);
        let y = m * (self.min_x - x1) + y1;
        if y > self.min_y && y < self.max_y {
            return true;
        }
        let y = m * (self.max_x - x1) + y1;
        if y > self.min_y && y < self.max_y {
            return true;
        }
        let x = (self.min_y - y1) / m + x1;
        if x > self.min_x && x < self.max_x {
            return true;
        }
        let x = (self.max_y - y1) / m + x1;
        if x > self.min_x && x < self.max_x {
            return true;
        }
        false
    }

    pub fn aabb_intersects_bounds(&self, other: &SkeletonBounds) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// The first bounding-box polygon containing the point, if any.
    pub fn contains_point(&self, x: f32, y: f32) -> Option<&BoundsPolygon> {
        self.polygons.iter().find(|p| p.contains_point(x, y))
    }

    /// The first bounding-box polygon intersecting the segment, if any.
    pub fn intersects_segment(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<&BoundsPolygon> {
        self.polygons
            .iter()
            .find(|p| p.intersects_segment(x1, y1, x2, y2))
    }

    /// The polygon computed for a given bounding-box attachment, if present.
    pub fn polygon(&self, slot_index: usize, attachment_name: &str) -> Option<&BoundsPolygon> {
        self.polygons
            .iter()
            .find(|p| p.slot_index == slot_index && p.attachment_name == attachment_name)
    }
}
