use crate::math::{DEG_RAD, RAD_DEG, normalize_deg, wrap_pi};
use crate::{
    Attachment, PathAttachment, PositionMode, RegionAttachment, RotateMode, SkeletonData, Skin,
    SpacingMode, VertexData,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static Y_DOWN: AtomicBool = AtomicBool::new(false);

/// Selects the Y-axis convention for root bones: screen style (Y grows down)
/// or math style (Y grows up). Must be set before skeletons are created; each
/// skeleton captures the flag at construction.
pub fn set_y_down(y_down: bool) {
    Y_DOWN.store(y_down, Ordering::Relaxed);
}

pub fn is_y_down() -> bool {
    Y_DOWN.load(Ordering::Relaxed)
}

const EPSILON: f32 = 1.0e-4;

/// A posed bone: local transform plus the derived 2x3 world matrix
/// `(a, b, c, d, world_x, world_y)`.
#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    /// Rotation actually used by the last world-transform computation.
    /// Constraints rewrite world matrices; partial-inheritance composition
    /// reads these instead of the raw locals.
    pub applied_rotation: f32,
    pub applied_scale_x: f32,
    pub applied_scale_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
    pub world_sign_x: f32,
    pub world_sign_y: f32,

    sorted: bool,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    /// World rotation of the X axis, in degrees.
    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a) * RAD_DEG
    }

    /// World rotation of the Y axis, in degrees.
    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b) * RAD_DEG
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt() * self.world_sign_x
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt() * self.world_sign_y
    }

    /// Maps a world point into this bone's local space. Degenerate world
    /// matrices pass the translated point through unchanged.
    pub fn world_to_local(&self, world_x: f32, world_y: f32) -> (f32, f32) {
        let x = world_x - self.world_x;
        let y = world_y - self.world_y;
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= EPSILON {
            return (x, y);
        }
        let inv = 1.0 / det;
        ((x * self.d - y * self.b) * inv, (y * self.a - x * self.c) * inv)
    }

    /// Maps a bone-local point into world space.
    pub fn local_to_world(&self, local_x: f32, local_y: f32) -> (f32, f32) {
        (
            local_x * self.a + local_y * self.b + self.world_x,
            local_x * self.c + local_y * self.d + self.world_y,
        )
    }

    #[cfg(feature = "glam")]
    pub fn world_affine(&self) -> glam::Affine2 {
        glam::Affine2::from_cols_array(&[
            self.a,
            self.c,
            self.b,
            self.d,
            self.world_x,
            self.world_y,
        ])
    }

    #[cfg(feature = "glam")]
    pub fn world_position(&self) -> glam::Vec2 {
        glam::Vec2::new(self.world_x, self.world_y)
    }
}

/// A draw-order unit: current tint, current attachment (by name, resolved
/// through the active skin) and the per-frame deform offsets.
#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub color: [f32; 4],
    pub attachment: Option<String>,
    attachment_time: f32,
    /// Per-vertex deform offsets written by deform timelines; consumed by
    /// world-vertex computation when the length matches the attachment.
    pub attachment_vertices: Vec<f32>,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub(crate) fn set_attachment_name(&mut self, name: Option<String>, time: f32) {
        if self.attachment == name {
            return;
        }
        self.attachment = name;
        self.attachment_time = time;
        self.attachment_vertices.clear();
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub bend_direction: i32,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug, Default)]
pub struct PathConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    /// Target slot index.
    pub target: usize,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,

    // Sampling scratch, kept to avoid per-frame allocation.
    spaces: Vec<f32>,
    positions: Vec<f32>,
    world: Vec<f32>,
    curves: Vec<f32>,
    lengths: Vec<f32>,
    segments: [f32; 10],
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

fn attachment_in_data<'a>(
    data: &'a SkeletonData,
    skin: Option<usize>,
    slot_index: usize,
    name: &str,
) -> Option<&'a Attachment> {
    if let Some(skin) = skin.and_then(|i| data.skins.get(i)) {
        if let Some(attachment) = skin.attachment(slot_index, name) {
            return Some(attachment);
        }
    }
    data.default_skin()?.attachment(slot_index, name)
}

/// The runtime instance of a rig: posed bones, slots, draw order, live
/// constraints and the precomputed update cache.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    bone_children: Vec<Vec<usize>>,
    pub slots: Vec<Slot>,
    /// `draw_order[i]` is the slot index drawn at position `i`.
    pub draw_order: Vec<usize>,
    skin: Option<usize>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    pub color: [f32; 4],
    /// Skeleton-space translation added to attachment world vertices.
    pub x: f32,
    pub y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    y_down: bool,
    time: f32,
    update_cache: Vec<UpdateCacheItem>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                applied_rotation: bone.rotation,
                applied_scale_x: bone.scale_x,
                applied_scale_y: bone.scale_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
                world_sign_x: 1.0,
                world_sign_y: 1.0,
                sorted: false,
            })
            .collect::<Vec<_>>();

        let mut bone_children = vec![Vec::new(); bones.len()];
        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                bone_children[parent].push(index);
            }
        }

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                color: slot.color,
                attachment: None,
                attachment_time: 0.0,
                attachment_vertices: Vec::new(),
            })
            .collect::<Vec<_>>();

        let draw_order = (0..slots.len()).collect::<Vec<_>>();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, ik)| IkConstraint {
                data_index,
                bones: ik.bones.clone(),
                target: ik.target,
                mix: ik.mix,
                bend_direction: ik.bend_direction,
            })
            .collect::<Vec<_>>();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| TransformConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                rotate_mix: c.rotate_mix,
                translate_mix: c.translate_mix,
                scale_mix: c.scale_mix,
                shear_mix: c.shear_mix,
            })
            .collect::<Vec<_>>();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| PathConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                position: c.position,
                spacing: c.spacing,
                rotate_mix: c.rotate_mix,
                translate_mix: c.translate_mix,
                ..PathConstraint::default()
            })
            .collect::<Vec<_>>();

        let mut skeleton = Self {
            data,
            bones,
            bone_children,
            slots,
            draw_order,
            skin: None,
            ik_constraints,
            transform_constraints,
            path_constraints,
            color: [1.0, 1.0, 1.0, 1.0],
            x: 0.0,
            y: 0.0,
            flip_x: false,
            flip_y: false,
            y_down: is_y_down(),
            time: 0.0,
            update_cache: Vec::new(),
        };
        skeleton.set_to_setup_pose();
        skeleton.update_cache();
        skeleton
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advances the skeleton-local clock, used for attachment timing.
    pub fn update(&mut self, delta: f32) {
        if delta.is_finite() {
            self.time += delta;
        }
    }

    pub fn root_bone(&self) -> Option<&Bone> {
        self.bones.first()
    }

    // ----- name lookups -----------------------------------------------------

    pub fn find_bone_index(&self, name: &str) -> Option<usize> {
        self.data.find_bone_index(name)
    }

    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.find_bone_index(name).and_then(|i| self.bones.get(i))
    }

    pub fn find_bone_mut(&mut self, name: &str) -> Option<&mut Bone> {
        let index = self.find_bone_index(name)?;
        self.bones.get_mut(index)
    }

    pub fn find_slot_index(&self, name: &str) -> Option<usize> {
        self.data.find_slot_index(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<&Slot> {
        self.find_slot_index(name).and_then(|i| self.slots.get(i))
    }

    pub fn find_slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        let index = self.find_slot_index(name)?;
        self.slots.get_mut(index)
    }

    pub fn find_ik_constraint(&self, name: &str) -> Option<&IkConstraint> {
        let index = self
            .data
            .ik_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.ik_constraints.get(index)
    }

    pub fn find_ik_constraint_mut(&mut self, name: &str) -> Option<&mut IkConstraint> {
        let index = self
            .data
            .ik_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.ik_constraints.get_mut(index)
    }

    pub fn find_transform_constraint(&self, name: &str) -> Option<&TransformConstraint> {
        let index = self
            .data
            .transform_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.transform_constraints.get(index)
    }

    pub fn find_transform_constraint_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut TransformConstraint> {
        let index = self
            .data
            .transform_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.transform_constraints.get_mut(index)
    }

    pub fn find_path_constraint(&self, name: &str) -> Option<&PathConstraint> {
        let index = self
            .data
            .path_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.path_constraints.get(index)
    }

    pub fn find_path_constraint_mut(&mut self, name: &str) -> Option<&mut PathConstraint> {
        let index = self
            .data
            .path_constraints
            .iter()
            .position(|c| c.name == name)?;
        self.path_constraints.get_mut(index)
    }

    // ----- skin and attachments ---------------------------------------------

    pub fn skin(&self) -> Option<&Skin> {
        self.skin.and_then(|i| self.data.skins.get(i))
    }

    pub fn skin_index(&self) -> Option<usize> {
        self.skin
    }

    /// Switches the active skin. Attachments shown from the old skin are
    /// replaced by same-key attachments of the new skin; switching from no
    /// skin applies each slot's setup attachment from the new skin.
    pub fn set_skin(&mut self, skin: Option<usize>) {
        if self.skin == skin {
            return;
        }

        let data = Arc::clone(&self.data);
        let new_skin = skin.and_then(|i| data.skins.get(i));
        if let Some(new_skin) = new_skin {
            let time = self.time;
            if let Some(old_skin) = self.skin.and_then(|i| data.skins.get(i)) {
                // Replace attachments sourced from the old skin with same-key
                // attachments of the new skin.
                for entry in &old_skin.entries {
                    let Some(slot) = self.slots.get_mut(entry.slot_index) else {
                        continue;
                    };
                    if slot.attachment.as_deref() != Some(entry.name.as_str()) {
                        continue;
                    }
                    if new_skin.attachment(entry.slot_index, &entry.name).is_some() {
                        // The resolved attachment changes even though the key
                        // stays; stale deform offsets must not carry over.
                        slot.attachment_vertices.clear();
                        slot.attachment_time = time;
                    }
                }
            } else {
                for (slot_index, slot) in self.slots.iter_mut().enumerate() {
                    let Some(setup_name) = data
                        .slots
                        .get(slot_index)
                        .and_then(|s| s.attachment.as_deref())
                    else {
                        continue;
                    };
                    if new_skin.attachment(slot_index, setup_name).is_some() {
                        if slot.attachment.as_deref() == Some(setup_name) {
                            // Same key, but the resolved attachment moves from
                            // the default skin to the new one.
                            slot.attachment_vertices.clear();
                            slot.attachment_time = time;
                        } else {
                            slot.set_attachment_name(Some(setup_name.to_string()), time);
                        }
                    }
                }
            }
        }

        self.skin = skin;
        self.update_cache();
    }

    /// Returns false if no skin with the given name exists.
    pub fn set_skin_by_name(&mut self, name: &str) -> bool {
        let Some((index, _)) = self.data.find_skin(name) else {
            return false;
        };
        self.set_skin(Some(index));
        true
    }

    /// Resolves an attachment name through the active skin, falling back to
    /// the default skin.
    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&Attachment> {
        attachment_in_data(&self.data, self.skin, slot_index, name)
    }

    /// The attachment currently shown by a slot, if any.
    pub fn slot_attachment(&self, slot_index: usize) -> Option<&Attachment> {
        let slot = self.slots.get(slot_index)?;
        let name = slot.attachment.as_deref()?;
        self.attachment(slot_index, name)
    }

    /// Sets or clears a slot's attachment by name. Returns false if the slot
    /// does not exist or the attachment cannot be resolved.
    pub fn set_attachment(&mut self, slot_name: &str, attachment_name: Option<&str>) -> bool {
        let Some(slot_index) = self.find_slot_index(slot_name) else {
            return false;
        };
        let time = self.time;
        match attachment_name {
            None => {
                self.slots[slot_index].set_attachment_name(None, time);
                true
            }
            Some(name) => {
                if self.attachment(slot_index, name).is_none() {
                    return false;
                }
                self.slots[slot_index].set_attachment_name(Some(name.to_string()), time);
                true
            }
        }
    }

    pub(crate) fn set_slot_attachment(&mut self, slot_index: usize, name: Option<&str>) {
        let resolved = match name {
            Some(name) if self.attachment(slot_index, name).is_some() => Some(name.to_string()),
            _ => None,
        };
        let time = self.time;
        if let Some(slot) = self.slots.get_mut(slot_index) {
            slot.set_attachment_name(resolved, time);
        }
    }

    // ----- draw order -------------------------------------------------------

    /// Installs a draw order; `order[i]` is the slot index drawn at position `i`.
    pub fn set_draw_order(&mut self, order: &[usize]) {
        for (i, &slot_index) in order.iter().enumerate().take(self.draw_order.len()) {
            self.draw_order[i] = slot_index;
        }
    }

    /// Restores the setup (identity) draw order.
    pub fn reset_draw_order(&mut self) {
        for (i, slot) in self.draw_order.iter_mut().enumerate() {
            *slot = i;
        }
    }

    // ----- setup pose -------------------------------------------------------

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    pub fn set_bones_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        for (bone, setup) in self.bones.iter_mut().zip(data.bones.iter()) {
            bone.x = setup.x;
            bone.y = setup.y;
            bone.rotation = setup.rotation;
            bone.scale_x = setup.scale_x;
            bone.scale_y = setup.scale_y;
            bone.shear_x = setup.shear_x;
            bone.shear_y = setup.shear_y;
        }

        for (ik, setup) in self
            .ik_constraints
            .iter_mut()
            .zip(data.ik_constraints.iter())
        {
            ik.mix = setup.mix;
            ik.bend_direction = setup.bend_direction;
        }

        for (c, setup) in self
            .transform_constraints
            .iter_mut()
            .zip(data.transform_constraints.iter())
        {
            c.rotate_mix = setup.rotate_mix;
            c.translate_mix = setup.translate_mix;
            c.scale_mix = setup.scale_mix;
            c.shear_mix = setup.shear_mix;
        }

        for (c, setup) in self
            .path_constraints
            .iter_mut()
            .zip(data.path_constraints.iter())
        {
            c.position = setup.position;
            c.spacing = setup.spacing;
            c.rotate_mix = setup.rotate_mix;
            c.translate_mix = setup.translate_mix;
        }
    }

    pub fn set_slots_to_setup_pose(&mut self) {
        self.reset_draw_order();
        let data = Arc::clone(&self.data);
        for slot_index in 0..self.slots.len() {
            let setup = &data.slots[slot_index];
            self.slots[slot_index].color = setup.color;
            self.set_slot_attachment(slot_index, setup.attachment.as_deref());
        }
    }

    // ----- update cache -----------------------------------------------------

    /// Rebuilds the ordered list of bone updates and constraint applications.
    /// Called automatically on construction and skin changes; call it again
    /// if constraints or weighted path attachments are edited.
    pub fn update_cache(&mut self) {
        let data = Arc::clone(&self.data);
        let mut out = Vec::with_capacity(
            self.bones.len()
                + self.ik_constraints.len()
                + self.transform_constraints.len()
                + self.path_constraints.len(),
        );

        for bone in &mut self.bones {
            bone.sorted = false;
        }

        // IK first, shallowest chains first. The insertion sort is stable:
        // authoring order wins for equal levels.
        let levels = self
            .ik_constraints
            .iter()
            .map(|ik| {
                let mut level = 0usize;
                let mut bone = ik
                    .bones
                    .first()
                    .and_then(|&b| self.bones.get(b))
                    .and_then(|b| b.parent);
                while let Some(index) = bone {
                    level += 1;
                    bone = self.bones[index].parent;
                }
                level
            })
            .collect::<Vec<_>>();

        let mut ik_order = (0..self.ik_constraints.len()).collect::<Vec<_>>();
        for i in 1..ik_order.len() {
            let ik = ik_order[i];
            let level = levels[ik];
            let mut ii = i;
            while ii > 0 && levels[ik_order[ii - 1]] > level {
                ik_order[ii] = ik_order[ii - 1];
                ii -= 1;
            }
            ik_order[ii] = ik;
        }

        for &ik_index in &ik_order {
            let (target, first, last) = {
                let ik = &self.ik_constraints[ik_index];
                let (Some(&first), Some(&last)) = (ik.bones.first(), ik.bones.last()) else {
                    continue;
                };
                (ik.target, first, last)
            };
            sort_bone(&mut self.bones, &mut out, target);
            sort_bone(&mut self.bones, &mut out, first);
            out.push(UpdateCacheItem::Ik(ik_index));
            sort_reset(&mut self.bones, &self.bone_children, first);
            self.bones[last].sorted = true;
        }

        for path_index in 0..self.path_constraints.len() {
            let (target_slot, constrained) = {
                let c = &self.path_constraints[path_index];
                (c.target, c.bones.clone())
            };
            let Some(slot) = self.slots.get(target_slot) else {
                continue;
            };
            let slot_bone = slot.bone;

            // The target slot's attachment can change at runtime; cover every
            // path attachment the slot could show across all skins.
            if let Some(skin) = self.skin.and_then(|i| data.skins.get(i)) {
                sort_path_attachments_in_skin(
                    &mut self.bones,
                    &mut out,
                    skin,
                    target_slot,
                    slot_bone,
                );
            }
            if let Some(default_index) = data.default_skin {
                if self.skin != Some(default_index) {
                    sort_path_attachments_in_skin(
                        &mut self.bones,
                        &mut out,
                        &data.skins[default_index],
                        target_slot,
                        slot_bone,
                    );
                }
            }
            for skin in &data.skins {
                sort_path_attachments_in_skin(
                    &mut self.bones,
                    &mut out,
                    skin,
                    target_slot,
                    slot_bone,
                );
            }
            if let Some(name) = self.slots[target_slot].attachment.clone() {
                if let Some(attachment) = attachment_in_data(&data, self.skin, target_slot, &name) {
                    sort_path_attachment_bones(&mut self.bones, &mut out, attachment, slot_bone);
                }
            }

            for &bone_index in &constrained {
                sort_bone(&mut self.bones, &mut out, bone_index);
            }
            out.push(UpdateCacheItem::Path(path_index));
            for &bone_index in &constrained {
                sort_reset(&mut self.bones, &self.bone_children, bone_index);
            }
            for &bone_index in &constrained {
                self.bones[bone_index].sorted = true;
            }
        }

        for transform_index in 0..self.transform_constraints.len() {
            let (target, constrained) = {
                let c = &self.transform_constraints[transform_index];
                (c.target, c.bones.clone())
            };
            sort_bone(&mut self.bones, &mut out, target);
            for &bone_index in &constrained {
                sort_bone(&mut self.bones, &mut out, bone_index);
            }
            out.push(UpdateCacheItem::Transform(transform_index));
            for &bone_index in &constrained {
                sort_reset(&mut self.bones, &self.bone_children, bone_index);
            }
            for &bone_index in &constrained {
                self.bones[bone_index].sorted = true;
            }
        }

        for index in 0..self.bones.len() {
            sort_bone(&mut self.bones, &mut out, index);
        }

        self.update_cache = out;
    }

    #[doc(hidden)]
    pub fn debug_update_cache(&self) -> Vec<String> {
        self.update_cache
            .iter()
            .map(|item| match *item {
                UpdateCacheItem::Bone(i) => format!("bone {}", self.data.bones[i].name),
                UpdateCacheItem::Ik(i) => format!("ik {}", self.data.ik_constraints[i].name),
                UpdateCacheItem::Transform(i) => {
                    format!("transform {}", self.data.transform_constraints[i].name)
                }
                UpdateCacheItem::Path(i) => {
                    format!("path {}", self.data.path_constraints[i].name)
                }
            })
            .collect()
    }

    // ----- world transforms -------------------------------------------------

    /// Walks the update cache: bones are world-transformed and constraints run
    /// at their scheduled positions.
    pub fn update_world_transform(&mut self) {
        let cache = std::mem::take(&mut self.update_cache);
        for item in cache.iter().copied() {
            match item {
                UpdateCacheItem::Bone(index) => self.update_bone_world_transform(index),
                UpdateCacheItem::Ik(index) => self.apply_ik_constraint(index),
                UpdateCacheItem::Transform(index) => self.apply_transform_constraint(index),
                UpdateCacheItem::Path(index) => self.apply_path_constraint(index),
            }
        }
        self.update_cache = cache;
    }

    pub(crate) fn update_bone_world_transform(&mut self, index: usize) {
        let bone = &self.bones[index];
        let (x, y, rotation, scale_x, scale_y, shear_x, shear_y) = (
            bone.x,
            bone.y,
            bone.rotation,
            bone.scale_x,
            bone.scale_y,
            bone.shear_x,
            bone.shear_y,
        );
        self.update_bone_world_transform_with(
            index, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
        );
    }

    /// Computes a bone's world matrix from the given local transform,
    /// recording the applied rotation and scale.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn update_bone_world_transform_with(
        &mut self,
        index: usize,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        shear_x: f32,
        shear_y: f32,
    ) {
        let data = Arc::clone(&self.data);

        let rotation_x = (rotation + shear_x) * DEG_RAD;
        let rotation_y = (rotation + 90.0 + shear_y) * DEG_RAD;
        let mut la = rotation_x.cos() * scale_x;
        let mut lb = rotation_y.cos() * scale_y;
        let mut lc = rotation_x.sin() * scale_x;
        let mut ld = rotation_y.sin() * scale_y;

        let parent_index = self.bones[index].parent;
        let flip_x = self.flip_x;
        let flip_y = self.flip_y != self.y_down;

        let Some(parent_index) = parent_index else {
            // Root bone.
            let mut world_x = x;
            let mut world_y = y;
            if flip_x {
                world_x = -world_x;
                la = -la;
                lb = -lb;
            }
            if flip_y {
                world_y = -world_y;
                lc = -lc;
                ld = -ld;
            }
            let bone = &mut self.bones[index];
            bone.applied_rotation = rotation;
            bone.applied_scale_x = scale_x;
            bone.applied_scale_y = scale_y;
            bone.a = la;
            bone.b = lb;
            bone.c = lc;
            bone.d = ld;
            bone.world_x = world_x;
            bone.world_y = world_y;
            bone.world_sign_x = if scale_x > 0.0 { 1.0 } else { -1.0 };
            bone.world_sign_y = if scale_y > 0.0 { 1.0 } else { -1.0 };
            return;
        };

        let (mut pa, mut pb, mut pc, mut pd, parent_world_x, parent_world_y, psign_x, psign_y) = {
            let p = &self.bones[parent_index];
            (
                p.a,
                p.b,
                p.c,
                p.d,
                p.world_x,
                p.world_y,
                p.world_sign_x,
                p.world_sign_y,
            )
        };

        let world_x = pa * x + pb * y + parent_world_x;
        let world_y = pc * x + pd * y + parent_world_y;
        let world_sign_x = psign_x * if scale_x > 0.0 { 1.0 } else { -1.0 };
        let world_sign_y = psign_y * if scale_y > 0.0 { 1.0 } else { -1.0 };

        let inherit_rotation = data.bones[index].inherit_rotation;
        let inherit_scale = data.bones[index].inherit_scale;

        let mut a: f32;
        let mut b: f32;
        let mut c: f32;
        let mut d: f32;
        if inherit_rotation && inherit_scale {
            a = pa * la + pb * lc;
            b = pa * lb + pb * ld;
            c = pc * la + pd * lc;
            d = pc * lb + pd * ld;
        } else {
            if inherit_rotation {
                // Fold in rotation-only contributions from ancestors until the
                // first one that itself drops rotation inheritance.
                pa = 1.0;
                pb = 0.0;
                pc = 0.0;
                pd = 1.0;
                let mut p = Some(parent_index);
                while let Some(pi) = p {
                    let radians = self.bones[pi].applied_rotation * DEG_RAD;
                    let cosine = radians.cos();
                    let sine = radians.sin();
                    let temp = pa * cosine + pb * sine;
                    pb = pa * -sine + pb * cosine;
                    pa = temp;
                    let temp = pc * cosine + pd * sine;
                    pd = pc * -sine + pd * cosine;
                    pc = temp;

                    if !data.bones[pi].inherit_rotation {
                        break;
                    }
                    p = self.bones[pi].parent;
                }
                a = pa * la + pb * lc;
                b = pa * lb + pb * ld;
                c = pc * la + pd * lc;
                d = pc * lb + pd * ld;
            } else if inherit_scale {
                // Fold in scale-only contributions: apply each ancestor's
                // scaled basis, then cancel its rotation.
                pa = 1.0;
                pb = 0.0;
                pc = 0.0;
                pd = 1.0;
                let mut p = Some(parent_index);
                while let Some(pi) = p {
                    let mut r = self.bones[pi].rotation;
                    let psx = self.bones[pi].applied_scale_x;
                    let psy = self.bones[pi].applied_scale_y;
                    let radians = r * DEG_RAD;
                    let cosine = radians.cos();
                    let sine = radians.sin();
                    let za = cosine * psx;
                    let zb = -sine * psy;
                    let zc = sine * psx;
                    let zd = cosine * psy;
                    let temp = pa * za + pb * zc;
                    pb = pa * zb + pb * zd;
                    pa = temp;
                    let temp = pc * za + pd * zc;
                    pd = pc * zb + pd * zd;
                    pc = temp;

                    if psx < 0.0 {
                        r = -r;
                    }
                    let radians = -r * DEG_RAD;
                    let cosine = radians.cos();
                    let sine = radians.sin();
                    let temp = pa * cosine + pb * sine;
                    pb = pa * -sine + pb * cosine;
                    pa = temp;
                    let temp = pc * cosine + pd * sine;
                    pd = pc * -sine + pd * cosine;
                    pc = temp;

                    if !data.bones[pi].inherit_scale {
                        break;
                    }
                    p = self.bones[pi].parent;
                }
                a = pa * la + pb * lc;
                b = pa * lb + pb * ld;
                c = pc * la + pd * lc;
                d = pc * lb + pd * ld;
            } else {
                a = la;
                b = lb;
                c = lc;
                d = ld;
            }
            if flip_x {
                a = -a;
                b = -b;
            }
            if flip_y {
                c = -c;
                d = -d;
            }
        }

        let bone = &mut self.bones[index];
        bone.applied_rotation = rotation;
        bone.applied_scale_x = scale_x;
        bone.applied_scale_y = scale_y;
        bone.a = a;
        bone.b = b;
        bone.c = c;
        bone.d = d;
        bone.world_x = world_x;
        bone.world_y = world_y;
        bone.world_sign_x = world_sign_x;
        bone.world_sign_y = world_sign_y;
    }

    // ----- inverse kinematics -----------------------------------------------

    fn apply_ik_constraint(&mut self, index: usize) {
        let (bones, target, mix, bend_direction) = {
            let ik = &self.ik_constraints[index];
            (ik.bones.clone(), ik.target, ik.mix, ik.bend_direction)
        };
        let Some(target) = self.bones.get(target) else {
            return;
        };
        let (target_x, target_y) = (target.world_x, target.world_y);

        match bones.as_slice() {
            [bone] => self.apply_ik_one(*bone, target_x, target_y, mix),
            [parent, child] => {
                self.apply_ik_two(*parent, *child, target_x, target_y, bend_direction, mix)
            }
            _ => {}
        }
    }

    /// Aims a single bone at a world point, blending rotation by `alpha`.
    fn apply_ik_one(&mut self, bone_index: usize, target_x: f32, target_y: f32, alpha: f32) {
        let Some(parent_index) = self.bones[bone_index].parent else {
            return;
        };

        let (pa, pb, pc, pd, pwx, pwy) = {
            let p = &self.bones[parent_index];
            (p.a, p.b, p.c, p.d, p.world_x, p.world_y)
        };
        let det = pa * pd - pb * pc;
        if det.abs() <= EPSILON {
            return;
        }
        let id = 1.0 / det;

        let (x, y, rotation, scale_x, scale_y, shear_x, shear_y) = {
            let bone = &self.bones[bone_index];
            (
                bone.x,
                bone.y,
                bone.rotation,
                bone.scale_x,
                bone.scale_y,
                bone.shear_x,
                bone.shear_y,
            )
        };

        let dx = target_x - pwx;
        let dy = target_y - pwy;
        let tx = (dx * pd - dy * pb) * id - x;
        let ty = (dy * pa - dx * pc) * id - y;

        let mut rotation_ik = ty.atan2(tx) * RAD_DEG - shear_x - rotation;
        if scale_x < 0.0 {
            rotation_ik += 180.0;
        }
        rotation_ik = normalize_deg(rotation_ik);

        self.update_bone_world_transform_with(
            bone_index,
            x,
            y,
            rotation + rotation_ik * alpha,
            scale_x,
            scale_y,
            shear_x,
            shear_y,
        );
    }

    /// Drives a two-bone chain toward a world target with the given bend
    /// direction, blending both rotations by `alpha`.
    fn apply_ik_two(
        &mut self,
        parent_index: usize,
        child_index: usize,
        target_x: f32,
        target_y: f32,
        bend_direction: i32,
        alpha: f32,
    ) {
        let (cx, child_y, child_rotation, csx_signed) = {
            let child = &self.bones[child_index];
            (child.x, child.y, child.rotation, child.scale_x)
        };
        let (child_scale_y, child_shear_x, child_shear_y) = {
            let child = &self.bones[child_index];
            (child.scale_y, child.shear_x, child.shear_y)
        };
        if alpha == 0.0 {
            // The chain keeps its pose, but the child's world matrix is
            // refreshed against the parent.
            self.update_bone_world_transform_with(
                child_index,
                cx,
                child_y,
                child_rotation,
                csx_signed,
                child_scale_y,
                child_shear_x,
                child_shear_y,
            );
            return;
        }

        let Some(pp) = self.bones[parent_index].parent else {
            return;
        };
        let (px, py, parent_rotation, parent_scale_x, parent_scale_y) = {
            let parent = &self.bones[parent_index];
            (parent.x, parent.y, parent.rotation, parent.scale_x, parent.scale_y)
        };
        let (pa, pb, pc, pd, pwx, pwy) = {
            let parent = &self.bones[parent_index];
            (parent.a, parent.b, parent.c, parent.d, parent.world_x, parent.world_y)
        };

        let mut psx = parent_scale_x;
        let mut psy = parent_scale_y;
        let mut csx = csx_signed;

        // Negative setup scales reflect into 180-degree output offsets.
        let mut o1 = 0.0f32;
        let mut s2 = 1.0f32;
        if psx < 0.0 {
            psx = -psx;
            o1 = 180.0;
            s2 = -1.0;
        }
        if psy < 0.0 {
            psy = -psy;
            s2 = -s2;
        }
        let mut o2 = 0.0f32;
        if csx < 0.0 {
            csx = -csx;
            o2 = 180.0;
        }

        let uniform = (psx - psy).abs() <= EPSILON;
        let cy: f32;
        let cwx: f32;
        let cwy: f32;
        if !uniform {
            cy = 0.0;
            cwx = pa * cx + pwx;
            cwy = pc * cx + pwy;
        } else {
            cy = child_y;
            cwx = pa * cx + pb * cy + pwx;
            cwy = pc * cx + pd * cy + pwy;
        }

        let (ppa, ppb, ppc, ppd, ppwx, ppwy) = {
            let pp = &self.bones[pp];
            (pp.a, pp.b, pp.c, pp.d, pp.world_x, pp.world_y)
        };
        let det = ppa * ppd - ppb * ppc;
        if det.abs() <= EPSILON {
            return;
        }
        let id = 1.0 / det;

        let x = target_x - ppwx;
        let y = target_y - ppwy;
        let tx = (x * ppd - y * ppb) * id - px;
        let ty = (y * ppa - x * ppc) * id - py;
        let x = cwx - ppwx;
        let y = cwy - ppwy;
        let dx = (x * ppd - y * ppb) * id - px;
        let dy = (y * ppa - x * ppc) * id - py;

        let l1 = (dx * dx + dy * dy).sqrt();
        let mut l2 = self.data.bones[child_index].length * csx;
        let bend = bend_direction as f32;
        let mut a1: f32;
        let mut a2: f32;

        if uniform {
            l2 *= psx;
            let denom = 2.0 * l1 * l2;
            if denom.abs() <= EPSILON {
                return;
            }
            let cosine = ((tx * tx + ty * ty - l1 * l1 - l2 * l2) / denom).clamp(-1.0, 1.0);
            a2 = cosine.acos() * bend;
            let a = l1 + l2 * cosine;
            let b = l2 * a2.sin();
            a1 = (ty * a - tx * b).atan2(tx * a + ty * b);
        } else {
            // Non-uniform parent scale: the child's tip traces an ellipse.
            // Intersect it with the circle of radius l1 via the quadratic in
            // r; with no usable root, pick the closest ellipse extremum.
            let a = psx * l2;
            let b = psy * l2;
            let aa = a * a;
            let bb = b * b;
            let ll = l1 * l1;
            let dd = tx * tx + ty * ty;
            let ta = ty.atan2(tx);
            let c0 = bb * ll + aa * dd - aa * bb;
            let c1 = -2.0 * bb * l1;
            let c2 = bb - aa;
            let d = c1 * c1 - 4.0 * c2 * c0;

            let mut solved = false;
            a1 = 0.0;
            a2 = 0.0;
            if d >= 0.0 {
                let mut q = d.sqrt();
                if c1 < 0.0 {
                    q = -q;
                }
                q = -(c1 + q) / 2.0;
                let r0 = q / c2;
                let r1 = c0 / q;
                let r = if r0.abs() < r1.abs() { r0 } else { r1 };
                if r * r <= dd {
                    let y = (dd - r * r).sqrt() * bend;
                    a1 = ta - y.atan2(r);
                    a2 = (y / psy).atan2((r - l1) / psx);
                    solved = true;
                }
            }
            if !solved {
                let mut min_angle = 0.0f32;
                let mut min_dist = f32::MAX;
                let mut min_x = 0.0f32;
                let mut min_y = 0.0f32;
                let mut max_angle = 0.0f32;
                let mut max_dist = 0.0f32;
                let mut max_x = 0.0f32;
                let mut max_y = 0.0f32;

                let mut x = l1 + a;
                let mut dist = x * x;
                if dist > max_dist {
                    max_dist = dist;
                    max_x = x;
                }
                x = l1 - a;
                dist = x * x;
                if dist < min_dist {
                    min_angle = std::f32::consts::PI;
                    min_dist = dist;
                    min_x = x;
                }
                let angle = (-a * l1 / (aa - bb)).acos();
                x = a * angle.cos() + l1;
                let y = b * angle.sin();
                dist = x * x + y * y;
                if dist < min_dist {
                    min_angle = angle;
                    min_dist = dist;
                    min_x = x;
                    min_y = y;
                }
                if dist > max_dist {
                    max_angle = angle;
                    max_dist = dist;
                    max_x = x;
                    max_y = y;
                }
                if dd <= (min_dist + max_dist) / 2.0 {
                    a1 = ta - (min_y * bend).atan2(min_x);
                    a2 = min_angle * bend;
                } else {
                    a1 = ta - (max_y * bend).atan2(max_x);
                    a2 = max_angle * bend;
                }
            }
        }

        let os = cy.atan2(cx) * s2;
        let a1 = normalize_deg((a1 - os) * RAD_DEG + o1 - parent_rotation);
        self.update_bone_world_transform_with(
            parent_index,
            px,
            py,
            parent_rotation + a1 * alpha,
            parent_scale_x,
            parent_scale_y,
            0.0,
            0.0,
        );

        let a2 = normalize_deg(((a2 + os) * RAD_DEG - child_shear_x) * s2 + o2 - child_rotation);
        self.update_bone_world_transform_with(
            child_index,
            cx,
            cy,
            child_rotation + a2 * alpha,
            csx_signed,
            child_scale_y,
            child_shear_x,
            child_shear_y,
        );
    }

    // ----- transform constraint ---------------------------------------------

    fn apply_transform_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let (bones, target, rotate_mix, translate_mix, scale_mix, shear_mix, data_index) = {
            let c = &self.transform_constraints[index];
            (
                c.bones.clone(),
                c.target,
                c.rotate_mix,
                c.translate_mix,
                c.scale_mix,
                c.shear_mix,
                c.data_index,
            )
        };
        let setup = &data.transform_constraints[data_index];

        let (ta, tb, tc, td, offset_world_x, offset_world_y) = {
            let Some(target) = self.bones.get(target) else {
                return;
            };
            let (wx, wy) = target.local_to_world(setup.offset_x, setup.offset_y);
            (target.a, target.b, target.c, target.d, wx, wy)
        };

        for &bone_index in &bones {
            if bone_index >= self.bones.len() {
                continue;
            }

            if rotate_mix > 0.0 {
                let (a, b, c, d) = {
                    let bone = &self.bones[bone_index];
                    (bone.a, bone.b, bone.c, bone.d)
                };
                let mut r = tc.atan2(ta) - c.atan2(a) + setup.offset_rotation * DEG_RAD;
                r = wrap_pi(r) * rotate_mix;
                let cosine = r.cos();
                let sine = r.sin();
                let bone = &mut self.bones[bone_index];
                bone.a = cosine * a - sine * c;
                bone.b = cosine * b - sine * d;
                bone.c = sine * a + cosine * c;
                bone.d = sine * b + cosine * d;
            }

            if translate_mix > 0.0 {
                let bone = &mut self.bones[bone_index];
                bone.world_x += (offset_world_x - bone.world_x) * translate_mix;
                bone.world_y += (offset_world_y - bone.world_y) * translate_mix;
            }

            if scale_mix > 0.0 {
                let bone = &mut self.bones[bone_index];
                let mut bs = (bone.a * bone.a + bone.c * bone.c).sqrt();
                let mut ts = (ta * ta + tc * tc).sqrt();
                let mut s = if bs > 0.00001 {
                    (bs + (ts - bs + setup.offset_scale_x) * scale_mix) / bs
                } else {
                    0.0
                };
                bone.a *= s;
                bone.c *= s;
                bs = (bone.b * bone.b + bone.d * bone.d).sqrt();
                ts = (tb * tb + td * td).sqrt();
                s = if bs > 0.00001 {
                    (bs + (ts - bs + setup.offset_scale_y) * scale_mix) / bs
                } else {
                    0.0
                };
                bone.b *= s;
                bone.d *= s;
            }

            if shear_mix > 0.0 {
                let (a, b, c, d) = {
                    let bone = &self.bones[bone_index];
                    (bone.a, bone.b, bone.c, bone.d)
                };
                let by = d.atan2(b);
                let r = wrap_pi(td.atan2(tb) - tc.atan2(ta) - (by - c.atan2(a)));
                let r = by + (r + setup.offset_shear_y * DEG_RAD) * shear_mix;
                let s = (b * b + d * d).sqrt();
                let bone = &mut self.bones[bone_index];
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
            }
        }
    }

    // ----- path constraint --------------------------------------------------

    fn apply_path_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let mut constraint = std::mem::take(&mut self.path_constraints[index]);
        self.apply_path_constraint_inner(&data, &mut constraint);
        self.path_constraints[index] = constraint;
    }

    fn apply_path_constraint_inner(
        &mut self,
        data: &SkeletonData,
        constraint: &mut PathConstraint,
    ) {
        let translate = constraint.translate_mix > 0.0;
        let rotate = constraint.rotate_mix > 0.0;
        if !translate && !rotate {
            return;
        }

        let setup = &data.path_constraints[constraint.data_index];
        let target_slot = constraint.target;
        let attachment_name = match self.slots.get(target_slot) {
            Some(slot) => slot.attachment.clone(),
            None => return,
        };
        let Some(name) = attachment_name else {
            return;
        };
        let Some(Attachment::Path(path)) =
            attachment_in_data(data, self.skin, target_slot, &name)
        else {
            return;
        };

        let length_spacing = setup.spacing_mode == SpacingMode::Length;
        let rotate_mode = setup.rotate_mode;
        let tangents = rotate_mode == RotateMode::Tangent;
        let scale = rotate_mode == RotateMode::ChainScale;
        let bone_count = constraint.bones.len();
        if bone_count == 0 {
            return;
        }
        let spaces_count = if tangents { bone_count } else { bone_count + 1 };

        constraint.spaces.clear();
        constraint.spaces.resize(spaces_count, 0.0);
        if scale {
            constraint.lengths.clear();
            constraint.lengths.resize(bone_count, 0.0);
        }

        let spacing = constraint.spacing;
        if scale || length_spacing {
            for i in 0..spaces_count - 1 {
                let bone_index = constraint.bones[i];
                let setup_length = data.bones[bone_index].length;
                let bone = &self.bones[bone_index];
                let x = setup_length * bone.a;
                let y = setup_length * bone.c;
                let length = (x * x + y * y).sqrt();
                if scale {
                    constraint.lengths[i] = length;
                }
                constraint.spaces[i + 1] = if length_spacing {
                    (length + spacing).max(0.0)
                } else {
                    spacing
                };
            }
        } else {
            for space in constraint.spaces.iter_mut().skip(1) {
                *space = spacing;
            }
        }

        self.compute_path_positions(
            constraint,
            path,
            target_slot,
            tangents,
            setup.position_mode == PositionMode::Percent,
            setup.spacing_mode == SpacingMode::Percent,
        );
        if constraint.positions.len() < 2 {
            return;
        }

        let rotate_mix = constraint.rotate_mix;
        let translate_mix = constraint.translate_mix;
        let skeleton_x = self.x;
        let skeleton_y = self.y;

        let mut bone_x = constraint.positions[0];
        let mut bone_y = constraint.positions[1];
        let offset_rotation = setup.offset_rotation;
        let tip = scale && offset_rotation == 0.0;

        for i in 0..bone_count {
            let bone_index = constraint.bones[i];
            if bone_index >= self.bones.len() {
                continue;
            }

            {
                let bone = &mut self.bones[bone_index];
                bone.world_x += (bone_x - skeleton_x - bone.world_x) * translate_mix;
                bone.world_y += (bone_y - skeleton_y - bone.world_y) * translate_mix;
            }

            let x = constraint.positions[(i + 1) * 3];
            let y = constraint.positions[(i + 1) * 3 + 1];
            let dx = x - bone_x;
            let dy = y - bone_y;

            if scale {
                let length = constraint.lengths[i];
                if length != 0.0 {
                    let s = ((dx * dx + dy * dy).sqrt() / length - 1.0) * rotate_mix + 1.0;
                    let bone = &mut self.bones[bone_index];
                    bone.a *= s;
                    bone.c *= s;
                }
            }

            bone_x = x;
            bone_y = y;

            if rotate {
                let (a, b, c, d) = {
                    let bone = &self.bones[bone_index];
                    (bone.a, bone.b, bone.c, bone.d)
                };
                let mut r = if tangents {
                    constraint.positions[i * 3 + 2]
                } else if constraint.spaces[i + 1] == 0.0 {
                    constraint.positions[(i + 1) * 3 + 2]
                } else {
                    dy.atan2(dx)
                };
                r -= c.atan2(a) - offset_rotation * DEG_RAD;

                if tip {
                    let cosine = r.cos();
                    let sine = r.sin();
                    let length = data.bones[bone_index].length;
                    bone_x += (length * (cosine * a - sine * c) - dx) * rotate_mix;
                    bone_y += (length * (sine * a + cosine * c) - dy) * rotate_mix;
                }

                let r = wrap_pi(r) * rotate_mix;
                let cosine = r.cos();
                let sine = r.sin();
                let bone = &mut self.bones[bone_index];
                bone.a = cosine * a - sine * c;
                bone.b = cosine * b - sine * d;
                bone.c = sine * a + cosine * c;
                bone.d = sine * b + cosine * d;
            }
        }
    }

    /// Samples world-space positions (and tangent angles) along the path for
    /// each spacing value, into `constraint.positions` with stride 3.
    fn compute_path_positions(
        &self,
        constraint: &mut PathConstraint,
        path: &PathAttachment,
        slot_index: usize,
        tangents: bool,
        percent_position: bool,
        percent_spacing: bool,
    ) {
        let spaces_count = constraint.spaces.len();
        constraint.positions.clear();
        constraint.positions.resize(spaces_count * 3 + 2, 0.0);

        let closed = path.closed;
        let mut vertices_length = path.vertex_data.world_vertices_count * 2;
        if vertices_length < 6 {
            constraint.positions.clear();
            return;
        }
        let mut curve_count = vertices_length / 6;
        let mut prev_curve = PREV_NONE;
        let mut position = constraint.position;

        if !path.constant_speed {
            let lengths = &path.lengths;
            let Some(count) = curve_count.checked_sub(if closed { 1 } else { 2 }) else {
                constraint.positions.clear();
                return;
            };
            curve_count = count;
            if curve_count >= lengths.len() {
                constraint.positions.clear();
                return;
            }
            let path_length = lengths[curve_count];
            if percent_position {
                position *= path_length;
            }
            if percent_spacing {
                for space in &mut constraint.spaces {
                    *space *= path_length;
                }
            }

            constraint.world.clear();
            constraint.world.resize(8, 0.0);

            let mut curve = 0usize;
            for i in 0..spaces_count {
                let space = constraint.spaces[i];
                position += space;
                let mut p = position;

                if closed {
                    p %= path_length;
                    if p < 0.0 {
                        p += path_length;
                    }
                    curve = 0;
                } else if p < 0.0 {
                    if prev_curve != PREV_BEFORE {
                        prev_curve = PREV_BEFORE;
                        self.compute_vertex_world(
                            &path.vertex_data,
                            slot_index,
                            2,
                            4,
                            &mut constraint.world,
                            0,
                        );
                    }
                    add_before_position(&constraint.world, p, &mut constraint.positions, i);
                    continue;
                } else if p > path_length {
                    if prev_curve != PREV_AFTER {
                        prev_curve = PREV_AFTER;
                        self.compute_vertex_world(
                            &path.vertex_data,
                            slot_index,
                            vertices_length - 6,
                            4,
                            &mut constraint.world,
                            0,
                        );
                    }
                    add_after_position(
                        &constraint.world,
                        p - path_length,
                        0,
                        &mut constraint.positions,
                        i,
                    );
                    continue;
                }

                // Determine the curve containing the position.
                loop {
                    let length = lengths[curve];
                    if p > length {
                        curve += 1;
                        continue;
                    }
                    if curve == 0 {
                        p /= length;
                    } else {
                        let prev = lengths[curve - 1];
                        p = (p - prev) / (length - prev);
                    }
                    break;
                }

                if curve as i32 != prev_curve {
                    prev_curve = curve as i32;
                    if closed && curve == curve_count {
                        self.compute_vertex_world(
                            &path.vertex_data,
                            slot_index,
                            vertices_length - 4,
                            4,
                            &mut constraint.world,
                            0,
                        );
                        self.compute_vertex_world(
                            &path.vertex_data,
                            slot_index,
                            0,
                            4,
                            &mut constraint.world,
                            4,
                        );
                    } else {
                        self.compute_vertex_world(
                            &path.vertex_data,
                            slot_index,
                            curve * 6 + 2,
                            8,
                            &mut constraint.world,
                            0,
                        );
                    }
                }

                add_curve_position(
                    p,
                    &constraint.world[0..8],
                    tangents || (i > 0 && space == 0.0),
                    &mut constraint.positions,
                    i,
                );
            }
            return;
        }

        // Uniform arc-length sampling.
        if closed {
            vertices_length += 2;
            constraint.world.clear();
            constraint.world.resize(vertices_length, 0.0);
            self.compute_vertex_world(
                &path.vertex_data,
                slot_index,
                2,
                vertices_length - 4,
                &mut constraint.world,
                0,
            );
            self.compute_vertex_world(
                &path.vertex_data,
                slot_index,
                0,
                2,
                &mut constraint.world,
                vertices_length - 4,
            );
            constraint.world[vertices_length - 2] = constraint.world[0];
            constraint.world[vertices_length - 1] = constraint.world[1];
        } else {
            let Some(count) = curve_count.checked_sub(1) else {
                constraint.positions.clear();
                return;
            };
            curve_count = count;
            vertices_length -= 4;
            constraint.world.clear();
            constraint.world.resize(vertices_length, 0.0);
            self.compute_vertex_world(
                &path.vertex_data,
                slot_index,
                2,
                vertices_length,
                &mut constraint.world,
                0,
            );
        }

        constraint.curves.clear();
        constraint.curves.resize(curve_count, 0.0);
        let mut path_length = 0.0f32;
        let mut x1 = constraint.world[0];
        let mut y1 = constraint.world[1];
        let (mut cx1, mut cy1, mut cx2, mut cy2, mut x2, mut y2) =
            (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);

        {
            let world = &constraint.world;
            let mut w = 2usize;
            for i in 0..curve_count {
                cx1 = world[w];
                cy1 = world[w + 1];
                cx2 = world[w + 2];
                cy2 = world[w + 3];
                x2 = world[w + 4];
                y2 = world[w + 5];
                let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.1875;
                let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.1875;
                let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.09375;
                let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.09375;
                let mut ddfx = tmpx * 2.0 + dddfx;
                let mut ddfy = tmpy * 2.0 + dddfy;
                let mut dfx = (cx1 - x1) * 0.75 + tmpx + dddfx * 0.16666667;
                let mut dfy = (cy1 - y1) * 0.75 + tmpy + dddfy * 0.16666667;
                path_length += (dfx * dfx + dfy * dfy).sqrt();
                dfx += ddfx;
                dfy += ddfy;
                ddfx += dddfx;
                ddfy += dddfy;
                path_length += (dfx * dfx + dfy * dfy).sqrt();
                dfx += ddfx;
                dfy += ddfy;
                path_length += (dfx * dfx + dfy * dfy).sqrt();
                dfx += ddfx + dddfx;
                dfy += ddfy + dddfy;
                path_length += (dfx * dfx + dfy * dfy).sqrt();
                constraint.curves[i] = path_length;
                x1 = x2;
                y1 = y2;
                w += 6;
            }
        }

        if percent_position {
            position *= path_length;
        }
        if percent_spacing {
            for space in &mut constraint.spaces {
                *space *= path_length;
            }
        }

        let mut curve_length = 0.0f32;
        let mut curve = 0usize;
        let mut segment = 0usize;
        let mut prev_curve = PREV_NONE;

        for i in 0..spaces_count {
            let space = constraint.spaces[i];
            position += space;
            let mut p = position;

            if closed {
                p %= path_length;
                if p < 0.0 {
                    p += path_length;
                }
                curve = 0;
            } else if p < 0.0 {
                add_before_position(&constraint.world, p, &mut constraint.positions, i);
                continue;
            } else if p > path_length {
                add_after_position(
                    &constraint.world,
                    p - path_length,
                    constraint.world.len() / 2 - 2,
                    &mut constraint.positions,
                    i,
                );
                continue;
            }

            // Determine the curve containing the position.
            loop {
                let length = constraint.curves[curve];
                if p > length {
                    curve += 1;
                    continue;
                }
                if curve == 0 {
                    p /= length;
                } else {
                    let prev = constraint.curves[curve - 1];
                    p = (p - prev) / (length - prev);
                }
                break;
            }

            // Curve segment lengths.
            if curve as i32 != prev_curve {
                prev_curve = curve as i32;
                let world = &constraint.world;
                let ii = curve * 6;
                x1 = world[ii];
                y1 = world[ii + 1];
                cx1 = world[ii + 2];
                cy1 = world[ii + 3];
                cx2 = world[ii + 4];
                cy2 = world[ii + 5];
                x2 = world[ii + 6];
                y2 = world[ii + 7];
                let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
                let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
                let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
                let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
                let mut ddfx = tmpx * 2.0 + dddfx;
                let mut ddfy = tmpy * 2.0 + dddfy;
                let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.16666667;
                let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.16666667;
                curve_length = (dfx * dfx + dfy * dfy).sqrt();
                constraint.segments[0] = curve_length;
                for ii in 1..8 {
                    dfx += ddfx;
                    dfy += ddfy;
                    ddfx += dddfx;
                    ddfy += dddfy;
                    curve_length += (dfx * dfx + dfy * dfy).sqrt();
                    constraint.segments[ii] = curve_length;
                }
                dfx += ddfx;
                dfy += ddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                constraint.segments[8] = curve_length;
                dfx += ddfx + dddfx;
                dfy += ddfy + dddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                constraint.segments[9] = curve_length;
                segment = 0;
            }

            // Weight by segment length.
            p *= curve_length;
            loop {
                let length = constraint.segments[segment];
                if p > length {
                    segment += 1;
                    continue;
                }
                if segment == 0 {
                    p /= length;
                } else {
                    let prev = constraint.segments[segment - 1];
                    p = segment as f32 + (p - prev) / (length - prev);
                }
                break;
            }

            add_curve_position(
                p * 0.1,
                &[x1, y1, cx1, cy1, cx2, cy2, x2, y2],
                tangents || (i > 0 && space == 0.0),
                &mut constraint.positions,
                i,
            );
        }
    }

    // ----- world vertices ---------------------------------------------------

    /// Fills `out[offset..offset + count]` with world-space `(x, y)` pairs for
    /// the vertex attachment shown by the given slot, starting at float index
    /// `start` of the attachment's vertices. The slot's deform offsets are
    /// consumed when their length matches.
    pub fn compute_world_vertices(
        &self,
        slot_index: usize,
        start: usize,
        count: usize,
        out: &mut [f32],
        offset: usize,
    ) {
        let Some(attachment) = self.slot_attachment(slot_index) else {
            return;
        };
        let vertex_data = match attachment {
            Attachment::Mesh(mesh) => match self.data.mesh_geometry(slot_index, mesh) {
                Some(geometry) => &geometry.vertex_data,
                None => return,
            },
            Attachment::BoundingBox(b) => &b.vertex_data,
            Attachment::Path(p) => &p.vertex_data,
            Attachment::Region(_) => return,
        };
        self.compute_vertex_world(vertex_data, slot_index, start, count, out, offset);
    }

    /// World vertices of a slot's current attachment: the quad corners for a
    /// region, all points for a vertex attachment.
    pub fn attachment_world_vertices(&self, slot_index: usize) -> Option<Vec<f32>> {
        let attachment = self.slot_attachment(slot_index)?;
        match attachment {
            Attachment::Region(region) => {
                let bone = self.slots[slot_index].bone;
                let mut out = vec![0.0; 8];
                self.compute_region_world_vertices(region, bone, &mut out);
                Some(out)
            }
            Attachment::Mesh(mesh) => {
                let geometry = self.data.mesh_geometry(slot_index, mesh)?;
                let mut out = vec![0.0; geometry.vertex_data.world_vertices_count * 2];
                let count = out.len();
                self.compute_vertex_world(&geometry.vertex_data, slot_index, 0, count, &mut out, 0);
                Some(out)
            }
            Attachment::BoundingBox(b) => {
                let mut out = vec![0.0; b.vertex_data.world_vertices_count * 2];
                let count = out.len();
                self.compute_vertex_world(&b.vertex_data, slot_index, 0, count, &mut out, 0);
                Some(out)
            }
            Attachment::Path(p) => {
                let mut out = vec![0.0; p.vertex_data.world_vertices_count * 2];
                let count = out.len();
                self.compute_vertex_world(&p.vertex_data, slot_index, 0, count, &mut out, 0);
                Some(out)
            }
        }
    }

    /// The four world-space corners of a region attachment: BL, TL, TR, BR.
    pub fn compute_region_world_vertices(
        &self,
        region: &RegionAttachment,
        bone_index: usize,
        out: &mut [f32],
    ) {
        let bone = &self.bones[bone_index];
        let x = self.x + bone.world_x;
        let y = self.y + bone.world_y;
        for corner in 0..4 {
            let ox = region.offset[corner * 2];
            let oy = region.offset[corner * 2 + 1];
            out[corner * 2] = ox * bone.a + oy * bone.b + x;
            out[corner * 2 + 1] = ox * bone.c + oy * bone.d + y;
        }
    }

    pub(crate) fn compute_vertex_world(
        &self,
        vertex_data: &VertexData,
        slot_index: usize,
        start: usize,
        count: usize,
        out: &mut [f32],
        offset: usize,
    ) {
        let count = count + offset;
        let slot = &self.slots[slot_index];
        let mut x = self.x;
        let mut y = self.y;
        let deform = &slot.attachment_vertices;

        if vertex_data.bones.is_empty() {
            let vertices: &[f32] = if !deform.is_empty() {
                deform
            } else {
                &vertex_data.vertices
            };
            let bone = &self.bones[slot.bone];
            x += bone.world_x;
            y += bone.world_y;
            let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
            let mut v = start;
            let mut w = offset;
            while w < count {
                let vx = vertices[v];
                let vy = vertices[v + 1];
                out[w] = vx * a + vy * b + x;
                out[w + 1] = vx * c + vy * d + y;
                v += 2;
                w += 2;
            }
            return;
        }

        let bones = &vertex_data.bones;
        let vertices = &vertex_data.vertices;
        let mut v = 0usize;
        let mut skip = 0usize;
        let mut i = 0usize;
        while i < start {
            let n = bones[v];
            v += n + 1;
            skip += n;
            i += 2;
        }

        if deform.is_empty() {
            let mut w = offset;
            let mut b = skip * 3;
            while w < count {
                let mut wx = x;
                let mut wy = y;
                let mut n = bones[v];
                v += 1;
                n += v;
                while v < n {
                    let bone = &self.bones[bones[v]];
                    let vx = vertices[b];
                    let vy = vertices[b + 1];
                    let weight = vertices[b + 2];
                    wx += (vx * bone.a + vy * bone.b + bone.world_x) * weight;
                    wy += (vx * bone.c + vy * bone.d + bone.world_y) * weight;
                    v += 1;
                    b += 3;
                }
                out[w] = wx;
                out[w + 1] = wy;
                w += 2;
            }
        } else {
            let mut w = offset;
            let mut b = skip * 3;
            let mut f = skip * 2;
            while w < count {
                let mut wx = x;
                let mut wy = y;
                let mut n = bones[v];
                v += 1;
                n += v;
                while v < n {
                    let bone = &self.bones[bones[v]];
                    let vx = vertices[b] + deform[f];
                    let vy = vertices[b + 1] + deform[f + 1];
                    let weight = vertices[b + 2];
                    wx += (vx * bone.a + vy * bone.b + bone.world_x) * weight;
                    wy += (vx * bone.c + vy * bone.d + bone.world_y) * weight;
                    v += 1;
                    b += 3;
                    f += 2;
                }
                out[w] = wx;
                out[w + 1] = wy;
                w += 2;
            }
        }
    }
}

fn sort_bone(bones: &mut [Bone], out: &mut Vec<UpdateCacheItem>, index: usize) {
    if bones[index].sorted {
        return;
    }
    if let Some(parent) = bones[index].parent {
        sort_bone(bones, out, parent);
    }
    bones[index].sorted = true;
    out.push(UpdateCacheItem::Bone(index));
}

fn sort_reset(bones: &mut [Bone], children: &[Vec<usize>], bone_index: usize) {
    for &child in &children[bone_index] {
        if bones[child].sorted {
            sort_reset(bones, children, child);
        }
        bones[child].sorted = false;
    }
}

fn sort_path_attachment_bones(
    bones: &mut [Bone],
    out: &mut Vec<UpdateCacheItem>,
    attachment: &Attachment,
    slot_bone: usize,
) {
    let Attachment::Path(path) = attachment else {
        return;
    };
    let path_bones = &path.vertex_data.bones;
    if path_bones.is_empty() {
        sort_bone(bones, out, slot_bone);
    } else {
        let mut i = 0;
        while i < path_bones.len() {
            let n = path_bones[i];
            for &bone_index in &path_bones[i + 1..i + 1 + n] {
                sort_bone(bones, out, bone_index);
            }
            i += n + 1;
        }
    }
}

fn sort_path_attachments_in_skin(
    bones: &mut [Bone],
    out: &mut Vec<UpdateCacheItem>,
    skin: &Skin,
    slot_index: usize,
    slot_bone: usize,
) {
    for entry in &skin.entries {
        if entry.slot_index == slot_index {
            sort_path_attachment_bones(bones, out, &entry.attachment, slot_bone);
        }
    }
}

const PREV_NONE: i32 = -1;
const PREV_BEFORE: i32 = -2;
const PREV_AFTER: i32 = -3;

/// Linear extrapolation before the path start, along the first segment's
/// tangent.
fn add_before_position(world: &[f32], pos: f32, out: &mut [f32], o: usize) {
    let dx = world[2] - world[0];
    let dy = world[3] - world[1];
    let r = dy.atan2(dx);
    out[o * 3] = world[0] + pos * r.cos();
    out[o * 3 + 1] = world[1] + pos * r.sin();
    out[o * 3 + 2] = r;
}

/// Linear extrapolation past the path end, along the last segment's tangent.
/// `i` is the point (not float) index of the segment start.
fn add_after_position(world: &[f32], pos: f32, i: usize, out: &mut [f32], o: usize) {
    let x1 = world[i * 2];
    let y1 = world[i * 2 + 1];
    let x2 = world[i * 2 + 2];
    let y2 = world[i * 2 + 3];
    let r = (y2 - y1).atan2(x2 - x1);
    out[o * 3] = x2 + pos * r.cos();
    out[o * 3 + 1] = y2 + pos * r.sin();
    out[o * 3 + 2] = r;
}

/// Evaluates the cubic Bezier `curve` (8 floats: p1, c1, c2, p2) at parameter
/// `p`, storing position and, when requested, the tangent angle.
fn add_curve_position(p: f32, curve: &[f32], tangents: bool, out: &mut [f32], o: usize) {
    let mut p = p;
    if p == 0.0 {
        p = 0.0001;
    }
    let (x1, y1, cx1, cy1, cx2, cy2, x2, y2) = (
        curve[0], curve[1], curve[2], curve[3], curve[4], curve[5], curve[6], curve[7],
    );
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    out[o * 3] = x;
    out[o * 3 + 1] = y;
    if tangents {
        out[o * 3 + 2] = (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt))
            .atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt));
    }
}
