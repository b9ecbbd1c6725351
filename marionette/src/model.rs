use crate::math::DEG_RAD;

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit_rotation: bool,
    pub inherit_scale: bool,
}

impl BoneData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            inherit_rotation: true,
            inherit_scale: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    /// Index of the bone this slot is attached to.
    pub bone: usize,
    pub color: [f32; 4],
    /// Setup-pose attachment name, resolved through the active skin.
    pub attachment: Option<String>,
    pub blend: BlendMode,
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
}

/// A fired event: the authored defaults of an [`EventData`] with per-key
/// overrides and the keyframe time.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
}

#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    /// One bone (aim) or two bones (parent, child) driven toward the target.
    pub bones: Vec<usize>,
    /// Target bone index.
    pub target: usize,
    pub bend_direction: i32,
    pub mix: f32,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub bones: Vec<usize>,
    /// Target bone index.
    pub target: usize,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PositionMode {
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpacingMode {
    Length,
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RotateMode {
    Tangent,
    Chain,
    ChainScale,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub bones: Vec<usize>,
    /// Target slot index; the slot's attachment must be a path.
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
}

/// Vertex positions of a mesh, bounding box or path, either rigid (bound to
/// the slot's bone) or weighted across several bones.
///
/// When `bones` is empty, `vertices` holds `world_vertices_count * 2` floats
/// of `(x, y)` in the slot bone's local space. Otherwise each logical vertex
/// is a run in `bones` of a count `n` followed by `n` bone indices, and the
/// matching `3 * n` floats in `vertices` are `(x, y, weight)` triples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexData {
    pub bones: Vec<usize>,
    pub vertices: Vec<f32>,
    pub world_vertices_count: usize,
}

impl VertexData {
    pub fn weighted(&self) -> bool {
        !self.bones.is_empty()
    }
}

/// A textured quad. The four corner offsets and UVs are precomputed from the
/// authored transform and the atlas region geometry.
#[derive(Clone, Debug)]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],

    pub region_offset_x: f32,
    pub region_offset_y: f32,
    pub region_width: f32,
    pub region_height: f32,
    pub region_original_width: f32,
    pub region_original_height: f32,

    /// Corner offsets in bone-local space: BL, TL, TR, BR as `(x, y)` pairs.
    pub offset: [f32; 8],
    pub uvs: [f32; 8],
}

impl RegionAttachment {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            width: 0.0,
            height: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
            region_offset_x: 0.0,
            region_offset_y: 0.0,
            region_width: 0.0,
            region_height: 0.0,
            region_original_width: 0.0,
            region_original_height: 0.0,
            offset: [0.0; 8],
            uvs: [0.0; 8],
        }
    }

    pub fn set_uvs(&mut self, u: f32, v: f32, u2: f32, v2: f32, rotate: bool) {
        if rotate {
            self.uvs[2] = u;
            self.uvs[3] = v2;
            self.uvs[4] = u;
            self.uvs[5] = v;
            self.uvs[6] = u2;
            self.uvs[7] = v;
            self.uvs[0] = u2;
            self.uvs[1] = v2;
        } else {
            self.uvs[0] = u;
            self.uvs[1] = v2;
            self.uvs[2] = u;
            self.uvs[3] = v;
            self.uvs[4] = u2;
            self.uvs[5] = v;
            self.uvs[6] = u2;
            self.uvs[7] = v2;
        }
    }

    /// Recomputes the four corner offsets. Call after changing the authored
    /// transform or the atlas region geometry.
    pub fn update_offset(&mut self) {
        let region_original_width = if self.region_original_width > 0.0 {
            self.region_original_width
        } else {
            self.width
        };
        let region_original_height = if self.region_original_height > 0.0 {
            self.region_original_height
        } else {
            self.height
        };
        let region_width = if self.region_width > 0.0 {
            self.region_width
        } else {
            self.width
        };
        let region_height = if self.region_height > 0.0 {
            self.region_height
        } else {
            self.height
        };

        let region_scale_x = self.width / region_original_width * self.scale_x;
        let region_scale_y = self.height / region_original_height * self.scale_y;
        let local_x = -self.width / 2.0 * self.scale_x + self.region_offset_x * region_scale_x;
        let local_y = -self.height / 2.0 * self.scale_y + self.region_offset_y * region_scale_y;
        let local_x2 = local_x + region_width * region_scale_x;
        let local_y2 = local_y + region_height * region_scale_y;
        let radians = self.rotation * DEG_RAD;
        let cosine = radians.cos();
        let sine = radians.sin();
        let local_x_cos = local_x * cosine + self.x;
        let local_x_sin = local_x * sine;
        let local_y_cos = local_y * cosine + self.y;
        let local_y_sin = local_y * sine;
        let local_x2_cos = local_x2 * cosine + self.x;
        let local_x2_sin = local_x2 * sine;
        let local_y2_cos = local_y2 * cosine + self.y;
        let local_y2_sin = local_y2 * sine;

        self.offset[0] = local_x_cos - local_y_sin;
        self.offset[1] = local_y_cos + local_x_sin;
        self.offset[2] = local_x_cos - local_y2_sin;
        self.offset[3] = local_y2_cos + local_x_sin;
        self.offset[4] = local_x2_cos - local_y2_sin;
        self.offset[5] = local_y2_cos + local_x2_sin;
        self.offset[6] = local_x2_cos - local_y_sin;
        self.offset[7] = local_y_cos + local_x2_sin;
    }
}

/// Geometry buffers of a mesh attachment.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshGeometry {
    pub vertex_data: VertexData,
    /// Authored UVs in region space, one `(u, v)` pair per vertex.
    pub region_uvs: Vec<f32>,
    /// Mapped UVs, recomputed from the atlas region via [`MeshAttachment::update_uvs`].
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    pub hull_length: usize,
    pub edges: Vec<u16>,
}

/// How a mesh obtains its geometry: its own buffers, or those of a parent
/// mesh it links to (resolved lazily through the skins).
#[derive(Clone, Debug)]
pub enum MeshSource {
    Owned(MeshGeometry),
    Linked {
        /// Skin holding the parent mesh; `None` means the default skin.
        skin: Option<String>,
        parent: String,
    },
}

#[derive(Clone, Debug)]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    /// Whether deform timelines keyed on the parent mesh also drive this mesh.
    pub inherit_deform: bool,
    pub source: MeshSource,

    pub region_u: f32,
    pub region_v: f32,
    pub region_u2: f32,
    pub region_v2: f32,
    pub region_rotate: bool,
}

impl MeshAttachment {
    /// Name of the mesh whose deform timelines apply to this one: the linked
    /// parent when deform is inherited, otherwise the mesh itself.
    pub fn deform_source_name(&self) -> &str {
        match &self.source {
            MeshSource::Linked { parent, .. } if self.inherit_deform => parent.as_str(),
            _ => self.name.as_str(),
        }
    }

    /// Recomputes mapped UVs from the atlas region. Only meaningful for owned
    /// geometry; linked meshes use the parent's buffers.
    pub fn update_uvs(&mut self) {
        let (region_u, region_v) = (self.region_u, self.region_v);
        let width = self.region_u2 - self.region_u;
        let height = self.region_v2 - self.region_v;
        let rotate = self.region_rotate;

        let MeshSource::Owned(geometry) = &mut self.source else {
            return;
        };

        geometry.uvs.clear();
        geometry.uvs.reserve(geometry.region_uvs.len());
        if rotate {
            for ruv in geometry.region_uvs.chunks_exact(2) {
                geometry.uvs.push(region_u + ruv[1] * width);
                geometry.uvs.push(region_v + height - ruv[0] * height);
            }
        } else {
            for ruv in geometry.region_uvs.chunks_exact(2) {
                geometry.uvs.push(region_u + ruv[0] * width);
                geometry.uvs.push(region_v + ruv[1] * height);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachment {
    pub name: String,
    pub vertex_data: VertexData,
}

#[derive(Clone, Debug)]
pub struct PathAttachment {
    pub name: String,
    pub vertex_data: VertexData,
    /// Accumulated length of each curve segment, as authored.
    pub lengths: Vec<f32>,
    pub closed: bool,
    pub constant_speed: bool,
}

#[derive(Clone, Debug)]
pub enum Attachment {
    Region(RegionAttachment),
    Mesh(MeshAttachment),
    BoundingBox(BoundingBoxAttachment),
    Path(PathAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Attachment::Region(a) => a.name.as_str(),
            Attachment::Mesh(a) => a.name.as_str(),
            Attachment::BoundingBox(a) => a.name.as_str(),
            Attachment::Path(a) => a.name.as_str(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SkinEntry {
    pub slot_index: usize,
    pub name: String,
    pub attachment: Attachment,
}

/// An ordered mapping from `(slot, attachment name)` to attachments.
#[derive(Clone, Debug, Default)]
pub struct Skin {
    pub name: String,
    pub entries: Vec<SkinEntry>,
}

impl Skin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn add_attachment(
        &mut self,
        slot_index: usize,
        name: impl Into<String>,
        attachment: Attachment,
    ) {
        self.entries.push(SkinEntry {
            slot_index,
            name: name.into(),
            attachment,
        });
    }

    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&Attachment> {
        self.entries
            .iter()
            .find(|e| e.slot_index == slot_index && e.name == name)
            .map(|e| &e.attachment)
    }
}

/// Per-keyframe interpolation for the segment following that keyframe.
///
/// Bezier curves store ten samples precomputed from the authored control
/// handles; evaluation is piecewise-linear across the samples plus the
/// implicit endpoint `(1, 1)`.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier { samples: [[f32; 2]; BEZIER_SAMPLES] },
}

pub const BEZIER_SAMPLES: usize = 10;

impl Curve {
    /// Precomputes a Bezier curve from control handles `(cx1, cy1)`, `(cx2, cy2)`.
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let tmpx = (-cx1 * 2.0 + cx2) * 0.03;
        let tmpy = (-cy1 * 2.0 + cy2) * 0.03;
        let dddfx = ((cx1 - cx2) * 3.0 + 1.0) * 0.006;
        let dddfy = ((cy1 - cy2) * 3.0 + 1.0) * 0.006;
        let mut ddfx = tmpx * 2.0 + dddfx;
        let mut ddfy = tmpy * 2.0 + dddfy;
        let mut dfx = cx1 * 0.3 + tmpx + dddfx * 0.16666667;
        let mut dfy = cy1 * 0.3 + tmpy + dddfy * 0.16666667;
        let mut x = dfx;
        let mut y = dfy;

        let mut samples = [[0.0f32; 2]; BEZIER_SAMPLES];
        for sample in &mut samples {
            sample[0] = x;
            sample[1] = y;
            dfx += ddfx;
            dfy += ddfy;
            ddfx += dddfx;
            ddfy += dddfy;
            x += dfx;
            y += dfy;
        }
        Curve::Bezier { samples }
    }

    /// Maps an interpolation percent through this curve. The input is
    /// saturated to `[0, 1]`.
    pub fn percent(&self, percent: f32) -> f32 {
        let percent = percent.clamp(0.0, 1.0);
        match self {
            Curve::Linear => percent,
            Curve::Stepped => 0.0,
            Curve::Bezier { samples } => {
                let mut prev = [0.0f32, 0.0];
                for sample in samples {
                    if sample[0] > percent {
                        return prev[1]
                            + (sample[1] - prev[1]) * (percent - prev[0]) / (sample[0] - prev[0]);
                    }
                    prev = *sample;
                }
                // Last sample to the implicit endpoint (1, 1).
                prev[1] + (1.0 - prev[1]) * (percent - prev[0]) / (1.0 - prev[0])
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ShearTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    /// Fired events ordered by time; equal times fire in authoring order.
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// `draw_order[i]` is the slot index drawn at position `i`; `None`
    /// restores the setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
pub struct DeformFrame {
    pub time: f32,
    /// One `(x, y)` offset pair per vertex.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct DeformTimeline {
    pub slot_index: usize,
    /// Name of the keyed attachment. Applies when the slot shows that
    /// attachment, or a mesh that inherits deform from it.
    pub attachment: String,
    pub frames: Vec<DeformFrame>,
}

#[derive(Clone, Debug)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub bend_direction: i32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Clone, Debug)]
pub struct TransformFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<TransformFrame>,
}

#[derive(Clone, Debug)]
pub struct FloatFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathConstraintPositionTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathConstraintSpacingTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathMixFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathConstraintMixTimeline {
    pub constraint_index: usize,
    pub frames: Vec<PathMixFrame>,
}

/// One sampled keyframe sequence writing into a single pose target.
#[derive(Clone, Debug)]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Shear(ShearTimeline),
    Color(ColorTimeline),
    Attachment(AttachmentTimeline),
    Event(EventTimeline),
    DrawOrder(DrawOrderTimeline),
    Deform(DeformTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathConstraintPosition(PathConstraintPositionTimeline),
    PathConstraintSpacing(PathConstraintSpacingTimeline),
    PathConstraintMix(PathConstraintMixTimeline),
}

/// An ordered bundle of timelines with a total duration.
#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    pub timelines: Vec<Timeline>,
}

#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: Vec<Skin>,
    /// Index of the designated default skin, used as a lookup fallback.
    pub default_skin: Option<usize>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
    pub width: f32,
    pub height: f32,
}

impl SkeletonData {
    pub fn find_bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    pub fn find_skin(&self, name: &str) -> Option<(usize, &Skin)> {
        self.skins
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == name)
    }

    pub fn default_skin(&self) -> Option<&Skin> {
        self.default_skin.and_then(|i| self.skins.get(i))
    }

    pub fn find_event(&self, name: &str) -> Option<&EventData> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn find_animation(&self, name: &str) -> Option<(usize, &Animation)> {
        self.animations
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }

    /// Resolves a mesh's geometry, following a linked mesh to its parent.
    ///
    /// Both layouts are equivalent: a mesh cloned on link and a lazily linked
    /// mesh yield the same buffers.
    pub fn mesh_geometry<'a>(
        &'a self,
        slot_index: usize,
        mesh: &'a MeshAttachment,
    ) -> Option<&'a MeshGeometry> {
        let mut mesh = mesh;
        // Linked chains are authored shallow; the bound guards against cycles.
        for _ in 0..self.skins.len() + 1 {
            match &mesh.source {
                MeshSource::Owned(geometry) => return Some(geometry),
                MeshSource::Linked { skin, parent } => {
                    let skin = match skin {
                        Some(name) => self.find_skin(name).map(|(_, s)| s),
                        None => self.default_skin(),
                    }?;
                    match skin.attachment(slot_index, parent)? {
                        Attachment::Mesh(parent_mesh) => mesh = parent_mesh,
                        _ => return None,
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bezier_curve_percent_is_monotonic_and_saturates() {
        let curve = Curve::bezier(0.25, 0.0, 0.75, 1.0);
        assert_eq!(curve.percent(-1.0), curve.percent(0.0));
        assert_eq!(curve.percent(2.0), curve.percent(1.0));

        let mut prev = -1.0f32;
        for i in 0..=20 {
            let p = curve.percent(i as f32 / 20.0);
            assert!(p >= prev, "curve not monotonic at sample {i}");
            prev = p;
        }
        assert!(curve.percent(0.0).abs() < 1.0e-3);
        assert!((curve.percent(1.0) - 1.0).abs() < 1.0e-3);
    }

    #[test]
    fn linear_and_stepped_curves() {
        assert_eq!(Curve::Linear.percent(0.3), 0.3);
        assert_eq!(Curve::Stepped.percent(0.3), 0.0);
        assert_eq!(Curve::Stepped.percent(1.0), 0.0);
    }

    #[test]
    fn region_offset_matches_hand_computed_corners() {
        let mut region = RegionAttachment::new("quad", "quad.png");
        region.width = 4.0;
        region.height = 2.0;
        region.update_offset();

        // Untransformed quad centered on the bone origin.
        assert_eq!(&region.offset[..], &[-2.0, -1.0, -2.0, 1.0, 2.0, 1.0, 2.0, -1.0]);
    }

    #[test]
    fn region_uvs_rotate_remaps_corners() {
        let mut region = RegionAttachment::new("quad", "quad.png");
        region.set_uvs(0.0, 0.0, 1.0, 1.0, false);
        let plain = region.uvs;
        region.set_uvs(0.0, 0.0, 1.0, 1.0, true);
        let rotated = region.uvs;
        assert_ne!(&plain[..], &rotated[..]);
        assert_eq!(&rotated[0..2], &[1.0, 1.0]);
    }

    #[test]
    fn skin_lookup_matches_slot_and_name() {
        let mut skin = Skin::new("default");
        skin.add_attachment(
            1,
            "head",
            Attachment::Region(RegionAttachment::new("head", "head.png")),
        );
        assert!(skin.attachment(1, "head").is_some());
        assert!(skin.attachment(0, "head").is_none());
        assert!(skin.attachment(1, "tail").is_none());
    }

    #[test]
    fn linked_mesh_resolves_parent_geometry() {
        let geometry = MeshGeometry {
            vertex_data: VertexData {
                bones: Vec::new(),
                vertices: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0],
                world_vertices_count: 3,
            },
            region_uvs: vec![0.0; 6],
            uvs: vec![0.0; 6],
            triangles: vec![0, 1, 2],
            hull_length: 3,
            edges: Vec::new(),
        };
        let parent = MeshAttachment {
            name: "parent".to_string(),
            path: "parent.png".to_string(),
            color: [1.0; 4],
            inherit_deform: false,
            source: MeshSource::Owned(geometry.clone()),
            region_u: 0.0,
            region_v: 0.0,
            region_u2: 1.0,
            region_v2: 1.0,
            region_rotate: false,
        };
        let child = MeshAttachment {
            name: "child".to_string(),
            path: "child.png".to_string(),
            color: [1.0; 4],
            inherit_deform: true,
            source: MeshSource::Linked {
                skin: None,
                parent: "parent".to_string(),
            },
            region_u: 0.0,
            region_v: 0.0,
            region_u2: 1.0,
            region_v2: 1.0,
            region_rotate: false,
        };

        let mut skin = Skin::new("default");
        skin.add_attachment(0, "parent", Attachment::Mesh(parent));
        let data = SkeletonData {
            skins: vec![skin],
            default_skin: Some(0),
            ..Default::default()
        };

        let resolved = data.mesh_geometry(0, &child).expect("parent geometry");
        assert_eq!(resolved, &geometry);
        assert_eq!(child.deform_source_name(), "parent");
    }
}
