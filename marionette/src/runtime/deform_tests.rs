use crate::{
    Animation, Attachment, BoneData, Curve, DeformFrame, DeformTimeline, MeshAttachment,
    MeshGeometry, MeshSource, Skeleton, SkeletonData, Skin, SlotData, Timeline, VertexData,
};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn assert_slices_approx(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_approx(*a, *e);
    }
}

fn mesh_geometry(vertices: Vec<f32>) -> MeshGeometry {
    let count = vertices.len() / 2;
    MeshGeometry {
        vertex_data: VertexData {
            bones: Vec::new(),
            vertices,
            world_vertices_count: count,
        },
        region_uvs: vec![0.0; count * 2],
        uvs: vec![0.0; count * 2],
        triangles: (0..count as u16).collect(),
        hull_length: count,
        edges: Vec::new(),
    }
}

fn mesh(name: &str, source: MeshSource) -> MeshAttachment {
    MeshAttachment {
        name: name.to_string(),
        path: format!("{name}.png"),
        color: [1.0, 1.0, 1.0, 1.0],
        inherit_deform: true,
        source,
        region_u: 0.0,
        region_v: 0.0,
        region_u2: 1.0,
        region_v2: 1.0,
        region_rotate: false,
    }
}

fn meshed_data(attachment: &str) -> SkeletonData {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    data.slots.push(SlotData {
        name: "body".to_string(),
        bone: 0,
        color: [1.0, 1.0, 1.0, 1.0],
        attachment: Some(attachment.to_string()),
        blend: Default::default(),
    });

    let geometry = mesh_geometry(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
    let mut skin = Skin::new("default");
    skin.add_attachment(0, "m", Attachment::Mesh(mesh("m", MeshSource::Owned(geometry))));
    skin.add_attachment(
        0,
        "linked",
        Attachment::Mesh(mesh(
            "linked",
            MeshSource::Linked {
                skin: None,
                parent: "m".to_string(),
            },
        )),
    );
    data.skins.push(skin);
    data.default_skin = Some(0);
    data
}

fn deform_animation(slot_index: usize, attachment: &str) -> Animation {
    Animation {
        name: "wobble".to_string(),
        duration: 1.0,
        timelines: vec![Timeline::Deform(DeformTimeline {
            slot_index,
            attachment: attachment.to_string(),
            frames: vec![
                DeformFrame {
                    time: 0.0,
                    vertices: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    curve: Curve::Linear,
                },
                DeformFrame {
                    time: 1.0,
                    vertices: vec![2.0, 0.0, 0.0, 2.0, 2.0, 2.0],
                    curve: Curve::Linear,
                },
            ],
        })],
    }
}

#[test]
fn deform_timeline_interpolates_vertex_offsets() {
    let mut skeleton = Skeleton::new(Arc::new(meshed_data("m")));
    let animation = deform_animation(0, "m");

    animation.apply(&mut skeleton, -1.0, 0.5, false, None);
    assert_slices_approx(
        &skeleton.slots[0].attachment_vertices,
        &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    );
}

#[test]
fn deform_blends_by_alpha_once_initialized() {
    let mut skeleton = Skeleton::new(Arc::new(meshed_data("m")));
    let animation = deform_animation(0, "m");

    // First application cannot mix with uninitialized offsets.
    animation.mix(&mut skeleton, -1.0, 1.0, false, None, 0.5);
    assert_slices_approx(
        &skeleton.slots[0].attachment_vertices,
        &[2.0, 0.0, 0.0, 2.0, 2.0, 2.0],
    );

    // Now at the first frame with half alpha: halfway back toward zero.
    animation.mix(&mut skeleton, -1.0, 0.0, false, None, 0.5);
    assert_slices_approx(
        &skeleton.slots[0].attachment_vertices,
        &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    );
}

#[test]
fn deform_ignores_slots_showing_other_attachments() {
    let mut skeleton = Skeleton::new(Arc::new(meshed_data("m")));
    let animation = deform_animation(0, "something-else");

    animation.apply(&mut skeleton, -1.0, 0.5, false, None);
    assert!(skeleton.slots[0].attachment_vertices.is_empty());
}

#[test]
fn deform_keyed_on_the_parent_drives_an_inheriting_linked_mesh() {
    let mut skeleton = Skeleton::new(Arc::new(meshed_data("linked")));
    let animation = deform_animation(0, "m");

    animation.apply(&mut skeleton, -1.0, 1.0, false, None);
    assert_slices_approx(
        &skeleton.slots[0].attachment_vertices,
        &[2.0, 0.0, 0.0, 2.0, 2.0, 2.0],
    );
}

#[test]
fn linked_and_cloned_meshes_produce_identical_world_vertices() {
    // Layout one: the slot shows a mesh that lazily links to its parent.
    let linked = Skeleton::new(Arc::new(meshed_data("linked")));
    let linked_vertices = linked.attachment_world_vertices(0).unwrap();

    // Layout two: the same geometry cloned on link.
    let mut cloned_data = meshed_data("m");
    {
        let skin = &mut cloned_data.skins[0];
        let Attachment::Mesh(parent) = skin.attachment(0, "m").unwrap().clone() else {
            panic!("expected mesh");
        };
        let mut copy = mesh("copy", parent.source.clone());
        copy.inherit_deform = false;
        skin.add_attachment(0, "copy", Attachment::Mesh(copy));
    }
    cloned_data.slots[0].attachment = Some("copy".to_string());
    let cloned = Skeleton::new(Arc::new(cloned_data));
    let cloned_vertices = cloned.attachment_world_vertices(0).unwrap();

    assert_eq!(linked_vertices, cloned_vertices);
}

#[test]
fn unweighted_world_vertices_follow_the_slot_bone() {
    let mut data = meshed_data("m");
    data.bones[0].x = 5.0;
    data.bones[0].rotation = 90.0;
    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let vertices = skeleton.attachment_world_vertices(0).unwrap();
    // Local (1, 0) rotates to (0, 1) around the bone at (5, 0).
    assert_slices_approx(&vertices, &[5.0, 0.0, 5.0, 1.0, 4.0, 1.0]);
}

#[test]
fn weighted_world_vertices_blend_bone_transforms() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut offset = BoneData::new("offset");
    offset.parent = Some(0);
    offset.x = 10.0;
    data.bones.push(offset);
    data.slots.push(SlotData {
        name: "body".to_string(),
        bone: 0,
        color: [1.0, 1.0, 1.0, 1.0],
        attachment: Some("m".to_string()),
        blend: Default::default(),
    });

    // One output vertex weighted half-and-half between the two bones.
    let geometry = MeshGeometry {
        vertex_data: VertexData {
            bones: vec![2, 0, 1],
            vertices: vec![1.0, 0.0, 0.5, 2.0, 0.0, 0.5],
            world_vertices_count: 1,
        },
        region_uvs: vec![0.0, 0.0],
        uvs: vec![0.0, 0.0],
        triangles: Vec::new(),
        hull_length: 0,
        edges: Vec::new(),
    };
    let mut skin = Skin::new("default");
    skin.add_attachment(0, "m", Attachment::Mesh(mesh("m", MeshSource::Owned(geometry))));
    data.skins.push(skin);
    data.default_skin = Some(0);

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let vertices = skeleton.attachment_world_vertices(0).unwrap();
    // 0.5 * (1, 0) from the root plus 0.5 * (10 + 2, 0) from the offset bone.
    assert_slices_approx(&vertices, &[6.5, 0.0]);
}

#[test]
fn deform_offsets_shift_weighted_vertices() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    data.slots.push(SlotData {
        name: "body".to_string(),
        bone: 0,
        color: [1.0, 1.0, 1.0, 1.0],
        attachment: Some("m".to_string()),
        blend: Default::default(),
    });
    let geometry = MeshGeometry {
        vertex_data: VertexData {
            bones: vec![1, 0],
            vertices: vec![1.0, 2.0, 1.0],
            world_vertices_count: 1,
        },
        region_uvs: vec![0.0, 0.0],
        uvs: vec![0.0, 0.0],
        triangles: Vec::new(),
        hull_length: 0,
        edges: Vec::new(),
    };
    let mut skin = Skin::new("default");
    skin.add_attachment(0, "m", Attachment::Mesh(mesh("m", MeshSource::Owned(geometry))));
    data.skins.push(skin);
    data.default_skin = Some(0);

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    // Weighted deform offsets add to the authored local positions.
    skeleton.slots[0].attachment_vertices = vec![0.5, -1.0];
    let vertices = skeleton.attachment_world_vertices(0).unwrap();
    assert_slices_approx(&vertices, &[1.5, 1.0]);
}

#[test]
fn partial_world_vertex_reads_honor_start_and_offset() {
    let skeleton = Skeleton::new(Arc::new(meshed_data("m")));

    let mut out = vec![0.0; 4];
    // Read the second vertex only, writing past a two-float offset.
    skeleton.compute_world_vertices(0, 2, 2, &mut out, 2);
    assert_slices_approx(&out, &[0.0, 0.0, 1.0, 0.0]);
}
