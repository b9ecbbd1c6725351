use crate::{
    Attachment, BoneData, BoundingBoxAttachment, RegionAttachment, Skeleton, SkeletonBounds,
    SkeletonData, Skin, SlotData, VertexData,
};
use std::sync::Arc;

fn square_box(name: &str, size: f32) -> BoundingBoxAttachment {
    BoundingBoxAttachment {
        name: name.to_string(),
        vertex_data: VertexData {
            bones: Vec::new(),
            vertices: vec![0.0, 0.0, size, 0.0, size, size, 0.0, size],
            world_vertices_count: 4,
        },
    }
}

fn boxed_data() -> SkeletonData {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut hit = BoneData::new("hit");
    hit.parent = Some(0);
    hit.x = 20.0;
    data.bones.push(hit);

    for (name, bone, attachment) in [
        ("near", 0usize, Some("near-box")),
        ("far", 1usize, Some("far-box")),
        ("visual", 0usize, Some("sprite")),
        ("empty", 0usize, None),
    ] {
        data.slots.push(SlotData {
            name: name.to_string(),
            bone,
            color: [1.0, 1.0, 1.0, 1.0],
            attachment: attachment.map(str::to_string),
            blend: Default::default(),
        });
    }

    let mut skin = Skin::new("default");
    skin.add_attachment(0, "near-box", Attachment::BoundingBox(square_box("near-box", 10.0)));
    skin.add_attachment(1, "far-box", Attachment::BoundingBox(square_box("far-box", 5.0)));
    skin.add_attachment(
        2,
        "sprite",
        Attachment::Region(RegionAttachment::new("sprite", "sprite.png")),
    );
    data.skins.push(skin);
    data.default_skin = Some(0);
    data
}

#[test]
fn update_collects_only_bounding_boxes() {
    let mut skeleton = Skeleton::new(Arc::new(boxed_data()));
    skeleton.update_world_transform();

    let mut bounds = SkeletonBounds::new();
    bounds.update(&skeleton, true);

    assert_eq!(bounds.polygons.len(), 2);
    assert!(bounds.polygon(0, "near-box").is_some());
    assert!(bounds.polygon(1, "far-box").is_some());
    assert!(bounds.polygon(2, "sprite").is_none());

    assert_eq!(bounds.min(), (0.0, 0.0));
    assert_eq!(bounds.max(), (25.0, 10.0));
}

#[test]
fn aabb_point_and_segment_tests() {
    let mut skeleton = Skeleton::new(Arc::new(boxed_data()));
    skeleton.update_world_transform();

    let mut bounds = SkeletonBounds::new();
    bounds.update(&skeleton, true);

    assert!(bounds.aabb_contains_point(5.0, 5.0));
    assert!(bounds.aabb_contains_point(22.0, 3.0));
    assert!(!bounds.aabb_contains_point(-1.0, 5.0));
    assert!(!bounds.aabb_contains_point(5.0, 11.0));

    assert!(bounds.aabb_intersects_segment(-5.0, 5.0, 30.0, 5.0));
    assert!(!bounds.aabb_intersects_segment(-5.0, 20.0, 30.0, 20.0));
}

#[test]
fn polygon_hit_tests_pick_the_containing_attachment() {
    let mut skeleton = Skeleton::new(Arc::new(boxed_data()));
    skeleton.update_world_transform();

    let mut bounds = SkeletonBounds::new();
    bounds.update(&skeleton, true);

    let near = bounds.contains_point(5.0, 5.0).unwrap();
    assert_eq!(near.attachment_name, "near-box");

    // Inside the AABB of everything, but between the two polygons.
    assert!(bounds.aabb_contains_point(15.0, 2.0));
    assert!(bounds.contains_point(15.0, 2.0).is_none());

    let far = bounds.contains_point(22.0, 2.0).unwrap();
    assert_eq!(far.attachment_name, "far-box");

    let hit = bounds.intersects_segment(12.0, 2.0, 30.0, 2.0).unwrap();
    assert_eq!(hit.attachment_name, "far-box");
    assert!(bounds.intersects_segment(12.0, 20.0, 30.0, 20.0).is_none());
}

#[test]
fn bounds_follow_the_posed_skeleton() {
    let mut skeleton = Skeleton::new(Arc::new(boxed_data()));
    skeleton.find_bone_mut("hit").unwrap().x = 40.0;
    skeleton.update_world_transform();

    let mut bounds = SkeletonBounds::new();
    bounds.update(&skeleton, true);

    assert!(bounds.contains_point(42.0, 2.0).is_some());
    assert!(bounds.contains_point(22.0, 2.0).is_none());
    assert_eq!(bounds.max(), (45.0, 10.0));
}

#[test]
fn aabb_against_other_bounds() {
    let mut skeleton = Skeleton::new(Arc::new(boxed_data()));
    skeleton.update_world_transform();

    let mut a = SkeletonBounds::new();
    a.update(&skeleton, true);

    let mut moved = Skeleton::new(Arc::new(boxed_data()));
    moved.x = 100.0;
    moved.update_world_transform();
    let mut b = SkeletonBounds::new();
    b.update(&moved, true);

    assert!(a.aabb_intersects_bounds(&a));
    assert!(!a.aabb_intersects_bounds(&b));
}
