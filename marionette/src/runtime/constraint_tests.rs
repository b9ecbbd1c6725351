use crate::{BoneData, Skeleton, SkeletonData, TransformConstraintData};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn constraint_data() -> TransformConstraintData {
    TransformConstraintData {
        name: "follow".to_string(),
        bones: vec![2],
        target: 1,
        offset_rotation: 0.0,
        offset_x: 0.0,
        offset_y: 0.0,
        offset_scale_x: 0.0,
        offset_scale_y: 0.0,
        offset_shear_y: 0.0,
        rotate_mix: 0.0,
        translate_mix: 0.0,
        scale_mix: 0.0,
        shear_mix: 0.0,
    }
}

/// root with a posed target bone and an untransformed driven bone.
fn rig(constraint: TransformConstraintData) -> SkeletonData {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut target = BoneData::new("target");
    target.parent = Some(0);
    target.x = 3.0;
    target.y = 4.0;
    target.rotation = 45.0;
    data.bones.push(target);
    let mut driven = BoneData::new("driven");
    driven.parent = Some(0);
    data.bones.push(driven);
    data.transform_constraints.push(constraint);
    data
}

#[test]
fn rotate_mix_turns_the_driven_bone_toward_the_target() {
    let mut constraint = constraint_data();
    constraint.rotate_mix = 1.0;
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint)));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.world_rotation_x(), 45.0);
    // World position is untouched by the rotation pass.
    assert_approx(driven.world_x, 0.0);
    assert_approx(driven.world_y, 0.0);
}

#[test]
fn rotate_mix_is_proportional() {
    let mut constraint = constraint_data();
    constraint.rotate_mix = 0.5;
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint)));
    skeleton.update_world_transform();

    assert_approx(
        skeleton.find_bone("driven").unwrap().world_rotation_x(),
        22.5,
    );
}

#[test]
fn translate_mix_moves_toward_the_target_world_position() {
    let mut constraint = constraint_data();
    constraint.translate_mix = 1.0;
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint)));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.world_x, 3.0);
    assert_approx(driven.world_y, 4.0);

    let mut constraint = constraint_data();
    constraint.translate_mix = 0.5;
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint)));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.world_x, 1.5);
    assert_approx(driven.world_y, 2.0);
}

#[test]
fn offset_translation_is_expressed_in_the_target_frame() {
    let mut constraint = constraint_data();
    constraint.translate_mix = 1.0;
    constraint.offset_x = 1.0;
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint)));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    let cos45 = 45f32.to_radians().cos();
    assert_approx(driven.world_x, 3.0 + cos45);
    assert_approx(driven.world_y, 4.0 + cos45);
}

#[test]
fn scale_mix_matches_the_target_axis_lengths() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut target = BoneData::new("target");
    target.parent = Some(0);
    target.scale_x = 2.0;
    target.scale_y = 3.0;
    data.bones.push(target);
    let mut driven = BoneData::new("driven");
    driven.parent = Some(0);
    data.bones.push(driven);
    let mut constraint = constraint_data();
    constraint.scale_mix = 1.0;
    data.transform_constraints.push(constraint);

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.world_scale_x(), 2.0);
    assert_approx(driven.world_scale_y(), 3.0);
}

#[test]
fn shear_mix_skews_the_y_axis_toward_the_target() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut target = BoneData::new("target");
    target.parent = Some(0);
    target.shear_y = 30.0;
    data.bones.push(target);
    let mut driven = BoneData::new("driven");
    driven.parent = Some(0);
    data.bones.push(driven);
    let mut constraint = constraint_data();
    constraint.shear_mix = 1.0;
    data.transform_constraints.push(constraint);

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.world_rotation_y(), 120.0);
    // The X axis keeps its direction.
    assert_approx(driven.world_rotation_x(), 0.0);
}

#[test]
fn zero_mixes_leave_the_driven_bone_untouched() {
    let mut skeleton = Skeleton::new(Arc::new(rig(constraint_data())));
    skeleton.update_world_transform();

    let driven = skeleton.find_bone("driven").unwrap();
    assert_approx(driven.a, 1.0);
    assert_approx(driven.b, 0.0);
    assert_approx(driven.c, 0.0);
    assert_approx(driven.d, 1.0);
    assert_approx(driven.world_x, 0.0);
    assert_approx(driven.world_y, 0.0);
}
