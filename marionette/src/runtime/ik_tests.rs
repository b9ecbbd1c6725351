use crate::{BoneData, IkConstraintData, Skeleton, SkeletonData};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn child_bone(name: &str, parent: usize) -> BoneData {
    let mut bone = BoneData::new(name);
    bone.parent = Some(parent);
    bone
}

/// root -> a -> b chain with a sibling target bone, both segments length 10.
fn two_bone_rig(target_x: f32, target_y: f32, bend_direction: i32, mix: f32) -> SkeletonData {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut a = child_bone("a", 0);
    a.length = 10.0;
    data.bones.push(a);
    let mut b = child_bone("b", 1);
    b.x = 10.0;
    b.length = 10.0;
    data.bones.push(b);
    let mut target = child_bone("target", 0);
    target.x = target_x;
    target.y = target_y;
    data.bones.push(target);

    data.ik_constraints.push(IkConstraintData {
        name: "reach".to_string(),
        bones: vec![1, 2],
        target: 3,
        bend_direction,
        mix,
    });
    data
}

fn chain_tip(skeleton: &Skeleton) -> (f32, f32) {
    let b = skeleton.find_bone("b").unwrap();
    let length = skeleton.data.bones[skeleton.find_bone_index("b").unwrap()].length;
    b.local_to_world(length, 0.0)
}

#[test]
fn one_bone_ik_aims_at_target() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    data.bones.push(child_bone("aim", 0));
    let mut target = child_bone("target", 0);
    target.x = 5.0;
    target.y = 5.0;
    data.bones.push(target);
    data.ik_constraints.push(IkConstraintData {
        name: "look".to_string(),
        bones: vec![1],
        target: 2,
        bend_direction: 1,
        mix: 1.0,
    });

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let aim = skeleton.find_bone("aim").unwrap();
    assert_approx(aim.world_rotation_x(), 45.0);
    assert_approx(aim.applied_rotation, 45.0);
    // The local pose is untouched; only the applied transform changes.
    assert_approx(aim.rotation, 0.0);
}

#[test]
fn one_bone_ik_blends_by_mix() {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    data.bones.push(child_bone("aim", 0));
    let mut target = child_bone("target", 0);
    target.x = 0.0;
    target.y = 10.0;
    data.bones.push(target);
    data.ik_constraints.push(IkConstraintData {
        name: "look".to_string(),
        bones: vec![1],
        target: 2,
        bend_direction: 1,
        mix: 0.5,
    });

    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    assert_approx(skeleton.find_bone("aim").unwrap().world_rotation_x(), 45.0);
}

#[test]
fn two_bone_ik_reaches_target_for_both_bend_directions() {
    for bend in [1, -1] {
        let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(10.0, 10.0, bend, 1.0)));
        skeleton.update_world_transform();

        let (tip_x, tip_y) = chain_tip(&skeleton);
        assert_approx(tip_x, 10.0);
        assert_approx(tip_y, 10.0);
    }
}

#[test]
fn two_bone_ik_bend_direction_picks_the_elbow_side() {
    // One bend direction folds the elbow up, the other folds it right.
    let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(10.0, 10.0, -1, 1.0)));
    skeleton.update_world_transform();
    let a = skeleton.find_bone("a").unwrap();
    let b = skeleton.find_bone("b").unwrap();
    assert_approx(a.applied_rotation, 90.0);
    assert_approx(b.applied_rotation, -90.0);
    assert_approx(b.world_x, 0.0);
    assert_approx(b.world_y, 10.0);

    let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(10.0, 10.0, 1, 1.0)));
    skeleton.update_world_transform();
    let a = skeleton.find_bone("a").unwrap();
    let b = skeleton.find_bone("b").unwrap();
    assert_approx(a.applied_rotation, 0.0);
    assert_approx(b.applied_rotation, 90.0);
    assert_approx(b.world_x, 10.0);
    assert_approx(b.world_y, 0.0);
}

#[test]
fn two_bone_ik_with_unreachable_target_straightens_the_chain() {
    let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(30.0, 0.0, 1, 1.0)));
    skeleton.update_world_transform();

    // Both segments extend along the target direction.
    let (tip_x, tip_y) = chain_tip(&skeleton);
    assert_approx(tip_x, 20.0);
    assert_approx(tip_y, 0.0);
}

#[test]
fn two_bone_ik_with_zero_mix_leaves_the_pose() {
    let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(10.0, 10.0, 1, 0.0)));
    skeleton.update_world_transform();

    let a = skeleton.find_bone("a").unwrap();
    let b = skeleton.find_bone("b").unwrap();
    assert_approx(a.world_rotation_x(), 0.0);
    assert_approx(b.world_x, 10.0);
    assert_approx(b.world_y, 0.0);
    // The child's world matrix is still refreshed; no stale or NaN values.
    assert!(b.a.is_finite() && b.d.is_finite());
    assert_approx(b.world_rotation_x(), 0.0);
}

#[test]
fn ik_mix_halves_the_correction() {
    let mut skeleton = Skeleton::new(Arc::new(two_bone_rig(0.0, 20.0, 1, 0.5)));
    skeleton.update_world_transform();

    // Full solve would rotate the parent by 90 degrees; half mix gives 45.
    let a = skeleton.find_bone("a").unwrap();
    assert_approx(a.applied_rotation, 45.0);
}
