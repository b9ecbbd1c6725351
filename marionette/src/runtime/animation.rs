use crate::math::normalize_deg;
use crate::{
    Animation, Attachment, AttachmentTimeline, ColorTimeline, DeformTimeline, DrawOrderTimeline,
    Event, EventTimeline, FloatFrame, IkConstraintTimeline, PathConstraintMixTimeline,
    PathConstraintPositionTimeline, PathConstraintSpacingTimeline, RotateTimeline, ScaleTimeline,
    ShearTimeline, Skeleton, Timeline, TransformConstraintTimeline, TranslateTimeline,
};

/// Index of the first frame with `frame.time > time`; the frame before it
/// supplies the leading value and the curve.
fn frame_after<T>(frames: &[T], time: f32, frame_time: impl Fn(&T) -> f32) -> usize {
    frames.partition_point(|f| frame_time(f) <= time)
}

/// Interpolation percent between the previous frame and the found frame,
/// mapped through the previous frame's curve.
fn curve_percent(
    prev_time: f32,
    cur_time: f32,
    time: f32,
    curve: &crate::Curve,
) -> f32 {
    let percent = 1.0 - (time - cur_time) / (prev_time - cur_time);
    curve.percent(percent)
}

impl Animation {
    /// Poses the skeleton at `time`. `last_time` is the previous application
    /// time, used for event emission; fired events are appended to `events`.
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        looped: bool,
        events: Option<&mut Vec<Event>>,
    ) {
        self.mix(skeleton, last_time, time, looped, events, 1.0);
    }

    /// Poses the skeleton at `time`, blending each timeline's delta into the
    /// current pose by `alpha`.
    pub fn mix(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
    ) {
        let (mut time, mut last_time) = (time, last_time);
        if looped && self.duration > 0.0 {
            time %= self.duration;
            last_time %= self.duration;
        }
        for timeline in &self.timelines {
            timeline.apply(skeleton, last_time, time, events.as_deref_mut(), alpha);
        }
    }

    /// Collapses timelines whose frames past the first are all identical.
    /// Safe unless individual frames are edited afterwards.
    pub fn clear_identity_frames(&mut self) {
        for timeline in &mut self.timelines {
            timeline.clear_identity_frames();
        }
    }
}

impl Timeline {
    pub(crate) fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
    ) {
        match self {
            Timeline::Rotate(t) => apply_rotate(t, skeleton, time, alpha),
            Timeline::Translate(t) => apply_translate(t, skeleton, time, alpha),
            Timeline::Scale(t) => apply_scale(t, skeleton, time, alpha),
            Timeline::Shear(t) => apply_shear(t, skeleton, time, alpha),
            Timeline::Color(t) => apply_color(t, skeleton, time, alpha),
            Timeline::Attachment(t) => apply_attachment(t, skeleton, time),
            Timeline::Event(t) => apply_event(t, last_time, time, events),
            Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time),
            Timeline::Deform(t) => apply_deform(t, skeleton, time, alpha),
            Timeline::IkConstraint(t) => apply_ik_constraint_timeline(t, skeleton, time, alpha),
            Timeline::TransformConstraint(t) => {
                apply_transform_constraint_timeline(t, skeleton, time, alpha)
            }
            Timeline::PathConstraintPosition(t) => {
                apply_path_position_timeline(t, skeleton, time, alpha)
            }
            Timeline::PathConstraintSpacing(t) => {
                apply_path_spacing_timeline(t, skeleton, time, alpha)
            }
            Timeline::PathConstraintMix(t) => apply_path_mix_timeline(t, skeleton, time, alpha),
        }
    }

    /// Erases all frames beyond the first when every frame carries the same
    /// value. Event and draw-order timelines never collapse.
    pub fn clear_identity_frames(&mut self) {
        match self {
            Timeline::Rotate(t) => {
                collapse_frames(&mut t.frames, |a, b| a.angle == b.angle);
            }
            Timeline::Translate(t) => {
                collapse_frames(&mut t.frames, |a, b| a.x == b.x && a.y == b.y);
            }
            Timeline::Scale(t) => {
                collapse_frames(&mut t.frames, |a, b| a.x == b.x && a.y == b.y);
            }
            Timeline::Shear(t) => {
                collapse_frames(&mut t.frames, |a, b| a.x == b.x && a.y == b.y);
            }
            Timeline::Color(t) => {
                collapse_frames(&mut t.frames, |a, b| a.color == b.color);
            }
            Timeline::Attachment(t) => {
                collapse_frames(&mut t.frames, |a, b| a.name == b.name);
            }
            Timeline::Deform(t) => {
                collapse_frames(&mut t.frames, |a, b| a.vertices == b.vertices);
            }
            Timeline::IkConstraint(t) => {
                collapse_frames(&mut t.frames, |a, b| a.mix == b.mix);
            }
            Timeline::TransformConstraint(t) => {
                collapse_frames(&mut t.frames, |a, b| {
                    a.rotate_mix == b.rotate_mix
                        && a.translate_mix == b.translate_mix
                        && a.scale_mix == b.scale_mix
                        && a.shear_mix == b.shear_mix
                });
            }
            Timeline::PathConstraintPosition(t) => {
                collapse_frames(&mut t.frames, |a, b| a.value == b.value);
            }
            Timeline::PathConstraintSpacing(t) => {
                collapse_frames(&mut t.frames, |a, b| a.value == b.value);
            }
            Timeline::PathConstraintMix(t) => {
                collapse_frames(&mut t.frames, |a, b| {
                    a.rotate_mix == b.rotate_mix && a.translate_mix == b.translate_mix
                });
            }
            Timeline::Event(_) | Timeline::DrawOrder(_) => {}
        }
    }
}

fn collapse_frames<T>(frames: &mut Vec<T>, same: impl Fn(&T, &T) -> bool) {
    let Some((first, rest)) = frames.split_first() else {
        return;
    };
    if rest.iter().all(|f| same(first, f)) {
        frames.truncate(1);
    }
}

pub(crate) fn apply_rotate(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(setup) = skeleton.data.bones.get(timeline.bone_index).map(|b| b.rotation) else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        let bone = &mut skeleton.bones[timeline.bone_index];
        let amount = normalize_deg(setup + last.angle - bone.rotation);
        bone.rotation += amount * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let amount = normalize_deg(cur.angle - prev.angle);
    let bone = &mut skeleton.bones[timeline.bone_index];
    let amount = normalize_deg(setup + (prev.angle + amount * percent) - bone.rotation);
    bone.rotation += amount * alpha;
}

pub(crate) fn apply_translate(
    timeline: &TranslateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some((setup_x, setup_y)) = skeleton
        .data
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.x, b.y))
    else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        let bone = &mut skeleton.bones[timeline.bone_index];
        bone.x += (setup_x + last.x - bone.x) * alpha;
        bone.y += (setup_y + last.y - bone.y) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let bone = &mut skeleton.bones[timeline.bone_index];
    bone.x += (setup_x + prev.x + (cur.x - prev.x) * percent - bone.x) * alpha;
    bone.y += (setup_y + prev.y + (cur.y - prev.y) * percent - bone.y) * alpha;
}

pub(crate) fn apply_scale(
    timeline: &ScaleTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some((setup_x, setup_y)) = skeleton
        .data
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.scale_x, b.scale_y))
    else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        let bone = &mut skeleton.bones[timeline.bone_index];
        bone.scale_x += (setup_x * last.x - bone.scale_x) * alpha;
        bone.scale_y += (setup_y * last.y - bone.scale_y) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let bone = &mut skeleton.bones[timeline.bone_index];
    bone.scale_x += (setup_x * (prev.x + (cur.x - prev.x) * percent) - bone.scale_x) * alpha;
    bone.scale_y += (setup_y * (prev.y + (cur.y - prev.y) * percent) - bone.scale_y) * alpha;
}

pub(crate) fn apply_shear(
    timeline: &ShearTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some((setup_x, setup_y)) = skeleton
        .data
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.shear_x, b.shear_y))
    else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        let bone = &mut skeleton.bones[timeline.bone_index];
        bone.shear_x += (setup_x + last.x - bone.shear_x) * alpha;
        bone.shear_y += (setup_y + last.y - bone.shear_y) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let bone = &mut skeleton.bones[timeline.bone_index];
    bone.shear_x += (setup_x + prev.x + (cur.x - prev.x) * percent - bone.shear_x) * alpha;
    bone.shear_y += (setup_y + prev.y + (cur.y - prev.y) * percent - bone.shear_y) * alpha;
}

pub(crate) fn apply_color(
    timeline: &ColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }

    let last = frames.last().expect("frames are non-empty");
    let color = if time >= last.time {
        last.color
    } else {
        let cur = frame_after(frames, time, |f| f.time);
        let prev = &frames[cur - 1];
        let cur = &frames[cur];
        let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

        let mut color = [0.0f32; 4];
        for (i, channel) in color.iter_mut().enumerate() {
            *channel = prev.color[i] + (cur.color[i] - prev.color[i]) * percent;
        }
        color
    };

    let Some(slot) = skeleton.slots.get_mut(timeline.slot_index) else {
        return;
    };
    if alpha < 1.0 {
        for (channel, target) in slot.color.iter_mut().zip(color.iter()) {
            *channel += (target - *channel) * alpha;
        }
    } else {
        slot.color = color;
    }
}

pub(crate) fn apply_attachment(timeline: &AttachmentTimeline, skeleton: &mut Skeleton, time: f32) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }

    let last = frames.last().expect("frames are non-empty");
    let frame = if time >= last.time {
        last
    } else {
        &frames[frame_after(frames, time, |f| f.time) - 1]
    };

    skeleton.set_slot_attachment(timeline.slot_index, frame.name.as_deref());
}

/// Fires events with `last_time < event.time <= time`. When the animation
/// looped (`last_time > time`), events in `(last_time, duration]` fire first,
/// then those in `[0, time]`.
pub(crate) fn apply_event(
    timeline: &EventTimeline,
    last_time: f32,
    time: f32,
    events: Option<&mut Vec<Event>>,
) {
    let Some(out) = events else {
        return;
    };
    let frames = &timeline.events;
    if frames.is_empty() {
        return;
    }

    let mut last_time = last_time;
    if last_time > time {
        emit_range(frames, last_time, f32::MAX, out);
        last_time = -1.0;
    } else if last_time >= frames.last().expect("events are non-empty").time {
        return;
    }
    if time < frames[0].time {
        return;
    }
    emit_range(frames, last_time, time, out);
}

fn emit_range(frames: &[Event], after: f32, until: f32, out: &mut Vec<Event>) {
    for event in frames {
        if event.time > after && event.time <= until {
            out.push(event.clone());
        }
    }
}

pub(crate) fn apply_draw_order(timeline: &DrawOrderTimeline, skeleton: &mut Skeleton, time: f32) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }

    let last = frames.last().expect("frames are non-empty");
    let frame = if time >= last.time {
        last
    } else {
        &frames[frame_after(frames, time, |f| f.time) - 1]
    };

    match &frame.draw_order {
        Some(order) => skeleton.set_draw_order(order),
        None => skeleton.reset_draw_order(),
    }
}

pub(crate) fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }

    // Only applies when the slot shows the keyed attachment, or a mesh
    // inheriting its deform from it.
    let applies = match skeleton.slot_attachment(timeline.slot_index) {
        Some(attachment) if attachment.name() == timeline.attachment => true,
        Some(Attachment::Mesh(mesh)) => mesh.deform_source_name() == timeline.attachment,
        _ => false,
    };
    if !applies {
        return;
    }

    let vertex_count = first.vertices.len();
    let Some(slot) = skeleton.slots.get_mut(timeline.slot_index) else {
        return;
    };

    let mut alpha = alpha;
    if slot.attachment_vertices.len() != vertex_count {
        // Uninitialized deform offsets cannot be mixed with.
        alpha = 1.0;
        slot.attachment_vertices.clear();
    }
    slot.attachment_vertices.resize(vertex_count, 0.0);

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        if alpha < 1.0 {
            for (value, target) in slot.attachment_vertices.iter_mut().zip(&last.vertices) {
                *value += (target - *value) * alpha;
            }
        } else {
            slot.attachment_vertices.copy_from_slice(&last.vertices);
        }
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    if alpha < 1.0 {
        for i in 0..vertex_count {
            let target = prev.vertices[i] + (cur.vertices[i] - prev.vertices[i]) * percent;
            let value = &mut slot.attachment_vertices[i];
            *value += (target - *value) * alpha;
        }
    } else {
        for i in 0..vertex_count {
            slot.attachment_vertices[i] =
                prev.vertices[i] + (cur.vertices[i] - prev.vertices[i]) * percent;
        }
    }
}

pub(crate) fn apply_ik_constraint_timeline(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(constraint) = skeleton.ik_constraints.get_mut(timeline.constraint_index) else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        constraint.mix += (last.mix - constraint.mix) * alpha;
        constraint.bend_direction = last.bend_direction;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let mix = prev.mix + (cur.mix - prev.mix) * percent;
    constraint.mix += (mix - constraint.mix) * alpha;
    constraint.bend_direction = prev.bend_direction;
}

pub(crate) fn apply_transform_constraint_timeline(
    timeline: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(constraint) = skeleton
        .transform_constraints
        .get_mut(timeline.constraint_index)
    else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        constraint.rotate_mix += (last.rotate_mix - constraint.rotate_mix) * alpha;
        constraint.translate_mix += (last.translate_mix - constraint.translate_mix) * alpha;
        constraint.scale_mix += (last.scale_mix - constraint.scale_mix) * alpha;
        constraint.shear_mix += (last.shear_mix - constraint.shear_mix) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let rotate = prev.rotate_mix + (cur.rotate_mix - prev.rotate_mix) * percent;
    let translate = prev.translate_mix + (cur.translate_mix - prev.translate_mix) * percent;
    let scale = prev.scale_mix + (cur.scale_mix - prev.scale_mix) * percent;
    let shear = prev.shear_mix + (cur.shear_mix - prev.shear_mix) * percent;
    constraint.rotate_mix += (rotate - constraint.rotate_mix) * alpha;
    constraint.translate_mix += (translate - constraint.translate_mix) * alpha;
    constraint.scale_mix += (scale - constraint.scale_mix) * alpha;
    constraint.shear_mix += (shear - constraint.shear_mix) * alpha;
}

fn apply_float_frames(frames: &[FloatFrame], time: f32, alpha: f32, value: &mut f32) {
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        *value += (last.value - *value) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let sampled = prev.value + (cur.value - prev.value) * percent;
    *value += (sampled - *value) * alpha;
}

pub(crate) fn apply_path_position_timeline(
    timeline: &PathConstraintPositionTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.constraint_index) else {
        return;
    };
    apply_float_frames(&timeline.frames, time, alpha, &mut constraint.position);
}

pub(crate) fn apply_path_spacing_timeline(
    timeline: &PathConstraintSpacingTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.constraint_index) else {
        return;
    };
    apply_float_frames(&timeline.frames, time, alpha, &mut constraint.spacing);
}

pub(crate) fn apply_path_mix_timeline(
    timeline: &PathConstraintMixTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
) {
    let frames = &timeline.frames;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.constraint_index) else {
        return;
    };

    let last = frames.last().expect("frames are non-empty");
    if time >= last.time {
        constraint.rotate_mix += (last.rotate_mix - constraint.rotate_mix) * alpha;
        constraint.translate_mix += (last.translate_mix - constraint.translate_mix) * alpha;
        return;
    }

    let cur = frame_after(frames, time, |f| f.time);
    let prev = &frames[cur - 1];
    let cur = &frames[cur];
    let percent = curve_percent(prev.time, cur.time, time, &prev.curve);

    let rotate = prev.rotate_mix + (cur.rotate_mix - prev.rotate_mix) * percent;
    let translate = prev.translate_mix + (cur.translate_mix - prev.translate_mix) * percent;
    constraint.rotate_mix += (rotate - constraint.rotate_mix) * alpha;
    constraint.translate_mix += (translate - constraint.translate_mix) * alpha;
}
