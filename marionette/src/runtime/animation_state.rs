use crate::{Error, Event, Skeleton, SkeletonData};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Pairwise crossfade durations between animations, plus a default.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    pub default_mix: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        let Some((from_index, _)) = self.skeleton_data.find_animation(from) else {
            return Err(Error::UnknownAnimation {
                name: from.to_string(),
            });
        };
        let Some((to_index, _)) = self.skeleton_data.find_animation(to) else {
            return Err(Error::UnknownAnimation {
                name: to.to_string(),
            });
        };
        self.set_mix_by_index(from_index, to_index, duration);
        Ok(())
    }

    pub fn set_mix_by_index(&mut self, from: usize, to: usize, duration: f32) {
        self.mixes.insert((from, to), duration);
    }

    pub fn mix_duration(&self, from: usize, to: usize) -> f32 {
        self.mixes.get(&(from, to)).copied().unwrap_or(self.default_mix)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// One playback record on a track. The `previous` link carries the entry
/// being mixed out during a crossfade.
pub struct TrackEntry {
    animation_index: usize,
    pub looped: bool,
    pub delay: f32,
    pub time: f32,
    pub last_time: f32,
    pub end_time: f32,
    pub time_scale: f32,
    pub mix: f32,
    pub mix_time: f32,
    pub mix_duration: f32,
    previous: Option<EntryId>,
    listener: Option<Box<dyn TrackEntryListener>>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("animation_index", &self.animation_index)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("time", &self.time)
            .field("last_time", &self.last_time)
            .field("end_time", &self.end_time)
            .field("time_scale", &self.time_scale)
            .field("mix", &self.mix)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("previous", &self.previous)
            .finish()
    }
}

impl TrackEntry {
    fn new(animation_index: usize, looped: bool, duration: f32) -> Self {
        Self {
            animation_index,
            looped,
            delay: 0.0,
            time: 0.0,
            last_time: -1.0,
            end_time: duration,
            time_scale: 1.0,
            mix: 1.0,
            mix_time: 0.0,
            mix_duration: 0.0,
            previous: None,
            listener: None,
        }
    }

    pub fn animation_index(&self) -> usize {
        self.animation_index
    }

    pub fn previous_id(&self) -> Option<EntryId> {
        self.previous
    }
}

/// Identity of an entry at the moment a listener fires; entries may be
/// disposed by the time the listener runs, so this is a value copy.
#[derive(Clone, Debug)]
pub struct TrackEntrySnapshot {
    pub track_index: usize,
    pub animation_index: usize,
    pub animation_name: String,
    pub time: f32,
}

#[derive(Clone, Debug)]
pub enum AnimationStateEvent {
    Start,
    End,
    Complete { count: i32 },
    Event(Event),
}

pub trait TrackEntryListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

impl<F> TrackEntryListener for F
where
    F: FnMut(&mut AnimationState, &TrackEntrySnapshot, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event)
    }
}

pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

impl<F> AnimationStateListener for F
where
    F: FnMut(&mut AnimationState, &TrackEntrySnapshot, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event)
    }
}

/// A validated handle to a track entry; mutations go through the owning
/// state and are ignored once the entry has been disposed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrackEntryHandle {
    id: EntryId,
}

impl TrackEntryHandle {
    pub fn id(&self) -> EntryId {
        self.id
    }

    fn with_entry_mut(&self, state: &mut AnimationState, f: impl FnOnce(&mut TrackEntry)) {
        if let Some(entry) = state.entry_mut(self.id) {
            f(entry);
        }
    }

    pub fn set_listener<L: TrackEntryListener + 'static>(
        &self,
        state: &mut AnimationState,
        listener: L,
    ) {
        self.with_entry_mut(state, |entry| entry.listener = Some(Box::new(listener)));
    }

    pub fn set_time_scale(&self, state: &mut AnimationState, time_scale: f32) {
        self.with_entry_mut(state, |entry| entry.time_scale = time_scale);
    }

    pub fn set_mix(&self, state: &mut AnimationState, mix: f32) {
        self.with_entry_mut(state, |entry| entry.mix = mix);
    }

    pub fn set_delay(&self, state: &mut AnimationState, delay: f32) {
        self.with_entry_mut(state, |entry| entry.delay = delay);
    }

    pub fn set_time(&self, state: &mut AnimationState, time: f32) {
        self.with_entry_mut(state, |entry| entry.time = time);
    }

    pub fn set_end_time(&self, state: &mut AnimationState, end_time: f32) {
        self.with_entry_mut(state, |entry| entry.end_time = end_time);
    }
}

#[derive(Default)]
struct Track {
    current: Option<EntryId>,
    queue: VecDeque<EntryId>,
}

/// Multi-track animation mixer: advances track times, applies active entries
/// to a skeleton with crossfades, and dispatches playback events.
pub struct AnimationState {
    pub data: AnimationStateData,
    tracks: Vec<Track>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    pub time_scale: f32,
    listener: Option<Box<dyn AnimationStateListener>>,
    events: Vec<Event>,
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            time_scale: 1.0,
            listener: None,
            events: Vec::new(),
        }
    }

    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    // ----- entry slab -------------------------------------------------------

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index: self.entries.len() - 1,
                generation: 0,
            }
        }
    }

    /// Frees an entry and, recursively, the crossfade chain it owns.
    fn dispose_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        let Some(entry) = slot.entry.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        if let Some(previous) = entry.previous {
            self.dispose_entry(previous);
        }
    }

    pub fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn ensure_track(&mut self, index: usize) {
        if index >= self.tracks.len() {
            self.tracks.resize_with(index + 1, Track::default);
        }
    }

    fn track_current(&self, index: usize) -> Option<EntryId> {
        self.tracks.get(index).and_then(|t| t.current)
    }

    // ----- listeners --------------------------------------------------------

    fn snapshot(&self, id: EntryId, track_index: usize) -> Option<TrackEntrySnapshot> {
        let entry = self.entry(id)?;
        let animation_name = self
            .data
            .skeleton_data
            .animations
            .get(entry.animation_index)
            .map(|a| a.name.clone())
            .unwrap_or_default();
        Some(TrackEntrySnapshot {
            track_index,
            animation_index: entry.animation_index,
            animation_name,
            time: entry.time,
        })
    }

    fn fire_entry_listener(
        &mut self,
        id: EntryId,
        track_index: usize,
        event: &AnimationStateEvent,
    ) {
        let Some(snapshot) = self.snapshot(id, track_index) else {
            return;
        };
        let listener = self.entry_mut(id).and_then(|e| e.listener.take());
        if let Some(mut listener) = listener {
            listener.on_event(self, &snapshot, event);
            if let Some(entry) = self.entry_mut(id) {
                if entry.listener.is_none() {
                    entry.listener = Some(listener);
                }
            }
        }
    }

    fn fire_state_listener(
        &mut self,
        id: EntryId,
        track_index: usize,
        event: &AnimationStateEvent,
    ) {
        let Some(snapshot) = self.snapshot(id, track_index) else {
            return;
        };
        if let Some(mut listener) = self.listener.take() {
            listener.on_event(self, &snapshot, event);
            if self.listener.is_none() {
                self.listener = Some(listener);
            }
        }
    }

    fn fire_end(&mut self, id: EntryId, track_index: usize) {
        self.fire_entry_listener(id, track_index, &AnimationStateEvent::End);
        self.fire_state_listener(id, track_index, &AnimationStateEvent::End);
    }

    // ----- track control ----------------------------------------------------

    /// Sets the current animation on a track, discarding any queued entries.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let Some((animation_index, _)) = self.data.skeleton_data.find_animation(animation_name)
        else {
            return Err(Error::UnknownAnimation {
                name: animation_name.to_string(),
            });
        };
        Ok(self.set_animation_by_index(track_index, animation_index, looped))
    }

    pub fn set_animation_by_index(
        &mut self,
        track_index: usize,
        animation_index: usize,
        looped: bool,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);

        let queued = self.tracks[track_index]
            .queue
            .drain(..)
            .collect::<Vec<_>>();
        for id in queued {
            self.dispose_entry(id);
        }

        let duration = self
            .data
            .skeleton_data
            .animations
            .get(animation_index)
            .map(|a| a.duration)
            .unwrap_or(0.0);
        let entry_id = self.alloc_entry(TrackEntry::new(animation_index, looped, duration));
        self.set_current(track_index, entry_id);
        TrackEntryHandle { id: entry_id }
    }

    /// Queues an animation after the current or last queued entry. A delay of
    /// zero or less makes it start just before the previous entry ends, by
    /// the crossfade duration.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let Some((animation_index, _)) = self.data.skeleton_data.find_animation(animation_name)
        else {
            return Err(Error::UnknownAnimation {
                name: animation_name.to_string(),
            });
        };
        Ok(self.add_animation_by_index(track_index, animation_index, looped, delay))
    }

    pub fn add_animation_by_index(
        &mut self,
        track_index: usize,
        animation_index: usize,
        looped: bool,
        delay: f32,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);

        let last = {
            let track = &self.tracks[track_index];
            track.queue.back().copied().or(track.current)
        };

        let duration = self
            .data
            .skeleton_data
            .animations
            .get(animation_index)
            .map(|a| a.duration)
            .unwrap_or(0.0);
        let entry_id = self.alloc_entry(TrackEntry::new(animation_index, looped, duration));

        let mut delay = delay;
        if delay <= 0.0 {
            delay = match last.and_then(|id| self.entry(id)) {
                Some(last_entry) => {
                    delay + last_entry.end_time
                        - self
                            .data
                            .mix_duration(last_entry.animation_index, animation_index)
                }
                None => 0.0,
            };
        }
        if let Some(entry) = self.entry_mut(entry_id) {
            entry.delay = delay;
        }

        if last.is_none() {
            self.tracks[track_index].current = Some(entry_id);
        } else {
            self.tracks[track_index].queue.push_back(entry_id);
        }
        TrackEntryHandle { id: entry_id }
    }

    /// Installs an entry as a track's current animation, arranging the
    /// crossfade from the entry it replaces.
    fn set_current(&mut self, track_index: usize, entry_id: EntryId) {
        self.ensure_track(track_index);

        if let Some(current_id) = self.tracks[track_index].current {
            let previous = self.entry_mut(current_id).and_then(|c| c.previous.take());
            self.fire_end(current_id, track_index);

            let mix_duration = match (
                self.entry(current_id).map(|e| e.animation_index),
                self.entry(entry_id).map(|e| e.animation_index),
            ) {
                (Some(from), Some(to)) => self.data.mix_duration(from, to),
                _ => 0.0,
            };
            if let Some(entry) = self.entry_mut(entry_id) {
                entry.mix_duration = mix_duration;
            }

            let mut dispose_current = false;
            let mut dispose_previous = previous;
            if mix_duration > 0.0 {
                if let Some(entry) = self.entry_mut(entry_id) {
                    entry.mix_time = 0.0;
                }
                // If a crossfade is still in its first half, keep fading from
                // the closer animation.
                let keep_fading_previous = previous.is_some()
                    && self
                        .entry(current_id)
                        .is_some_and(|c| c.mix_duration > 0.0 && c.mix_time / c.mix_duration < 0.5);
                if keep_fading_previous {
                    if let Some(entry) = self.entry_mut(entry_id) {
                        entry.previous = previous;
                    }
                    dispose_previous = None;
                    dispose_current = true;
                } else if let Some(entry) = self.entry_mut(entry_id) {
                    entry.previous = Some(current_id);
                }
            } else {
                dispose_current = true;
            }

            if dispose_current {
                self.dispose_entry(current_id);
            }
            if let Some(previous) = dispose_previous {
                self.dispose_entry(previous);
            }
        }

        self.tracks[track_index].current = Some(entry_id);

        self.fire_entry_listener(entry_id, track_index, &AnimationStateEvent::Start);
        if self.track_current(track_index) != Some(entry_id) {
            // The listener replaced the entry; stop processing.
            return;
        }
        self.fire_state_listener(entry_id, track_index, &AnimationStateEvent::Start);
    }

    pub fn get_current(&self, track_index: usize) -> Option<&TrackEntry> {
        let id = self.track_current(track_index)?;
        self.entry(id)
    }

    pub fn current_handle(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.track_current(track_index).map(|id| TrackEntryHandle { id })
    }

    pub fn with_track_entry<R>(
        &self,
        track_index: usize,
        f: impl FnOnce(&TrackEntry) -> R,
    ) -> Option<R> {
        self.get_current(track_index).map(f)
    }

    /// Removes a track's entries, firing `End` synchronously.
    pub fn clear_track(&mut self, track_index: usize) {
        let Some(current_id) = self.track_current(track_index) else {
            return;
        };
        self.fire_end(current_id, track_index);

        if let Some(track) = self.tracks.get_mut(track_index) {
            track.current = None;
        }
        self.dispose_entry(current_id);
        let queued = self
            .tracks
            .get_mut(track_index)
            .map(|t| t.queue.drain(..).collect::<Vec<_>>())
            .unwrap_or_default();
        for id in queued {
            self.dispose_entry(id);
        }
    }

    pub fn clear_tracks(&mut self) {
        for index in 0..self.tracks.len() {
            self.clear_track(index);
        }
        self.tracks.clear();
    }

    // ----- per-frame --------------------------------------------------------

    /// Advances track times by `delta`, promoting queued entries and clearing
    /// finished non-looping tracks.
    pub fn update(&mut self, delta: f32) {
        let delta = delta * self.time_scale;

        let mut track_index = 0;
        while track_index < self.tracks.len() {
            let index = track_index;
            track_index += 1;

            let Some(current_id) = self.tracks[index].current else {
                continue;
            };

            let advanced = self.entry_mut(current_id).map(|current| {
                current.time += delta * current.time_scale;
                (
                    current.last_time,
                    current.end_time,
                    current.looped,
                    current.previous,
                )
            });
            let Some((last_time, end_time, looped, previous)) = advanced else {
                self.tracks[index].current = None;
                continue;
            };

            if let Some(previous_id) = previous {
                let previous_delta =
                    delta * self.entry(previous_id).map(|p| p.time_scale).unwrap_or(1.0);
                if let Some(previous) = self.entry_mut(previous_id) {
                    previous.time += previous_delta;
                }
                if let Some(current) = self.entry_mut(current_id) {
                    current.mix_time += previous_delta;
                }
            }

            if let Some(&next_id) = self.tracks[index].queue.front() {
                let next_time =
                    last_time - self.entry(next_id).map(|n| n.delay).unwrap_or(0.0);
                if let Some(next) = self.entry_mut(next_id) {
                    next.time = next_time;
                }
                if next_time >= 0.0 {
                    self.tracks[index].queue.pop_front();
                    self.set_current(index, next_id);
                }
            } else if !looped && last_time >= end_time {
                // A finished non-looping animation with nothing queued frees
                // its track.
                self.clear_track(index);
            }
        }
    }

    /// Applies each track's active entries to the skeleton, crossfading from
    /// `previous` entries and dispatching collected events.
    pub fn apply(&mut self, skeleton: &mut Skeleton) {
        let data = Arc::clone(&self.data.skeleton_data);

        let mut track_index = 0;
        while track_index < self.tracks.len() {
            let index = track_index;
            track_index += 1;

            let Some(current_id) = self.tracks[index].current else {
                continue;
            };

            let mut events = std::mem::take(&mut self.events);
            events.clear();

            let (animation_index, mut time, last_time, looped, end_time, mix, previous) = {
                let Some(current) = self.entry(current_id) else {
                    continue;
                };
                (
                    current.animation_index,
                    current.time,
                    current.last_time,
                    current.looped,
                    current.end_time,
                    current.mix,
                    current.previous,
                )
            };
            let Some(animation) = data.animations.get(animation_index) else {
                continue;
            };
            if !looped && time > end_time {
                time = end_time;
            }

            match previous {
                None => {
                    animation.mix(skeleton, last_time, time, looped, Some(&mut events), mix);
                }
                Some(previous_id) => {
                    let (mix_time, mix_duration) = self
                        .entry(current_id)
                        .map(|c| (c.mix_time, c.mix_duration))
                        .unwrap_or((0.0, 0.0));
                    let mut alpha = if mix_duration > 0.0 {
                        mix_time / mix_duration * mix
                    } else {
                        mix
                    };

                    if let Some(previous_entry) = self.entry(previous_id) {
                        let mut previous_time = previous_entry.time;
                        if !previous_entry.looped && previous_time > previous_entry.end_time {
                            previous_time = previous_entry.end_time;
                        }
                        if let Some(previous_animation) =
                            data.animations.get(previous_entry.animation_index)
                        {
                            let previous_looped = previous_entry.looped;
                            previous_animation.apply(
                                skeleton,
                                previous_time,
                                previous_time,
                                previous_looped,
                                None,
                            );
                        }
                    }

                    if alpha >= 1.0 {
                        alpha = 1.0;
                        self.dispose_entry(previous_id);
                        if let Some(current) = self.entry_mut(current_id) {
                            current.previous = None;
                        }
                    }

                    animation.mix(skeleton, last_time, time, looped, Some(&mut events), alpha);
                }
            }

            let mut entry_changed = false;
            for event in events.drain(..) {
                let event = AnimationStateEvent::Event(event);
                self.fire_entry_listener(current_id, index, &event);
                if self.track_current(index) != Some(current_id) {
                    entry_changed = true;
                    break;
                }
                self.fire_state_listener(current_id, index, &event);
                if self.track_current(index) != Some(current_id) {
                    entry_changed = true;
                    break;
                }
            }
            self.events = events;
            if entry_changed {
                continue;
            }

            // Completion of the animation or of a loop iteration.
            let complete = if looped {
                last_time % end_time > time % end_time
            } else {
                last_time < end_time && time >= end_time
            };
            if complete {
                let count = if end_time > 0.0 {
                    (time / end_time) as i32
                } else {
                    1
                };
                let event = AnimationStateEvent::Complete { count };
                self.fire_entry_listener(current_id, index, &event);
                if self.track_current(index) != Some(current_id) {
                    continue;
                }
                self.fire_state_listener(current_id, index, &event);
                if self.track_current(index) != Some(current_id) {
                    continue;
                }
            }

            if let Some(current) = self.entry_mut(current_id) {
                current.last_time = current.time;
            }
        }
    }
}
