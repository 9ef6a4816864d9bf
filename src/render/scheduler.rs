use rayon::prelude::*;

use crate::foundation::core::TimeMs;
use crate::foundation::error::ForgeResult;
use crate::render::renderer::{ItemRenderer, RendererState, build_renderer};
use crate::render::surface::Surface;
use crate::timeline::model::{ItemId, TimelineItem};

/// Per-frame counters reported by [`RenderScheduler::render_frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Items whose display window contains the query time.
    pub active: usize,
    /// Active items that drew successfully.
    pub drawn: usize,
    /// Active items skipped this pass (enter/pre-draw/draw failure).
    pub skipped: usize,
}

/// Observable state of one scheduler slot, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub id: ItemId,
    pub state: RendererState,
    /// Bumped every time a renderer is (re)built for this item. Unchanged
    /// generation across `set_items` calls proves reuse.
    pub generation: u64,
}

struct Slot {
    item: TimelineItem,
    renderer: Option<Box<dyn ItemRenderer>>,
    state: RendererState,
    generation: u64,
    /// Item failed enter/pre-draw for the current frame only.
    skip_pass: bool,
}

impl Slot {
    fn new(item: TimelineItem) -> Self {
        Self {
            item,
            renderer: None,
            state: RendererState::Uninitialized,
            generation: 0,
            skip_pass: false,
        }
    }

    fn force_leave(&mut self) {
        if let Some(r) = self.renderer.as_mut() {
            r.leave_timeline();
        }
        self.state = RendererState::Uninitialized;
    }
}

/// Exclusive owner of all live item renderers.
///
/// Renderers are created lazily the first time their item is queried as
/// active (hardware decoders are scarce; a timeline can reference more
/// sources than the device can hold open), reused while the item value is
/// unchanged, and destroyed when the item leaves the set or its value
/// changes.
#[derive(Default)]
pub struct RenderScheduler {
    slots: Vec<Slot>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the item set, diffing against the previous one.
    ///
    /// Value-equal items keep their renderer and lifecycle state untouched
    /// (reuse law); changed items get their old renderer destroyed and a
    /// fresh one built on next activation (replacement law); absent items
    /// are destroyed immediately. Audio-only items carry no renderer and are
    /// ignored here.
    pub fn set_items(&mut self, items: &[TimelineItem]) {
        let mut old: Vec<Option<Slot>> = self.slots.drain(..).map(Some).collect();
        let mut next = Vec::with_capacity(items.len());

        for item in items.iter().filter(|i| i.has_canvas_output()) {
            let previous = old
                .iter_mut()
                .find(|s| s.as_ref().is_some_and(|s| s.item.id == item.id))
                .and_then(Option::take);

            match previous {
                Some(slot)
                    if slot
                        .renderer
                        .as_ref()
                        .map(|r| r.is_equals(item))
                        .unwrap_or(slot.item == *item) =>
                {
                    next.push(slot);
                }
                Some(mut slot) => {
                    // Value changed: no partial reuse across value changes.
                    slot.force_leave();
                    drop(slot);
                    next.push(Slot::new(item.clone()));
                }
                None => next.push(Slot::new(item.clone())),
            }
        }

        for mut stale in old.into_iter().flatten() {
            stale.force_leave();
        }
        self.slots = next;
    }

    /// Composite every item active at `t` onto `target`.
    ///
    /// Stage order is fixed: leave-inactive and enter-active fan out in
    /// parallel across items (their resources are disjoint), `pre_draw` runs
    /// in parallel, then draws run sequentially in ascending layer order
    /// against the one shared target (ties keep input order).
    ///
    /// Per-item failures are absorbed here: the item is skipped for this
    /// pass and logged, never propagated as a pipeline failure.
    pub fn render_frame(&mut self, t: TimeMs, target: &mut Surface) -> ForgeResult<FrameStats> {
        for slot in &mut self.slots {
            slot.skip_pass = false;
        }

        // Release renderers whose window no longer covers `t`. They stay in
        // the arena so the item can re-enter later in the scan.
        self.slots.par_iter_mut().for_each(|slot| {
            if slot.state == RendererState::Prepared && !slot.item.is_active(t) {
                slot.force_leave();
            }
        });

        // Lazily build + enter renderers for newly active items.
        self.slots.par_iter_mut().for_each(|slot| {
            if !slot.item.is_active(t) {
                return;
            }
            if slot.renderer.is_none() {
                match build_renderer(&slot.item) {
                    Ok(r) => {
                        slot.renderer = Some(r);
                        slot.generation += 1;
                    }
                    Err(e) => {
                        tracing::warn!(item = slot.item.id.0, error = %e, "skipping item: renderer construction failed");
                        slot.skip_pass = true;
                        return;
                    }
                }
            }
            if slot.state == RendererState::Uninitialized
                && let Some(r) = slot.renderer.as_mut()
            {
                match r.enter_timeline() {
                    Ok(()) => slot.state = RendererState::Prepared,
                    Err(e) => {
                        tracing::warn!(item = slot.item.id.0, error = %e, "skipping item: enter_timeline failed");
                        slot.renderer = None;
                        slot.skip_pass = true;
                    }
                }
            }
        });

        // Per-frame preparation (decode I/O lives here, not in draw).
        self.slots.par_iter_mut().for_each(|slot| {
            if slot.state != RendererState::Prepared || slot.skip_pass || !slot.item.is_active(t) {
                return;
            }
            if let Some(r) = slot.renderer.as_mut()
                && let Err(e) = r.pre_draw(t)
            {
                tracing::warn!(item = slot.item.id.0, error = %e, "skipping item: pre_draw failed");
                slot.skip_pass = true;
            }
        });

        target.clear();

        let mut order: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].item.is_active(t))
            .collect();
        // Stable sort: equal layers keep input order.
        order.sort_by_key(|&i| self.slots[i].item.layer);

        let mut stats = FrameStats {
            active: order.len(),
            ..FrameStats::default()
        };
        for i in order {
            let slot = &mut self.slots[i];
            if slot.skip_pass || slot.state != RendererState::Prepared {
                stats.skipped += 1;
                continue;
            }
            let Some(r) = slot.renderer.as_mut() else {
                stats.skipped += 1;
                continue;
            };
            match r.draw(target, t) {
                Ok(()) => stats.drawn += 1,
                Err(e) => {
                    tracing::warn!(item = slot.item.id.0, error = %e, "skipping item: draw failed");
                    stats.skipped += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Force `leave_timeline` on everything and drop all slots. Called at
    /// pipeline teardown so no decoder handles outlive the export.
    pub fn destroy_all(&mut self) {
        for mut slot in self.slots.drain(..) {
            slot.force_leave();
        }
    }

    /// Snapshot of slot lifecycle state, in item order.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .map(|s| SlotSnapshot {
                id: s.item.id,
                state: s.state,
                generation: s.generation,
            })
            .collect()
    }
}
