use reelforge::{
    AudioItem, DisplayTime, ItemId, ItemKind, RendererState, RenderScheduler, Rgba8, ShapeItem,
    ShapeKind, Surface, TimelineItem,
};

fn rect(id: u64, start: u64, stop: u64, layer: i32, color: Rgba8) -> TimelineItem {
    TimelineItem {
        id: ItemId(id),
        display: DisplayTime::new(start, stop).unwrap(),
        layer,
        kind: ItemKind::Shape(ShapeItem {
            shape: ShapeKind::Rect,
            x: 0,
            y: 0,
            width: 8,
            height: 8,
            color,
        }),
    }
}

const RED: Rgba8 = Rgba8::opaque(255, 0, 0);
const GREEN: Rgba8 = Rgba8::opaque(0, 255, 0);
const BLUE: Rgba8 = Rgba8::opaque(0, 0, 255);

#[test]
fn renderers_are_created_lazily() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 1000, 0, RED)]);

    let snap = scheduler.snapshot();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].state, RendererState::Uninitialized);
    assert_eq!(snap[0].generation, 0);

    let mut target = Surface::new(8, 8).unwrap();
    scheduler.render_frame(500, &mut target).unwrap();
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Prepared);
    assert_eq!(snap[0].generation, 1);
}

#[test]
fn value_equal_items_keep_their_renderer() {
    let item = rect(1, 0, 1000, 0, RED);
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(std::slice::from_ref(&item));

    let mut target = Surface::new(8, 8).unwrap();
    scheduler.render_frame(0, &mut target).unwrap();
    assert_eq!(scheduler.snapshot()[0].generation, 1);

    // Same value submitted again: nothing is destroyed or recreated.
    scheduler.set_items(&[item.clone()]);
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Prepared);
    assert_eq!(snap[0].generation, 1);

    scheduler.render_frame(1, &mut target).unwrap();
    assert_eq!(scheduler.snapshot()[0].generation, 1);
}

#[test]
fn changed_value_replaces_the_renderer() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 1000, 0, RED)]);

    let mut target = Surface::new(8, 8).unwrap();
    scheduler.render_frame(0, &mut target).unwrap();
    assert_eq!(scheduler.snapshot()[0].generation, 1);

    // Same id, different value: old renderer destroyed, a fresh one built
    // and entered before the next draw.
    scheduler.set_items(&[rect(1, 0, 1000, 0, GREEN)]);
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Uninitialized);
    assert_eq!(snap[0].generation, 0);

    scheduler.render_frame(1, &mut target).unwrap();
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Prepared);
    assert_eq!(snap[0].generation, 1);
    assert_eq!(target.pixel(0, 0), [0, 255, 0, 255]);
}

#[test]
fn inactive_items_leave_but_keep_their_renderer() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 1000, 0, RED)]);
    let mut target = Surface::new(8, 8).unwrap();

    scheduler.render_frame(500, &mut target).unwrap();
    assert_eq!(scheduler.snapshot()[0].state, RendererState::Prepared);

    // Past the window: released but not destroyed.
    scheduler.render_frame(1500, &mut target).unwrap();
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Uninitialized);
    assert_eq!(snap[0].generation, 1);

    // Scanning back re-enters the same renderer.
    scheduler.render_frame(500, &mut target).unwrap();
    let snap = scheduler.snapshot();
    assert_eq!(snap[0].state, RendererState::Prepared);
    assert_eq!(snap[0].generation, 1);
}

#[test]
fn leave_is_safe_before_enter_and_twice_after() {
    use reelforge::{ItemRenderer as _, build_renderer};

    let mut renderer = build_renderer(&rect(1, 0, 1000, 0, RED)).unwrap();
    // Never entered: leaving must be a no-op.
    renderer.leave_timeline();

    renderer.enter_timeline().unwrap();
    renderer.leave_timeline();
    renderer.leave_timeline();

    // Still usable after the double leave.
    renderer.enter_timeline().unwrap();
    let mut target = Surface::new(8, 8).unwrap();
    renderer.draw(&mut target, 0).unwrap();
    assert_eq!(target.pixel(0, 0), [255, 0, 0, 255]);

    // Repeated leave passes at the scheduler level keep the slot parked
    // in the released state rather than erroring.
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(2, 0, 1000, 0, BLUE)]);
    scheduler.render_frame(500, &mut target).unwrap();
    scheduler.render_frame(1500, &mut target).unwrap();
    scheduler.render_frame(1500, &mut target).unwrap();
    assert_eq!(scheduler.snapshot()[0].state, RendererState::Uninitialized);
}

#[test]
fn items_hand_off_at_the_window_boundary() {
    // A covers [0, 5000), B covers [5000, 10000).
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 5000, 0, RED), rect(2, 5000, 10_000, 0, BLUE)]);
    let mut target = Surface::new(8, 8).unwrap();

    let stats = scheduler.render_frame(4999, &mut target).unwrap();
    assert_eq!(stats.active, 1);
    assert_eq!(target.pixel(0, 0), [255, 0, 0, 255]);

    let stats = scheduler.render_frame(5000, &mut target).unwrap();
    assert_eq!(stats.active, 1);
    assert_eq!(target.pixel(0, 0), [0, 0, 255, 255]);

    let states: Vec<_> = scheduler.snapshot().iter().map(|s| s.state).collect();
    assert_eq!(
        states,
        vec![RendererState::Uninitialized, RendererState::Prepared]
    );
}

#[test]
fn draw_order_follows_layers_not_input_order() {
    // Input order 2, 0, 1; the layer-2 item must end up on top.
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[
        rect(1, 0, 1000, 2, GREEN),
        rect(2, 0, 1000, 0, RED),
        rect(3, 0, 1000, 1, BLUE),
    ]);
    let mut target = Surface::new(8, 8).unwrap();
    let stats = scheduler.render_frame(0, &mut target).unwrap();
    assert_eq!(stats.drawn, 3);
    assert_eq!(target.pixel(4, 4), [0, 255, 0, 255]);
}

#[test]
fn removed_items_are_destroyed() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 1000, 0, RED), rect(2, 0, 1000, 0, BLUE)]);
    let mut target = Surface::new(8, 8).unwrap();
    scheduler.render_frame(0, &mut target).unwrap();

    scheduler.set_items(&[rect(2, 0, 1000, 0, BLUE)]);
    let snap = scheduler.snapshot();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].id, ItemId(2));
    assert_eq!(snap[0].state, RendererState::Prepared);
}

#[test]
fn audio_items_get_no_slot() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[
        rect(1, 0, 1000, 0, RED),
        TimelineItem {
            id: ItemId(2),
            display: DisplayTime::new(0, 1000).unwrap(),
            layer: 0,
            kind: ItemKind::Audio(AudioItem {
                source: "tone.wav".into(),
                crop_offset_ms: 0,
                volume: 1.0,
            }),
        },
    ]);
    let snap = scheduler.snapshot();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].id, ItemId(1));
}

#[test]
fn destroy_all_empties_the_arena() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 1000, 0, RED)]);
    let mut target = Surface::new(8, 8).unwrap();
    scheduler.render_frame(0, &mut target).unwrap();

    scheduler.destroy_all();
    assert!(scheduler.snapshot().is_empty());
}

#[test]
fn target_is_cleared_between_frames() {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(&[rect(1, 0, 100, 0, RED)]);
    let mut target = Surface::new(8, 8).unwrap();

    scheduler.render_frame(0, &mut target).unwrap();
    assert_eq!(target.pixel(0, 0), [255, 0, 0, 255]);

    // Nothing active: the previous frame's pixels must not survive.
    scheduler.render_frame(500, &mut target).unwrap();
    assert_eq!(target.pixel(0, 0), [0, 0, 0, 0]);
}
