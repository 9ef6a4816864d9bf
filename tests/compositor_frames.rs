use reelforge::{
    DisplayTime, EffectItem, ItemId, ItemKind, RegionPx, RenderScheduler, Rgba8, ShapeItem,
    ShapeKind, Surface, TimelineItem,
};

fn shape(id: u64, kind: ShapeKind, x: i64, y: i64, w: u32, h: u32, color: Rgba8) -> TimelineItem {
    TimelineItem {
        id: ItemId(id),
        display: DisplayTime::new(0, 1000).unwrap(),
        layer: 0,
        kind: ItemKind::Shape(ShapeItem {
            shape: kind,
            x,
            y,
            width: w,
            height: h,
            color,
        }),
    }
}

fn effect(id: u64, layer: i32, source: &str, region: Option<RegionPx>) -> TimelineItem {
    TimelineItem {
        id: ItemId(id),
        display: DisplayTime::new(0, 1000).unwrap(),
        layer,
        kind: ItemKind::Effect(EffectItem {
            source: source.to_owned(),
            region,
        }),
    }
}

fn render(items: &[TimelineItem], size: u32, t: u64) -> Surface {
    let mut scheduler = RenderScheduler::new();
    scheduler.set_items(items);
    let mut target = Surface::new(size, size).unwrap();
    scheduler.render_frame(t, &mut target).unwrap();
    scheduler.destroy_all();
    target
}

#[test]
fn ellipse_misses_the_rect_corners() {
    let target = render(
        &[shape(1, ShapeKind::Ellipse, 0, 0, 16, 16, Rgba8::opaque(255, 0, 0))],
        16,
        0,
    );
    assert_eq!(target.pixel(8, 8), [255, 0, 0, 255]);
    assert_eq!(target.pixel(0, 0), [0, 0, 0, 0]);
    assert_eq!(target.pixel(15, 15), [0, 0, 0, 0]);
}

#[test]
fn translucent_shape_blends_over_opaque_one() {
    let mut semi = Rgba8::opaque(0, 0, 255);
    semi.a = 128;
    let mut items = vec![
        shape(1, ShapeKind::Rect, 0, 0, 8, 8, Rgba8::opaque(255, 0, 0)),
        shape(2, ShapeKind::Rect, 0, 0, 8, 8, semi),
    ];
    items[1].layer = 1;
    let target = render(&items, 8, 0);

    let px = target.pixel(4, 4);
    assert_eq!(px[3], 255);
    // Roughly half red half blue after the premultiplied over.
    assert!(px[0] > 100 && px[0] < 140, "r = {}", px[0]);
    assert!(px[2] > 100 && px[2] < 140, "b = {}", px[2]);
    assert_eq!(px[1], 0);
}

#[test]
fn grayscale_effect_flattens_layers_below() {
    let items = vec![
        shape(1, ShapeKind::Rect, 0, 0, 8, 8, Rgba8::opaque(255, 0, 0)),
        effect(2, 1, "grayscale", None),
    ];
    let target = render(&items, 8, 0);
    let px = target.pixel(4, 4);
    assert_eq!(px[0], px[1]);
    assert_eq!(px[1], px[2]);
    assert_eq!(px[3], 255);
}

#[test]
fn effect_region_limits_the_damage() {
    let items = vec![
        shape(1, ShapeKind::Rect, 0, 0, 16, 16, Rgba8::opaque(255, 0, 0)),
        effect(
            2,
            1,
            "invert",
            Some(RegionPx {
                x: 0,
                y: 0,
                width: 8,
                height: 16,
            }),
        ),
    ];
    let target = render(&items, 16, 0);
    // Left half inverted (red -> cyan), right half untouched.
    assert_eq!(target.pixel(2, 8), [0, 255, 255, 255]);
    assert_eq!(target.pixel(12, 8), [255, 0, 0, 255]);
}

#[test]
fn effect_below_an_item_does_not_touch_it() {
    let mut items = vec![
        effect(1, 0, "invert", None),
        shape(2, ShapeKind::Rect, 0, 0, 8, 8, Rgba8::opaque(255, 0, 0)),
    ];
    items[1].layer = 1;
    let target = render(&items, 8, 0);
    // Draw order is by layer: the rect lands after the inversion pass.
    assert_eq!(target.pixel(4, 4), [255, 0, 0, 255]);
}

#[test]
fn offscreen_shape_clips_cleanly() {
    let target = render(
        &[shape(1, ShapeKind::Rect, -4, -4, 8, 8, Rgba8::opaque(0, 255, 0))],
        8,
        0,
    );
    assert_eq!(target.pixel(3, 3), [0, 255, 0, 255]);
    assert_eq!(target.pixel(4, 4), [0, 0, 0, 0]);
}

#[test]
fn frame_outside_every_window_is_transparent() {
    let target = render(
        &[shape(1, ShapeKind::Rect, 0, 0, 8, 8, Rgba8::opaque(255, 0, 0))],
        8,
        1000,
    );
    assert!(target.data().iter().all(|&b| b == 0));
}
