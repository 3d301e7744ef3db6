use embedded_graphics::prelude::Point;

use super::*;

#[test]
fn flip_horizontal_mirrors_columns() {
    let mut frame = Frame::new(3, 1);
    frame.set(0, 0, Color::RED);
    frame.set(2, 0, Color::BLUE);

    let flipped = frame.flip_horizontal();
    assert_eq!(flipped.get(0, 0), Color::BLUE);
    assert_eq!(flipped.get(1, 0), Color::BLACK);
    assert_eq!(flipped.get(2, 0), Color::RED);
    // the source frame is left alone
    assert_eq!(frame.get(0, 0), Color::RED);
}

#[test]
fn scale_to_height() {
    assert_eq!(
        Resolution::new(640, 480).scale_to_height(240),
        Resolution::new(320, 240)
    );
    assert_eq!(
        Resolution::new(1280, 720).scale_to_height(480),
        Resolution::new(853, 480)
    );
    assert_eq!(
        Resolution::new(1, 1000).scale_to_height(10),
        Resolution::new(1, 10)
    );
}

#[test]
fn hconcat_places_frames_side_by_side() {
    let mut a = Frame::new(2, 2);
    a.clear(Color::RED);
    let mut b = Frame::new(3, 1);
    b.clear(Color::GREEN);

    let out = Frame::hconcat(&[&a, &b]);
    assert_eq!(out.resolution(), Resolution::new(5, 2));
    assert_eq!(out.get(1, 1), Color::RED);
    assert_eq!(out.get(2, 0), Color::GREEN);
    // `b` is shorter, padding stays black
    assert_eq!(out.get(4, 1), Color::BLACK);
}

#[test]
fn to_0rgb() {
    let mut frame = Frame::new(1, 1);
    frame.set(0, 0, Color::from_rgb8(0x12, 0x34, 0x56));
    assert_eq!(frame.to_0rgb(), vec![0x00123456]);
}

#[test]
fn mask_to_frame() {
    let mut mask = Mask::new(2, 1);
    mask.set(1, 0);
    assert_eq!(mask.count_set(), 1);
    assert!(!mask.is_empty());

    let frame = mask.to_frame();
    assert_eq!(frame.get(0, 0), Color::BLACK);
    assert_eq!(frame.get(1, 0), Color::WHITE);
}

#[test]
fn fill_convex_square() {
    let mut mask = Mask::new(20, 20);
    let square = [
        Point::new(5, 5),
        Point::new(14, 5),
        Point::new(14, 14),
        Point::new(5, 14),
    ];
    draw::fill_convex(&mut mask, &square);

    assert_eq!(mask.get(10, 10), Mask::SET);
    assert_eq!(mask.get(7, 12), Mask::SET);
    assert_eq!(mask.get(2, 2), 0);
    assert_eq!(mask.get(17, 10), 0);
    assert!(mask.count_set() >= 64);
}

#[test]
fn fill_convex_degenerate_is_noop() {
    let mut mask = Mask::new(10, 10);
    draw::fill_convex(&mut mask, &[]);
    draw::fill_convex(&mut mask, &[Point::new(1, 1), Point::new(5, 5)]);
    assert!(mask.is_empty());
}

#[test]
fn polygon_outline_is_clipped() {
    let mut frame = Frame::new(10, 10);
    let points = [Point::new(-5, 2), Point::new(20, 2)];
    draw::polygon(&mut frame, &points).color(Color::GREEN);
    assert_eq!(frame.get(0, 2), Color::GREEN);
    assert_eq!(frame.get(9, 2), Color::GREEN);
    assert_eq!(frame.get(5, 5), Color::BLACK);
}
