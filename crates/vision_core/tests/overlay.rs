use data_contracts::{BoxXyxy, GroundTruth, Prediction};
use vision_core::overlay::{
    clamp_box, draw_rect, render_overlay, GT_OTHER, GT_WITH_MASK, PRED_OTHER, PRED_WITH_MASK,
};

#[test]
fn clamp_and_draw_box() {
    let bbox = clamp_box(BoxXyxy::new(10.2, 40.0, 30.0, 80.4), (100, 200)).expect("bbox");
    assert_eq!(bbox, [10, 40, 30, 80]);

    let mut img = image::RgbaImage::new(40, 40);
    draw_rect(&mut img, [5, 5, 10, 10], image::Rgba([255, 0, 0, 255]), 2);
    // Expect the four corners to be colored.
    assert_eq!(img.get_pixel(5, 5), &image::Rgba([255, 0, 0, 255]));
    assert_eq!(img.get_pixel(10, 5), &image::Rgba([255, 0, 0, 255]));
    assert_eq!(img.get_pixel(5, 10), &image::Rgba([255, 0, 0, 255]));
    assert_eq!(img.get_pixel(10, 10), &image::Rgba([255, 0, 0, 255]));
    // Interior stays untouched.
    assert_eq!(img.get_pixel(8, 8), &image::Rgba([0, 0, 0, 0]));
}

#[test]
fn clamp_pulls_spilling_boxes_inside_and_skips_outside_ones() {
    assert_eq!(
        clamp_box(BoxXyxy::new(-5.0, -5.0, 120.0, 50.0), (100, 60)),
        Some([0, 0, 99, 50])
    );
    assert_eq!(clamp_box(BoxXyxy::new(150.0, 10.0, 160.0, 20.0), (100, 60)), None);
    assert_eq!(clamp_box(BoxXyxy::new(10.0, 10.0, 5.0, 20.0), (100, 60)), None);
}

#[test]
fn overlay_colors_follow_class_and_source() {
    let mut img = image::RgbaImage::new(64, 64);
    let gt = GroundTruth {
        boxes: vec![BoxXyxy::new(2.0, 2.0, 12.0, 12.0), BoxXyxy::new(40.0, 2.0, 50.0, 12.0)],
        labels: vec![2, 3],
    };
    let pred = Prediction::new(
        vec![BoxXyxy::new(2.0, 30.0, 12.0, 40.0), BoxXyxy::new(40.0, 30.0, 50.0, 40.0)],
        vec![0.9, 0.8],
        vec![2, 1],
    );
    let drawn = render_overlay(&mut img, &pred, &gt, 1);
    assert_eq!(drawn, 4);
    assert_eq!(img.get_pixel(2, 2), &GT_WITH_MASK);
    assert_eq!(img.get_pixel(40, 2), &GT_OTHER);
    assert_eq!(img.get_pixel(2, 30), &PRED_WITH_MASK);
    assert_eq!(img.get_pixel(40, 30), &PRED_OTHER);
}
