use data_contracts::{BoxXyxy, GroundTruth, MaskClass, Prediction};
use image::{Rgba, RgbaImage};

pub const PRED_WITH_MASK: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const PRED_OTHER: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const GT_WITH_MASK: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const GT_OTHER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Round a pixel-space box to integer corners, clamped to image bounds.
pub fn clamp_box(bbox: BoxXyxy, dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 || !bbox.is_well_formed() {
        return None;
    }
    if bbox.xmax < 0.0 || bbox.ymax < 0.0 || bbox.xmin > w as f32 || bbox.ymin > h as f32 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.round().max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(bbox.xmin, w);
    let y0 = clamp(bbox.ymin, h);
    let x1 = clamp(bbox.xmax, w);
    let y1 = clamp(bbox.ymax, h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Draw a rectangle border with given thickness.
pub fn draw_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn is_with_mask(label: u32) -> bool {
    MaskClass::from_label(label) == Some(MaskClass::WithMask)
}

pub fn prediction_color(label: u32) -> Rgba<u8> {
    if is_with_mask(label) {
        PRED_WITH_MASK
    } else {
        PRED_OTHER
    }
}

pub fn ground_truth_color(label: u32) -> Rgba<u8> {
    if is_with_mask(label) {
        GT_WITH_MASK
    } else {
        GT_OTHER
    }
}

/// Draw ground truth first, then predictions on top. Returns the number of
/// boxes drawn; boxes entirely outside the image are skipped.
pub fn render_overlay(
    img: &mut RgbaImage,
    prediction: &Prediction,
    ground_truth: &GroundTruth,
    thickness: u32,
) -> usize {
    let dims = img.dimensions();
    let mut drawn = 0;
    for (bbox, &label) in ground_truth.boxes.iter().zip(&ground_truth.labels) {
        if let Some(px) = clamp_box(*bbox, dims) {
            draw_rect(img, px, ground_truth_color(label), thickness);
            drawn += 1;
        }
    }
    for (bbox, &label) in prediction.boxes.iter().zip(&prediction.labels) {
        if let Some(px) = clamp_box(*bbox, dims) {
            draw_rect(img, px, prediction_color(label), thickness);
            drawn += 1;
        }
    }
    drawn
}
