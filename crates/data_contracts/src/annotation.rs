use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mask-wearing status attached to every annotated face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskClass {
    MaskWornIncorrectly,
    WithMask,
    WithoutMask,
}

impl MaskClass {
    /// All classes in label order.
    pub const ALL: [MaskClass; 3] = [
        MaskClass::MaskWornIncorrectly,
        MaskClass::WithMask,
        MaskClass::WithoutMask,
    ];

    /// Detector label; `0` is reserved for background.
    pub fn label(self) -> u32 {
        match self {
            MaskClass::MaskWornIncorrectly => 1,
            MaskClass::WithMask => 2,
            MaskClass::WithoutMask => 3,
        }
    }

    pub fn from_label(label: u32) -> Option<Self> {
        match label {
            1 => Some(MaskClass::MaskWornIncorrectly),
            2 => Some(MaskClass::WithMask),
            3 => Some(MaskClass::WithoutMask),
            _ => None,
        }
    }

    /// Zero-based class id used in YOLO label files.
    pub fn yolo_id(self) -> u32 {
        self.label() - 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaskClass::MaskWornIncorrectly => "mask_worn_incorrectly",
            MaskClass::WithMask => "with_mask",
            MaskClass::WithoutMask => "without_mask",
        }
    }
}

impl fmt::Display for MaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "with_mask" => Ok(MaskClass::WithMask),
            "without_mask" => Ok(MaskClass::WithoutMask),
            // Older exports of the dataset use the misspelled name.
            "mask_worn_incorrectly" | "mask_weared_incorrect" => {
                Ok(MaskClass::MaskWornIncorrectly)
            }
            other => Err(ValidationError::UnknownClass(other.to_string())),
        }
    }
}

/// Axis-aligned box in pixel coordinates, `[xmin, ymin, xmax, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxXyxy {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoxXyxy {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn from_array(b: [f32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    /// Area; zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_well_formed(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && self.xmax > self.xmin
            && self.ymax > self.ymin
    }

    /// Intersection over union. Returns 0 when the union is empty.
    pub fn iou(&self, other: &BoxXyxy) -> f32 {
        let inter_w = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let inter_h = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One labelled face box inside one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub image_id: String,
    pub image_width: u32,
    pub image_height: u32,
    pub bbox: BoxXyxy,
    pub class: MaskClass,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    /// Center/size normalized to the image, as YOLO expects.
    pub fn normalized_cxcywh(&self) -> [f32; 4] {
        let w = self.image_width as f32;
        let h = self.image_height as f32;
        [
            (self.bbox.xmin + self.bbox.xmax) / 2.0 / w,
            (self.bbox.ymin + self.bbox.ymax) / 2.0 / h,
            self.bbox.width() / w,
            self.bbox.height() / h,
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.image_id.trim().is_empty() {
            return Err(ValidationError::MissingImageId);
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ValidationError::InvalidImageSize(
                self.image_width,
                self.image_height,
            ));
        }
        if !self.bbox.is_well_formed() {
            return Err(ValidationError::InvalidBbox(self.bbox.to_array()));
        }
        if self.bbox.xmax > self.image_width as f32 || self.bbox.ymax > self.image_height as f32 {
            return Err(ValidationError::BboxOutOfBounds {
                bbox: self.bbox.to_array(),
                width: self.image_width,
                height: self.image_height,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown class name {0:?}")]
    UnknownClass(String),
    #[error("detection has an empty image id")]
    MissingImageId,
    #[error("invalid image size {0}x{1}")]
    InvalidImageSize(u32, u32),
    #[error("bbox invalid order or non-finite: {0:?}")]
    InvalidBbox([f32; 4]),
    #[error("bbox {bbox:?} exceeds image bounds {width}x{height}")]
    BboxOutOfBounds {
        bbox: [f32; 4],
        width: u32,
        height: u32,
    },
    #[error("unknown label id {0}")]
    UnknownLabel(u32),
    #[error("prediction columns differ in length: boxes={boxes}, scores={scores}, labels={labels}")]
    LengthMismatch {
        boxes: usize,
        scores: usize,
        labels: usize,
    },
    #[error("ground truth columns differ in length: boxes={boxes}, labels={labels}")]
    GroundTruthLengthMismatch { boxes: usize, labels: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_class_name_is_normalized() {
        let class: MaskClass = "mask_weared_incorrect".parse().unwrap();
        assert_eq!(class, MaskClass::MaskWornIncorrectly);
        assert_eq!(class.to_string(), "mask_worn_incorrectly");
    }

    #[test]
    fn labels_follow_alphabetical_encoding() {
        assert_eq!(MaskClass::MaskWornIncorrectly.label(), 1);
        assert_eq!(MaskClass::WithMask.label(), 2);
        assert_eq!(MaskClass::WithoutMask.label(), 3);
        assert_eq!(MaskClass::WithoutMask.yolo_id(), 2);
        assert_eq!(MaskClass::from_label(0), None);
        for class in MaskClass::ALL {
            assert_eq!(MaskClass::from_label(class.label()), Some(class));
        }
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoxXyxy::new(0.0, 0.0, 10.0, 10.0);
        let b = BoxXyxy::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let half = BoxXyxy::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let empty = BoxXyxy::new(3.0, 3.0, 3.0, 3.0);
        assert_eq!(empty.area(), 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }
}
