//! Frame annotation for the UI snapshot path.
//!
//! Recognized faces get a green box labelled `ID <id> - <name>`, unknown
//! faces a red box labelled `Unknown`. Box and label-bar drawing is plain
//! pixel work so it is available in every build; glyph rendering uses
//! OpenCV when the feature is on and is skipped otherwise.

use argus_models::{BoundingBox, EmployeeId};

use crate::frame::Frame;

const GREEN: [u8; 3] = [0, 255, 0];
const RED: [u8; 3] = [0, 0, 255];
const BLACK: [u8; 3] = [0, 0, 0];
const BOX_THICKNESS: i64 = 2;
const LABEL_BAR_HEIGHT: i64 = 18;

/// Label for one face in a frame.
#[derive(Debug, Clone)]
pub struct FaceLabel {
    pub bbox: BoundingBox,
    /// Recognized identity, if any.
    pub employee: Option<(EmployeeId, String)>,
}

impl FaceLabel {
    /// Text shown above the box.
    pub fn text(&self) -> String {
        match &self.employee {
            Some((id, name)) => format!("ID {id} - {name}"),
            None => "Unknown".to_string(),
        }
    }
}

/// Draw boxes and labels onto a copy of `frame`.
pub fn annotate_frame(frame: &Frame, labels: &[FaceLabel]) -> Frame {
    let mut img = frame.clone();
    for label in labels {
        let color = if label.employee.is_some() { GREEN } else { RED };
        draw_rect(&mut img, &label.bbox, color);
        draw_label_bar(&mut img, &label.bbox);
        draw_label_text(&mut img, label, color);
    }
    img
}

fn draw_rect(img: &mut Frame, bbox: &BoundingBox, color: [u8; 3]) {
    let x1 = bbox.x as i64;
    let y1 = bbox.y as i64;
    let x2 = bbox.x2() as i64;
    let y2 = bbox.y2() as i64;
    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            img.put_pixel(x, y1 + t, color);
            img.put_pixel(x, y2 - t, color);
        }
        for y in y1..=y2 {
            img.put_pixel(x1 + t, y, color);
            img.put_pixel(x2 - t, y, color);
        }
    }
}

/// Filled black bar above the box where the label text goes.
fn draw_label_bar(img: &mut Frame, bbox: &BoundingBox) {
    let x1 = bbox.x as i64;
    let x2 = bbox.x2() as i64;
    let bar_bottom = (bbox.y as i64).max(LABEL_BAR_HEIGHT);
    let bar_top = bar_bottom - LABEL_BAR_HEIGHT;
    for y in bar_top..bar_bottom {
        for x in x1..=x2 {
            img.put_pixel(x, y, BLACK);
        }
    }
}

#[cfg(feature = "opencv")]
fn draw_label_text(img: &mut Frame, label: &FaceLabel, color: [u8; 3]) {
    use opencv::core::{Point, Scalar};
    use opencv::imgproc;
    use opencv::prelude::*;

    let mat = match Mat::from_slice(&img.data)
        .and_then(|m| m.reshape(3, img.height as i32)?.try_clone())
    {
        Ok(m) => m,
        Err(_) => return,
    };
    let mut mat = mat;
    let bar_bottom = (label.bbox.y as i32).max(LABEL_BAR_HEIGHT as i32);
    let org = Point::new(label.bbox.x as i32 + 3, bar_bottom - 5);
    let bgr = Scalar::new(f64::from(color[0]), f64::from(color[1]), f64::from(color[2]), 0.0);
    if imgproc::put_text(
        &mut mat,
        &label.text(),
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        bgr,
        1,
        imgproc::LINE_AA,
        false,
    )
    .is_ok()
    {
        if let Ok(bytes) = mat.data_bytes() {
            img.data.copy_from_slice(bytes);
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn draw_label_text(_img: &mut Frame, _label: &FaceLabel, _color: [u8; 3]) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_text() {
        let known = FaceLabel {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            employee: Some((7, "Ayu".to_string())),
        };
        assert_eq!(known.text(), "ID 7 - Ayu");
        let unknown = FaceLabel {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            employee: None,
        };
        assert_eq!(unknown.text(), "Unknown");
    }

    #[test]
    fn test_annotate_draws_box_color() {
        let frame = Frame::zeros(64, 64);
        let labels = vec![FaceLabel {
            bbox: BoundingBox::new(20.0, 30.0, 20.0, 20.0),
            employee: Some((1, "Budi".to_string())),
        }];
        let out = annotate_frame(&frame, &labels);
        // top edge of the box is green (BGR 0,255,0)
        let idx = (30 * 64 + 25) * 3;
        assert_eq!(&out.data[idx..idx + 3], &GREEN);
        // original frame untouched
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_annotate_unknown_is_red() {
        let frame = Frame::zeros(64, 64);
        let labels = vec![FaceLabel {
            bbox: BoundingBox::new(10.0, 30.0, 12.0, 12.0),
            employee: None,
        }];
        let out = annotate_frame(&frame, &labels);
        let idx = (30 * 64 + 15) * 3;
        assert_eq!(&out.data[idx..idx + 3], &RED);
    }

    #[test]
    fn test_annotate_clips_at_edges() {
        let frame = Frame::zeros(16, 16);
        let labels = vec![FaceLabel {
            bbox: BoundingBox::new(-5.0, -5.0, 30.0, 30.0),
            employee: None,
        }];
        // must not panic on out-of-bounds boxes
        let out = annotate_frame(&frame, &labels);
        assert_eq!(out.width, 16);
    }
}
