use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use super::detector::Detection;
use super::summary::{HazardKind, Status, StatusSummary};
use crate::camera::Frame;

fn bgr(b: f64, g: f64, r: f64) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn hazard_color(kind: HazardKind) -> Scalar {
    match kind {
        HazardKind::Fire => bgr(0.0, 0.0, 255.0),
        HazardKind::Spark => bgr(0.0, 165.0, 255.0),
    }
}

fn status_color(status: Status) -> Scalar {
    match status {
        Status::Fire => bgr(0.0, 0.0, 255.0),
        Status::SparkRisk => bgr(0.0, 165.0, 255.0),
        Status::Safe => bgr(0.0, 255.0, 0.0),
    }
}

/// Draws hazard boxes and the status banner onto a copy of `frame`.
pub fn annotate(
    frame: &Frame,
    detections: &[Detection],
    summary: &StatusSummary,
) -> opencv::Result<Frame> {
    let mut mat = frame.to_mat()?;

    for det in detections {
        let Some(kind) = HazardKind::from_label(&det.class_name) else {
            continue;
        };
        draw_box(&mut mat, det, kind)?;
    }
    draw_banner(&mut mat, summary)?;

    Frame::from_mat(&mat)
}

fn draw_box(mat: &mut Mat, det: &Detection, kind: HazardKind) -> opencv::Result<()> {
    let color = hazard_color(kind);
    let x1 = det.bbox.x1 as i32;
    let y1 = det.bbox.y1 as i32;
    let rect = Rect::new(
        x1,
        y1,
        ((det.bbox.x2 - det.bbox.x1) as i32).max(1),
        ((det.bbox.y2 - det.bbox.y1) as i32).max(1),
    );
    imgproc::rectangle(mat, rect, color, 2, imgproc::LINE_8, 0)?;

    let label = format!("{} {:.2}", kind.as_str(), det.confidence);
    imgproc::put_text(
        mat,
        &label,
        Point::new(x1, (y1 - 8).max(12)),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        color,
        2,
        imgproc::LINE_8,
        false,
    )
}

fn draw_banner(mat: &mut Mat, summary: &StatusSummary) -> opencv::Result<()> {
    let color = status_color(summary.status);
    let message = summary.status.message();

    let text_size = imgproc::get_text_size(message, imgproc::FONT_HERSHEY_DUPLEX, 1.0, 2, &mut 0)?;
    imgproc::rectangle(
        mat,
        Rect::new(10, 10, text_size.width + 20, text_size.height + 20),
        bgr(0.0, 0.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        mat,
        message,
        Point::new(20, 35),
        imgproc::FONT_HERSHEY_DUPLEX,
        1.0,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;

    if summary.confidence_percent > 0.0 {
        imgproc::put_text(
            mat,
            &format!("{:.1}%", summary.confidence_percent),
            Point::new(20, 60),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::detector::BoundingBox;

    #[test]
    fn annotation_leaves_source_untouched() {
        let frame = Frame::filled(320, 240, [40, 40, 40]);
        let detections = vec![Detection {
            class_name: "fire".to_string(),
            confidence: 0.8,
            bbox: BoundingBox {
                x1: 100.0,
                y1: 100.0,
                x2: 200.0,
                y2: 200.0,
            },
        }];
        let summary = StatusSummary::from_detections(&detections, 40.0);

        let annotated = annotate(&frame, &detections, &summary).unwrap();

        assert_eq!(annotated.width(), 320);
        assert_eq!(annotated.height(), 240);
        assert_ne!(annotated, frame);
        assert!(frame.data().iter().all(|&b| b == 40));
    }
}
