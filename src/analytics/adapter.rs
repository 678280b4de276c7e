use std::sync::Arc;

use super::annotate::annotate;
use super::detector::Detector;
use super::summary::StatusSummary;
use crate::camera::Frame;
use crate::config::InferenceConfig;

/// Result of one inference pass over one frame.
pub struct Analysis {
    pub annotated: Arc<Frame>,
    pub summary: StatusSummary,
}

/// Wraps the external model: runs detection, drops low-confidence boxes,
/// derives the status summary and draws the annotated copy. Never fails;
/// a model error counts as a pass with zero detections.
pub struct DetectionAdapter {
    detector: Box<dyn Detector>,
    min_detection_confidence: f32,
    alert_threshold_percent: f32,
}

impl DetectionAdapter {
    pub fn new(detector: Box<dyn Detector>, config: &InferenceConfig) -> Self {
        Self {
            detector,
            min_detection_confidence: config.min_detection_confidence,
            alert_threshold_percent: config.alert_threshold_percent,
        }
    }

    pub fn analyze(&mut self, camera_id: &str, frame: &Frame) -> Analysis {
        let mut detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(camera = %camera_id, error = %e, "detection failed, treating as empty");
                Vec::new()
            }
        };
        detections.retain(|d| d.confidence >= self.min_detection_confidence);

        let summary = StatusSummary::from_detections(&detections, self.alert_threshold_percent);

        let annotated = match annotate(frame, &detections, &summary) {
            Ok(annotated) => annotated,
            Err(e) => {
                tracing::warn!(camera = %camera_id, error = %e, "annotation failed, serving raw frame");
                frame.clone()
            }
        };

        tracing::trace!(
            camera = %camera_id,
            status = ?summary.status,
            fire = format!("{:.1}", summary.fire_percent),
            spark = format!("{:.1}", summary.spark_percent),
            objects = detections.len(),
            "inference pass"
        );

        Analysis {
            annotated: Arc::new(annotated),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::detector::{BoundingBox, DetectError, Detection};
    use crate::analytics::summary::Status;

    struct Fixed(Result<Vec<Detection>, ()>);

    impl Detector for Fixed {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            self.0
                .clone()
                .map_err(|_| DetectError::Inference("scripted".to_string()))
        }
    }

    fn det(class: &str, confidence: f32) -> Detection {
        Detection {
            class_name: class.to_string(),
            confidence,
            bbox: BoundingBox {
                x1: 10.0,
                y1: 10.0,
                x2: 50.0,
                y2: 50.0,
            },
        }
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let mut adapter = DetectionAdapter::new(
            Box::new(Fixed(Ok(vec![det("fire", 0.25), det("spark", 0.42)]))),
            &InferenceConfig::default(),
        );

        let analysis = adapter.analyze("0", &Frame::filled(64, 64, [0, 0, 0]));

        assert_eq!(analysis.summary.objects_detected, vec!["spark".to_string()]);
        assert_eq!(analysis.summary.fire_percent, 0.0);
        assert_eq!(analysis.summary.status, Status::SparkRisk);
    }

    #[test]
    fn detector_error_counts_as_no_detections() {
        let mut adapter =
            DetectionAdapter::new(Box::new(Fixed(Err(()))), &InferenceConfig::default());

        let analysis = adapter.analyze("0", &Frame::filled(64, 64, [0, 0, 0]));

        assert_eq!(analysis.summary, StatusSummary::default());
        assert_eq!(analysis.annotated.width(), 64);
    }
}
