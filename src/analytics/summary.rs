use serde::Serialize;

use super::detector::Detection;

const FIRE_LABELS: [&str; 2] = ["fire", "api"];
const SPARK_LABELS: [&str; 2] = ["spark", "percikan"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Fire,
    Spark,
}

impl HazardKind {
    /// Case-insensitive match against the known synonyms; anything else is
    /// not a hazard.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        if FIRE_LABELS.contains(&lower.as_str()) {
            Some(HazardKind::Fire)
        } else if SPARK_LABELS.contains(&lower.as_str()) {
            Some(HazardKind::Spark)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HazardKind::Fire => "fire",
            HazardKind::Spark => "spark",
        }
    }

    /// The status this hazard raises once it crosses the alert threshold.
    pub fn status(self) -> Status {
        match self {
            HazardKind::Fire => Status::Fire,
            HazardKind::Spark => Status::SparkRisk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Safe,
    SparkRisk,
    Fire,
}

impl Status {
    pub fn message(self) -> &'static str {
        match self {
            Status::Safe => "SAFE",
            Status::SparkRisk => "SPARK RISK - SPARK DETECTED",
            Status::Fire => "DANGER - FIRE DETECTED",
        }
    }
}

/// What one inference pass concluded. All confidences are percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub status: Status,
    /// Confidence of the hazard driving `status`; 0 when safe.
    pub confidence_percent: f32,
    pub objects_detected: Vec<String>,
    pub fire_percent: f32,
    pub spark_percent: f32,
}

impl Default for StatusSummary {
    fn default() -> Self {
        Self {
            status: Status::Safe,
            confidence_percent: 0.0,
            objects_detected: Vec::new(),
            fire_percent: 0.0,
            spark_percent: 0.0,
        }
    }
}

impl StatusSummary {
    /// Fire outranks spark when both reach `threshold_percent`.
    pub fn from_detections(detections: &[Detection], threshold_percent: f32) -> Self {
        let mut fire = 0.0f32;
        let mut spark = 0.0f32;
        let mut objects = Vec::with_capacity(detections.len());

        for det in detections {
            objects.push(det.class_name.clone());
            match HazardKind::from_label(&det.class_name) {
                Some(HazardKind::Fire) => fire = fire.max(det.confidence),
                Some(HazardKind::Spark) => spark = spark.max(det.confidence),
                None => {}
            }
        }

        let fire_percent = fire * 100.0;
        let spark_percent = spark * 100.0;

        let (status, confidence_percent) = if fire_percent >= threshold_percent {
            (Status::Fire, fire_percent)
        } else if spark_percent >= threshold_percent {
            (Status::SparkRisk, spark_percent)
        } else {
            (Status::Safe, 0.0)
        };

        Self {
            status,
            confidence_percent,
            objects_detected: objects,
            fire_percent,
            spark_percent,
        }
    }

    pub fn hazard_percent(&self, kind: HazardKind) -> f32 {
        match kind {
            HazardKind::Fire => self.fire_percent,
            HazardKind::Spark => self.spark_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::detector::BoundingBox;

    fn det(class: &str, confidence: f32) -> Detection {
        Detection {
            class_name: class.to_string(),
            confidence,
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
        }
    }

    #[test]
    fn labels_match_synonyms_case_insensitively() {
        assert_eq!(HazardKind::from_label("FIRE"), Some(HazardKind::Fire));
        assert_eq!(HazardKind::from_label("Api"), Some(HazardKind::Fire));
        assert_eq!(HazardKind::from_label("Percikan"), Some(HazardKind::Spark));
        assert_eq!(HazardKind::from_label("spark"), Some(HazardKind::Spark));
        assert_eq!(HazardKind::from_label("smoke"), None);
    }

    #[test]
    fn fire_outranks_spark() {
        let summary =
            StatusSummary::from_detections(&[det("spark", 0.9), det("fire", 0.5)], 40.0);
        assert_eq!(summary.status, Status::Fire);
        assert!((summary.confidence_percent - 50.0).abs() < 1e-3);
        assert!((summary.spark_percent - 90.0).abs() < 1e-3);
    }

    #[test]
    fn spark_risk_when_only_spark_crosses() {
        let summary =
            StatusSummary::from_detections(&[det("fire", 0.35), det("percikan", 0.45)], 40.0);
        assert_eq!(summary.status, Status::SparkRisk);
        assert!((summary.confidence_percent - 45.0).abs() < 1e-3);
        assert!((summary.fire_percent - 35.0).abs() < 1e-3);
    }

    #[test]
    fn unknown_labels_are_listed_but_safe() {
        let summary = StatusSummary::from_detections(&[det("person", 0.99)], 40.0);
        assert_eq!(summary.status, Status::Safe);
        assert_eq!(summary.confidence_percent, 0.0);
        assert_eq!(summary.objects_detected, vec!["person".to_string()]);
    }

    #[test]
    fn status_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&Status::SparkRisk).unwrap(),
            "\"SPARK_RISK\""
        );
        assert_eq!(Status::Fire.message(), "DANGER - FIRE DETECTED");
    }
}
