use ndarray::{Array4, ArrayD, Ix3};
use opencv::core::{Mat, Scalar, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use thiserror::Error;

use crate::camera::Frame;

const YOLO_INPUT_SIZE: u32 = 640;
const NMS_IOU_THRESHOLD: f32 = 0.45;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unsupported model output: {0}")]
    UnsupportedOutput(String),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    /// 0..=1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// The model boundary: a frame in, labeled boxes out.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

enum RawOutput {
    /// `logits [1, N, C]` + `pred_boxes [1, N, 4]`, normalized cxcywh, no NMS needed.
    EndToEnd { logits: ArrayD<f32>, boxes: ArrayD<f32> },
    /// `output0 [1, 4 + C, N]` in input pixels, needs NMS.
    Anchors(ArrayD<f32>),
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    orig_w: f32,
    orig_h: f32,
}

impl Letterbox {
    fn to_original(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let x1 = ((cx - w / 2.0) - self.pad_x) / self.scale;
        let y1 = ((cy - h / 2.0) - self.pad_y) / self.scale;
        let x2 = ((cx + w / 2.0) - self.pad_x) / self.scale;
        let y2 = ((cy + h / 2.0) - self.pad_y) / self.scale;
        BoundingBox {
            x1: x1.clamp(0.0, self.orig_w),
            y1: y1.clamp(0.0, self.orig_h),
            x2: x2.clamp(0.0, self.orig_w),
            y2: y2.clamp(0.0, self.orig_h),
        }
    }
}

/// YOLO detector backed by ONNX Runtime.
pub struct OrtDetector {
    session: Session,
    confidence_threshold: f32,
    class_names: Vec<String>,
}

impl OrtDetector {
    pub fn new(
        model_path: &str,
        confidence_threshold: f32,
        class_names: Vec<String>,
        intra_threads: usize,
    ) -> Result<Self, DetectError> {
        let session = Self::load_session(model_path, intra_threads)
            .map_err(|e| DetectError::ModelLoad(format!("{model_path}: {e}")))?;

        tracing::info!(model = %model_path, classes = ?class_names, "detection model loaded");

        Ok(Self {
            session,
            confidence_threshold,
            class_names,
        })
    }

    fn load_session(model_path: &str, intra_threads: usize) -> Result<Session, BoxError> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
            builder.commit_from_url(model_path)?
        } else {
            builder.commit_from_file(model_path)?
        };
        Ok(session)
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    fn run(&mut self, input: Array4<f32>) -> Result<RawOutput, BoxError> {
        let tensor_ref = TensorRef::from_array_view(input.view())?.into_dyn();
        let outputs = self.session.run(ort::inputs![tensor_ref])?;

        if let (Some(logits), Some(boxes)) = (outputs.get("logits"), outputs.get("pred_boxes")) {
            return Ok(RawOutput::EndToEnd {
                logits: logits.try_extract_array::<f32>()?.to_owned(),
                boxes: boxes.try_extract_array::<f32>()?.to_owned(),
            });
        }
        if let Some(out) = outputs.get("output0") {
            return Ok(RawOutput::Anchors(out.try_extract_array::<f32>()?.to_owned()));
        }

        Err("expected 'logits'/'pred_boxes' or 'output0' outputs".into())
    }

    fn postprocess_end_to_end(
        &self,
        logits: &ArrayD<f32>,
        boxes: &ArrayD<f32>,
        letterbox: &Letterbox,
    ) -> Result<Vec<Detection>, DetectError> {
        let shape = logits.shape();
        if shape.len() < 2 || boxes.shape().len() < 2 {
            return Ok(Vec::new());
        }
        let (num_detections, num_classes) = if shape.len() == 3 {
            (shape[1], shape[2])
        } else {
            (shape[0], shape[1])
        };

        let logits_flat = logits
            .as_slice()
            .ok_or_else(|| DetectError::UnsupportedOutput("non-contiguous logits".to_string()))?;
        let boxes_flat = boxes
            .as_slice()
            .ok_or_else(|| DetectError::UnsupportedOutput("non-contiguous boxes".to_string()))?;
        if logits_flat.len() < num_detections * num_classes || boxes_flat.len() < num_detections * 4
        {
            return Err(DetectError::UnsupportedOutput(
                "output shorter than its shape".to_string(),
            ));
        }

        let input_size = YOLO_INPUT_SIZE as f32;
        let mut detections = Vec::new();

        for i in 0..num_detections {
            let mut max_score = 0.0f32;
            let mut max_class = 0usize;
            for j in 0..num_classes {
                let score = sigmoid(logits_flat[i * num_classes + j]);
                if score > max_score {
                    max_score = score;
                    max_class = j;
                }
            }

            if max_score < self.confidence_threshold {
                continue;
            }

            let cx = boxes_flat[i * 4] * input_size;
            let cy = boxes_flat[i * 4 + 1] * input_size;
            let w = boxes_flat[i * 4 + 2] * input_size;
            let h = boxes_flat[i * 4 + 3] * input_size;

            detections.push(Detection {
                class_name: self.class_name(max_class),
                confidence: max_score,
                bbox: letterbox.to_original(cx, cy, w, h),
            });
        }

        Ok(detections)
    }

    fn postprocess_anchors(
        &self,
        output: &ArrayD<f32>,
        letterbox: &Letterbox,
    ) -> Result<Vec<Detection>, DetectError> {
        let output = output
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| DetectError::UnsupportedOutput(format!("output0 shape {:?}", output.shape())))?;
        let (_, rows, num_anchors) = output.dim();
        if rows <= 4 {
            return Err(DetectError::UnsupportedOutput(format!(
                "output0 has {rows} rows, expected box + class rows"
            )));
        }
        let num_classes = rows - 4;

        let mut candidates: Vec<(usize, Detection)> = Vec::new();
        for a in 0..num_anchors {
            let mut max_score = 0.0f32;
            let mut max_class = 0usize;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, a]];
                if score > max_score {
                    max_score = score;
                    max_class = c;
                }
            }
            if max_score < self.confidence_threshold {
                continue;
            }

            let bbox = letterbox.to_original(
                output[[0, 0, a]],
                output[[0, 1, a]],
                output[[0, 2, a]],
                output[[0, 3, a]],
            );
            candidates.push((
                max_class,
                Detection {
                    class_name: self.class_name(max_class),
                    confidence: max_score,
                    bbox,
                },
            ));
        }

        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }
}

impl Detector for OrtDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let mat = frame.to_mat()?;
        let (input, letterbox) = preprocess(&mat)?;

        let raw = self
            .run(input)
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        match raw {
            RawOutput::EndToEnd { logits, boxes } => {
                self.postprocess_end_to_end(&logits, &boxes, &letterbox)
            }
            RawOutput::Anchors(output) => self.postprocess_anchors(&output, &letterbox),
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn preprocess(frame: &Mat) -> Result<(Array4<f32>, Letterbox), DetectError> {
    let rows = frame.rows() as f32;
    let cols = frame.cols() as f32;
    let input_size = YOLO_INPUT_SIZE as f32;

    let scale = (input_size / cols).min(input_size / rows);
    let new_w = (cols * scale).round() as i32;
    let new_h = (rows * scale).round() as i32;

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(new_w, new_h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let pad_x = ((input_size as i32 - new_w) / 2) as f32;
    let pad_y = ((input_size as i32 - new_h) / 2) as f32;

    let mut padded = Mat::default();
    opencv::core::copy_make_border(
        &resized,
        &mut padded,
        pad_y as i32,
        input_size as i32 - new_h - pad_y as i32,
        pad_x as i32,
        input_size as i32 - new_w - pad_x as i32,
        BORDER_CONSTANT,
        Scalar::new(114.0, 114.0, 114.0, 0.0),
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&padded, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let data = rgb.data_bytes()?;
    let side = YOLO_INPUT_SIZE as usize;
    if data.len() < side * side * 3 {
        return Err(DetectError::Inference("frame data too small".to_string()));
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for y in 0..side {
        for x in 0..side {
            let idx = (y * side + x) * 3;
            tensor[[0, 0, y, x]] = data[idx] as f32 / 255.0;
            tensor[[0, 1, y, x]] = data[idx + 1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = data[idx + 2] as f32 / 255.0;
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
            orig_w: cols,
            orig_h: rows,
        },
    ))
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<(usize, Detection)>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));

    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (class_id, det) in candidates {
        let suppressed = kept
            .iter()
            .any(|(k_class, k)| *k_class == class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push((class_id, det));
        }
    }

    kept.into_iter().map(|(_, d)| d).collect()
}
