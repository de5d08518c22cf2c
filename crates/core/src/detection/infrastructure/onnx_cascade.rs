/// Single-feature anchor detector running on ONNX Runtime via `ort`.
///
/// Expects a BlazeFace-style short-range graph: a 128x128 RGB input and two
/// outputs, `[1, 896, 16]` box regressors and `[1, 896, 1]` logits. One model
/// file per feature kind; eyes/nose/mouth models run on face crops.
use std::path::Path;

use crate::detection::domain::cascade::{
    Cascade, CascadeLoader, ConfigurationError, DetectionParams,
};
use crate::shared::backend::BackendError;
use crate::shared::frame::Frame;
use crate::shared::region::{FeatureKind, Region};

/// Model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of anchors in the short-range layout.
const NUM_ANCHORS: usize = 896;

/// Floats per anchor in the regressor output.
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxCascade {
    kind: FeatureKind,
    session: ort::session::Session,
    anchors: Vec<[f32; 2]>,
}

impl OnnxCascade {
    pub fn new(kind: FeatureKind, model_path: &Path) -> Result<Self, BackendError> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        Ok(Self {
            kind,
            session,
            anchors: generate_anchors(),
        })
    }
}

impl Cascade for OnnxCascade {
    fn kind(&self) -> FeatureKind {
        self.kind
    }

    fn detect(
        &mut self,
        image: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Region>, BackendError> {
        if image.is_empty() {
            return Ok(Vec::new());
        }
        let fw = image.width() as f32;
        let fh = image.height() as f32;

        let input_tensor = preprocess(image, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        if outputs.len() < 2 {
            return Err(format!(
                "{} cascade expected 2 outputs, got {}",
                self.kind,
                outputs.len()
            )
            .into());
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = decode(
            &self.anchors,
            reg_data,
            score_data,
            params.confidence as f32,
            fw,
            fh,
        );
        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);

        Ok(kept
            .iter()
            .filter_map(|d| {
                let x = d.x1 as i32;
                let y = d.y1 as i32;
                Region::new(
                    x,
                    y,
                    (d.x2 - d.x1) as i32,
                    (d.y2 - d.y1) as i32,
                    self.kind,
                )
                .within(image.width(), image.height())
            })
            .collect())
    }
}

/// Loads one `.onnx` file per feature kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxCascadeLoader;

impl CascadeLoader for OnnxCascadeLoader {
    fn load(&self, kind: FeatureKind, path: &Path) -> Result<Box<dyn Cascade>, ConfigurationError> {
        if !path.is_file() {
            return Err(ConfigurationError::MissingCascade {
                kind,
                path: path.to_path_buf(),
            });
        }
        let cascade =
            OnnxCascade::new(kind, path).map_err(|e| ConfigurationError::InvalidCascade {
                kind,
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        log::info!("Loaded {kind} cascade from {}", path.display());
        Ok(Box::new(cascade))
    }
}

/// Preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU if the provider is unavailable.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Nearest-neighbour resize to `size x size`, normalized to [0,1] NCHW.
///
/// Grayscale input is replicated across the three channels; alpha is ignored.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let channels = frame.channels() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                let src_c = if channels >= 3 { c } else { 0 };
                tensor[[0, c, y, x]] = src[[src_y, src_x, src_c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Anchor centres for the short-range layout: a 16x16 grid with 2 anchors
/// per cell followed by an 8x8 grid with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

/// Turns raw regressor/logit output into image-space boxes above `threshold`.
fn decode(
    anchors: &[[f32; 2]],
    reg_data: &[f32],
    score_data: &[f32],
    threshold: f32,
    fw: f32,
    fh: f32,
) -> Vec<RawDet> {
    let mut dets = Vec::new();
    let scale = INPUT_SIZE as f32;

    for (i, &logit) in score_data.iter().enumerate().take(anchors.len()) {
        let score = sigmoid(logit);
        if score < threshold {
            continue;
        }
        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let cx = anchor[0] + reg_data[offset] / scale;
        let cy = anchor[1] + reg_data[offset + 1] / scale;
        let w = reg_data[offset + 2] / scale;
        let h = reg_data[offset + 3] / scale;

        dets.push(RawDet {
            x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fw).min(fw) as f64,
            y2: ((cy + h / 2.0) * fh).min(fh) as f64,
            score: score as f64,
        });
    }
    dets
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
