//! Template-matching recognizer: one mean image per identity, scored by
//! Pearson correlation against the query.

use std::collections::BTreeMap;

use image::imageops::FilterType;
use image::GrayImage;

use crate::recognition::domain::face_recognizer::{FaceRecognizer, Prediction};
use crate::recognition::domain::training_image::TrainingImage;
use crate::shared::backend::BackendError;

/// Variance below which a template carries no usable signal.
const MIN_TEMPLATE_VARIANCE: f64 = 1e-6;

pub struct CorrelationRecognizer {
    width: u32,
    height: u32,
    templates: Vec<(String, Vec<f64>)>,
}

impl CorrelationRecognizer {
    /// Images of any other size are resampled to `width x height` first.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            templates: Vec::new(),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|(label, _)| label.as_str())
    }

    fn vectorize(&self, image: &GrayImage) -> Vec<f64> {
        if image.dimensions() == (self.width, self.height) {
            image.as_raw().iter().map(|&p| p as f64).collect()
        } else {
            image::imageops::resize(image, self.width, self.height, FilterType::Triangle)
                .as_raw()
                .iter()
                .map(|&p| p as f64)
                .collect()
        }
    }
}

impl FaceRecognizer for CorrelationRecognizer {
    fn train(&mut self, samples: &[TrainingImage]) -> Result<(), BackendError> {
        self.templates.clear();
        if self.width == 0 || self.height == 0 {
            return Err("template size must be non-zero".into());
        }

        let mut sums: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
        for sample in samples {
            if sample.pixels.width() == 0 || sample.pixels.height() == 0 {
                return Err(format!("sample {} is empty", sample.path.display()).into());
            }
            let pixels = self.vectorize(&sample.pixels);
            let (sum, count) = sums
                .entry(sample.label.as_str())
                .or_insert_with(|| (vec![0.0; pixels.len()], 0));
            for (acc, value) in sum.iter_mut().zip(&pixels) {
                *acc += value;
            }
            *count += 1;
        }

        let mut templates = Vec::with_capacity(sums.len());
        for (label, (sum, count)) in sums {
            let template: Vec<f64> = sum.into_iter().map(|v| v / count as f64).collect();
            if variance(&template) < MIN_TEMPLATE_VARIANCE {
                return Err(format!("template for {label:?} has no contrast").into());
            }
            templates.push((label.to_string(), template));
        }
        self.templates = templates;
        Ok(())
    }

    fn predict(&self, image: &GrayImage) -> Result<Prediction, BackendError> {
        if image.width() == 0 || image.height() == 0 {
            return Err("cannot recognize an empty image".into());
        }
        let query = self.vectorize(image);
        self.templates
            .iter()
            .map(|(label, template)| Prediction {
                label: label.clone(),
                score: pearson_correlation(&query, template),
            })
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| "recognizer has no templates".into())
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Pearson correlation coefficient.
///
/// Returns 1.0 when both inputs have zero variance, and 0.0 when only one
/// does (undefined, treated as uncorrelated).
fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let n = len as f64;
    let mean_a = a[..len].iter().sum::<f64>() / n;
    let mean_b = b[..len].iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..len].iter().zip(&b[..len]) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        return if var_a < f64::EPSILON && var_b < f64::EPSILON {
            1.0
        } else {
            0.0
        };
    }
    cov / denom
}
