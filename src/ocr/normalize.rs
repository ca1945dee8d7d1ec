//! Translation of platform observations into a `RecognitionResult`

use super::model::{BoundingBox, Element, RecognitionResult};

/// One ranked reading of an observation
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    /// Platform confidence; clamped to [0, 1] during normalization
    pub confidence: f32,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Region geometry as reported by a platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Source image pixels, origin top-left
    Pixels {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Fractions of the image size, origin bottom-left (Apple Vision)
    Normalized {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl Geometry {
    /// Convert to a pixel box clipped to a `width` x `height` image
    pub fn to_pixels(&self, width: u32, height: u32) -> BoundingBox {
        let (img_w, img_h) = (f64::from(width), f64::from(height));

        let (left, top, right, bottom) = match *self {
            Geometry::Pixels {
                x,
                y,
                width,
                height,
            } => (x, y, x + width, y + height),
            Geometry::Normalized {
                x,
                y,
                width,
                height,
            } => {
                let left = x * img_w;
                let right = (x + width) * img_w;
                // flip the y axis: normalized origin is the bottom edge
                let top = (1.0 - (y + height)) * img_h;
                let bottom = (1.0 - y) * img_h;
                (left, top, right, bottom)
            }
        };

        let clip = |v: f64, max: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };
        let left = clip(left, img_w);
        let right = clip(right, img_w);
        let top = clip(top, img_h);
        let bottom = clip(bottom, img_h);

        BoundingBox {
            x: left.round() as u32,
            y: top.round() as u32,
            width: (right - left).max(0.0).round() as u32,
            height: (bottom - top).max(0.0).round() as u32,
        }
    }

    /// Smallest pixel-space rectangle covering every geometry in `parts`
    ///
    /// Returns `None` when `parts` is empty or mixes conventions.
    pub fn union_pixels(parts: &[Geometry]) -> Option<Geometry> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for part in parts {
            let Geometry::Pixels {
                x,
                y,
                width,
                height,
            } = *part
            else {
                return None;
            };
            bounds = Some(match bounds {
                None => (x, y, x + width, y + height),
                Some((min_x, min_y, max_x, max_y)) => (
                    min_x.min(x),
                    min_y.min(y),
                    max_x.max(x + width),
                    max_y.max(y + height),
                ),
            });
        }

        bounds.map(|(min_x, min_y, max_x, max_y)| Geometry::Pixels {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// A platform-reported unit of recognized text, usually a line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    /// Readings ranked best first
    pub candidates: Vec<Candidate>,
    /// Region of the whole observation
    pub bounds: Option<Geometry>,
    /// Per-word regions, when the platform reports them
    pub word_bounds: Vec<Geometry>,
}

impl Observation {
    /// Observation with a single candidate
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            candidates: vec![Candidate::new(text, confidence)],
            ..Default::default()
        }
    }

    pub fn with_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, bounds: Geometry) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_word_bounds(mut self, word_bounds: Vec<Geometry>) -> Self {
        self.word_bounds = word_bounds;
        self
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Build the caller-facing result from observations in platform order.
///
/// `width`/`height` are the source image's pixel dimensions. Every token of a
/// line gets the line's confidence: platforms do not report per-token scores.
pub fn normalize(observations: Vec<Observation>, width: u32, height: u32) -> RecognitionResult {
    if observations.is_empty() {
        return RecognitionResult::empty();
    }

    let mut result = RecognitionResult {
        success: true,
        ..Default::default()
    };

    for observation in observations {
        let Observation {
            candidates,
            bounds,
            word_bounds,
        } = observation;

        let Some(top) = candidates.into_iter().next() else {
            continue;
        };

        let confidence = clamp_confidence(top.confidence);
        let line_box = bounds.map(|g| g.to_pixels(width, height));
        let tokens: Vec<&str> = top.text.split_whitespace().collect();
        let per_word = !word_bounds.is_empty() && word_bounds.len() == tokens.len();

        for (i, token) in tokens.iter().enumerate() {
            let bounds = if per_word {
                Some(word_bounds[i].to_pixels(width, height))
            } else {
                line_box
            };
            result.elements.push(Element {
                text: (*token).to_string(),
                confidence,
                bounds,
            });
        }

        result.lines.push(top.text);
    }

    result.all_text = result.lines.join(" ");
    result
}
