use std::fmt;

use log::debug;
use serde::Serialize;

use crate::config::THRESHOLD;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::preprocess::InputTensor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Label {
    #[serde(rename = "COVID-19")]
    Covid,

    #[serde(rename = "No COVID-19")]
    NoCovid,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Covid => "COVID-19",
            Label::NoCovid => "No COVID-19",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholded model output. Field order is the JSON order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub class: Label,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Raw model output, probability of COVID-19
    pub probability: f32,
}

impl Prediction {
    pub fn from_probability(probability: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidProbability(probability));
        }

        let (class, confidence) = if probability > THRESHOLD {
            (Label::Covid, probability)
        } else {
            (Label::NoCovid, 1.0 - probability)
        };

        Ok(Prediction {
            class,
            confidence,
            probability,
        })
    }
}

/// Run `model` once and classify its first output value.
pub fn predict_covid(model: &dyn Model, input: &InputTensor) -> Result<Prediction> {
    let output = model.predict(input)?;
    let probability = *output.first().ok_or(Error::EmptyOutput)?;

    debug!("Model output {:?}", output);

    Prediction::from_probability(probability)
}
