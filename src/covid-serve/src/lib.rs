use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

pub mod config;
mod error;
pub mod inference;
pub mod model;
pub mod preprocess;
mod timer;
pub mod upload;

pub use config::TargetSize;
pub use error::{Error, Result};
pub use inference::{predict_covid, Label, Prediction};
pub use model::{load_model, Model, ModelOps, SavedModel};
pub use preprocess::{open_image, preprocess, preprocess_bytes, preprocess_image, InputTensor};
pub use timer::Timer;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    /// Time spent decoding the image
    pub image_load: i64,

    /// Time spent resizing and normalizing
    pub image_resize: i64,

    /// Time spent on running the model
    pub session_run: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    #[serde(flatten)]
    pub prediction: Prediction,

    /// Milliseconds per stage
    pub timings: StageTimings,
}

/// Chest X-ray classifier over a shared model handle
#[derive(Clone)]
pub struct XrayClassifier {
    model: Arc<dyn Model>,
    size: TargetSize,
}

impl XrayClassifier {
    pub fn new(model: Arc<dyn Model>) -> Self {
        XrayClassifier {
            model,
            size: TargetSize::default(),
        }
    }

    pub fn with_size(mut self, size: TargetSize) -> Self {
        self.size = size;
        self
    }

    fn run(&self, input: &InputTensor) -> Result<Classification> {
        let mut t = Timer::new_start("Running session");
        let prediction = predict_covid(self.model.as_ref(), input)?;

        Ok(Classification {
            prediction,
            timings: StageTimings {
                session_run: t.stop(),
                ..Default::default()
            },
        })
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let mut t = Timer::new_start("Resizing image");
        let input = preprocess(image, self.size);
        t.stop();

        let mut classification = self.run(&input)?;
        classification.timings.image_resize = t.millis();

        Ok(classification)
    }

    pub fn classify_bytes(&self, data: &[u8]) -> Result<Classification> {
        let mut t = Timer::new_start("Load image from memory");
        let image = image::load_from_memory(data)?;
        t.stop();

        let mut classification = self.classify(&image)?;
        classification.timings.image_load = t.millis();

        Ok(classification)
    }

    pub fn classify_file(&self, path: &Path) -> Result<Classification> {
        let mut t = Timer::new_start(&format!("Loading image {}", path.display()));
        let image = open_image(path)?;
        t.stop();

        let mut classification = self.classify(&image)?;
        classification.timings.image_load = t.millis();

        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use image::{GrayImage, Luma};

    use super::*;

    /// Records the shape it was fed and answers with a fixed probability
    struct Probe {
        probability: f32,
        seen: Mutex<Vec<[u64; 4]>>,
    }

    impl Model for Probe {
        fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(input.shape());
            Ok(vec![self.probability])
        }
    }

    fn probe(probability: f32) -> Arc<Probe> {
        Arc::new(Probe {
            probability,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn feeds_model_shaped_tensor() {
        let model = probe(0.9);
        let classifier = XrayClassifier::new(model.clone());
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 480, Luma([90])));

        let result = classifier.classify(&image).unwrap();

        assert_eq!(result.prediction.class, Label::Covid);
        assert_eq!(*model.seen.lock().unwrap(), vec![[1u64, 224, 224, 3]]);
    }

    #[test]
    fn honours_custom_size() {
        let model = probe(0.1);
        let classifier = XrayClassifier::new(model.clone()).with_size(TargetSize::new(32, 16));
        let image = DynamicImage::ImageLuma8(GrayImage::new(8, 8));

        let result = classifier.classify(&image).unwrap();

        assert_eq!(result.prediction.class, Label::NoCovid);
        assert_eq!(*model.seen.lock().unwrap(), vec![[1u64, 16, 32, 3]]);
    }

    #[test]
    fn undecodable_bytes_never_reach_the_model() {
        let model = probe(0.9);
        let classifier = XrayClassifier::new(model.clone());

        assert!(matches!(
            classifier.classify_bytes(b"\x89PNG broken"),
            Err(Error::Image(_))
        ));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn classification_json_is_flat() {
        let classification = Classification {
            prediction: Prediction::from_probability(0.75).unwrap(),
            timings: StageTimings::default(),
        };

        let json = serde_json::to_value(&classification).unwrap();
        assert_eq!(json["class"], "COVID-19");
        assert_eq!(json["probability"], 0.75);
        assert_eq!(json["timings"]["session_run"], 0);
    }
}
