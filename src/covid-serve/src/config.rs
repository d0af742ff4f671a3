//! Fixed service defaults. Front-ends may override them from the command line.

use std::net::{IpAddr, Ipv4Addr};

/// Directory uploaded images are written to while a request is in flight
pub const UPLOAD_FOLDER: &str = "uploads";

/// File extensions accepted for upload, lower-case and without the dot
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// TensorFlow SavedModel export directory
pub const MODEL_PATH: &str = "modelo_covid";

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 5000;

/// Graph operation fed with the input image tensor
pub const DEFAULT_INPUT_OP: &str = "serving_default_input_1";

/// Graph operation fetched for the model output
pub const DEFAULT_OUTPUT_OP: &str = "StatefulPartitionedCall";

/// Probabilities strictly above this value are labelled COVID-19
pub const THRESHOLD: f32 = 0.5;

/// Spatial size of the model input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub const fn new(width: u32, height: u32) -> Self {
        TargetSize { width, height }
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        TARGET_SIZE
    }
}

pub const TARGET_SIZE: TargetSize = TargetSize::new(224, 224);
