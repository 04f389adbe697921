use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::MenuPipeline;

/* ---------- App state ---------- */
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MenuPipeline>,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            pipeline: Arc::new(MenuPipeline::new(config.clone())),
            config,
        }
    }
}

/* ---------- History models ---------- */

/// A dish image that exists in the output directory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub dish: String,
    pub filename: String,
    /// Routable reference, e.g. `/image/carne_asada.png`.
    pub path: String,
}

impl ImageRef {
    #[must_use]
    pub fn new(dish: &str, filename: &str) -> Self {
        Self {
            dish: dish.to_string(),
            filename: filename.to_string(),
            path: format!("/image/{filename}"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadRecord {
    #[serde(rename = "filename", default)]
    pub original_filename: String,
    #[serde(default)]
    pub dishes: Vec<String>,
    #[serde(default)]
    pub generated_images: Vec<ImageRef>,
    /// UNIX seconds of the last write.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default = "one")]
    pub upload_count: u64,
}

const fn one() -> u64 {
    1
}

/* ---------- API models ---------- */

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SkippedImage {
    #[serde(flatten)]
    pub image: ImageRef,
    pub status: &'static str,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OriginalImage {
    pub filename: String,
    pub path: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct UploadResponse {
    pub dishes: Vec<String>,
    pub generated_images: Vec<ImageRef>,
    pub total_generated: usize,
    pub skipped_images: Vec<SkippedImage>,
    pub total_skipped: usize,
    pub original_image: OriginalImage,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_count: Option<u64>,
}
