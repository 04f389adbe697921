use std::path::Path;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::dish_parser::parse_dishes;
use crate::error::PipelineError;
use crate::fingerprint::fingerprint;
use crate::history::HistoryStore;
use crate::llm::{ExtractRequest, GenerateRequest, OpenAiClient};
use crate::models::{ImageRef, OriginalImage, SkippedImage, UploadRecord, UploadResponse};
use crate::naming;

/// Runs one uploaded menu through fingerprint, cache, extraction and image
/// resolution. Passes are serialized: the history file is rewritten whole on
/// every update and tolerates only one writer.
pub struct MenuPipeline {
    config: Config,
    history: HistoryStore,
    http: reqwest::Client,
    run_lock: Mutex<()>,
}

impl MenuPipeline {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            history: HistoryStore::new(config.history_file.clone()),
            http: reqwest::Client::new(),
            run_lock: Mutex::new(()),
            config,
        }
    }

    /// # Errors
    ///
    /// `InputInvalid` for an empty name or body, `ConfigurationMissing` when a
    /// model call is needed without a key, extraction failures, `NoDishesFound`,
    /// or I/O errors saving the upload. Per-dish generation failures and
    /// history persistence failures are logged, never returned.
    pub async fn process(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadResponse, PipelineError> {
        if filename.trim().is_empty() {
            return Err(PipelineError::InputInvalid("No file selected".into()));
        }
        if bytes.is_empty() {
            return Err(PipelineError::InputInvalid("Uploaded file is empty".into()));
        }

        let _pass = self.run_lock.lock().await;

        let hash = fingerprint(bytes);
        let stored_name = naming::stored_upload_name(filename, &hash);
        self.save_upload(&stored_name, bytes).await?;
        let original_image = OriginalImage {
            path: format!("/upload/{stored_name}"),
            filename: stored_name.clone(),
        };

        let history = self.history.clone();
        let key = hash.clone();
        if let Some(previous) = blocking(move || history.get(&key)).await? {
            return Ok(self.cached_response(&hash, previous, original_image).await);
        }

        let client = OpenAiClient::from_config(&self.config)?;
        let dishes = self.extract(&client, &stored_name, bytes).await?;
        if dishes.is_empty() {
            tracing::warn!(%hash, "no dishes found");
            return Err(PipelineError::NoDishesFound);
        }
        tracing::info!(count = dishes.len(), "found dishes, checking existing images");

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let (generated_images, skipped_images) = self.resolve_or_generate(&client, &dishes).await;
        tracing::info!(
            generated = generated_images.len() - skipped_images.len(),
            reused = skipped_images.len(),
            failed = dishes.len() - generated_images.len(),
            "completed processing"
        );

        let recorded = {
            let history = self.history.clone();
            let (key, name) = (hash.clone(), stored_name.clone());
            let (dishes, images) = (dishes.clone(), generated_images.clone());
            blocking(move || history.record(&key, &name, &dishes, &images)).await?
        };
        let upload_count = match recorded {
            Ok(rec) => Some(rec.upload_count),
            Err(e) => {
                tracing::error!(%hash, error = %e, "could not record upload history");
                None
            }
        };

        Ok(UploadResponse {
            total_generated: generated_images.len(),
            total_skipped: skipped_images.len(),
            dishes,
            generated_images,
            skipped_images,
            original_image,
            cached: false,
            upload_count,
        })
    }

    async fn save_upload(&self, name: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let path = self.config.upload_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), "saved upload");
        Ok(())
    }

    async fn cached_response(
        &self,
        hash: &str,
        previous: UploadRecord,
        original_image: OriginalImage,
    ) -> UploadResponse {
        let history = self.history.clone();
        let key = hash.to_string();
        let touched = blocking(move || history.touch(&key)).await.and_then(|r| r);
        let record = match touched {
            Ok(Some(rec)) => rec,
            Ok(None) => previous,
            Err(e) => {
                tracing::error!(%hash, error = %e, "could not update upload count");
                UploadRecord {
                    upload_count: previous.upload_count.saturating_add(1),
                    ..previous
                }
            }
        };
        tracing::info!(%hash, upload_count = record.upload_count, "returning cached results");

        let out_dir = self.config.output_dir.clone();
        let images = record.generated_images.clone();
        let missing = blocking(move || {
            images
                .into_iter()
                .filter(|img| !out_dir.join(&img.filename).is_file())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();
        for img in &missing {
            tracing::warn!(dish = %img.dish, filename = %img.filename, "cached image is missing on disk");
        }

        UploadResponse {
            total_generated: record.generated_images.len(),
            dishes: record.dishes,
            generated_images: record.generated_images,
            skipped_images: Vec::new(),
            total_skipped: 0,
            original_image,
            cached: true,
            upload_count: Some(record.upload_count),
        }
    }

    async fn extract(
        &self,
        client: &OpenAiClient,
        stored_name: &str,
        bytes: &[u8],
    ) -> Result<Vec<String>, PipelineError> {
        let mime = mime_guess::from_path(stored_name)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map_or_else(|| "image/jpeg".to_string(), |m| m.to_string());

        let content = client
            .extract_dishes(ExtractRequest {
                http: &self.http,
                prompt: &self.config.extraction_prompt,
                mime: &mime,
                image: bytes,
                max_tokens: self.config.extraction_max_tokens,
                timeout: self.config.extraction_timeout(),
            })
            .await
            .inspect_err(|e| tracing::error!(error = %e, "dish extraction failed"))?;

        parse_dishes(&content)
    }

    /// Reuses an image on disk for each dish or generates one. Returns every
    /// dish that ended up with an image, and the subset that was reused.
    async fn resolve_or_generate(
        &self,
        client: &OpenAiClient,
        dishes: &[String],
    ) -> (Vec<ImageRef>, Vec<SkippedImage>) {
        let out_dir = self.config.output_dir.as_path();
        let mut generated = Vec::with_capacity(dishes.len());
        let mut skipped = Vec::new();
        let mut called_before = false;

        for (i, dish) in dishes.iter().enumerate() {
            tracing::info!(n = i + 1, total = dishes.len(), %dish, "processing dish");
            if dish.trim().is_empty() {
                tracing::debug!("skipping blank dish name");
                continue;
            }

            let found = {
                let (dish, dir) = (dish.clone(), out_dir.to_path_buf());
                blocking(move || naming::resolve(&dish, &dir)).await
            };
            if let Ok(Some(existing)) = found {
                let image = ImageRef::new(dish, &existing);
                skipped.push(SkippedImage {
                    image: image.clone(),
                    status: "existing",
                });
                generated.push(image);
                continue;
            }

            // provider rate limit: fixed gap between generation calls
            if called_before && !self.config.generation_delay().is_zero() {
                tokio::time::sleep(self.config.generation_delay()).await;
            }
            called_before = true;

            let filename = naming::sanitize(dish);
            match self.generate_one(client, dish, out_dir, &filename).await {
                Ok(()) => {
                    tracing::info!(%dish, %filename, "generated image");
                    generated.push(ImageRef::new(dish, &filename));
                }
                Err(e) => tracing::warn!(%dish, error = %e, "image generation failed, skipping dish"),
            }
        }

        (generated, skipped)
    }

    async fn generate_one(
        &self,
        client: &OpenAiClient,
        dish: &str,
        out_dir: &Path,
        filename: &str,
    ) -> Result<(), PipelineError> {
        let prompt = self.config.image_prompt_for(dish);
        let bytes = client
            .generate_image(GenerateRequest {
                http: &self.http,
                prompt: &prompt,
                timeout: self.config.generation_timeout(),
                download_timeout: self.config.download_timeout(),
            })
            .await?;

        let png = blocking(move || crate::image_io::ensure_png(bytes))
            .await?
            .map_err(|e| PipelineError::Upstream(format!("downloaded payload is not an image: {e}")))?;

        tokio::fs::write(out_dir.join(filename), png).await?;
        Ok(())
    }
}

/// Runs filesystem or CPU-bound work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))
}
