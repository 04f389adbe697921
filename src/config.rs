use clap::{ArgAction, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::error::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "menu2img", version, about = "Menu photo to dish gallery server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Process a single menu image from disk and print the result as JSON
    Process {
        /// Path to the menu photo
        image: PathBuf,
    },
}

/// menu2img server configuration
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease verbosity (-q, -qq, -qqq)
    #[arg(short = 'q', action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Address to bind the HTTP server to
    #[arg(long, env = "MENU2IMG_BIND_ADDR", default_value = "0.0.0.0:5051")]
    pub bind: SocketAddr,

    /// Directory where uploaded menu photos are kept
    #[arg(long, env = "MENU2IMG_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory where generated dish images are written
    #[arg(long, env = "MENU2IMG_OUTPUT_DIR", default_value = "dishes")]
    pub output_dir: PathBuf,

    /// JSON file holding the upload history cache
    #[arg(long, env = "MENU2IMG_HISTORY_FILE", default_value = "upload_history.json")]
    pub history_file: PathBuf,

    /// Log file path (logs are written to stdout + this file)
    #[arg(long, env = "MENU2IMG_LOG_FILE", default_value = "menu2img.log")]
    pub log_file: PathBuf,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MENU2IMG_MAX_UPLOAD_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// OpenAI-compatible API key; without it every model call is refused
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "MENU2IMG_API_URL", default_value = "https://api.openai.com/v1")]
    pub api_url: String,

    /// Vision model used to read dish names off the menu
    #[arg(long, env = "MENU2IMG_VISION_MODEL", default_value = "gpt-4o")]
    pub vision_model: String,

    /// Image model used to draw each dish
    #[arg(long, env = "MENU2IMG_IMAGE_MODEL", default_value = "dall-e-3")]
    pub image_model: String,

    /// Size requested from the image model
    #[arg(long, env = "MENU2IMG_IMAGE_SIZE", default_value = "1024x1024")]
    pub image_size: String,

    /// Instruction sent alongside the menu photo
    #[arg(long, env = "MENU2IMG_EXTRACTION_PROMPT", default_value = DEFAULT_EXTRACTION_PROMPT)]
    pub extraction_prompt: String,

    /// Prompt template for dish images; `{dish}` is replaced by the dish name
    #[arg(long, env = "MENU2IMG_IMAGE_PROMPT", default_value = DEFAULT_IMAGE_PROMPT)]
    pub image_prompt: String,

    /// Token cap for the extraction completion
    #[arg(long, env = "MENU2IMG_EXTRACTION_MAX_TOKENS", default_value_t = 500)]
    pub extraction_max_tokens: u32,

    /// Timeout for the dish extraction call, in seconds
    #[arg(long, env = "MENU2IMG_EXTRACTION_TIMEOUT_SECS", default_value_t = 60)]
    pub extraction_timeout_secs: u64,

    /// Timeout for each image generation call, in seconds
    #[arg(long, env = "MENU2IMG_GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub generation_timeout_secs: u64,

    /// Timeout for downloading a generated image, in seconds
    #[arg(long, env = "MENU2IMG_DOWNLOAD_TIMEOUT_SECS", default_value_t = 30)]
    pub download_timeout_secs: u64,

    /// Pause between consecutive image generation calls, in milliseconds
    #[arg(long, env = "MENU2IMG_GENERATION_DELAY_MS", default_value_t = 2000)]
    pub generation_delay_ms: u64,
}

const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a menu analysis expert. Look at this menu image and extract all the food items/dishes listed. Return ONLY a JSON array of dish names, nothing else. For example: ["Beef Taco", "Chicken Fajitas", "Carne Asada"]"#;

const DEFAULT_IMAGE_PROMPT: &str = "Professional food photography of {dish}, high quality, appetizing, well-lit, restaurant quality photo";

impl Config {
    #[must_use]
    pub fn verbosity_delta(&self) -> i16 {
        i16::from(self.verbose) - i16::from(self.quiet)
    }

    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity_delta() {
            d if d <= -2 => "error",
            -1 => "warn",
            0 => "info,menu2img=info,axum=info,tower_http=info",
            1 => "debug,menu2img=debug,axum=info,tower_http=info,reqwest=info",
            2 => "trace,menu2img=trace,axum=debug,tower_http=trace,reqwest=debug,hyper=info",
            _ => "trace,menu2img=trace,axum=trace,tower_http=trace,reqwest=trace,hyper=debug",
        }
    }

    /// The API credential, or `ConfigurationMissing` when unset or blank.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigurationMissing` if no usable key is configured.
    pub fn api_key(&self) -> Result<&str, PipelineError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(PipelineError::ConfigurationMissing)
    }

    #[must_use]
    pub fn image_prompt_for(&self, dish: &str) -> String {
        self.image_prompt.replace("{dish}", dish)
    }

    #[must_use]
    pub const fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    #[must_use]
    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    #[must_use]
    pub const fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.generation_delay_ms)
    }

    /// Defaults as the CLI would produce them with no flags and no env,
    /// rooted in `base` so tests and embedders get isolated directories.
    #[must_use]
    pub fn rooted_at(base: &std::path::Path) -> Self {
        Self {
            verbose: 0,
            quiet: 0,
            bind: SocketAddr::from(([127, 0, 0, 1], 5051)),
            upload_dir: base.join("uploads"),
            output_dir: base.join("dishes"),
            history_file: base.join("upload_history.json"),
            log_file: base.join("menu2img.log"),
            max_upload_bytes: 16 * 1024 * 1024,
            api_key: None,
            api_url: "https://api.openai.com/v1".into(),
            vision_model: "gpt-4o".into(),
            image_model: "dall-e-3".into(),
            image_size: "1024x1024".into(),
            extraction_prompt: DEFAULT_EXTRACTION_PROMPT.into(),
            image_prompt: DEFAULT_IMAGE_PROMPT.into(),
            extraction_max_tokens: 500,
            extraction_timeout_secs: 60,
            generation_timeout_secs: 60,
            download_timeout_secs: 30,
            generation_delay_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_counts_as_missing() {
        let mut cfg = Config::rooted_at(std::path::Path::new("/tmp"));
        assert!(matches!(cfg.api_key(), Err(PipelineError::ConfigurationMissing)));

        cfg.api_key = Some("   ".into());
        assert!(matches!(cfg.api_key(), Err(PipelineError::ConfigurationMissing)));

        cfg.api_key = Some(" sk-test ".into());
        assert_eq!(cfg.api_key().ok(), Some("sk-test"));
    }

    #[test]
    fn image_prompt_substitutes_dish() {
        let cfg = Config::rooted_at(std::path::Path::new("/tmp"));
        let prompt = cfg.image_prompt_for("Carne Asada");
        assert!(prompt.contains("Carne Asada"));
        assert!(!prompt.contains("{dish}"));
    }

    #[test]
    fn cli_defaults_parse() {
        let cli = Cli::try_parse_from(["menu2img", "-vv"]).unwrap();
        assert_eq!(cli.config.verbosity_delta(), 2);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["menu2img", "process", "menu.jpg"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Process { .. })));
    }
}
