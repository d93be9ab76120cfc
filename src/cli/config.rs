use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Main service configuration. Keys are camelCase in the YAML file to
/// match the submission API's conventions.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Directory capture artifacts are written to
    pub output_dir: PathBuf,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Wall-clock bounds for the capture pipeline
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// How many times a failed task is re-queued before it is terminal
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep between queue polls when a worker finds the queue empty
    #[serde(default = "default_queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,

    /// Page viewport applied before navigation
    #[serde(default)]
    pub viewport: ViewportSettings,

    /// Screenshot rendering options
    #[serde(default)]
    pub screenshot: ScreenshotSettings,

    /// Optional user agent override applied to every page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Reject submissions whose URL is already pending or processing
    #[serde(default)]
    pub reject_duplicate_urls: bool,

    /// Remote browser endpoints; one worker is bound to each
    pub browsers: Vec<BrowserEndpoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Address the HTTP API binds to
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1:8090".to_string() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    /// Navigation bound in milliseconds
    pub page_load: u64,

    /// Per-artifact rendering/extraction bound in milliseconds
    pub capture: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { page_load: 30_000, capture: 10_000 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ViewportSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self { width: 1280, height: 800 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotSettings {
    /// Capture the full scroll height instead of the viewport
    #[serde(default)]
    pub full_page: bool,

    /// JPEG quality 1-100; ignored for PNG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
}

/// One remote browser instance reachable over CDP.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEndpoint {
    /// CDP websocket or debug URL, e.g. `ws://10.0.0.5:9222`
    pub endpoint: String,

    /// Delay in milliseconds inserted before every page command
    #[serde(default)]
    pub slow_mo: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_queue_poll_interval_ms() -> u64 {
    50
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./captures"),
            server: ServerSettings::default(),
            timeouts: TimeoutSettings::default(),
            max_retries: default_max_retries(),
            queue_poll_interval_ms: default_queue_poll_interval_ms(),
            viewport: ViewportSettings::default(),
            screenshot: ScreenshotSettings::default(),
            user_agent: None,
            reject_duplicate_urls: false,
            browsers: vec![BrowserEndpoint {
                endpoint: "ws://127.0.0.1:9222".to_string(),
                slow_mo: 0,
            }],
        }
    }
}

impl ServiceConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("io", "webshot", "webshot") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Default config file location (`default.yaml` under the config dir).
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration, writing one out on first run.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            anyhow::bail!("outputDir must not be empty");
        }
        if self.timeouts.page_load == 0 {
            anyhow::bail!("timeouts.pageLoad must be positive");
        }
        if self.timeouts.capture == 0 {
            anyhow::bail!("timeouts.capture must be positive");
        }
        if self.queue_poll_interval_ms == 0 {
            anyhow::bail!("queuePollIntervalMs must be positive");
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            anyhow::bail!("viewport dimensions must be positive");
        }
        if let Some(quality) = self.screenshot.quality {
            if !(1..=100).contains(&quality) {
                anyhow::bail!("screenshot.quality must be between 1 and 100");
            }
        }
        if self.browsers.is_empty() {
            anyhow::bail!("at least one browser endpoint must be configured");
        }
        for browser in &self.browsers {
            if browser.endpoint.trim().is_empty() {
                anyhow::bail!("browser endpoint must not be empty");
            }
        }
        Ok(())
    }

    /// Create the output directory if needed and verify it is usable.
    pub fn ensure_output_dir(&self) -> Result<()> {
        if !self.output_dir.exists() {
            if let Err(e) = fs::create_dir_all(&self.output_dir) {
                error!("Failed to create output directory: {}", e);
                return Err(e).context(format!(
                    "Failed to create output directory: {}",
                    self.output_dir.display()
                ));
            }
        }
        if !self.output_dir.is_dir() {
            anyhow::bail!("outputDir is not a directory: {}", self.output_dir.display());
        }
        Ok(())
    }
}
