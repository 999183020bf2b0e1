//! Image reference resolution.
//!
//! Tasks reference their image by a server path such as
//! `/data/upload/3/1a2b3c4d-shoe.jpg`. In `remote` mode the path is appended
//! to a base URL and fetched over HTTP; in `local` mode the upload prefix
//! (`1a2b3c4d-`) is stripped from the file name and the original file is
//! read from a local directory.

use super::Task;
use crate::config::{Config, ImageMode};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{resolve_env_var, ImageInput};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Length of the random prefix Label Studio prepends to uploaded file names.
pub const UPLOAD_PREFIX_LEN: usize = 9;

/// Where a task's image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Remote(String),
    Local(PathBuf),
}

impl std::fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageLocation::Remote(url) => f.write_str(url),
            ImageLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Strip the upload prefix from a stored file name.
pub fn strip_upload_prefix(file_name: &str) -> Option<&str> {
    file_name
        .get(UPLOAD_PREFIX_LEN..)
        .filter(|rest| !rest.is_empty())
}

/// Resolves task image references and loads them as [`ImageInput`]s.
pub struct ImageResolver {
    mode: ImageMode,
    base_url: String,
    local_dir: PathBuf,
    data_key: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl ImageResolver {
    pub fn new(mode: ImageMode, base_url: &str, local_dir: &Path, data_key: &str) -> Self {
        Self {
            mode,
            base_url: base_url.trim_end_matches('/').to_string(),
            local_dir: local_dir.to_path_buf(),
            data_key: data_key.to_string(),
            auth_token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config. Remote fetches reuse the Label Studio token.
    pub fn from_config(config: &Config) -> Self {
        let mut resolver = Self::new(
            config.images.mode,
            &config.images.base_url,
            &config.local_image_dir(),
            &config.images.data_key,
        );
        resolver.auth_token = resolve_env_var(&config.label_studio.api_key);
        resolver
    }

    pub fn mode(&self) -> ImageMode {
        self.mode
    }

    /// Work out where a task's image lives without touching it.
    pub fn locate(&self, task: &Task) -> PipelineResult<ImageLocation> {
        let reference = task
            .data
            .get(&self.data_key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Image {
                reference: format!("task {}", task.id),
                message: format!("task data has no string '{}' field", self.data_key),
            })?;

        match self.mode {
            ImageMode::Remote => {
                if reference.starts_with("http://") || reference.starts_with("https://") {
                    Ok(ImageLocation::Remote(reference.to_string()))
                } else if reference.starts_with('/') {
                    Ok(ImageLocation::Remote(format!("{}{reference}", self.base_url)))
                } else {
                    Ok(ImageLocation::Remote(format!("{}/{reference}", self.base_url)))
                }
            }
            ImageMode::Local => {
                let file_name = reference.rsplit('/').next().unwrap_or(reference);
                let original =
                    strip_upload_prefix(file_name).ok_or_else(|| PipelineError::Image {
                        reference: reference.to_string(),
                        message: format!(
                            "file name shorter than the {UPLOAD_PREFIX_LEN}-character upload prefix"
                        ),
                    })?;
                Ok(ImageLocation::Local(self.local_dir.join(original)))
            }
        }
    }

    /// Fetch or read the image and encode it for transport.
    pub async fn load(&self, location: &ImageLocation) -> PipelineResult<ImageInput> {
        let image_error = |message: String| PipelineError::Image {
            reference: location.to_string(),
            message,
        };

        let bytes = match location {
            ImageLocation::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| image_error(format!("Failed to read image: {e}")))?,
            ImageLocation::Remote(url) => {
                let mut request = self.client.get(url).timeout(Duration::from_secs(30));
                if let Some(token) = &self.auth_token {
                    request = request.header("Authorization", format!("Token {token}"));
                }
                let resp = request
                    .send()
                    .await
                    .map_err(|e| image_error(format!("Failed to fetch image: {e}")))?;
                if !resp.status().is_success() {
                    return Err(image_error(format!("HTTP {}", resp.status())));
                }
                resp.bytes()
                    .await
                    .map_err(|e| image_error(format!("Failed to read image body: {e}")))?
                    .to_vec()
            }
        };

        Ok(ImageInput::from_bytes(&bytes, &format_of(location)))
    }
}

/// Image format from the reference's extension, defaulting to jpeg.
fn format_of(location: &ImageLocation) -> String {
    let name = match location {
        ImageLocation::Remote(url) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
        ImageLocation::Local(path) => path.to_string_lossy().into_owned(),
    };
    Path::new(&name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "jpeg".to_string())
}
