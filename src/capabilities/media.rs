//! Location analysis for uploaded photos and videos.
//!
//! Both capabilities ask the configured model, without tools, to describe
//! where the media was captured.

use super::keyframes::extract_keyframes;
use crate::config::{MediaSettings, Settings};
use crate::conversation::{ContentBlock, Turn};
use crate::error::{Result, TripsyError};
use crate::model::{ModelClient, ModelRequest};
use crate::tools::{Capability, ToolArguments, ToolDeclaration};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

pub const IMAGE_TOOL_NAME: &str = "get_image_location";
pub const VIDEO_TOOL_NAME: &str = "get_video_location";

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

pub fn image_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        IMAGE_TOOL_NAME,
        "Work out where a photo was taken. Use this when the user has uploaded an image.",
        json!({
            "type": "object",
            "properties": {
                "image_path": {
                    "type": "string",
                    "description": "Path of the uploaded image file"
                }
            },
            "required": ["image_path"]
        }),
    )
}

pub fn video_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        VIDEO_TOOL_NAME,
        "Work out where a video was recorded from a few of its frames. Use this when the \
         user has uploaded a video.",
        json!({
            "type": "object",
            "properties": {
                "video_path": {
                    "type": "string",
                    "description": "Path of the uploaded video file"
                }
            },
            "required": ["video_path"]
        }),
    )
}

/// Media type of an image, guessed from its extension.
pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
}

pub fn is_image(path: &Path) -> bool {
    media_type_for(path).is_some()
}

/// Read an image file into an inline image block.
pub async fn image_block(path: &Path) -> Result<ContentBlock> {
    let media_type = media_type_for(path).ok_or_else(|| {
        TripsyError::InvalidInput(format!("Unsupported image type: {}", path.display()))
    })?;
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        TripsyError::Media(format!("Cannot read {}: {}", path.display(), e))
    })?;

    Ok(ContentBlock::Image {
        media_type: media_type.to_string(),
        data: STANDARD.encode(bytes),
    })
}

async fn describe(
    client: &dyn ModelClient,
    mut blocks: Vec<ContentBlock>,
    prompt: &str,
    max_tokens: u32,
) -> Result<String> {
    blocks.push(ContentBlock::text(prompt));
    let turns = [Turn::user_blocks(blocks)];
    let request = ModelRequest {
        messages: &turns,
        tools: &[],
        max_tokens,
        system: None,
    };

    let response = client.send(&request).await?;
    Ok(response.text())
}

#[derive(Debug, Deserialize)]
struct ImageArgs {
    image_path: String,
}

#[derive(Debug, Deserialize)]
struct VideoArgs {
    video_path: String,
}

/// The `get_image_location` capability.
pub struct ImageLocationCapability {
    client: Arc<dyn ModelClient>,
    settings: MediaSettings,
}

impl ImageLocationCapability {
    pub fn new(client: Arc<dyn ModelClient>, settings: MediaSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl Capability for ImageLocationCapability {
    #[instrument(skip_all)]
    async fn invoke(&self, args: ToolArguments) -> Result<Value> {
        let args: ImageArgs = args.parse()?;
        let path = Settings::expand_path(&args.image_path);
        info!("Locating image {}", path.display());

        let image = image_block(&path).await?;
        let answer = describe(
            self.client.as_ref(),
            vec![image],
            &self.settings.image_prompt,
            self.settings.max_tokens,
        )
        .await?;
        Ok(Value::String(answer))
    }
}

/// The `get_video_location` capability.
pub struct VideoLocationCapability {
    client: Arc<dyn ModelClient>,
    settings: MediaSettings,
    temp_root: PathBuf,
}

impl VideoLocationCapability {
    /// Keyframes are written to a fresh directory under `temp_root` and removed afterwards.
    pub fn new(client: Arc<dyn ModelClient>, settings: MediaSettings, temp_root: PathBuf) -> Self {
        Self {
            client,
            settings,
            temp_root,
        }
    }
}

#[async_trait]
impl Capability for VideoLocationCapability {
    #[instrument(skip_all)]
    async fn invoke(&self, args: ToolArguments) -> Result<Value> {
        let args: VideoArgs = args.parse()?;
        let path = Settings::expand_path(&args.video_path);
        if !path.is_file() {
            return Err(TripsyError::InvalidInput(format!(
                "Video file not found: {}",
                path.display()
            )));
        }
        info!("Locating video {}", path.display());

        tokio::fs::create_dir_all(&self.temp_root).await?;
        let workdir = tempfile::Builder::new()
            .prefix("keyframes-")
            .tempdir_in(&self.temp_root)?;

        let frames = extract_keyframes(&self.settings, &path, workdir.path()).await?;
        if frames.is_empty() {
            return Err(TripsyError::Media(format!(
                "No frames could be extracted from {}",
                path.display()
            )));
        }

        let mut blocks = Vec::with_capacity(frames.len() + 1);
        for frame in &frames {
            blocks.push(image_block(frame).await?);
        }

        let answer = describe(
            self.client.as_ref(),
            blocks,
            &self.settings.video_prompt,
            self.settings.max_tokens,
        )
        .await?;
        Ok(Value::String(answer))
    }
}
