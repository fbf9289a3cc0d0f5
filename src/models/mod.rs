use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, Result};

/// 上传图片的大小上限 (4 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

/// 模型生成并通过校验的音乐描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMusic {
    pub genre: String,
    pub mood: String,
    /// BPM
    pub tempo: u32,
    pub key: String,
    pub instruments: Vec<String>,
    pub description: String,
}

/// 调用方持有的图片，Base64 编码后随请求发送
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    base64: String,
    media_type: String,
}

impl ImageFile {
    pub fn from_bytes(data: &[u8], media_type: &str, max_bytes: usize) -> Result<Self> {
        let media_type = normalize_media_type(media_type)?;
        check_size(data.len(), max_bytes)?;

        Ok(Self {
            base64: BASE64_STANDARD.encode(data),
            media_type,
        })
    }

    pub fn from_base64(data: &str, media_type: &str, max_bytes: usize) -> Result<Self> {
        let media_type = normalize_media_type(media_type)?;
        let data = data.trim();
        let decoded = BASE64_STANDARD
            .decode(data)
            .map_err(|err| AgentError::validation(format!("图片 Base64 解码失败: {err}")))?;
        check_size(decoded.len(), max_bytes)?;

        Ok(Self {
            base64: data.to_string(),
            media_type,
        })
    }

    /// 解析 `data:image/png;base64,....` 形式的 data URL
    pub fn from_data_url(url: &str, max_bytes: usize) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AgentError::validation("图片 data URL 必须以 data: 开头"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AgentError::validation("图片 data URL 缺少数据段"))?;
        let media_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| AgentError::validation("图片 data URL 必须使用 base64 编码"))?;

        Self::from_base64(payload, media_type, max_bytes)
    }

    pub async fn from_path(path: impl AsRef<Path>, max_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let media_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(media_type_for_extension)
            .ok_or_else(|| {
                AgentError::validation(format!("无法识别的图片格式: {}", path.display()))
            })?;

        let metadata = tokio::fs::metadata(path).await?;
        check_size(usize::try_from(metadata.len()).unwrap_or(usize::MAX), max_bytes)?;

        let data = tokio::fs::read(path).await?;
        Self::from_bytes(&data, media_type, max_bytes)
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

fn normalize_media_type(media_type: &str) -> Result<String> {
    let normalized = media_type.trim().to_ascii_lowercase();
    if SUPPORTED_IMAGE_TYPES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(AgentError::validation(format!(
            "不支持的图片类型: {media_type}"
        )))
    }
}

fn check_size(len: usize, max_bytes: usize) -> Result<()> {
    if len > max_bytes {
        return Err(AgentError::validation(format!(
            "Image size should not exceed {}.",
            format_limit(max_bytes)
        )));
    }
    Ok(())
}

fn format_limit(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    match bytes {
        b if b >= MIB && b % MIB == 0 => format!("{}MB", b / MIB),
        b if b >= KIB && b % KIB == 0 => format!("{}KB", b / KIB),
        b => format!("{b} bytes"),
    }
}

fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub media_type: String,
}

impl From<&ImageFile> for InlineImage {
    fn from(value: &ImageFile) -> Self {
        Self {
            data: value.base64().to_string(),
            media_type: value.media_type().to_string(),
        }
    }
}

/// 发往生成服务的多模态请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub instruction_text: String,
    pub image: Option<InlineImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart<'a> {
    Text(&'a str),
    Image(&'a InlineImage),
}

impl GenerationRequest {
    /// 文本在前，图片在后
    pub fn parts(&self) -> Vec<RequestPart<'_>> {
        let mut parts = vec![RequestPart::Text(&self.instruction_text)];
        if let Some(image) = &self.image {
            parts.push(RequestPart::Image(image));
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_from_bytes_encodes_payload() {
        let image = ImageFile::from_bytes(b"hello", "IMAGE/PNG", DEFAULT_MAX_IMAGE_BYTES)
            .expect("valid image");
        assert_eq!(image.base64(), "aGVsbG8=");
        assert_eq!(image.media_type(), "image/png");
    }

    #[test]
    fn image_over_ceiling_is_rejected() {
        let data = vec![0u8; 17];
        let err = ImageFile::from_bytes(&data, "image/jpeg", 16).unwrap_err();
        assert_eq!(err.user_message(), "Image size should not exceed 16 bytes.");

        let exact = vec![0u8; 16];
        assert!(ImageFile::from_bytes(&exact, "image/jpeg", 16).is_ok());
    }

    #[test]
    fn size_limit_is_readable_at_every_scale() {
        assert_eq!(format_limit(DEFAULT_MAX_IMAGE_BYTES), "4MB");
        assert_eq!(format_limit(512 * 1024), "512KB");
        assert_eq!(format_limit(8), "8 bytes");
        assert_eq!(format_limit(1536 * 1024), "1536KB");
    }

    #[test]
    fn non_image_media_type_is_rejected() {
        let err = ImageFile::from_bytes(b"%PDF", "application/pdf", DEFAULT_MAX_IMAGE_BYTES)
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = ImageFile::from_base64("not base64!!", "image/png", DEFAULT_MAX_IMAGE_BYTES)
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn data_url_is_split_into_type_and_payload() {
        let image =
            ImageFile::from_data_url("data:image/webp;base64,aGVsbG8=", DEFAULT_MAX_IMAGE_BYTES)
                .expect("valid data url");
        assert_eq!(image.media_type(), "image/webp");
        assert_eq!(image.base64(), "aGVsbG8=");

        assert!(ImageFile::from_data_url("image/webp;base64,aGVsbG8=", 1024).is_err());
        assert!(ImageFile::from_data_url("data:image/webp,aGVsbG8=", 1024).is_err());
    }

    #[tokio::test]
    async fn image_from_path_infers_media_type() {
        let path = std::env::temp_dir().join(format!("music-prompt-{}.JPG", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"\xff\xd8\xff").await.expect("write temp image");

        let image = ImageFile::from_path(&path, DEFAULT_MAX_IMAGE_BYTES)
            .await
            .expect("readable image");
        assert_eq!(image.media_type(), "image/jpeg");
        assert_eq!(image.base64(), BASE64_STANDARD.encode(b"\xff\xd8\xff"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_from_metadata() {
        let path = std::env::temp_dir().join(format!("music-prompt-{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, vec![0u8; 2048]).await.expect("write temp image");

        let err = ImageFile::from_path(&path, 1024).await.unwrap_err();
        assert_eq!(err.user_message(), "Image size should not exceed 1KB.");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn parts_put_text_before_image() {
        let request = GenerationRequest {
            instruction_text: "describe".to_string(),
            image: Some(InlineImage {
                data: "aGVsbG8=".to_string(),
                media_type: "image/png".to_string(),
            }),
        };

        let parts = request.parts();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], RequestPart::Text("describe")));
        assert!(matches!(parts[1], RequestPart::Image(img) if img.media_type == "image/png"));
    }
}
