use std::sync::LazyLock;

use serde_json::{Value, json};

use crate::models::{GenerationRequest, ImageFile, InlineImage};

pub const REQUIRED_FIELDS: [&str; 6] = ["genre", "mood", "tempo", "key", "instruments", "description"];

static MUSIC_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "genre": {
                "type": "STRING",
                "description": "e.g., 'Ambient Lo-fi', 'Uptempo Electronic', 'Cinematic Orchestral'"
            },
            "mood": {
                "type": "STRING",
                "description": "e.g., 'Relaxing and introspective', 'Energetic and motivational'"
            },
            "tempo": {
                "type": "INTEGER",
                "description": "Beats per minute (BPM), e.g., 80"
            },
            "key": {
                "type": "STRING",
                "description": "Musical key, e.g., 'C Minor'"
            },
            "instruments": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Primary instruments in order of prominence, e.g., ['Piano', 'Synth Pad', '808 Drums']"
            },
            "description": {
                "type": "STRING",
                "description": "A one or two-sentence creative description of the track."
            }
        },
        "required": REQUIRED_FIELDS,
    })
});

/// 结果 schema，作为 `responseSchema` 交给生成服务
pub fn result_schema() -> &'static Value {
    &MUSIC_SCHEMA
}

/// 构造发往模型的多模态请求。
///
/// prompt 非空、图片大小与类型由调用方保证，这里不做校验。
pub fn build_request(prompt: &str, image: Option<&ImageFile>) -> GenerationRequest {
    let subject = if image.is_some() {
        "user prompt and the attached image"
    } else {
        "user prompt"
    };

    let instruction_text = format!(
        "Read the following {subject} and imagine an original piece of music that fits it.\n\
         Infer the mood, theme and style, then describe the track: genre, mood, tempo in BPM, \
         musical key, the main instruments and a one or two sentence description.\n\
         \n\
         User Prompt: \"{prompt}\"\n\
         \n\
         Reply with a single JSON object that follows the provided schema exactly \
         (fields: {fields}). Do not put any text or markdown formatting before or after the JSON object.",
        fields = REQUIRED_FIELDS.join(", "),
    );

    GenerationRequest {
        instruction_text,
        image: image.map(InlineImage::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_MAX_IMAGE_BYTES, RequestPart};

    #[test]
    fn text_only_request_quotes_prompt_and_has_no_image() {
        let request = build_request("Upbeat electronic music for a workout", None);

        assert!(
            request
                .instruction_text
                .contains("\"Upbeat electronic music for a workout\"")
        );
        assert!(request.instruction_text.contains("JSON object"));
        assert!(!request.instruction_text.contains("attached image"));
        assert!(request.image.is_none());
        assert_eq!(request.parts().len(), 1);
    }

    #[test]
    fn image_part_is_reproduced_after_text() {
        let image = ImageFile::from_base64("iVBORw0KGgo=", "image/png", DEFAULT_MAX_IMAGE_BYTES)
            .expect("valid image");
        let request = build_request("rainy city at night", Some(&image));

        assert!(request.instruction_text.contains("attached image"));
        let parts = request.parts();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], RequestPart::Text(text) if text.contains("rainy city at night")));
        match parts[1] {
            RequestPart::Image(inline) => {
                assert_eq!(inline.data, "iVBORw0KGgo=");
                assert_eq!(inline.media_type, "image/png");
            }
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn schema_requires_all_fields() {
        let schema = result_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required list")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, REQUIRED_FIELDS);
        assert_eq!(schema["properties"]["tempo"]["type"], "INTEGER");
        assert_eq!(schema["properties"]["instruments"]["items"]["type"], "STRING");
    }
}
