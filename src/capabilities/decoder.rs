use tracing::warn;

use crate::{
    errors::{AgentError, Result},
    models::GeneratedMusic,
};

/// 把模型返回的原始文本解析成 `GeneratedMusic`。
///
/// 只接受完整且类型正确的 JSON 对象，任何不符合都返回 `AgentError::Decoding`，
/// 错误中保留未经修改的原始文本。
pub fn decode_music(raw: &str) -> Result<GeneratedMusic> {
    let sanitized = strip_code_fence(raw.trim());

    let music: GeneratedMusic = serde_json::from_str(sanitized).map_err(|err| {
        warn!(target: "result_decoder", error = %err, response = raw, "模型返回无法解析为音乐描述");
        AgentError::decoding(err.to_string(), raw)
    })?;

    if let Err(reason) = check_shape(&music) {
        warn!(target: "result_decoder", reason, response = raw, "模型返回不符合结果 schema");
        return Err(AgentError::decoding(reason, raw));
    }

    Ok(music)
}

fn check_shape(music: &GeneratedMusic) -> std::result::Result<(), &'static str> {
    if music.tempo == 0 {
        return Err("tempo must be a positive number of beats per minute");
    }
    if music.instruments.is_empty() {
        return Err("instruments must not be empty");
    }
    Ok(())
}

fn strip_code_fence(text: &str) -> &str {
    if let Some(body) = text.strip_prefix("```json") {
        body.trim_end_matches("```").trim()
    } else if let Some(body) = text.strip_prefix("```") {
        body.trim_end_matches("```").trim()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKOUT: &str = r#"{"genre":"Uptempo Electronic","mood":"Energetic","tempo":128,"key":"A Minor","instruments":["Synth Lead","808 Drums","Bass"],"description":"A driving track built for motivation."}"#;

    fn sample() -> GeneratedMusic {
        GeneratedMusic {
            genre: "Ambient Lo-fi".to_string(),
            mood: "Relaxing and introspective".to_string(),
            tempo: 80,
            key: "C Minor".to_string(),
            instruments: vec!["Piano".to_string(), "Synth Pad".to_string()],
            description: "Soft keys over a dusty beat.".to_string(),
        }
    }

    fn assert_decoding_error(raw: &str) {
        let err = decode_music(raw).unwrap_err();
        assert!(matches!(err, AgentError::Decoding { .. }), "unexpected error: {err:?}");
        assert_eq!(err.raw_response(), Some(raw));
    }

    #[test]
    fn decodes_workout_example() {
        let music = decode_music(WORKOUT).expect("valid response");
        assert_eq!(music.tempo, 128);
        assert_eq!(music.key, "A Minor");
        assert_eq!(music.instruments, vec!["Synth Lead", "808 Drums", "Bass"]);
    }

    #[test]
    fn encoded_value_decodes_to_equal_value() {
        let original = sample();
        let raw = serde_json::to_string(&original).expect("serialize");
        assert_eq!(decode_music(&raw).expect("decode"), original);
    }

    #[test]
    fn surrounding_whitespace_and_fence_are_tolerated() {
        let fenced = format!("\n```json\n{WORKOUT}\n```\n");
        assert_eq!(decode_music(&fenced).expect("fenced"), decode_music(WORKOUT).expect("plain"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let raw = r#"{"genre":"Jazz","mood":"Warm","tempo":96,"key":"F Major","instruments":["Upright Bass"],"description":"Late night trio.","confidence":0.9}"#;
        assert_eq!(decode_music(raw).expect("decode").genre, "Jazz");
    }

    #[test]
    fn every_missing_field_is_rejected() {
        let full: serde_json::Value = serde_json::from_str(WORKOUT).expect("json");
        for field in crate::capabilities::REQUIRED_FIELDS {
            let mut value = full.clone();
            value.as_object_mut().expect("object").remove(field);
            assert_decoding_error(&value.to_string());
        }
    }

    #[test]
    fn non_numeric_tempo_is_rejected() {
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":"fast","key":"F Major","instruments":["Piano"],"description":"x"}"#,
        );
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":96.5,"key":"F Major","instruments":["Piano"],"description":"x"}"#,
        );
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":0,"key":"F Major","instruments":["Piano"],"description":"x"}"#,
        );
    }

    #[test]
    fn empty_or_mistyped_instruments_are_rejected() {
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":96,"key":"F Major","instruments":[],"description":"x"}"#,
        );
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":96,"key":"F Major","instruments":"Piano","description":"x"}"#,
        );
        assert_decoding_error(
            r#"{"genre":"Jazz","mood":"Warm","tempo":96,"key":"F Major","instruments":["Piano",3],"description":"x"}"#,
        );
    }

    #[test]
    fn prose_and_garbage_are_rejected() {
        assert_decoding_error("Here is your track: a calm piano piece.");
        assert_decoding_error("");
        assert_decoding_error("[1, 2, 3]");
    }
}
