mod decoder;
mod music;

pub use decoder::decode_music;
pub use music::{REQUIRED_FIELDS, build_request, result_schema};
