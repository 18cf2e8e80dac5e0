//! Infrastructure: the completion-provider boundary and shared decoding.

pub mod openai;
pub mod ports;
pub mod tolerant_json;
