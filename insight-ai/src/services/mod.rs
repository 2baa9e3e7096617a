//! Services for the analysis pipeline

pub mod inference_client;
pub mod response_normalizer;
pub mod status;

pub use inference_client::{
    BackendError, HttpInferenceBackend, InferenceBackend, InferenceClient, Media, PromptPayload,
};
pub use response_normalizer::normalize;
pub use status::{record_status, RecordStatusView};
