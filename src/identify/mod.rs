pub mod data_uri;
pub mod gemini;
pub mod interface;
pub mod openai;
pub mod prompt;
pub mod service;

pub use data_uri::{encode_image_bytes, load_image_file, parse_data_uri};
pub use interface::{
    ErrorReason, IdentificationResult, IdentifyError, IdentifyRequest, MedicineIdentifier,
};
pub use service::IdentifyService;
