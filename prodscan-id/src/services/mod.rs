//! Production implementations of the pipeline's external collaborators

pub mod image_codec;
pub mod openai_client;
pub mod openfoodfacts_client;
pub mod vision_client;

pub use image_codec::RasterCodec;
pub use openai_client::OpenAIClient;
pub use openfoodfacts_client::OpenFoodFactsClient;
pub use vision_client::VisionClient;
