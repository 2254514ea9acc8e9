mod traits;
mod xai;

pub use traits::*;
pub use xai::{sse_events, SseDecoder, XaiClient};
