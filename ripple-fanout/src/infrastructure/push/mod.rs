pub mod encryption;
pub mod http_sender;
pub mod recording_sender;
pub mod vapid;

pub use http_sender::HttpPushSender;
pub use recording_sender::{RecordedDelivery, RecordingPushSender};
pub use vapid::VapidSigner;
