pub mod dedup;
pub mod enrichment;
pub mod notification;
pub mod presence;
pub mod push_dispatcher;
pub mod realtime;

pub use dedup::{DedupDecision, DedupGuard, DedupPolicy};
pub use enrichment::NotificationEnricher;
pub use notification::{EmitOutcome, NotificationService};
pub use presence::PresenceCounter;
pub use push_dispatcher::{DeliveryReport, PushDispatcher, PushPayloadBuilder};
pub use realtime::{PublishOutcome, RealtimeFanout};
