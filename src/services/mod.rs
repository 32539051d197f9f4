// Application services. Each one owns a slice of behaviour and talks to storage only through
// EntityStore; nothing here spans more than one document per atomic step.

pub mod directory;
pub mod engagement_service;
pub mod moderation_service;
pub mod order_service;
pub mod pointer_sync;
pub mod rsvp_service;
pub mod unified_orders;

pub use engagement_service::{EngagementService, ReviewInput, ReviewTarget};
pub use moderation_service::{ModerationService, ReportTarget};
pub use order_service::{OrderService, OrderTarget};
pub use pointer_sync::PointerSync;
pub use rsvp_service::{RsvpInput, RsvpService};
pub use unified_orders::{PageRequest, UnifiedOrderService};
