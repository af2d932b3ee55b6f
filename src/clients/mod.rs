pub mod identity;
pub mod listing;
pub mod notify;

pub use identity::{IdentityClient, IdentityDirectory, Profile};
pub use listing::{ListingClient, ListingService, ListingSummary};
pub use notify::{NotificationDispatcher, WebhookNotifier};
