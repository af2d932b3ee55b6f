pub mod conversations;
pub mod events;
pub mod feed;
pub mod messages;
pub mod offers;
