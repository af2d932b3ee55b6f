pub mod conversation;
pub mod feed;
pub mod message;
pub mod offer;

pub use conversation::*;
pub use feed::*;
pub use message::*;
pub use offer::*;
