mod item;
mod media_ref;
mod tag;

pub use item::MediaItem;
pub use media_ref::MediaRef;
pub use tag::{TagKind, sanitize_requester};
