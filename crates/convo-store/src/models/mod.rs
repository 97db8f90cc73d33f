//! Domain models persisted in the document store.
//!
//! Every model derives `Serialize`/`Deserialize` with PascalCase property
//! names. User snapshots embedded in threads, events and messages are not
//! stored; hydration rebuilds them from the authoritative user documents.

pub mod event;
pub mod message;
pub mod readable;
pub mod thread;
pub mod user;

pub use event::{Event, EventDraft, Place};
pub use message::Message;
pub use readable::{Read, Readable};
pub use thread::{MessagePreview, Thread};
pub use user::{OAuthProfile, Provider, User, UserPartial};
