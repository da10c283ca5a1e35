pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod events;
pub mod store;

pub use dispatcher::{DispatchRequest, Dispatcher};
pub use encoder::{guess_mime_type, AttachmentEncoder, Base64Encoder, PendingFile};
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use store::{GenerationOptions, GenerationOutcome, SessionStore};
