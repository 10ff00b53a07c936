//! Domain services. Each mutation commits to the store first and only then
//! pushes live events, so a dropped push never undoes committed state.

pub mod messaging;
pub mod relationships;
pub mod statuses;

pub use messaging::{AttachmentUpload, MessagingService, OutgoingMessage};
pub use relationships::{NewUser, RelationshipService, RequestAction, UserSearchResult};
pub use statuses::{StatusDraft, StatusService};
