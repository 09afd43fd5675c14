//! Context domain: the combined build/upload record, its merge rule, and the
//! file-backed store both phases persist it through.

mod legacy;
pub mod patch;
pub mod store;
pub mod types;

pub(crate) use legacy::decode_record;
pub use patch::ContextPatch;
pub use store::{ContextStore, CONTEXT_FILE_NAME};
pub use types::{
    CombinedContext, ContextStatus, PaymentSnapshot, PublishResult, PullRequestInfo,
    TriggerKind, CONTEXT_VERSION,
};
