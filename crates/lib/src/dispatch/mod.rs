//! Message dispatch: modality descriptors, reply strings, the generic pipeline, and the per-chat router.

mod dispatcher;
mod modality;
mod replies;
mod router;

pub use dispatcher::Dispatcher;
pub use modality::{descriptor, ModalityDescriptor};
pub use replies::{
    unsupported_document_reply, FailureStage, GREETING, PDF_FAILURE_REPLY, TEXT_FAILURE_REPLY,
};
pub use router::InboundRouter;
