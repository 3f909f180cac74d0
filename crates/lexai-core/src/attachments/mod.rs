pub mod codec;
pub mod extractors;
pub mod kind;
pub mod manager;
pub mod model;
pub mod validation;

pub use codec::{AttachmentCodec, SheetText, TextExtractor, WorkbookParser};
pub use kind::{AttachmentKind, ContentKind, classify};
pub use manager::{AttachmentManager, Rejection, SubmitReport};
pub use model::{Attachment, EncodedPayload, FileSource, RawFile, decode_portable, encode_portable};
pub use validation::{ValidationError, validate_attachment};
