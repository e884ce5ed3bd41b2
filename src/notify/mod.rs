pub mod email;
pub mod recipients;

pub use email::{DigestMailer, DigestMetadata, DigestRenderer, OutgoingDigest, SmtpMailer};
pub use recipients::coerce_recipient_list;
