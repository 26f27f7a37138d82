//! CHK and SSK block construction and verification (spec §3, §4.2).

pub mod chk;
pub mod error;
pub mod ssk;

pub use chk::ChkBlock;
pub use error::BlockVerifyError;
pub use ssk::{DsaIdentity, SskBlock};
