//! Credential references for the rotating uploader
//!
//! A credential is an opaque reference to a service-account file on disk. The
//! uploader never reads or validates the file contents; it only hands the path
//! to the external transfer tool. This crate discovers credential files in a
//! directory and fixes the order the rotation pool starts from.

pub mod discovery;
pub mod error;

pub use discovery::{Credential, DEFAULT_EXTENSION, discover};
pub use error::{Error, Result};
