//! Remote archive backends.
//!
//! The remote archive is the durable copy of each owner's store file. It
//! speaks whole files only: there is no delta or patch protocol, a push
//! replaces the owner's entry and a pull returns it in full.
//!
//! - **MemoryArchive**: process-local, for tests and embedding
//! - **FilesystemArchive**: a directory standing in for a bucket
//!
//! # Custom Backends
//!
//! Implement the `RemoteArchive` trait to sync to another store:
//!
//! ```ignore
//! use metasync::archive::RemoteArchive;
//!
//! struct S3Archive { /* ... */ }
//! impl RemoteArchive for S3Archive { /* ... */ }
//! ```

mod backend;
mod filesystem;
mod memory;

pub use backend::RemoteArchive;
pub use filesystem::FilesystemArchive;
pub use memory::MemoryArchive;
