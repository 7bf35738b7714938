//! Multipart upload client for S3-compatible object stores

pub mod client;
pub mod driver;
pub mod error;
#[cfg(feature = "test-utils")]
pub mod memory;
pub mod store;

pub use client::S3Store;
pub use driver::MultipartUploadDriver;
pub use error::ClientError;
#[cfg(feature = "test-utils")]
pub use memory::MemoryStore;
pub use store::ObjectStoreClient;

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ClientError>;
