pub mod azure;
pub mod credential;
pub mod register;

pub use credential::CredentialConfig;
pub use register::BlobStorageConfig;
