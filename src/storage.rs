pub mod backends;
pub mod resolver;
pub mod sas;
mod template;

#[cfg(test)]
pub mod testing;

pub use resolver::{PathResolver, ResolveError};
pub use template::{BlobStore, UserDelegationKey};
