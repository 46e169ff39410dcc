//! # Firebase Storage Provider
//!
//! Object storage backing [`StreamSource::Storage`](bridge_traits::stream::StreamSource)
//! tracks. A storage path is exchanged for a time-limited download URL by
//! reading the object's metadata with the user's identity token.
//!
//! The identity token comes from the host through [`IdentityTokenSource`];
//! [`IdentityTokens`] adapts it so a rejected token is renewed and the lookup
//! retried once.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;

pub use client::{FirebaseStorageClient, FirebaseStorageProvider, StorageObject};
pub use config::FirebaseStorageConfig;
pub use error::{FirebaseStorageError, Result};
pub use identity::{IdentityTokenSource, IdentityTokens};
