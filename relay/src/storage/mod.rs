//! Object storage access.
//!
//! The relay only ever needs two operations against a bucket/key namespace:
//! fetch an object's bytes and write an object's bytes. Both go through
//! [`StorageClient`], which hides which `object_store` backend holds the
//! buckets.

pub mod client;

pub use client::{StorageClient, StorageError};
