//! cppan: C/C++ package manager and CMake build-system generator.
//!
//! Given a `cppan.yml` manifest, cppan resolves the transitive dependency
//! graph against a remote registry, downloads and verifies package
//! archives into a content-addressed cache, and emits the CMake files that
//! build the project together with its dependencies.
//!
//! # Architecture
//!
//! ```text
//! manifest → source discovery → registry round trip
//!          → cache (download / verify / unpack) → build-file emission
//! ```
//!
//! The pipeline is single-threaded and synchronous; every failure is fatal
//! to the invocation and leaves the cache in a consistent state.

pub mod cache;
pub mod cwd;
pub mod error;
pub mod generate;
pub mod manifest;
pub mod path;
pub mod registry;
pub mod resolve;
pub mod sources;
pub mod version;
pub mod yaml;
