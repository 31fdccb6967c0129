//! Reference build engine for the stitch boundary.
//!
//! The engine exercises the records and trampolines of `stitch_abi` the way a
//! production bundler would: builds produce [`stitch_abi::BuildResult`]
//! records, plugin setup and start hooks go through the dispatch entry points,
//! and asynchronous completions are delivered from engine threads.
//!
//! The bundling itself is deliberately small. Each entry point is read
//! through a [`SourceFs`], side-effect imports (`import "./x.js";`) are
//! inlined when bundling is enabled, and every emitted file carries a
//! truncated SHA-256 content hash.
//!
//! The C surface lives in [`ffi`]; Rust embedders may also use [`Context`]
//! and the other types directly.

pub mod bundler;
pub mod context;
mod error;
pub mod ffi;
pub mod handles;
pub mod options;
pub mod plugin;
pub mod runtime;
pub mod source;
mod token;

pub use self::context::Context;
pub use self::error::{EngineError, HandleKind};
pub use self::options::{BuildOptions, EntryPoint};
pub use self::plugin::PluginDescriptor;
pub use self::source::{MemoryFs, OsFs, SourceError, SourceFs};
pub use self::token::Token;
