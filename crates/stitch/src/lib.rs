//! Safe Rust bindings over the stitch build engine boundary.
//!
//! The engine speaks a C-compatible protocol of handles, `repr(C)` records
//! and callbacks (see `stitch_abi`). This crate wraps that protocol in owned
//! Rust types:
//!
//! - [`BuildOptions`] configures entry points, bundling, sources and plugins.
//! - [`build`] and [`build_async`] run one-shot builds; a [`Context`] keeps
//!   plugin setup around for repeated builds and supports cancellation.
//! - [`BuildResult`] owns the engine's result record and exposes borrowed
//!   views ([`OutputFile`], [`Message`]) over it.
//! - [`Plugin`] implementations register start hooks through a
//!   [`PluginBuilder`].
//!
//! ```
//! use stitch::{BuildOptions, MemoryFs};
//!
//! let options = BuildOptions::new()
//!     .bundle(true)
//!     .source_fs(MemoryFs::new().with_file("index.js", "run();\n"))
//!     .entry_point("index.js", "out.js");
//! let result = stitch::build(&options);
//! assert!(!result.is_error());
//! assert_eq!(result.output_files()[0].text(), Some("run();\n"));
//! ```

pub mod build;
pub mod context;
pub mod message;
pub mod plugin;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::build::{BuildFuture, BuildOptions, BuildResult, OutputFile, build, build_async};
pub use self::context::{Context, ContextError};
pub use self::message::{Location, Message, Note};
pub use self::plugin::{OnStartResult, Plugin, PluginBuilder};
pub use stitch_abi::owned::{BuildOutcome, LocationData, MessageData, NoteData, OutputFileData};
pub use stitch_engine::context::CANCELLED_ID;
pub use stitch_engine::{MemoryFs, OsFs, SourceError, SourceFs};
