//! # lazy-pipes
//!
//! Lazy, composable, shell-style pipelines over streams of tokens.
//!
//! Stages are ordinary functions registered with a [`StageDescriptor`].
//! Calling a stage only binds its arguments; chaining with [`Pipe::pipe`]
//! only wires sources together. Nothing runs until a token is pulled, either
//! by iterating a [`Connector`] or by attaching a terminator such as
//! [`stages::count`], which drains the chain and then closes every link back
//! to the root.
//!
//! ## Overview
//!
//! - **Composable stages**: lazy transformations (`matches`, `smap`, `head`, ...)
//! - **Terminators**: drain into one value (`first`, `count`, `aslist`, ...)
//! - **Sources**: literal sequences, auto-wrapped scalars, files, globs, processes
//! - **Closing**: every stage's resources are released exactly once
//!
//! ## Example
//!
//! ```
//! use lazy_pipes::{Pipe, source};
//! use lazy_pipes::stages::{aslist, head, matches, smap};
//!
//! let lines: Vec<String> = ["INFO start", "ERROR disk", "INFO tick", "ERROR net"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//!
//! let errors = source(lines)
//!     .pipe(matches("^ERROR"))?
//!     .pipe(smap(|line: String| line[6..].to_string()))?
//!     .pipe(head(5))?
//!     .pipe(aslist())?;
//!
//! assert_eq!(errors, vec!["disk", "net"]);
//! # Ok::<(), lazy_pipes::PipelineError>(())
//! ```

pub mod config;
pub mod connector;
pub mod error;
mod executor;
pub mod pipe;
pub mod stage;
pub mod stages;
pub mod stream;

pub use config::{StreamConfig, TextEncoding};
pub use connector::Connector;
pub use error::{PipelineError, Result};
pub use pipe::{Downstream, Pipe, TerminatorCall};
pub use stage::{
    ComposableFactory, FromFn, Input, StageDescriptor, StageKind, Step, TerminatorFactory,
    TerminatorFn, step_fn, wrap, wrap_terminator,
};
pub use stream::{BoxStream, IntoSource, Source, TokenStream, source};
