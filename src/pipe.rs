//! The composition operator and the redirection shorthands.
//!
//! `left.pipe(right)` binds `left` as the source of `right`. When `right` is
//! a [`Connector`] the result is a new, still inert connector; when it is a
//! [`TerminatorCall`] the chain runs immediately and the materialized value
//! is returned.
//!
//! ```
//! use lazy_pipes::{Pipe, source};
//! use lazy_pipes::stages::{count, matches};
//!
//! let months = vec!["January", "April", "August", "May"];
//! let n = source(months.into_iter().map(String::from).collect::<Vec<_>>())
//!     .pipe(matches("^A"))?
//!     .pipe(count())?;
//! assert_eq!(n, 2);
//! # Ok::<(), lazy_pipes::PipelineError>(())
//! ```

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use crate::connector::Connector;
use crate::error::Result;
use crate::executor;
use crate::stage::{Input, StageDescriptor};
use crate::stages::io::{WriteTarget, write};
use crate::stream::{BoxStream, TokenStream};

/// Body of a terminator with its arguments already bound.
pub(crate) type TerminatorBody<'a, I, V> = Box<dyn FnOnce(&mut Input<'_, I>) -> Result<V> + 'a>;

/// A terminator stage bound to its arguments, waiting for a source.
pub struct TerminatorCall<'a, I, V> {
    descriptor: StageDescriptor,
    body: TerminatorBody<'a, I, V>,
}

impl<'a, I, V> TerminatorCall<'a, I, V> {
    pub fn new<F>(descriptor: StageDescriptor, body: F) -> Self
    where
        F: FnOnce(&mut Input<'_, I>) -> Result<V> + 'a,
    {
        Self {
            descriptor,
            body: Box::new(body),
        }
    }

    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }
}

/// Anything that can sit on the right-hand side of [`Pipe::pipe`].
pub trait Downstream<T> {
    /// What composing yields: a connector, or a terminator's value.
    type Output;

    fn attach(self, upstream: BoxStream<T>) -> Result<Self::Output>;
}

impl<T: 'static, O: 'static> Downstream<T> for Connector<T, O> {
    type Output = Connector<T, O>;

    fn attach(self, upstream: BoxStream<T>) -> Result<Connector<T, O>> {
        self.bind(upstream)
    }
}

impl<T, V> Downstream<T> for TerminatorCall<'_, T, V> {
    type Output = V;

    fn attach(self, upstream: BoxStream<T>) -> Result<V> {
        executor::terminate(self.descriptor, self.body, upstream)
    }
}

/// Composition and redirection for every token stream.
pub trait Pipe: TokenStream + Sized + 'static {
    /// Bind `self` as the source of `next`.
    fn pipe<D>(self, next: D) -> Result<D::Output>
    where
        D: Downstream<Self::Item>,
    {
        next.attach(Box::new(self))
    }

    /// Write every token as a line to `path`, truncating it first (`>`).
    fn redirect(self, path: impl AsRef<Path>) -> Result<()>
    where
        Self::Item: Display,
    {
        self.pipe(write(WriteTarget::truncate(path)))
    }

    /// Write every token as a line to the end of `path` (`>>`).
    fn append(self, path: impl AsRef<Path>) -> Result<()>
    where
        Self::Item: Display,
    {
        self.pipe(write(WriteTarget::append(path)))
    }

    /// Write every token as a line to a caller-owned writer. The writer is
    /// flushed but stays open.
    fn redirect_into<W: Write>(self, writer: &mut W) -> Result<()>
    where
        Self::Item: Display,
    {
        self.pipe(write(WriteTarget::Writer(writer)))
    }
}

impl<S: TokenStream + 'static> Pipe for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use crate::stages::{aslist, first, smap};
    use crate::stream::source;

    #[test]
    fn test_pipe_into_connector_stays_lazy() {
        let connector = source(vec![1, 2, 3]).pipe(smap(|x: i32| x + 1)).unwrap();
        assert!(connector.is_bound());
        assert!(!connector.is_live());
    }

    #[test]
    fn test_pipe_into_terminator_returns_value() {
        let value: Vec<i32> = source(vec![1, 2]).pipe(aslist()).unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[test]
    fn test_pipe_rejects_bound_right_side() {
        let bound = smap(|x: i32| x).with_source(vec![1]).unwrap();
        let err = source(vec![2]).pipe(bound).unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyBound { stage: "smap" }));
    }

    #[test]
    fn test_chain_of_connectors() {
        let head = source(vec![1, 2, 3])
            .pipe(smap(|x: i32| x * 10))
            .unwrap()
            .pipe(smap(|x: i32| x.to_string()))
            .unwrap()
            .pipe(first())
            .unwrap();
        assert_eq!(head.as_deref(), Some("10"));
    }

    #[test]
    fn test_redirect_into_keeps_writer() {
        let mut buffer: Vec<u8> = Vec::new();
        source(vec!["a", "b\n"]).redirect_into(&mut buffer).unwrap();
        source(vec!["c"]).redirect_into(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_terminator_descriptor() {
        let call = first::<i32>();
        assert_eq!(call.descriptor().name, "first");
    }
}
