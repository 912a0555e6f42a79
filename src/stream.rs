//! The pull interface shared by every link in a chain.
//!
//! A [`TokenStream`] hands out one token per call to
//! [`next_token`](TokenStream::next_token) and releases whatever it holds when
//! [`close`](TokenStream::close) is called. Connectors implement it, and so do
//! literal sources built with [`source`] or [`Source::new`].

use std::fmt;

use crate::error::Result;

/// A pull-based, closeable sequence of tokens.
pub trait TokenStream {
    /// Token type produced by this stream.
    type Item;

    /// Prepare the stream for pulling. Called depth-first before the first
    /// token is requested; a no-op for streams that need no setup.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pull the next token. `None` signals the end of the sequence.
    fn next_token(&mut self) -> Option<Result<Self::Item>>;

    /// Release held resources and propagate the close upstream. Must be
    /// idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An owned, type-erased link in a chain.
pub type BoxStream<T> = Box<dyn TokenStream<Item = T>>;

impl<S: TokenStream + ?Sized> TokenStream for Box<S> {
    type Item = S::Item;

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next_token(&mut self) -> Option<Result<Self::Item>> {
        (**self).next_token()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A literal sequence or an already-open iterator used as the root of a chain.
pub struct Source<T> {
    items: Option<Box<dyn Iterator<Item = Result<T>>>>,
}

impl<T: 'static> Source<T> {
    /// Wrap any iterator of plain values.
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self {
            items: Some(Box::new(items.into_iter().map(Ok))),
        }
    }

    /// Wrap an iterator whose items may already be errors.
    pub fn try_new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<T>>,
        I::IntoIter: 'static,
    {
        Self {
            items: Some(Box::new(items.into_iter())),
        }
    }

    /// A source that yields nothing.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// True once the source has been closed.
    pub fn is_closed(&self) -> bool {
        self.items.is_none()
    }
}

impl<T> TokenStream for Source<T> {
    type Item = T;

    fn next_token(&mut self) -> Option<Result<T>> {
        self.items.as_mut()?.next()
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the iterator releases anything it owns.
        self.items = None;
        Ok(())
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("closed", &self.items.is_none())
            .finish()
    }
}

/// Conversion into the root of a chain.
///
/// Collections become their elements; scalars (numbers, `bool`, `char` and
/// strings) are auto-wrapped into a one-element sequence.
pub trait IntoSource {
    type Item;

    fn into_source(self) -> Source<Self::Item>;
}

impl<T: 'static> IntoSource for Source<T> {
    type Item = T;

    fn into_source(self) -> Source<T> {
        self
    }
}

impl<T: 'static> IntoSource for Vec<T> {
    type Item = T;

    fn into_source(self) -> Source<T> {
        Source::new(self)
    }
}

impl<T: 'static, const N: usize> IntoSource for [T; N] {
    type Item = T;

    fn into_source(self) -> Source<T> {
        Source::new(self)
    }
}

impl IntoSource for &str {
    type Item = String;

    fn into_source(self) -> Source<String> {
        Source::new(std::iter::once(self.to_owned()))
    }
}

macro_rules! scalar_source {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoSource for $ty {
                type Item = $ty;

                fn into_source(self) -> Source<$ty> {
                    Source::new(std::iter::once(self))
                }
            }
        )*
    };
}

scalar_source!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, String,
);

/// Start a chain from a literal sequence or an auto-wrapped scalar.
///
/// ```
/// use lazy_pipes::{Pipe, source};
/// use lazy_pipes::stages::{aslist, smap};
///
/// let floats = source(1_i32).pipe(smap(f64::from)).unwrap().pipe(aslist()).unwrap();
/// assert_eq!(floats, vec![1.0]);
/// ```
pub fn source<S: IntoSource>(items: S) -> Source<S::Item> {
    items.into_source()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<S: TokenStream>(stream: &mut S) -> Vec<S::Item> {
        let mut out = Vec::new();
        while let Some(token) = stream.next_token() {
            out.push(token.unwrap());
        }
        out
    }

    #[test]
    fn test_vec_source() {
        let mut src = source(vec![1, 2, 3]);
        assert_eq!(drain(&mut src), vec![1, 2, 3]);
        assert!(src.next_token().is_none());
    }

    #[test]
    fn test_scalar_auto_wrap() {
        assert_eq!(drain(&mut source(7_u8)), vec![7]);
        assert_eq!(drain(&mut source(2.5)), vec![2.5]);
        assert_eq!(drain(&mut source('x')), vec!['x']);
    }

    #[test]
    fn test_str_is_one_token() {
        assert_eq!(drain(&mut source("hello world")), vec!["hello world".to_string()]);
    }

    #[test]
    fn test_close_stops_source() {
        let mut src = source([1, 2, 3]);
        assert_eq!(src.next_token().unwrap().unwrap(), 1);
        src.close().unwrap();
        src.close().unwrap();
        assert!(src.is_closed());
        assert!(src.next_token().is_none());
    }

    #[test]
    fn test_try_new_passes_errors() {
        let mut src = Source::try_new(vec![
            Ok(1),
            Err(crate::PipelineError::stage("test", "boom")),
        ]);
        assert_eq!(src.next_token().unwrap().unwrap(), 1);
        assert!(src.next_token().unwrap().is_err());
    }
}
