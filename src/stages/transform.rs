//! Generic composable stages: mapping, filtering, slicing and de-duplication.
//!
//! None of these care about the token type beyond the bounds they state, and
//! all of them stream except [`tail`] and [`unique`], which must remember
//! what they have seen.

use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use crate::connector::Connector;
use crate::error::{PipelineError, Result};
use crate::stage::{Input, StageDescriptor, Step, wrap};

const SMAP: StageDescriptor = StageDescriptor::composable("smap", &["func"]);
const SFILTER: StageDescriptor = StageDescriptor::composable("sfilter", &["func"]);
const SFILTERFALSE: StageDescriptor = StageDescriptor::composable("sfilterfalse", &["func"]);
const TAKEWHILE: StageDescriptor = StageDescriptor::composable("takewhile", &["func"]);
const DROPWHILE: StageDescriptor = StageDescriptor::composable("dropwhile", &["func"]);
const CONVERT: StageDescriptor = StageDescriptor::composable("convert", &["converter", "default"]);
const UNIQUE: StageDescriptor = StageDescriptor::composable("unique", &[]);
const HEAD: StageDescriptor = StageDescriptor::composable("head", &["n", "skip"]);
const SSLICE: StageDescriptor = StageDescriptor::composable("sslice", &["start", "stop", "step"]);
const TAIL: StageDescriptor = StageDescriptor::composable("tail", &["n"]);
const SEPARATE: StageDescriptor = StageDescriptor::composable("separate", &[]);

// ---------------------------------------------------------------------------
// Map / filter
// ---------------------------------------------------------------------------

struct MapStep<F> {
    f: F,
}

impl<I, O, F> Step<I> for MapStep<F>
where
    F: FnMut(I) -> O,
{
    type Output = O;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<O>> {
        Some(input.pull()?.map(&mut self.f))
    }
}

/// Apply `f` to every token.
pub fn smap<I, O, F>(f: F) -> Connector<I, O>
where
    I: 'static,
    O: 'static,
    F: FnMut(I) -> O + 'static,
{
    wrap(SMAP, |f: F| Ok(MapStep { f })).call(f)
}

struct FilterStep<F> {
    f: F,
    keep: bool,
}

impl<I, F> Step<I> for FilterStep<F>
where
    F: FnMut(&I) -> bool,
{
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        loop {
            match input.pull()? {
                Ok(token) if (self.f)(&token) != self.keep => continue,
                other => return Some(other),
            }
        }
    }
}

/// Keep tokens for which `f` returns true.
pub fn sfilter<I, F>(f: F) -> Connector<I, I>
where
    I: 'static,
    F: FnMut(&I) -> bool + 'static,
{
    wrap(SFILTER, |f: F| Ok(FilterStep { f, keep: true })).call(f)
}

/// Keep tokens for which `f` returns false.
pub fn sfilterfalse<I, F>(f: F) -> Connector<I, I>
where
    I: 'static,
    F: FnMut(&I) -> bool + 'static,
{
    wrap(SFILTERFALSE, |f: F| Ok(FilterStep { f, keep: false })).call(f)
}

struct TakeWhileStep<F> {
    f: F,
}

impl<I, F> Step<I> for TakeWhileStep<F>
where
    F: FnMut(&I) -> bool,
{
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        match input.pull()? {
            Ok(token) if !(self.f)(&token) => None,
            other => Some(other),
        }
    }
}

/// Pass tokens while `f` holds; stop at the first token where it does not.
pub fn takewhile<I, F>(f: F) -> Connector<I, I>
where
    I: 'static,
    F: FnMut(&I) -> bool + 'static,
{
    wrap(TAKEWHILE, |f: F| Ok(TakeWhileStep { f })).call(f)
}

struct DropWhileStep<F> {
    f: F,
    dropping: bool,
}

impl<I, F> Step<I> for DropWhileStep<F>
where
    F: FnMut(&I) -> bool,
{
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        loop {
            match input.pull()? {
                Ok(token) if self.dropping && (self.f)(&token) => continue,
                other => {
                    self.dropping = false;
                    return Some(other);
                }
            }
        }
    }
}

/// Skip tokens while `f` holds, then pass everything after.
pub fn dropwhile<I, F>(f: F) -> Connector<I, I>
where
    I: 'static,
    F: FnMut(&I) -> bool + 'static,
{
    wrap(DROPWHILE, |f: F| Ok(DropWhileStep { f, dropping: true })).call(f)
}

struct ConvertStep<F, O> {
    f: F,
    default: Option<O>,
}

impl<I, O, E, F> Step<I> for ConvertStep<F, O>
where
    F: FnMut(I) -> std::result::Result<O, E>,
    E: Display,
    O: Clone,
{
    type Output = O;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<O>> {
        let token = match input.pull()? {
            Ok(token) => token,
            Err(err) => return Some(Err(err)),
        };
        Some(match (self.f)(token) {
            Ok(value) => Ok(value),
            Err(err) => match &self.default {
                Some(default) => Ok(default.clone()),
                None => Err(PipelineError::stage(CONVERT.name, err)),
            },
        })
    }
}

/// Apply a fallible conversion. Failures become `default` when one is given,
/// otherwise they are reported as errors at that token.
pub fn convert<I, O, E, F>(f: F, default: Option<O>) -> Connector<I, O>
where
    I: 'static,
    O: Clone + 'static,
    E: Display + 'static,
    F: FnMut(I) -> std::result::Result<O, E> + 'static,
{
    wrap(CONVERT, |(f, default): (F, Option<O>)| Ok(ConvertStep { f, default })).call((f, default))
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

struct UniqueStep<I> {
    seen: HashSet<I>,
}

impl<I> Step<I> for UniqueStep<I>
where
    I: Hash + Eq + Clone,
{
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        loop {
            match input.pull()? {
                Ok(token) if !self.seen.insert(token.clone()) => continue,
                other => return Some(other),
            }
        }
    }
}

/// Pass each distinct token the first time it is seen.
pub fn unique<I>() -> Connector<I, I>
where
    I: Hash + Eq + Clone + 'static,
{
    wrap(UNIQUE, |(): ()| {
        Ok(UniqueStep {
            seen: HashSet::new(),
        })
    })
    .call(())
}

/// Emits tokens at zero-based positions `target, target + stride, ...`
/// strictly below `stop`, never pulling past the last one it needs.
struct SliceStep {
    position: usize,
    target: usize,
    stop: Option<usize>,
    stride: usize,
}

impl<I> Step<I> for SliceStep {
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        loop {
            if self.stop.is_some_and(|stop| self.target >= stop) {
                return None;
            }
            let token = input.pull()?;
            let index = self.position;
            self.position += 1;
            if token.is_err() {
                return Some(token);
            }
            if index < self.target {
                continue;
            }
            self.target = index.saturating_add(self.stride);
            return Some(token);
        }
    }
}

/// The first `n` tokens (`n == 0` passes everything).
pub fn head<I: 'static>(n: usize) -> Connector<I, I> {
    head_skip(n, 0)
}

/// The first `n` tokens after skipping `skip` (`n == 0` passes the rest).
pub fn head_skip<I: 'static>(n: usize, skip: usize) -> Connector<I, I> {
    wrap(HEAD, |(n, skip): (usize, usize)| {
        Ok(SliceStep {
            position: 0,
            target: skip,
            stop: (n > 0).then_some(skip.saturating_add(n)),
            stride: 1,
        })
    })
    .call((n, skip))
}

/// Tokens from 1-based `start` up to (not including) `stop`, every `step`th.
pub fn sslice<I: 'static>(start: usize, stop: Option<usize>, step: usize) -> Connector<I, I> {
    wrap(SSLICE, |(start, stop, step): (usize, Option<usize>, usize)| {
        if start == 0 || step == 0 {
            return Err(PipelineError::stage(
                SSLICE.name,
                "start and step must be at least 1",
            ));
        }
        Ok(SliceStep {
            position: 0,
            target: start - 1,
            stop: stop.map(|stop| stop.saturating_sub(1)),
            stride: step,
        })
    })
    .call((start, stop, step))
}

struct TailStep<I> {
    n: usize,
    buffer: Option<VecDeque<I>>,
}

impl<I> Step<I> for TailStep<I> {
    type Output = I;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<I>> {
        if self.buffer.is_none() {
            let mut buffer = VecDeque::new();
            for token in input.by_ref() {
                let token = match token {
                    Ok(token) => token,
                    Err(err) => {
                        // A partial drain has no meaningful tail.
                        self.buffer = Some(VecDeque::new());
                        return Some(Err(err));
                    }
                };
                if self.n == 0 {
                    continue;
                }
                if buffer.len() == self.n {
                    buffer.pop_front();
                }
                buffer.push_back(token);
            }
            self.buffer = Some(buffer);
        }
        self.buffer.as_mut()?.pop_front().map(Ok)
    }
}

/// The last `n` tokens. Buffers at most `n` tokens while draining its input.
pub fn tail<I: 'static>(n: usize) -> Connector<I, I> {
    wrap(TAIL, |n: usize| Ok(TailStep { n, buffer: None })).call(n)
}

struct SeparateStep<It> {
    current: Option<It>,
}

impl<I, It> Step<I> for SeparateStep<It>
where
    I: IntoIterator<IntoIter = It>,
    It: Iterator,
{
    type Output = It::Item;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<It::Item>> {
        loop {
            if let Some(current) = self.current.as_mut()
                && let Some(item) = current.next()
            {
                return Some(Ok(item));
            }
            match input.pull()? {
                Ok(collection) => self.current = Some(collection.into_iter()),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Flatten collection tokens into their elements.
pub fn separate<I>() -> Connector<I, I::Item>
where
    I: IntoIterator + 'static,
    I::IntoIter: 'static,
    I::Item: 'static,
{
    wrap(SEPARATE, |(): ()| {
        Ok(SeparateStep::<I::IntoIter> { current: None })
    })
    .call(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use crate::stages::aslist;
    use crate::stream::{Source, source};

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn collect<O: 'static>(connector: Connector<String, O>, text: &str) -> Vec<O> {
        source(words(text)).pipe(connector).unwrap().pipe(aslist()).unwrap()
    }

    #[test]
    fn test_smap() {
        let out: Vec<usize> = collect(smap(|s: String| s.len()), "a bb ccc");
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_sfilter_and_false() {
        let kept = collect(sfilter(|s: &String| s.starts_with('h')), "hi ho it off");
        assert_eq!(kept, vec!["hi", "ho"]);
        let dropped = collect(sfilterfalse(|s: &String| s.starts_with('h')), "hi ho it off");
        assert_eq!(dropped, vec!["it", "off"]);
    }

    #[test]
    fn test_takewhile_stops_pulling() {
        let out = collect(takewhile(|s: &String| s != "stop"), "a b stop c d");
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_dropwhile() {
        let out = collect(dropwhile(|s: &String| s != "go"), "a b go c a");
        assert_eq!(out, vec!["go", "c", "a"]);
    }

    #[test]
    fn test_convert_with_default() {
        let out: Vec<i64> = collect(convert(|s: String| s.parse::<i64>(), Some(-1)), "1 x 3");
        assert_eq!(out, vec![1, -1, 3]);
    }

    #[test]
    fn test_convert_without_default_errors() {
        let err = source(words("1 x"))
            .pipe(convert(|s: String| s.parse::<i64>(), None))
            .unwrap()
            .pipe(aslist())
            .unwrap_err();
        assert!(err.to_string().starts_with("convert:"), "got: {err}");
    }

    #[test]
    fn test_unique() {
        let out = collect(unique(), "one two two three three three one");
        assert_eq!(out, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_head() {
        assert_eq!(collect(head(2), "a b c d"), vec!["a", "b"]);
        assert_eq!(collect(head(0), "a b c"), vec!["a", "b", "c"]);
        assert_eq!(collect(head_skip(2, 1), "a b c d"), vec!["b", "c"]);
    }

    #[test]
    fn test_sslice() {
        let lines = "hi ho hi ho it's off to work we go";
        assert_eq!(collect(sslice(2, Some(10), 2), lines), vec!["ho", "ho", "off", "work"]);
        assert_eq!(collect(sslice(9, None, 1), lines), vec!["we", "go"]);
    }

    #[test]
    fn test_sslice_rejects_zero_step() {
        let err = source(words("a b"))
            .pipe(sslice(1, None, 0))
            .unwrap()
            .pipe(aslist())
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_tail() {
        let lines = "hi ho hi ho it's off to work we go";
        assert_eq!(collect(tail(3), lines), vec!["work", "we", "go"]);
        assert!(collect(tail(0), lines).is_empty());
        assert_eq!(collect(tail(50), "a b"), vec!["a", "b"]);
    }

    #[test]
    fn test_tail_larger_than_stream() {
        assert_eq!(collect(tail(usize::MAX), "a b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tail_ends_after_upstream_error() {
        let src = Source::try_new(vec![
            Ok(1),
            Err(PipelineError::stage("up", "boom")),
            Ok(2),
            Ok(3),
        ]);
        let mut connector = src.pipe(tail(2)).unwrap();
        assert!(connector.next().unwrap().is_err());
        assert!(connector.next().is_none());
    }

    #[test]
    fn test_huge_bounds_do_not_overflow() {
        assert_eq!(collect(head_skip(usize::MAX, 1), "a b c"), vec!["b", "c"]);
        assert_eq!(collect(sslice(2, None, usize::MAX), "a b c"), vec!["b"]);
        assert_eq!(collect(sslice(usize::MAX, None, 1), "a b c"), Vec::<String>::new());
    }

    #[test]
    fn test_separate() {
        let out: Vec<i32> = source(vec![vec![1, 2], vec![], vec![3]])
            .pipe(separate())
            .unwrap()
            .pipe(aslist())
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }
}
