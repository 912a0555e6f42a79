//! Stage descriptors, the running-body trait and the stage wrappers.
//!
//! A stage is an ordinary function plus a [`StageDescriptor`]. Composable
//! stages are functions `fn(args) -> Result<S>` where `S: Step<I>` is the
//! stage's generation loop; terminator stages are functions
//! `fn(args, &mut Input<I>) -> Result<V>`. [`wrap`] and [`wrap_terminator`]
//! turn those functions into factories whose `call` binds arguments without
//! running anything.

use std::fmt;

use crate::connector::Connector;
use crate::error::Result;
use crate::pipe::TerminatorCall;
use crate::stream::TokenStream;

/// Whether a stage stays lazy or drains its input into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Produces a lazy sequence of tokens.
    Composable,
    /// Consumes its input and produces one materialized value.
    Terminator,
}

/// Immutable description of a stage, kept for introspection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: &'static str,
    /// Names of the arguments bound when the stage is called.
    pub params: &'static [&'static str],
    /// Name of the parameter that receives the upstream sequence.
    pub source_param: &'static str,
    pub kind: StageKind,
}

impl StageDescriptor {
    /// Conventional name of the source parameter.
    pub const SOURCE_PARAM: &'static str = "tokens";

    pub const fn composable(name: &'static str, params: &'static [&'static str]) -> Self {
        Self {
            name,
            params,
            source_param: Self::SOURCE_PARAM,
            kind: StageKind::Composable,
        }
    }

    pub const fn terminator(name: &'static str, params: &'static [&'static str]) -> Self {
        Self {
            name,
            params,
            source_param: Self::SOURCE_PARAM,
            kind: StageKind::Terminator,
        }
    }

    /// Human-readable signature, e.g. `matches(pattern, tokens)`.
    pub fn signature(&self) -> String {
        let mut params: Vec<&str> = self.params.to_vec();
        params.push(self.source_param);
        format!("{}({})", self.name, params.join(", "))
    }
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Pull handle over a stage's upstream.
///
/// An unbound input behaves as an empty sequence, so source stages (which
/// read files or spawn processes) simply never pull from it.
pub struct Input<'a, I> {
    upstream: Option<&'a mut dyn TokenStream<Item = I>>,
}

impl<'a, I> Input<'a, I> {
    pub(crate) fn new(upstream: &'a mut dyn TokenStream<Item = I>) -> Self {
        Self {
            upstream: Some(upstream),
        }
    }

    pub(crate) fn unbound() -> Self {
        Self { upstream: None }
    }

    /// True if an upstream sequence is attached.
    pub fn is_bound(&self) -> bool {
        self.upstream.is_some()
    }

    /// Pull one token from upstream.
    pub fn pull(&mut self) -> Option<Result<I>> {
        self.upstream.as_mut()?.next_token()
    }
}

impl<I> Iterator for Input<'_, I> {
    type Item = Result<I>;

    fn next(&mut self) -> Option<Result<I>> {
        self.pull()
    }
}

/// The running body of a composable stage.
///
/// `step` is called once per requested token and may pull any number of
/// tokens from `input` before answering. Returning `None` ends the stage.
pub trait Step<I> {
    type Output;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<Self::Output>>;

    /// Release anything the step holds (files, child processes). Called at
    /// most once, when the owning connector closes.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A [`Step`] backed by a closure.
pub struct FromFn<F> {
    f: F,
}

/// Build a step from a closure over the input handle.
pub fn step_fn<I, O, F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Input<'_, I>) -> Option<Result<O>>,
{
    FromFn { f }
}

impl<I, O, F> Step<I> for FromFn<F>
where
    F: FnMut(&mut Input<'_, I>) -> Option<Result<O>>,
{
    type Output = O;

    fn step(&mut self, input: &mut Input<'_, I>) -> Option<Result<O>> {
        (self.f)(input)
    }
}

/// Factory for a composable stage; see [`wrap`].
pub struct ComposableFactory<A, S> {
    descriptor: StageDescriptor,
    function: fn(A) -> Result<S>,
}

/// Register a function as a composable stage.
pub fn wrap<A, S>(descriptor: StageDescriptor, function: fn(A) -> Result<S>) -> ComposableFactory<A, S> {
    debug_assert_eq!(descriptor.kind, StageKind::Composable);
    ComposableFactory {
        descriptor,
        function,
    }
}

impl<A: 'static, S> ComposableFactory<A, S> {
    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    /// Bind arguments. The function body does not run until the returned
    /// connector is first pulled.
    pub fn call<I>(&self, args: A) -> Connector<I, S::Output>
    where
        I: 'static,
        S: Step<I> + 'static,
        S::Output: 'static,
    {
        let function = self.function;
        Connector::new(self.descriptor, move || function(args))
    }
}

/// Signature of a terminator body.
pub type TerminatorFn<A, I, V> = fn(A, &mut Input<'_, I>) -> Result<V>;

/// Factory for a terminator stage; see [`wrap_terminator`].
pub struct TerminatorFactory<A, I, V> {
    descriptor: StageDescriptor,
    function: TerminatorFn<A, I, V>,
}

/// Register a function as a terminator stage.
pub fn wrap_terminator<A, I, V>(
    descriptor: StageDescriptor,
    function: TerminatorFn<A, I, V>,
) -> TerminatorFactory<A, I, V> {
    debug_assert_eq!(descriptor.kind, StageKind::Terminator);
    TerminatorFactory {
        descriptor,
        function,
    }
}

impl<A, I, V> TerminatorFactory<A, I, V> {
    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    /// Bind arguments. Nothing runs until the call is attached to a stream.
    pub fn call<'a>(&self, args: A) -> TerminatorCall<'a, I, V>
    where
        A: 'a,
        I: 'a,
        V: 'a,
    {
        let function = self.function;
        TerminatorCall::new(self.descriptor, move |input| function(args, input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::source;

    #[test]
    fn test_signature_lists_source_last() {
        let d = StageDescriptor::composable("matches", &["pattern"]);
        assert_eq!(d.signature(), "matches(pattern, tokens)");
        assert_eq!(d.kind, StageKind::Composable);
    }

    #[test]
    fn test_unbound_input_is_empty() {
        let mut input: Input<'_, i32> = Input::unbound();
        assert!(!input.is_bound());
        assert!(input.pull().is_none());
    }

    #[test]
    fn test_input_pulls_upstream() {
        let mut src = source(vec![1, 2]);
        let mut input = Input::new(&mut src);
        assert!(input.is_bound());
        let got: Vec<i32> = input.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn test_step_fn_doubles() {
        let mut step = step_fn(|input: &mut Input<'_, i32>| input.pull().map(|r| r.map(|x| x * 2)));
        let mut src = source(vec![3]);
        let mut input = Input::new(&mut src);
        assert_eq!(step.step(&mut input).unwrap().unwrap(), 6);
        assert!(step.step(&mut input).is_none());
    }

    #[test]
    fn test_factory_keeps_descriptor() {
        const DOUBLE: StageDescriptor = StageDescriptor::composable("double", &[]);
        let factory = wrap(DOUBLE, |(): ()| {
            Ok(step_fn(|input: &mut Input<'_, i32>| {
                input.pull().map(|r| r.map(|x| x * 2))
            }))
        });
        assert_eq!(factory.descriptor().name, "double");
        let connector = factory.call::<i32>(());
        assert_eq!(connector.descriptor().name, "double");
        assert!(!connector.is_bound());
    }
}
