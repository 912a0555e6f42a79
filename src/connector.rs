//! The deferred invocation: a stage bound to its arguments but not yet run.

use std::fmt;

use tracing::{debug, trace, warn};

use crate::error::{PipelineError, Result};
use crate::stage::{Input, StageDescriptor, Step};
use crate::stream::{BoxStream, IntoSource, TokenStream};

type Init<I, O> = Box<dyn FnOnce() -> Result<Box<dyn Step<I, Output = O>>>>;

enum State<I, O> {
    /// Arguments captured, body not yet run.
    Pending(Init<I, O>),
    /// Body running; the step owns the stage's resources.
    Live(Box<dyn Step<I, Output = O>>),
    /// The body could not start. Upstream may still need closing.
    Failed,
    /// Released. Never leaves this state.
    Closed,
}

impl<I, O> State<I, O> {
    fn label(&self) -> &'static str {
        match self {
            State::Pending(_) => "pending",
            State::Live(_) => "live",
            State::Failed => "failed",
            State::Closed => "closed",
        }
    }
}

/// A composable stage bound to arguments and, possibly, to an upstream.
///
/// Creating a connector does no work. The stage body runs on the first pull
/// (through [`Iterator::next`] or a terminator), at most once. After the
/// connector closes, further pulls yield nothing.
///
/// Iterating a connector directly does not close it when the caller stops
/// early; call [`close`](Connector::close) or drain it to release the chain.
/// Terminators always close the chain they consume.
pub struct Connector<I, O> {
    descriptor: StageDescriptor,
    upstream: Option<BoxStream<I>>,
    state: State<I, O>,
}

impl<I: 'static, O: 'static> Connector<I, O> {
    /// Capture a stage whose body is produced by `init` on first demand.
    pub fn new<S, F>(descriptor: StageDescriptor, init: F) -> Self
    where
        F: FnOnce() -> Result<S> + 'static,
        S: Step<I, Output = O> + 'static,
    {
        let init: Init<I, O> = Box::new(move || {
            let step: Box<dyn Step<I, Output = O>> = Box::new(init()?);
            Ok(step)
        });
        Self {
            descriptor,
            upstream: None,
            state: State::Pending(init),
        }
    }

    /// Bind the source directly, e.g. to a literal list.
    pub fn with_source<S>(self, tokens: S) -> Result<Self>
    where
        S: IntoSource<Item = I>,
    {
        self.bind(Box::new(tokens.into_source()))
    }

    /// Attach `upstream` as this stage's source. Fails if one is already bound.
    pub(crate) fn bind(mut self, upstream: BoxStream<I>) -> Result<Self> {
        if self.upstream.is_some() {
            return Err(PipelineError::AlreadyBound {
                stage: self.descriptor.name,
            });
        }
        self.upstream = Some(upstream);
        Ok(self)
    }
}

impl<I, O> Connector<I, O> {
    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    /// True if a source has been bound.
    pub fn is_bound(&self) -> bool {
        self.upstream.is_some()
    }

    /// True once the stage body has been created and not yet released.
    pub fn is_live(&self) -> bool {
        matches!(self.state, State::Live(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Release this stage and every stage upstream of it.
    ///
    /// Idempotent. Every link is closed even if an earlier one fails; the
    /// first failure is returned.
    pub fn close(&mut self) -> Result<()> {
        let stage = self.descriptor.name;
        let released = match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => return Ok(()),
            State::Live(mut step) => step.release().map_err(|source| PipelineError::Release {
                stage,
                source: Box::new(source),
            }),
            State::Pending(_) | State::Failed => Ok(()),
        };
        trace!(stage, "stage closed");

        let upstream = match self.upstream.as_mut() {
            Some(upstream) => upstream.close(),
            None => Ok(()),
        };

        match (released, upstream) {
            (Err(own), Err(other)) => {
                warn!(stage, error = %other, "upstream release also failed");
                Err(own)
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

impl<I, O> TokenStream for Connector<I, O> {
    type Item = O;

    /// Materialize the chain depth-first: upstream links open before this
    /// stage's body is created.
    fn open(&mut self) -> Result<()> {
        if !matches!(self.state, State::Pending(_)) {
            return Ok(());
        }
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.open()?;
        }
        let State::Pending(init) = std::mem::replace(&mut self.state, State::Failed) else {
            return Ok(());
        };
        debug!(
            stage = self.descriptor.name,
            bound = self.upstream.is_some(),
            "materializing stage"
        );
        self.state = State::Live(init()?);
        Ok(())
    }

    fn next_token(&mut self) -> Option<Result<O>> {
        if matches!(self.state, State::Pending(_))
            && let Err(err) = self.open()
        {
            self.state = State::Failed;
            return Some(Err(err));
        }

        let State::Live(step) = &mut self.state else {
            return None;
        };
        let mut input = match self.upstream.as_mut() {
            Some(upstream) => Input::new(&mut **upstream),
            None => Input::unbound(),
        };
        match step.step(&mut input) {
            Some(token) => Some(token),
            None => {
                trace!(stage = self.descriptor.name, "stage exhausted");
                self.close().err().map(Err)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        Connector::close(self)
    }
}

impl<I, O> Iterator for Connector<I, O> {
    type Item = Result<O>;

    fn next(&mut self) -> Option<Result<O>> {
        self.next_token()
    }
}

impl<I, O> Drop for Connector<I, O> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(stage = self.descriptor.name, error = %err, "release failed while dropping stage");
        }
    }
}

impl<I, O> fmt::Debug for Connector<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("stage", &self.descriptor.name)
            .field("bound", &self.upstream.is_some())
            .field("state", &self.state.label())
            .finish()
    }
}
