//! Terminator execution and the chain-closing protocol.
//!
//! A terminator pulls from the chain it was attached to until it has its
//! answer, then every link from the terminator back to the root source is
//! closed exactly once, whether the terminator drained the stream, stopped
//! early, or failed. Release failures never replace the terminator's own
//! error; they are reported only when the terminator itself succeeded.

use tracing::{debug, warn};

use crate::error::Result;
use crate::pipe::TerminatorBody;
use crate::stage::{Input, StageDescriptor};
use crate::stream::{BoxStream, TokenStream};

/// Run a terminator body over `upstream`, then close the whole chain.
pub(crate) fn terminate<I, V>(
    descriptor: StageDescriptor,
    body: TerminatorBody<'_, I, V>,
    mut upstream: BoxStream<I>,
) -> Result<V> {
    let stage = descriptor.name;
    debug!(stage, "terminator started");

    let outcome = body(&mut Input::new(&mut *upstream));
    let released = upstream.close();

    match (outcome, released) {
        (Ok(value), Ok(())) => {
            debug!(stage, "terminator finished");
            Ok(value)
        }
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release)) => {
            warn!(stage, error = %release, "chain release failed after terminator error");
            Err(err)
        }
    }
}
