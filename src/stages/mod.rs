//! Ready-made stages, grouped by what they work on.
//!
//! Everything is re-exported here, so `use lazy_pipes::stages::*` brings the
//! whole toolbox into scope.

pub mod aggregate;
pub mod io;
pub mod process;
pub mod text;
pub mod transform;

pub use aggregate::{
    action, aslist, bag, count, countby, first, first_or, firstby, last, lastby, meanby, nlargest,
    nsmallest, nth, smax, smin, sreduce, ssorted, ssorted_by_key, ssum, sumby,
};
pub use io::{WriteTarget, find, read, read_each, read_each_with, read_with, write};
pub use process::{RunOptions, run, run_with};
pub use text::{
    fnmatches, fnmatches_with, join, matches, nomatch, replace, search, search_all, search_strict, sformat, split,
    split_field, strip, substitute, words,
};
pub use transform::{
    convert, dropwhile, head, head_skip, separate, sfilter, sfilterfalse, smap, sslice, tail,
    takewhile, unique,
};
