//! Terminators: stages that drain their input into one value.
//!
//! Each body pulls only what it needs. [`first`] and [`nth`] stop early and
//! leave the rest of the upstream unread; the chain is closed either way.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::iter::Sum;
use std::ops::AddAssign;

use crate::error::Result;
use crate::pipe::TerminatorCall;
use crate::stage::{Input, StageDescriptor, wrap_terminator};

const FIRST: StageDescriptor = StageDescriptor::terminator("first", &["default"]);
const LAST: StageDescriptor = StageDescriptor::terminator("last", &["default"]);
const NTH: StageDescriptor = StageDescriptor::terminator("nth", &["n"]);
const ASLIST: StageDescriptor = StageDescriptor::terminator("aslist", &[]);
const COUNT: StageDescriptor = StageDescriptor::terminator("count", &[]);
const BAG: StageDescriptor = StageDescriptor::terminator("bag", &[]);
const SSUM: StageDescriptor = StageDescriptor::terminator("ssum", &[]);
const SMAX: StageDescriptor = StageDescriptor::terminator("smax", &[]);
const SMIN: StageDescriptor = StageDescriptor::terminator("smin", &[]);
const NLARGEST: StageDescriptor = StageDescriptor::terminator("nlargest", &["n"]);
const NSMALLEST: StageDescriptor = StageDescriptor::terminator("nsmallest", &["n"]);
const SSORTED: StageDescriptor = StageDescriptor::terminator("ssorted", &["key"]);
const SREDUCE: StageDescriptor = StageDescriptor::terminator("sreduce", &["func", "initial"]);
const ACTION: StageDescriptor = StageDescriptor::terminator("action", &["func"]);
const COUNTBY: StageDescriptor = StageDescriptor::terminator("countby", &["key"]);
const SUMBY: StageDescriptor = StageDescriptor::terminator("sumby", &[]);
const MEANBY: StageDescriptor = StageDescriptor::terminator("meanby", &[]);
const FIRSTBY: StageDescriptor = StageDescriptor::terminator("firstby", &[]);
const LASTBY: StageDescriptor = StageDescriptor::terminator("lastby", &[]);

// ---------------------------------------------------------------------------
// Positional
// ---------------------------------------------------------------------------

fn first_body<I>((): (), tokens: &mut Input<'_, I>) -> Result<Option<I>> {
    tokens.pull().transpose()
}

/// The first token, if any. Pulls exactly one token from upstream.
pub fn first<I: 'static>() -> TerminatorCall<'static, I, Option<I>> {
    wrap_terminator(FIRST, first_body::<I>).call(())
}

fn first_or_body<I>(default: I, tokens: &mut Input<'_, I>) -> Result<I> {
    Ok(tokens.pull().transpose()?.unwrap_or(default))
}

/// The first token, or `default` if the stream is empty.
pub fn first_or<I: 'static>(default: I) -> TerminatorCall<'static, I, I> {
    wrap_terminator(FIRST, first_or_body::<I>).call(default)
}

fn last_body<I>((): (), tokens: &mut Input<'_, I>) -> Result<Option<I>> {
    let mut last = None;
    for token in tokens {
        last = Some(token?);
    }
    Ok(last)
}

/// The last token, if any.
pub fn last<I: 'static>() -> TerminatorCall<'static, I, Option<I>> {
    wrap_terminator(LAST, last_body::<I>).call(())
}

fn nth_body<I>(n: usize, tokens: &mut Input<'_, I>) -> Result<Option<I>> {
    if n == 0 {
        return Ok(None);
    }
    for _ in 1..n {
        match tokens.pull() {
            Some(token) => {
                token?;
            }
            None => return Ok(None),
        }
    }
    tokens.pull().transpose()
}

/// The `n`th token, counting from 1. Pulls at most `n` tokens.
pub fn nth<I: 'static>(n: usize) -> TerminatorCall<'static, I, Option<I>> {
    wrap_terminator(NTH, nth_body::<I>).call(n)
}

// ---------------------------------------------------------------------------
// Collecting
// ---------------------------------------------------------------------------

fn aslist_body<I>((): (), tokens: &mut Input<'_, I>) -> Result<Vec<I>> {
    tokens.collect()
}

/// Every token, in order.
pub fn aslist<I: 'static>() -> TerminatorCall<'static, I, Vec<I>> {
    wrap_terminator(ASLIST, aslist_body::<I>).call(())
}

fn count_body<I>((): (), tokens: &mut Input<'_, I>) -> Result<usize> {
    let mut n = 0;
    for token in tokens {
        token?;
        n += 1;
    }
    Ok(n)
}

/// Number of tokens.
pub fn count<I: 'static>() -> TerminatorCall<'static, I, usize> {
    wrap_terminator(COUNT, count_body::<I>).call(())
}

fn bag_body<I: Hash + Eq>((): (), tokens: &mut Input<'_, I>) -> Result<HashMap<I, usize>> {
    let mut bag = HashMap::new();
    for token in tokens {
        *bag.entry(token?).or_insert(0) += 1;
    }
    Ok(bag)
}

/// Occurrences of each distinct token.
pub fn bag<I: Hash + Eq + 'static>() -> TerminatorCall<'static, I, HashMap<I, usize>> {
    wrap_terminator(BAG, bag_body::<I>).call(())
}

fn ssorted_body<I: Ord>((): (), tokens: &mut Input<'_, I>) -> Result<Vec<I>> {
    let mut all: Vec<I> = tokens.collect::<Result<_>>()?;
    all.sort();
    Ok(all)
}

/// Every token, sorted ascending. The sort is stable.
pub fn ssorted<I: Ord + 'static>() -> TerminatorCall<'static, I, Vec<I>> {
    wrap_terminator(SSORTED, ssorted_body::<I>).call(())
}

fn ssorted_by_key_body<I, K, F>(key: F, tokens: &mut Input<'_, I>) -> Result<Vec<I>>
where
    K: Ord,
    F: FnMut(&I) -> K,
{
    let mut all: Vec<I> = tokens.collect::<Result<_>>()?;
    all.sort_by_key(key);
    Ok(all)
}

/// Every token, sorted ascending by `key`. The sort is stable.
pub fn ssorted_by_key<I, K, F>(key: F) -> TerminatorCall<'static, I, Vec<I>>
where
    I: 'static,
    K: Ord,
    F: FnMut(&I) -> K + 'static,
{
    wrap_terminator(SSORTED, ssorted_by_key_body::<I, K, F>).call(key)
}

// ---------------------------------------------------------------------------
// Reductions
// ---------------------------------------------------------------------------

fn ssum_body<I: Sum<I>>((): (), tokens: &mut Input<'_, I>) -> Result<I> {
    tokens.sum()
}

/// Sum of all tokens; the type's zero for an empty stream.
pub fn ssum<I: Sum<I> + 'static>() -> TerminatorCall<'static, I, I> {
    wrap_terminator(SSUM, ssum_body::<I>).call(())
}

/// Keeps the earliest token among equals, like the usual `max` of a list.
fn extreme<I: PartialOrd>(
    tokens: &mut Input<'_, I>,
    replaces: fn(&I, &I) -> bool,
) -> Result<Option<I>> {
    let mut best: Option<I> = None;
    for token in tokens {
        let token = token?;
        if best.as_ref().is_none_or(|current| replaces(&token, current)) {
            best = Some(token);
        }
    }
    Ok(best)
}

fn smax_body<I: PartialOrd>((): (), tokens: &mut Input<'_, I>) -> Result<Option<I>> {
    extreme(tokens, |candidate, current| candidate > current)
}

fn smin_body<I: PartialOrd>((): (), tokens: &mut Input<'_, I>) -> Result<Option<I>> {
    extreme(tokens, |candidate, current| candidate < current)
}

/// Largest token, if any.
pub fn smax<I: PartialOrd + 'static>() -> TerminatorCall<'static, I, Option<I>> {
    wrap_terminator(SMAX, smax_body::<I>).call(())
}

/// Smallest token, if any.
pub fn smin<I: PartialOrd + 'static>() -> TerminatorCall<'static, I, Option<I>> {
    wrap_terminator(SMIN, smin_body::<I>).call(())
}

fn nlargest_body<I: Ord>(n: usize, tokens: &mut Input<'_, I>) -> Result<Vec<I>> {
    let mut heap = BinaryHeap::new();
    for token in tokens {
        heap.push(Reverse(token?));
        if heap.len() > n {
            heap.pop();
        }
    }
    Ok(heap.into_sorted_vec().into_iter().map(|Reverse(token)| token).collect())
}

fn nsmallest_body<I: Ord>(n: usize, tokens: &mut Input<'_, I>) -> Result<Vec<I>> {
    let mut heap = BinaryHeap::new();
    for token in tokens {
        heap.push(token?);
        if heap.len() > n {
            heap.pop();
        }
    }
    Ok(heap.into_sorted_vec())
}

/// The `n` largest tokens, largest first. Holds at most `n + 1` tokens.
pub fn nlargest<I: Ord + 'static>(n: usize) -> TerminatorCall<'static, I, Vec<I>> {
    wrap_terminator(NLARGEST, nlargest_body::<I>).call(n)
}

/// The `n` smallest tokens, smallest first. Holds at most `n + 1` tokens.
pub fn nsmallest<I: Ord + 'static>(n: usize) -> TerminatorCall<'static, I, Vec<I>> {
    wrap_terminator(NSMALLEST, nsmallest_body::<I>).call(n)
}

fn sreduce_body<I, V, F>((f, initial): (F, V), tokens: &mut Input<'_, I>) -> Result<V>
where
    F: FnMut(V, I) -> V,
{
    let mut f = f;
    let mut acc = initial;
    for token in tokens {
        acc = f(acc, token?);
    }
    Ok(acc)
}

/// Fold every token into `initial` with `f`.
pub fn sreduce<I, V, F>(f: F, initial: V) -> TerminatorCall<'static, I, V>
where
    I: 'static,
    V: 'static,
    F: FnMut(V, I) -> V + 'static,
{
    wrap_terminator(SREDUCE, sreduce_body::<I, V, F>).call((f, initial))
}

fn action_body<I, F: FnMut(I)>(f: F, tokens: &mut Input<'_, I>) -> Result<()> {
    let mut f = f;
    for token in tokens {
        f(token?);
    }
    Ok(())
}

/// Call `f` on every token for its side effect.
pub fn action<I, F>(f: F) -> TerminatorCall<'static, I, ()>
where
    I: 'static,
    F: FnMut(I) + 'static,
{
    wrap_terminator(ACTION, action_body::<I, F>).call(f)
}

// ---------------------------------------------------------------------------
// Keyed aggregation
// ---------------------------------------------------------------------------

fn countby_body<I, K, F>(key: F, tokens: &mut Input<'_, I>) -> Result<HashMap<K, usize>>
where
    K: Hash + Eq,
    F: FnMut(&I) -> K,
{
    let mut key = key;
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(key(&token?)).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Number of tokens per key.
pub fn countby<I, K, F>(key: F) -> TerminatorCall<'static, I, HashMap<K, usize>>
where
    I: 'static,
    K: Hash + Eq + 'static,
    F: FnMut(&I) -> K + 'static,
{
    wrap_terminator(COUNTBY, countby_body::<I, K, F>).call(key)
}

fn sumby_body<K, V>((): (), tokens: &mut Input<'_, (K, V)>) -> Result<HashMap<K, V>>
where
    K: Hash + Eq,
    V: AddAssign + Default,
{
    let mut sums: HashMap<K, V> = HashMap::new();
    for token in tokens {
        let (key, value) = token?;
        *sums.entry(key).or_default() += value;
    }
    Ok(sums)
}

/// Sum of the values of `(key, value)` tokens, per key.
pub fn sumby<K, V>() -> TerminatorCall<'static, (K, V), HashMap<K, V>>
where
    K: Hash + Eq + 'static,
    V: AddAssign + Default + 'static,
{
    wrap_terminator(SUMBY, sumby_body::<K, V>).call(())
}

fn meanby_body<K, V>((): (), tokens: &mut Input<'_, (K, V)>) -> Result<HashMap<K, f64>>
where
    K: Hash + Eq,
    V: Into<f64>,
{
    let mut totals: HashMap<K, (f64, usize)> = HashMap::new();
    for token in tokens {
        let (key, value) = token?;
        let entry = totals.entry(key).or_insert((0.0, 0));
        entry.0 += value.into();
        entry.1 += 1;
    }
    Ok(totals
        .into_iter()
        .map(|(key, (sum, n))| (key, sum / n as f64))
        .collect())
}

/// Mean of the values of `(key, value)` tokens, per key.
pub fn meanby<K, V>() -> TerminatorCall<'static, (K, V), HashMap<K, f64>>
where
    K: Hash + Eq + 'static,
    V: Into<f64> + 'static,
{
    wrap_terminator(MEANBY, meanby_body::<K, V>).call(())
}

fn firstby_body<K: Hash + Eq, V>((): (), tokens: &mut Input<'_, (K, V)>) -> Result<HashMap<K, V>> {
    let mut firsts = HashMap::new();
    for token in tokens {
        let (key, value) = token?;
        firsts.entry(key).or_insert(value);
    }
    Ok(firsts)
}

fn lastby_body<K: Hash + Eq, V>((): (), tokens: &mut Input<'_, (K, V)>) -> Result<HashMap<K, V>> {
    let mut lasts = HashMap::new();
    for token in tokens {
        let (key, value) = token?;
        lasts.insert(key, value);
    }
    Ok(lasts)
}

/// The first value seen for each key of `(key, value)` tokens.
pub fn firstby<K: Hash + Eq + 'static, V: 'static>() -> TerminatorCall<'static, (K, V), HashMap<K, V>> {
    wrap_terminator(FIRSTBY, firstby_body::<K, V>).call(())
}

/// The last value seen for each key of `(key, value)` tokens.
pub fn lastby<K: Hash + Eq + 'static, V: 'static>() -> TerminatorCall<'static, (K, V), HashMap<K, V>> {
    wrap_terminator(LASTBY, lastby_body::<K, V>).call(())
}
