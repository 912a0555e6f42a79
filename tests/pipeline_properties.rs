//! Property-based and end-to-end tests for pipeline composition
//!
//! These tests verify invariants that should hold for all inputs:
//! - Grouping of left-to-right composition does not change the output
//! - A drained connector yields nothing the second time
//! - Terminators pull only what they need and close the chain
//! - Scalars auto-wrap into one-token sequences

use lazy_pipes::stages::{aslist, count, first, head, matches, read, sfilter, smap, tail};
use lazy_pipes::{Connector, Input, Pipe, PipelineError, StageDescriptor, Step, TokenStream, source};
use proptest::prelude::*;
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

const COUNTING: StageDescriptor = StageDescriptor::composable("counting", &["pulled"]);

/// Pass-through stage that records how many tokens were asked of it.
struct Counting {
    pulled: Rc<Cell<usize>>,
}

impl<T> Step<T> for Counting {
    type Output = T;

    fn step(&mut self, input: &mut Input<'_, T>) -> Option<lazy_pipes::Result<T>> {
        let token = input.pull()?;
        self.pulled.set(self.pulled.get() + 1);
        Some(token)
    }
}

fn counting<T: 'static>(pulled: Rc<Cell<usize>>) -> Connector<T, T> {
    Connector::new(COUNTING, move || Ok(Counting { pulled }))
}

proptest! {
    /// Property: building `src | a | b | c` in one expression, or stopping to
    /// hold `src | a | b` before adding `c`, gives the same tokens as the plain
    /// iterator equivalent.
    #[test]
    fn prop_grouping_does_not_change_output(
        values in prop::collection::vec(-1000i32..1000, 0..60),
        offset in -50i32..50,
        threshold in -500i32..500,
        limit in 0usize..40,
    ) {
        let expected: Vec<i32> = values
            .iter()
            .map(|v| v + offset)
            .filter(|v| *v > threshold)
            .take(if limit == 0 { usize::MAX } else { limit })
            .collect();

        let chained = source(values.clone())
            .pipe(smap(move |v: i32| v + offset)).unwrap()
            .pipe(sfilter(move |v: &i32| *v > threshold)).unwrap()
            .pipe(head(limit)).unwrap()
            .pipe(aslist()).unwrap();

        let held = source(values.clone())
            .pipe(smap(move |v: i32| v + offset)).unwrap()
            .pipe(sfilter(move |v: &i32| *v > threshold)).unwrap();
        let grouped = held.pipe(head(limit)).unwrap();
        let iterated: Vec<i32> = grouped.map(|r| r.unwrap()).collect();

        prop_assert_eq!(&chained, &expected);
        prop_assert_eq!(&iterated, &expected);
    }

    /// Property: once a connector has been drained it stays empty.
    #[test]
    fn prop_run_once(values in prop::collection::vec(any::<u16>(), 0..40)) {
        let mut connector = source(values.clone()).pipe(smap(u32::from)).unwrap();
        let drained = connector.by_ref().count();
        prop_assert_eq!(drained, values.len());
        prop_assert!(connector.is_closed());
        prop_assert_eq!(connector.by_ref().count(), 0);
    }

    /// Property: `first` pulls at most one token through the chain, however
    /// long the input.
    #[test]
    fn prop_first_pulls_at_most_one(values in prop::collection::vec(any::<i64>(), 0..100)) {
        let pulled = Rc::new(Cell::new(0));
        let found = source(values.clone())
            .pipe(counting(pulled.clone())).unwrap()
            .pipe(first()).unwrap();
        prop_assert_eq!(found, values.first().copied());
        prop_assert_eq!(pulled.get(), usize::from(!values.is_empty()));
    }

    /// Property: `tail(n)` keeps the last `n` tokens in order.
    #[test]
    fn prop_tail_matches_slice(values in prop::collection::vec(any::<i32>(), 0..50), n in 0usize..60) {
        let got = source(values.clone()).pipe(tail(n)).unwrap().pipe(aslist()).unwrap();
        let start = values.len().saturating_sub(n);
        prop_assert_eq!(got, values[start..].to_vec());
    }
}

#[test]
fn test_composing_does_no_work() {
    let pulled = Rc::new(Cell::new(0));
    let connector = source(vec![1, 2, 3])
        .pipe(counting(pulled.clone()))
        .unwrap()
        .pipe(smap(|x: i32| x * 2))
        .unwrap();
    assert!(!connector.is_live());
    assert_eq!(pulled.get(), 0);
    drop(connector);
    assert_eq!(pulled.get(), 0);
}

#[test]
fn test_matches_then_first_pulls_one_line() {
    let pulled = Rc::new(Cell::new(0));
    let lines: Vec<String> = ["match one", "two", "match three", "four"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let found = source(lines)
        .pipe(counting(pulled.clone()))
        .unwrap()
        .pipe(matches("match"))
        .unwrap()
        .pipe(first())
        .unwrap();
    assert_eq!(found.as_deref(), Some("match one"));
    assert_eq!(pulled.get(), 1);
}

#[test]
fn test_scalar_auto_wrap() {
    let floats = source(1_i32)
        .pipe(smap(f64::from))
        .unwrap()
        .pipe(aslist())
        .unwrap();
    assert_eq!(floats, vec![1.0]);
}

#[test]
fn test_close_after_partial_iteration() {
    let mut connector = source(vec!["a", "b", "c"]).pipe(smap(str::len)).unwrap();
    assert_eq!(connector.next().unwrap().unwrap(), 1);
    connector.close().unwrap();
    connector.close().unwrap();
    assert!(connector.next().is_none());
}

#[test]
fn test_redirection_modes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.txt");
    fs::write(&path, "old 1\nold 2\nold 3\n").unwrap();

    source(vec!["new 1", "new 2"]).redirect(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "new 1\nnew 2\n");

    fs::write(&path, "old 1\nold 2\nold 3\n").unwrap();
    source(vec!["new 1", "new 2"]).append(&path).unwrap();
    let lines = read(&path).pipe(aslist()).unwrap();
    assert_eq!(lines, vec!["old 1", "old 2", "old 3", "new 1", "new 2"]);
}

#[test]
fn test_terminator_returns_plain_value() {
    let n: usize = source(vec![1, 2, 3]).pipe(count()).unwrap();
    assert_eq!(n, 3);
}

#[test]
fn test_custom_stream_can_be_piped() {
    /// Counts down from a start value; not a connector or literal source.
    struct Countdown(u32);

    impl TokenStream for Countdown {
        type Item = u32;

        fn next_token(&mut self) -> Option<lazy_pipes::Result<u32>> {
            if self.0 == 0 {
                return None;
            }
            self.0 -= 1;
            Some(Ok(self.0 + 1))
        }
    }

    let out = Countdown(3).pipe(aslist()).unwrap();
    assert_eq!(out, vec![3, 2, 1]);
}

#[test]
fn test_stage_error_reaches_terminator() {
    let lines = vec!["ok".to_string()];
    let err = source(lines).pipe(matches("(")).unwrap().pipe(count()).unwrap_err();
    assert!(matches!(err, PipelineError::Pattern(_)));
}
