//! Small arithmetic circuits on top of [`MpcExecutor`].

use std::{future::Future, task::Poll};

use itertools::Itertools;

use crate::{executor::MpcExecutor, transport::Player, MpcRing, Opener, Preprocessing, Share};

pub use futures; // Reexport futures crate for join_circuits! macro.

/// Wait on multiple concurrent branches, returning when **all** branches complete.
/// This macro guarantees deterministic polling order of provided futures,
/// which makes it safe to use with our async circuits.
#[macro_export]
macro_rules! join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::join!($( $tokens )*)
    }}
}

/// Wait on all circuits from iterator.
/// Every pending circuit is polled on every wakeup, in iteration order, so that requests are
/// issued in the same order by all parties.
pub async fn join_circuits_all<I>(iter: I) -> Vec<<I::Item as Future>::Output>
where
    I: IntoIterator,
    I::Item: Future,
{
    let mut circuits: Vec<_> = iter
        .into_iter()
        .map(|circuit| Box::pin(futures::future::maybe_done(circuit)))
        .collect();

    futures::future::poll_fn(|cx| {
        let mut all_done = true;
        for circuit in circuits.iter_mut() {
            if circuit.as_mut().poll(cx).is_pending() {
                all_done = false;
            }
        }
        if all_done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;

    circuits
        .iter_mut()
        .filter_map(|circuit| circuit.as_mut().take_output())
        .collect()
}

/// Single element or pair of elements of the same type.
enum SingleOrPair<T> {
    Single(T),
    Pair(T, T),
}

/// Batch iterator into pairs and maybe a leftover single element.
fn batch_pairs<T>(it: impl IntoIterator<Item = T>) -> impl Iterator<Item = SingleOrPair<T>> {
    it.into_iter().batching(|it| {
        it.next().map(|first| match it.next() {
            Some(second) => SingleOrPair::Pair(first, second),
            None => SingleOrPair::Single(first),
        })
    })
}

/// Aggregate elements by combining distinct pairs in log_2(n) rounds.
pub async fn fold_tree<T, F, Fut>(iter: impl IntoIterator<Item = T>, default: T, combine_fn: F) -> T
where
    F: Copy + Fn(T, T) -> Fut,
    Fut: Future<Output = T>,
{
    let mut elems: Vec<_> = iter.into_iter().collect();

    while elems.len() > 1 {
        elems = join_circuits_all(batch_pairs(elems).map(|p| async move {
            match p {
                SingleOrPair::Single(value) => value,
                SingleOrPair::Pair(first, second) => combine_fn(first, second).await,
            }
        }))
        .await;
    }

    elems.into_iter().next().unwrap_or(default)
}

/// Inner product of two sequences of shares.
/// Cost: n multiplications in a single round.
pub async fn dot_product<P, O, Prep>(
    ctx: &MpcExecutor<P, O, Prep>,
    a: &[O::Share],
    b: &[O::Share],
) -> O::Share
where
    P: Player,
    O: Opener,
    Prep: Preprocessing<O::Share>,
{
    join_circuits_all(a.iter().zip(b).map(|(&x, &y)| ctx.mul(x, y)))
        .await
        .into_iter()
        .fold(<O::Share as Share>::zero(), |acc, x| acc + x)
}

/// Product of given sequence of shares.
/// Cost: n-1 multiplications in log_2(n) rounds.
pub async fn product<P, O, Prep>(
    ctx: &MpcExecutor<P, O, Prep>,
    elems: impl IntoIterator<Item = O::Share>,
) -> O::Share
where
    P: Player,
    O: Opener,
    Prep: Preprocessing<O::Share>,
{
    let one = ctx.constant(<<O::Share as Share>::Clear as MpcRing>::one());
    fold_tree(elems, one, |a, b| ctx.mul(a, b)).await
}
