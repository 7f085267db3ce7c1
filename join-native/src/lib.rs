//! Runtime-agnostic combinators for running many futures
//!
//! Bounded-concurrency execution of task thunks, plus the usual helpers
//! for sequencing, settling and racing futures. Nothing here spawns; every
//! future is driven by whoever awaits the combinator.

pub mod any;
pub mod parallel;
pub mod promise;
pub mod race;
pub mod sequential;
pub mod settle;

pub use {
    any::{AggregateError, any},
    parallel::{Concurrency, ParallelError, parallel, parallel_detached},
    promise::{Promise, PromiseError, Resolver, create_promise},
    race::race_with_timeout,
    sequential::sequential,
    settle::{all_settled, partition_settled},
};
