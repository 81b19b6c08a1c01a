#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod load_test;

pub(crate) mod collector;
pub(crate) mod controller;
pub(crate) mod evaluator;
pub(crate) mod runner;
pub(crate) mod scheduler;

mod error;

pub use error::Error;
pub use load_test::LoadTest;
pub use stampede_core as core;

/// Convenience error type for iteration callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub mod prelude {
    pub use crate::load_test::LoadTest;
    pub use crate::{BoxError, Error};
    pub use stampede_core::{
        ConcurrencyProfile, IndeterminatePolicy, RampStage, TestReport, ThresholdResult, Verdict,
    };
}
