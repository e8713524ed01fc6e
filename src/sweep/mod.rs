//! The stale sweep: decide per item, then execute within an operation budget.

pub mod evaluate;
pub mod report;
pub mod runner;

pub use evaluate::{evaluate, plan_mutations, Decision, Mutation, SkipReason, UnstaleReason};
pub use report::{AppliedMutation, ClassTally, ItemFailure, SweepReport, Trigger};
pub use runner::{StaleSweeper, SweepError, DEFAULT_PAGE_SIZE};
