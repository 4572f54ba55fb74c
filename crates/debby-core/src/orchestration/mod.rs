pub mod check;

pub use check::{
    CheckReport, CheckResult, CheckRunner, FailurePolicy, ManagerFailure, ManagerSummary,
    UpdatableEntry,
};
