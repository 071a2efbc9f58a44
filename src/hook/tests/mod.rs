//! Unit tests for the hook bounded context.

mod checkpoint_tests;
mod ledger_tests;
