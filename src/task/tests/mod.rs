//! Unit tests for the task bounded context.

mod domain_tests;
