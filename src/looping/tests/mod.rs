//! Unit tests for loop steps.
