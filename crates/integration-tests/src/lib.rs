//! End-to-end tests for the blockrun proxy live in `tests/`
