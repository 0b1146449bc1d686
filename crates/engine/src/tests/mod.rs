//! End-to-end tests of the pool across its components.
