//! End-to-end protocol flow tests; see `tests/`.
