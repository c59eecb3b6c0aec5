//! Throwaway Postgres and Redis containers for store tests.
//!
//! Tests call [`runtime::ensure_container_runtime`] (directly or through a container's
//! `start`) and return early when it fails, so the suite still passes on machines
//! without Docker or Podman.

pub mod postgres;
pub mod redis;
pub mod runtime;

use uuid::Uuid;

pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed_and_unique() {
        let first = unique_name("lexicard-pg");
        let second = unique_name("lexicard-pg");
        assert!(first.starts_with("lexicard-pg-"));
        assert_ne!(first, second);
    }
}
