// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination bucket provisioning.

use crate::destination::{Destination, DestinationError};
use crate::retry::RetryPolicy;

/// Makes sure a bucket exists before data is written into it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Provisioner {
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Look the bucket up and create it if missing.
    ///
    /// Transient failures are retried according to the policy. At most one
    /// creation request is issued per call; later attempts only re-check
    /// whether the bucket showed up. Returns `false` instead of failing so
    /// the caller can still attempt the write and surface the real error.
    pub fn ensure_exists<D: Destination + ?Sized>(&self, destination: &D, bucket: &str) -> bool {
        let mut create_issued = false;

        let result = self.retry.run(DestinationError::is_transient, |_| {
            if destination.bucket_exists(bucket)? {
                return Ok(());
            }
            if create_issued {
                return Err(DestinationError::BucketMissing(bucket.to_string()));
            }
            create_issued = true;
            destination.create_bucket(bucket)
        });

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(bucket, "Could not provision destination bucket: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDestination;

    #[test]
    fn test_existing_bucket_is_not_recreated() {
        let dest = MemoryDestination::new();
        dest.add_bucket("fridge-a");

        assert!(Provisioner::new(RetryPolicy::immediate(5)).ensure_exists(&dest, "fridge-a"));
        assert_eq!(dest.create_calls(), 0);
    }

    #[test]
    fn test_missing_bucket_created_once() {
        let dest = MemoryDestination::new();
        let provisioner = Provisioner::new(RetryPolicy::immediate(5));

        assert!(provisioner.ensure_exists(&dest, "fridge-a"));
        assert!(dest.has_bucket("fridge-a"));
        assert_eq!(dest.create_calls(), 1);

        // Second call finds it.
        assert!(provisioner.ensure_exists(&dest, "fridge-a"));
        assert_eq!(dest.create_calls(), 1);
    }

    #[test]
    fn test_transient_lookup_failures_are_retried() {
        let dest = MemoryDestination::new();
        dest.fail_next_lookups(3);

        assert!(Provisioner::new(RetryPolicy::immediate(5)).ensure_exists(&dest, "fridge-a"));
        assert_eq!(dest.lookup_calls(), 4);
        assert_eq!(dest.create_calls(), 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let dest = MemoryDestination::new();
        dest.fail_next_lookups(10);

        assert!(!Provisioner::new(RetryPolicy::immediate(5)).ensure_exists(&dest, "fridge-a"));
        assert_eq!(dest.lookup_calls(), 5);
        assert_eq!(dest.create_calls(), 0);
    }

    #[test]
    fn test_failed_creation_is_not_repeated() {
        let dest = MemoryDestination::new();
        dest.fail_next_creates(1);

        assert!(!Provisioner::new(RetryPolicy::immediate(5)).ensure_exists(&dest, "fridge-a"));
        assert_eq!(dest.create_calls(), 1);
        assert!(!dest.has_bucket("fridge-a"));
    }
}
