// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The only thing the controller needs to know about a reply.

/// Whatever a session hands to
/// [`process_reply`](crate::DynamicThrottle::process_reply).
///
/// The controller's only interest in a reply is whether it carries an error:
/// error-free replies are the sole throughput signal (see
/// [`DynamicThrottle::process_reply`](crate::DynamicThrottle::process_reply)).
/// Everything else about the reply -- freeing the caller's pending slot,
/// routing it back to application code -- is the session's concern.
pub trait Reply {
    /// Returns whether this reply represents a failure.
    fn has_error(&self) -> bool;
}

/// The simplest possible [`Reply`], useful for tests and for callers that
/// don't already have a richer reply type to implement the trait on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error,
}

impl Reply for Outcome {
    fn has_error(&self) -> bool {
        matches!(self, Outcome::Error)
    }
}
