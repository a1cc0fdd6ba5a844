// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A dynamic throttle policy for a message-bus client session.
//!
//! [`DynamicThrottle`] decides, for each outgoing message, whether the
//! session may dispatch it given how many replies are still outstanding. It
//! continuously probes the transport's throughput ceiling and adjusts a
//! fractional pending-message window to track it: growing the window while
//! throughput keeps setting new highs, backing off when a secondary
//! efficiency signal says the window has outgrown the useful concurrency,
//! and snapping the window back down after the session has been idle.
//!
//! This crate is the closed-loop controller only. The enclosing session
//! (tracking pending counts, handing replies to the policy), the transport
//! itself, and the monotonic time source are all external collaborators,
//! represented here only as the [`clock::Clock`] and [`policy::StaticThrottlePolicy`]
//! trait boundaries the controller is driven through.

pub mod clock;
pub mod config;
pub mod policy;
pub mod reply;
mod throttle;

pub use clock::{Clock, StdClock};
pub use config::{ConfigError, ThrottleConfig};
pub use policy::{MaxPendingCountPolicy, StaticThrottlePolicy};
pub use reply::{Outcome, Reply};
pub use throttle::DynamicThrottle;
