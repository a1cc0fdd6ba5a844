// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    clock::{Clock, StdClock},
    policy::{MaxPendingCountPolicy, StaticThrottlePolicy},
    reply::Reply,
};

/// A long quiet period after which the window is no longer trusted and is
/// contracted toward the caller's current load.
const IDLE_THRESHOLD_MILLIS: u64 = 60_000;

/// No-op unless the `throttle-tracing` feature is enabled, in which case it
/// forwards to `tracing::trace!`. Kept as a macro (rather than a function) so
/// the formatting arguments aren't evaluated at all when the feature is off.
macro_rules! log_transition {
    ($name:literal, $($field:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "throttle-tracing")]
        tracing::trace!(target: $name, $($field = $value),+);
        #[cfg(not(feature = "throttle-tracing"))]
        {
            $(let _ = &$value;)+
        }
    };
}

/// A self-tuning admission window for a single message-bus client session.
///
/// `DynamicThrottle` answers one question, [`can_send`](Self::can_send): given
/// how many replies are still outstanding, may the caller dispatch one more
/// message? It answers by probing the system's throughput ceiling -- growing
/// the window while each measurement interval sets a new best, backing off
/// when a secondary efficiency signal says the window has outgrown the
/// useful concurrency, and snapping back down after an idle period.
///
/// A single instance is meant to be driven serially by one session's I/O
/// loop: [`can_send`](Self::can_send) before a send, [`process_message`](Self::process_message)
/// after an admitted send, [`process_reply`](Self::process_reply) on every
/// reply. None of the three block, allocate beyond a few stack words, or
/// touch anything but the injected [`Clock`] and [`StaticThrottlePolicy`], so
/// there is no internal synchronization -- a caller that shares one throttle
/// across threads needs to supply its own.
///
/// ```
/// use dynamic_throttle::{clock::testing::ManualClock, policy::MaxPendingCountPolicy, DynamicThrottle};
///
/// let clock = ManualClock::new();
/// let mut throttle =
///     DynamicThrottle::with_clock_and_policy(clock, MaxPendingCountPolicy::unbounded());
/// assert!(throttle.can_send(0));
/// ```
#[derive(Clone, Debug)]
pub struct DynamicThrottle<C: Clock = StdClock, B: StaticThrottlePolicy = MaxPendingCountPolicy> {
    clock: C,
    base_policy: B,

    window_size: f64,
    min_window: f64,
    max_window: f64,
    window_size_increment: f64,
    decrement_factor: f64,
    window_size_back_off: f64,
    resize_rate: f64,
    efficiency_threshold: f64,
    /// Stored as `sqrt(configured weight)`; see [`Self::set_weight`].
    weight: f64,
    max_throughput: f64,
    local_max_throughput: f64,

    num_sent: u64,
    num_ok: u64,
    resize_time: u64,
    time_of_last_message: u64,
}

impl Default for DynamicThrottle<StdClock, MaxPendingCountPolicy> {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicThrottle<StdClock, MaxPendingCountPolicy> {
    /// Creates a throttle using the system clock and an unbounded static
    /// ceiling.
    pub fn new() -> Self {
        Self::with_clock_and_policy(StdClock::default(), MaxPendingCountPolicy::unbounded())
    }
}

impl<C: Clock, B: StaticThrottlePolicy> DynamicThrottle<C, B> {
    /// Creates a throttle with an injected clock and static base policy, both
    /// at the default tunables described in [`ThrottleConfig::default`](crate::config::ThrottleConfig::default).
    pub fn with_clock_and_policy(clock: C, base_policy: B) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            base_policy,
            window_size: 20.0,
            min_window: 20.0,
            max_window: f64::MAX,
            window_size_increment: 20.0,
            decrement_factor: 2.0,
            window_size_back_off: 0.9,
            resize_rate: 3.0,
            efficiency_threshold: 1.0,
            weight: 1.0,
            max_throughput: 0.0,
            local_max_throughput: 0.0,
            num_sent: 0,
            num_ok: 0,
            // Matches the source's literal `resizeTime = 0` rather than
            // `now()`: the first interval's `elapsed` is measured from the
            // clock's epoch, not from construction time. See DESIGN.md.
            resize_time: 0,
            time_of_last_message: now,
        }
    }

    /// Decides whether the caller may dispatch one more message given
    /// `pending_count` replies still outstanding.
    ///
    /// This is the only entry point that can observe a `false`; it is pure
    /// observation of the current window except for one side effect: after
    /// a quiet period longer than 60 seconds, the window is contracted
    /// toward `pending_count` before the admission test runs, so a client
    /// that went idle doesn't resume with a stale, inflated window.
    pub fn can_send(&mut self, pending_count: u64) -> bool {
        if !self.base_policy.can_send(pending_count) {
            return false;
        }

        let now = self.clock.now_millis();
        let elapsed_since_last = now.saturating_sub(self.time_of_last_message);
        if elapsed_since_last > IDLE_THRESHOLD_MILLIS {
            let idle_window = pending_count as f64 + self.window_size_increment;
            if idle_window < self.window_size {
                log_transition!(
                    "dynamic_throttle.idle_contract",
                    previous_window = self.window_size,
                    new_window = idle_window,
                    idle_millis = elapsed_since_last,
                );
            }
            self.window_size = self.window_size.min(idle_window);
        }
        self.time_of_last_message = now;

        let window_floor = self.window_size.floor();
        let fraction = self.window_size - window_floor;
        let carry = (self.num_sent as f64) < (self.window_size * self.resize_rate) * fraction;

        let pending_count = pending_count as f64;
        if carry {
            pending_count < window_floor + 1.0
        } else {
            pending_count < window_floor
        }
    }

    /// Records one admitted send, closing a measurement interval and
    /// resizing the window once enough sends have accumulated relative to
    /// the current window.
    pub fn process_message(&mut self) {
        self.num_sent += 1;
        if (self.num_sent as f64) >= self.window_size * self.resize_rate {
            self.close_interval();
        }
    }

    /// Records one reply. Only error-free replies count toward throughput --
    /// an errored reply consumed a window slot but contributes nothing to
    /// the measurement that grows the window.
    pub fn process_reply<R: Reply>(&mut self, reply: &R) {
        if !reply.has_error() {
            self.num_ok += 1;
        }
    }

    fn close_interval(&mut self) {
        let now = self.clock.now_millis();
        let elapsed = now.saturating_sub(self.resize_time);
        self.resize_time = now;

        // A zero-length interval is a measurement artifact (a coarse timer
        // that returned the same value twice), not a real infinite
        // throughput. Treating it as a new local maximum is the simplest
        // conformant choice: the window keeps probing instead of spuriously
        // backing off on a sample that carries no information.
        let throughput = if elapsed == 0 {
            f64::INFINITY
        } else {
            self.num_ok as f64 / elapsed as f64
        };

        self.num_sent = 0;
        self.num_ok = 0;

        if self.max_throughput > 0.0 && throughput > 0.95 * self.max_throughput {
            log_transition!(
                "dynamic_throttle.pinned",
                window = self.window_size,
                throughput = throughput,
                max_throughput = self.max_throughput,
            );
        } else if throughput >= self.local_max_throughput {
            self.local_max_throughput = throughput;
            self.window_size += self.weight * self.window_size_increment;
            log_transition!(
                "dynamic_throttle.probe_up",
                window = self.window_size,
                throughput = throughput,
            );
        } else {
            let efficiency = Self::efficiency(throughput, self.window_size);
            if efficiency < self.efficiency_threshold {
                self.window_size = (self.window_size * self.window_size_back_off)
                    .min(self.window_size - self.decrement_factor * self.window_size_increment);
                self.local_max_throughput = 0.0;
                log_transition!(
                    "dynamic_throttle.back_off",
                    window = self.window_size,
                    throughput = throughput,
                    efficiency = efficiency,
                );
            } else {
                self.window_size += self.weight * self.window_size_increment;
                log_transition!(
                    "dynamic_throttle.probe_up",
                    window = self.window_size,
                    throughput = throughput,
                );
            }
        }

        self.window_size = self.window_size.max(self.min_window).min(self.max_window);
    }

    /// Scale-normalizes `throughput` against `window_size` by choosing a
    /// `period` (a power of 10) so that `throughput * period / window_size`
    /// lands near 2, then returns that ratio.
    ///
    /// A closed form (`period = 2 * window_size / throughput`) is
    /// numerically equivalent whenever `throughput > 0`; the loop form is
    /// kept because it quantizes `period` to exact powers of 10, matching
    /// the original's behavior bit-for-bit rather than just in the limit.
    fn efficiency(throughput: f64, window_size: f64) -> f64 {
        if throughput <= 0.0 {
            return 0.0;
        }

        let mut period = 1.0_f64;
        // `period` is bounded above and below by powers of 10 so this
        // terminates even for pathological (throughput, window_size) pairs;
        // 320 iterations covers the entire normal f64 exponent range.
        let mut guard = 0;
        while throughput * period / window_size < 2.0 && guard < 320 {
            period *= 10.0;
            guard += 1;
        }
        guard = 0;
        while throughput * period / window_size > 2.0 && guard < 320 {
            period *= 0.1;
            guard += 1;
        }

        throughput * period / window_size
    }

    /// Returns `floor(window_size)`, the integer ceiling reported to callers.
    pub fn max_pending_count(&self) -> u64 {
        self.window_size.floor() as u64
    }

    pub fn min_window_size(&self) -> f64 {
        self.min_window
    }

    pub fn max_window_size(&self) -> f64 {
        self.max_window
    }

    pub fn window_size_increment(&self) -> f64 {
        self.window_size_increment
    }

    pub fn window_size_back_off(&self) -> f64 {
        self.window_size_back_off
    }

    /// The current, possibly fractional, window. Exposed mainly for tests;
    /// callers that want the admission-facing integer value should use
    /// [`max_pending_count`](Self::max_pending_count).
    pub fn window_size(&self) -> f64 {
        self.window_size
    }

    /// Sets the additive probe step, then re-initializes the window to
    /// `max(min_window, increment)`.
    pub fn set_window_size_increment(&mut self, increment: f64) -> &mut Self {
        debug_assert!(
            increment > 0.0,
            "window_size_increment must be positive, got {increment}"
        );
        self.window_size_increment = increment;
        self.window_size = self.min_window.max(self.window_size_increment);
        self
    }

    /// Sets the lower bound, then re-initializes the window to
    /// `max(min_window, increment)`.
    pub fn set_min_window_size(&mut self, min_window: f64) -> &mut Self {
        self.min_window = min_window;
        self.window_size = self.min_window.max(self.window_size_increment);
        self
    }

    pub fn set_max_window_size(&mut self, max_window: f64) -> &mut Self {
        self.max_window = max_window;
        self
    }

    /// Tightens the static base policy's ceiling and sets `max_window` to
    /// match, so the dynamic window can never probe past the hard cap.
    pub fn set_max_pending_count(&mut self, max_pending_count: u64) -> &mut Self {
        self.base_policy.set_max_pending_count(max_pending_count);
        self.max_window = max_pending_count as f64;
        self
    }

    /// Stores `sqrt(weight)`. Two throttles with relative weights `w1` and
    /// `w2`, probed through identical intervals, grow their windows at ratio
    /// `sqrt(w1) : sqrt(w2)`, since each probe step scales additively by the
    /// stored square root.
    pub fn set_weight(&mut self, weight: f64) -> &mut Self {
        self.weight = weight.sqrt();
        self
    }

    /// Clamps to `[0, 1]`.
    pub fn set_window_size_back_off(&mut self, back_off: f64) -> &mut Self {
        self.window_size_back_off = back_off.clamp(0.0, 1.0);
        self
    }

    pub fn set_efficiency_threshold(&mut self, threshold: f64) -> &mut Self {
        self.efficiency_threshold = threshold;
        self
    }

    pub fn set_resize_rate(&mut self, resize_rate: f64) -> &mut Self {
        self.resize_rate = resize_rate;
        self
    }

    pub fn set_window_size_decrement_factor(&mut self, decrement_factor: f64) -> &mut Self {
        self.decrement_factor = decrement_factor;
        self
    }

    /// `0.0` means "unset": the controller never stops probing on its own.
    pub fn set_max_throughput(&mut self, max_throughput: f64) -> &mut Self {
        self.max_throughput = max_throughput;
        self
    }

    /// Borrows the static base policy, e.g. to inspect its current ceiling.
    pub fn base_policy(&self) -> &B {
        &self.base_policy
    }

    /// Borrows the clock driving this throttle.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::testing::ManualClock, policy::MaxPendingCountPolicy, reply::Outcome};

    fn throttle() -> DynamicThrottle<ManualClock, MaxPendingCountPolicy> {
        DynamicThrottle::with_clock_and_policy(ManualClock::new(), MaxPendingCountPolicy::unbounded())
    }

    /// Drives one measurement interval to closure: sends enough messages to
    /// cross the `window_size * resize_rate` threshold, marking the first
    /// `oks` of them as error-free, and arranges for exactly `elapsed_millis`
    /// to have passed (on the clock) by the time the closing send fires.
    ///
    /// The reply for the very last send is delivered *after* the interval
    /// has already closed (that's what closes it), so it counts toward the
    /// next interval rather than this one; `oks` is interpreted against the
    /// `sends - 1` replies that do land inside this interval.
    fn drive_interval(
        throttle: &mut DynamicThrottle<ManualClock, MaxPendingCountPolicy>,
        oks: u64,
        elapsed_millis: u64,
    ) {
        let sends = (throttle.window_size() * throttle.resize_rate).ceil() as u64;
        for i in 0..sends {
            assert!(throttle.can_send(0));
            if i == sends - 1 {
                throttle.clock().advance(elapsed_millis);
            }
            throttle.process_message();
            if i < oks {
                throttle.process_reply(&Outcome::Ok);
            } else {
                throttle.process_reply(&Outcome::Error);
            }
        }
    }

    #[test]
    fn steady_probe_up() {
        let mut t = throttle();
        // default window=20, resize_rate=3 -> interval closes after 60 sends
        drive_interval(&mut t, 60, 60);
        assert_eq!(t.window_size(), 40.0);
        assert!(t.local_max_throughput > 0.0);
    }

    #[test]
    fn back_off_on_efficiency_drop() {
        let mut t = throttle();
        drive_interval(&mut t, 60, 60);
        assert_eq!(t.window_size(), 40.0);

        // Throughput drops well below the local max: half as many
        // error-free replies over twice the time.
        drive_interval(&mut t, 30, 120);
        assert_eq!(t.window_size(), 20.0);
        assert_eq!(t.local_max_throughput, 0.0);
    }

    #[test]
    fn max_throughput_pins_window() {
        let mut t = throttle();
        t.set_max_throughput(1.0);
        // ~0.983 ok-replies/ms, comfortably above 0.95 * max_throughput
        drive_interval(&mut t, 60, 60);
        assert_eq!(t.window_size(), 20.0);
        assert_eq!(t.local_max_throughput, 0.0);
    }

    #[test]
    fn idle_contraction_snaps_window_down() {
        let mut t = throttle();
        t.window_size = 100.0;

        t.clock().advance(60_001);
        assert!(t.can_send(5));
        assert_eq!(t.window_size(), 25.0);
    }

    #[test]
    fn weight_scales_probe_step() {
        let mut a = throttle();
        let mut b = throttle();
        b.set_weight(4.0);

        let initial = a.window_size();
        drive_interval(&mut a, 60, 60);
        drive_interval(&mut b, 60, 60);

        assert_eq!(b.window_size() - initial, 2.0 * (a.window_size() - initial));
    }

    #[test]
    fn base_policy_veto_overrides_window() {
        let mut t = throttle();
        t.set_max_pending_count(10);
        assert!(!t.can_send(10));
    }

    #[test]
    fn repeated_can_send_without_process_message_has_no_effect() {
        let mut t = throttle();
        let before = t.window_size();
        for _ in 0..5 {
            t.can_send(0);
        }
        assert_eq!(t.window_size(), before);
        assert_eq!(t.num_sent, 0);
    }

    #[test]
    fn set_window_size_back_off_clamps() {
        let mut t = throttle();
        t.set_window_size_back_off(5.0);
        assert_eq!(t.window_size_back_off(), 1.0);
        t.set_window_size_back_off(-5.0);
        assert_eq!(t.window_size_back_off(), 0.0);
    }

    #[test]
    fn window_never_leaves_its_bounds() {
        let mut t = throttle();
        t.set_min_window_size(5.0).set_max_window_size(50.0);
        for _ in 0..20 {
            drive_interval(&mut t, 1, 10);
            assert!(t.window_size() >= t.min_window_size());
            assert!(t.window_size() <= t.max_window_size());
        }
    }

}
