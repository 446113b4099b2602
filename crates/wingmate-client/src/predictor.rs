//! Per-aircraft smoothing predictor (§4.6.3).
//!
//! A free-standing, side-effect-free module: [`PredictorState`] holds the
//! two most recent samples, an extrapolated aiming point, and the
//! interpolated output last handed to a caller. Nothing here touches a
//! socket, a clock, or a catalog; [`crate::member::TrackedAircraft`] is the
//! only caller.

use wingmate_proto::AircraftPosition;

/// Horizon offset for the extrapolated aiming point (§6.2, suggested).
pub const PREDICTION_INTERCEPT_MS: u32 = 350;

/// Lateral speed above which a sample-to-sample jump is treated as a
/// teleport rather than real motion (§4.6.3 step 4).
const TELEPORT_SPEED_MPS: f64 = 1000.0;

const LONGITUDE_WRAP: (f64, f64) = (-90.0, 90.0);
const HEADING_WRAP: (f64, f64) = (90.0, 270.0);
const PITCH_WRAP: (f64, f64) = (-90.0, 90.0);
const ROLL_WRAP: (f64, f64) = (-90.0, 90.0);

fn zero_position() -> AircraftPosition {
    AircraftPosition {
        timestamp_ms: 0,
        latitude: 0.0,
        longitude: 0.0,
        altitude: 0.0,
        heading: 0.0,
        pitch: 0.0,
        roll: 0.0,
        rudder: 0.0,
        elevator: 0.0,
        aileron: 0.0,
        speedbrake: 0.0,
        flaps: 0.0,
        gear: false,
        beacon: false,
        strobe: false,
        navlight: false,
        taxilight: false,
        landlight: false,
    }
}

/// Great-circle distance in km between two lat/lon points, haversine form
/// (R = 6371 km), matching `AircraftPosition::DistanceTo` in the source.
#[must_use]
pub fn distance_km(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    let p = std::f64::consts::PI / 180.0;
    let a = 0.5 - ((to_lat - from_lat) * p).cos() / 2.0
        + (from_lat * p).cos() * (to_lat * p).cos() * (1.0 - ((to_lon - from_lon) * p).cos()) / 2.0;
    12742.0 * a.sqrt().asin()
}

/// Plain linear interpolation from `s0` toward `s1` at ratio `r`.
fn lerp(r: f64, s0: f64, s1: f64) -> f64 {
    s0 + r * (s1 - s0)
}

/// Plain linear extrapolation past `s1`, continuing the `s0 -> s1` slope.
fn extrap(r: f64, s0: f64, s1: f64) -> f64 {
    s1 + r * (s1 - s0)
}

/// If `s0`/`s1` straddle the `[q1, q2]` band's complement, shift them onto
/// one continuous side and report the shift applied. Otherwise, a no-op
/// shift of `0.0`.
fn wrap_shift(s0: f64, s1: f64, q1: f64, q2: f64) -> (f64, f64, f64) {
    let range = 2.0 * (q2 - q1);
    if s0 < q1 && s1 > q2 {
        (s0 + range, s1, range)
    } else if s1 < q1 && s0 > q2 {
        (s0, s1 + range, range)
    } else {
        (s0, s1, 0.0)
    }
}

/// Wrap-aware interpolation: shift onto one side of the divide, interpolate,
/// then shift back.
fn lerp_wrapped(r: f64, s0: f64, s1: f64, q1: f64, q2: f64) -> f64 {
    let (s0, s1, range) = wrap_shift(s0, s1, q1, q2);
    lerp(r, s0, s1) - range
}

/// Wrap-aware extrapolation, same shift-then-unshift shape as [`lerp_wrapped`].
fn extrap_wrapped(r: f64, s0: f64, s1: f64, q1: f64, q2: f64) -> f64 {
    let (s0, s1, range) = wrap_shift(s0, s1, q1, q2);
    extrap(r, s0, s1) - range
}

/// Plain per-second rate between two samples `t_ms` apart.
fn rate(t_ms: u32, s0: f64, s1: f64) -> f64 {
    1000.0 * (s1 - s0) / f64::from(t_ms)
}

/// Wrap-aware per-second rate. Unlike the wrap-aware interpolation and
/// extrapolation helpers, this one must *not* shift the already-divided
/// rate by the raw degree range afterward — the wrapped difference has to
/// be resolved first, in the same units as `s0`/`s1`, and only then
/// divided by `t_ms`. Dividing first and subtracting the range afterward
/// (as the rate helper this was ported from does) mixes a per-millisecond
/// rate with a raw angular span and produces a value with no physical
/// meaning.
fn rate_wrapped(t_ms: u32, s0: f64, s1: f64, q1: f64, q2: f64) -> f64 {
    let (s0, s1, _range) = wrap_shift(s0, s1, q1, q2);
    1000.0 * (s1 - s0) / f64::from(t_ms)
}

/// The smoothing predictor state for one tracked aircraft.
#[derive(Debug, Clone, Copy)]
pub struct PredictorState {
    ts_offset: i32,
    reported_prev: AircraftPosition,
    reported_last: AircraftPosition,
    target: AircraftPosition,
    current: AircraftPosition,
    delta_latitude: f64,
    delta_longitude: f64,
    report_count: u32,
}

impl Default for PredictorState {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorState {
    /// An untracked predictor: identity-valued until 3 samples arrive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ts_offset: 0,
            reported_prev: zero_position(),
            reported_last: zero_position(),
            target: zero_position(),
            current: zero_position(),
            delta_latitude: 0.0,
            delta_longitude: 0.0,
            report_count: 0,
        }
    }

    /// Number of samples ingested so far.
    #[must_use]
    pub fn report_count(&self) -> u32 {
        self.report_count
    }

    /// `ts_offset`, for tests asserting it only ever tightens.
    #[must_use]
    pub fn ts_offset(&self) -> i32 {
        self.ts_offset
    }

    /// The most recent output of [`PredictorState::get_prediction`], or the
    /// first sample if no query has happened yet.
    #[must_use]
    pub fn current(&self) -> AircraftPosition {
        self.current
    }

    /// Ingest one sample (§4.6.3 `UpdateTracking`). `rcv_ts_ms` is the
    /// receiver's local monotonic time of arrival; `sample.timestamp_ms` is
    /// in the sender's own frame and is rewritten in place to the
    /// receiver's frame before being stored. Returns the great-circle
    /// distance in km from `sample` to `(user_lat, user_lon)`.
    pub fn update_tracking(&mut self, mut sample: AircraftPosition, rcv_ts_ms: u32, user_lat: f64, user_lon: f64) -> f64 {
        if self.report_count == 0 {
            self.ts_offset = rcv_ts_ms as i32 - sample.timestamp_ms as i32;
            sample.timestamp_ms = (sample.timestamp_ms as i32 + self.ts_offset) as u32;
            self.reported_last = sample;
            self.current = sample;
            self.target = sample;
        } else {
            if (rcv_ts_ms as i32 - sample.timestamp_ms as i32) < self.ts_offset {
                self.ts_offset -= 1;
            }
            sample.timestamp_ms = (sample.timestamp_ms as i32 + self.ts_offset) as u32;
            self.reported_prev = self.reported_last;
            self.reported_last = sample;
            self.retarget(rcv_ts_ms);
        }

        self.report_count += 1;
        distance_km(sample.latitude, sample.longitude, user_lat, user_lon)
    }

    /// Recompute `target` and `deltas` from the current `reported_prev` /
    /// `reported_last` window (§4.6.3 steps 3-6).
    fn retarget(&mut self, rcv_ts_ms: u32) {
        let sample_distance_ms = self.reported_last.timestamp_ms.wrapping_sub(self.reported_prev.timestamp_ms);
        if sample_distance_ms == 0 {
            self.target = self.reported_last;
            self.delta_latitude = 0.0;
            self.delta_longitude = 0.0;
            return;
        }

        let lateral_km = distance_km(
            self.reported_prev.latitude,
            self.reported_prev.longitude,
            self.reported_last.latitude,
            self.reported_last.longitude,
        );
        let speed_m_per_s = 1.0e6 * lateral_km / f64::from(sample_distance_ms);
        if speed_m_per_s > TELEPORT_SPEED_MPS {
            self.target = self.reported_last;
            self.delta_latitude = 0.0;
            self.delta_longitude = 0.0;
            return;
        }

        let r = (f64::from(rcv_ts_ms) + f64::from(PREDICTION_INTERCEPT_MS) - f64::from(self.reported_last.timestamp_ms))
            / f64::from(sample_distance_ms);
        let prev = self.reported_prev;
        let last = self.reported_last;
        self.target = AircraftPosition {
            timestamp_ms: rcv_ts_ms + PREDICTION_INTERCEPT_MS,
            latitude: extrap(r, prev.latitude, last.latitude),
            longitude: extrap_wrapped(r, prev.longitude, last.longitude, LONGITUDE_WRAP.0, LONGITUDE_WRAP.1),
            altitude: extrap(r, prev.altitude, last.altitude),
            heading: extrap_wrapped(r, prev.heading, last.heading, HEADING_WRAP.0, HEADING_WRAP.1),
            pitch: extrap_wrapped(r, prev.pitch, last.pitch, PITCH_WRAP.0, PITCH_WRAP.1),
            roll: extrap_wrapped(r, prev.roll, last.roll, ROLL_WRAP.0, ROLL_WRAP.1),
            // Control surfaces and discrete switches are not smoothed; carry
            // them forward from the latest report unchanged.
            ..last
        };
        self.delta_latitude = rate(sample_distance_ms, prev.latitude, last.latitude);
        self.delta_longitude = rate_wrapped(sample_distance_ms, prev.longitude, last.longitude, LONGITUDE_WRAP.0, LONGITUDE_WRAP.1);
    }

    /// Query the predicted state at `now_ms` (§4.6.3 `GetPrediction`),
    /// called once per simulator frame.
    pub fn get_prediction(&mut self, now_ms: u32) -> AircraftPosition {
        if self.report_count <= 2 || now_ms <= self.current.timestamp_ms {
            return self.current;
        }

        if now_ms >= self.target.timestamp_ms {
            let r = f64::from(now_ms - self.current.timestamp_ms) / 1000.0;
            self.current.latitude += r * self.delta_latitude;
            self.current.longitude += r * self.delta_longitude;
            if self.current.longitude < -180.0 {
                self.current.longitude += 360.0;
            }
            if self.current.longitude >= 180.0 {
                self.current.longitude -= 360.0;
            }
        } else {
            let r = f64::from(now_ms - self.current.timestamp_ms) / f64::from(self.target.timestamp_ms - self.current.timestamp_ms);
            let target = self.target;
            self.current.latitude = lerp(r, self.current.latitude, target.latitude);
            self.current.longitude = lerp_wrapped(r, self.current.longitude, target.longitude, LONGITUDE_WRAP.0, LONGITUDE_WRAP.1);
            self.current.altitude = lerp(r, self.current.altitude, target.altitude);
            self.current.heading = lerp_wrapped(r, self.current.heading, target.heading, HEADING_WRAP.0, HEADING_WRAP.1);
            self.current.pitch = lerp_wrapped(r, self.current.pitch, target.pitch, PITCH_WRAP.0, PITCH_WRAP.1);
            self.current.roll = lerp_wrapped(r, self.current.roll, target.roll, ROLL_WRAP.0, ROLL_WRAP.1);
            self.current.rudder = lerp(r, self.current.rudder, target.rudder);
            self.current.elevator = lerp(r, self.current.elevator, target.elevator);
            self.current.aileron = lerp(r, self.current.aileron, target.aileron);
            self.current.speedbrake = lerp(r, self.current.speedbrake, target.speedbrake);
            self.current.flaps = lerp(r, self.current.flaps, target.flaps);
            self.current.gear = target.gear;
            self.current.beacon = target.beacon;
            self.current.strobe = target.strobe;
            self.current.navlight = target.navlight;
            self.current.taxilight = target.taxilight;
            self.current.landlight = target.landlight;
        }
        self.current.timestamp_ms = now_ms;
        self.current
    }
}
