//! Car-following models.
//!
//! Every model maps a vehicle's speed and the gap to whatever it follows onto a
//! speed for the next step. Speeds returned by [CarFollowing::follow_speed] and
//! [CarFollowing::stop_speed] are safe: a vehicle driving at that speed can still
//! stop behind its leader if the leader brakes as hard as it can.

pub use super::idm::Idm;
use rand::{Rng, RngCore};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Leaders slower than this are treated as standing.
const MIN_GAP_TO_STOPPED: f64 = 0.01; // m

/// The capabilities shared by all car-following models.
pub trait CarFollowing {
    /// The maximum acceleration in m/s<sup>2</sup>.
    fn accel(&self) -> f64;

    /// The maximum deceleration in m/s<sup>2</sup>.
    fn decel(&self) -> f64;

    /// The reaction time in s.
    fn tau(&self) -> f64;

    /// The highest speed reachable within one step.
    fn max_next_speed(&self, speed: f64, dt: f64) -> f64 {
        speed + self.accel() * dt
    }

    /// The speed after braking as hard as possible for one step.
    fn speed_after_max_decel(&self, speed: f64, dt: f64) -> f64 {
        (speed - self.decel() * dt).max(0.0)
    }

    /// The distance needed to stop from `speed`, including the reaction time.
    fn brake_gap(&self, speed: f64) -> f64 {
        speed * speed / (2.0 * self.decel()) + speed * self.tau()
    }

    /// The gap needed behind a leader to remain safe at `speed`.
    fn secure_gap(&self, speed: f64, leader_speed: f64, leader_decel: f64) -> f64 {
        let leader_brake_gap = leader_speed * leader_speed / (2.0 * leader_decel);
        (self.brake_gap(speed) - leader_brake_gap).max(0.0)
    }

    /// The highest speed from which the vehicle can still slow down to
    /// `target_speed` within `dist` metres.
    fn free_speed(&self, dist: f64, target_speed: f64) -> f64 {
        (target_speed * target_speed + 2.0 * self.decel() * dist.max(0.0)).sqrt()
    }

    /// The safe speed behind a leader `gap` metres ahead.
    fn follow_speed(&self, speed: f64, gap: f64, leader_speed: f64, leader_decel: f64, dt: f64) -> f64;

    /// The safe speed for stopping within `gap` metres.
    fn stop_speed(&self, speed: f64, gap: f64, dt: f64) -> f64;

    /// Applies driver imperfection to a speed.
    fn dawdle(&self, speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64;

    /// Combines a safe speed and a speed limit into the speed for the next step,
    /// keeping acceleration and deceleration within the vehicle's bounds.
    fn finalize_speed(&self, speed: f64, safe_speed: f64, max_speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64 {
        let v_min = self.speed_after_max_decel(speed, dt);
        let v_max = max_speed.min(self.max_next_speed(speed, dt)).min(safe_speed).max(v_min);
        self.dawdle(v_max, rng, dt).max(v_min)
    }

    /// Calculates the time it would take the vehicle to travel `dist` metres
    /// if it maximally accelerated.
    fn min_reach_time(&self, speed: f64, dist: f64, max_speed: f64) -> f64 {
        let accel = self.accel();
        let max_speed = max_speed.max(speed).max(f64::EPSILON);
        let discr = 2.0 * accel * dist + speed.powi(2);
        if discr < max_speed.powi(2) {
            (discr.sqrt() - speed) / accel
        } else {
            let t = (max_speed - speed) / accel;
            let d = 0.5 * (speed + max_speed) * t;
            t + (dist - d) / max_speed
        }
    }
}

/// Selects one of the car-following models for a vehicle type.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "model", rename_all = "snake_case"))]
pub enum CarFollowModel {
    /// The smoothed Krauss model.
    Krauss(Krauss),
    /// The original Krauss model.
    KraussOrig1(KraussOrig1),
    /// The intelligent driver model.
    Idm(Idm),
}

/// The Krauss model with smoothed braking: the leader's deceleration is taken
/// into account and slow vehicles dawdle less, so queues start up faster.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Krauss {
    pub accel: f64,
    pub decel: f64,
    /// Driver imperfection in `[0, 1]`.
    pub sigma: f64,
    pub tau: f64,
}

/// The original Krauss model, which assumes the leader brakes like the follower.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KraussOrig1 {
    pub accel: f64,
    pub decel: f64,
    /// Driver imperfection in `[0, 1]`.
    pub sigma: f64,
    pub tau: f64,
}

impl Default for CarFollowModel {
    fn default() -> Self {
        Self::Krauss(Krauss::default())
    }
}

impl Default for Krauss {
    fn default() -> Self {
        Self {
            accel: 2.6,
            decel: 4.5,
            sigma: 0.5,
            tau: 1.0,
        }
    }
}

impl Default for KraussOrig1 {
    fn default() -> Self {
        Self {
            accel: 2.6,
            decel: 4.5,
            sigma: 0.5,
            tau: 1.0,
        }
    }
}

/// The largest speed `v` with `v * tau + v² / 2b <= gap + vl² / 2bl`, i.e. the
/// follower can stop within the gap plus the leader's own braking distance.
pub(crate) fn safe_speed(decel: f64, tau: f64, gap: f64, leader_speed: f64, leader_decel: f64, dt: f64) -> f64 {
    if gap < 0.0 {
        return 0.0;
    }
    let leader_speed = if leader_speed < leader_decel * dt { 0.0 } else { leader_speed };
    if leader_speed == 0.0 && gap < MIN_GAP_TO_STOPPED {
        return 0.0;
    }
    let tau_decel = decel * tau;
    let leader_term = if leader_decel > 0.0 {
        decel * leader_speed * leader_speed / leader_decel
    } else {
        0.0
    };
    -tau_decel + (tau_decel * tau_decel + 2.0 * decel * gap + leader_term).sqrt()
}

impl CarFollowing for Krauss {
    fn accel(&self) -> f64 {
        self.accel
    }

    fn decel(&self) -> f64 {
        self.decel
    }

    fn tau(&self) -> f64 {
        self.tau
    }

    fn follow_speed(&self, speed: f64, gap: f64, leader_speed: f64, leader_decel: f64, dt: f64) -> f64 {
        safe_speed(self.decel, self.tau, gap, leader_speed, leader_decel, dt).min(self.max_next_speed(speed, dt))
    }

    fn stop_speed(&self, speed: f64, gap: f64, dt: f64) -> f64 {
        safe_speed(self.decel, self.tau, gap, 0.0, self.decel, dt).min(self.max_next_speed(speed, dt))
    }

    fn dawdle(&self, speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64 {
        let random: f64 = rng.gen();
        let loss = if speed < self.accel {
            self.sigma * speed * random * dt
        } else {
            self.sigma * self.accel * random * dt
        };
        (speed - loss).max(0.0)
    }
}

impl CarFollowing for KraussOrig1 {
    fn accel(&self) -> f64 {
        self.accel
    }

    fn decel(&self) -> f64 {
        self.decel
    }

    fn tau(&self) -> f64 {
        self.tau
    }

    fn follow_speed(&self, speed: f64, gap: f64, leader_speed: f64, _leader_decel: f64, dt: f64) -> f64 {
        self.vsafe(gap, leader_speed).min(self.max_next_speed(speed, dt))
    }

    fn stop_speed(&self, speed: f64, gap: f64, dt: f64) -> f64 {
        self.vsafe(gap, 0.0).min(self.max_next_speed(speed, dt))
    }

    fn dawdle(&self, speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64 {
        let random: f64 = rng.gen();
        (speed - self.sigma * self.accel * random * dt).max(0.0)
    }
}

impl KraussOrig1 {
    /// The safe speed, assuming the leader decelerates like this vehicle.
    fn vsafe(&self, gap: f64, leader_speed: f64) -> f64 {
        if gap < 0.0 || (leader_speed == 0.0 && gap < MIN_GAP_TO_STOPPED) {
            return 0.0;
        }
        let tau_decel = self.decel * self.tau;
        -tau_decel + (tau_decel * tau_decel + leader_speed * leader_speed + 2.0 * self.decel * gap).sqrt()
    }
}

/// Forwards a call to the selected model.
macro_rules! dispatch {
    ($self:ident, $model:ident => $call:expr) => {
        match $self {
            CarFollowModel::Krauss($model) => $call,
            CarFollowModel::KraussOrig1($model) => $call,
            CarFollowModel::Idm($model) => $call,
        }
    };
}

impl CarFollowing for CarFollowModel {
    fn accel(&self) -> f64 {
        dispatch!(self, m => m.accel())
    }

    fn decel(&self) -> f64 {
        dispatch!(self, m => m.decel())
    }

    fn tau(&self) -> f64 {
        dispatch!(self, m => m.tau())
    }

    fn follow_speed(&self, speed: f64, gap: f64, leader_speed: f64, leader_decel: f64, dt: f64) -> f64 {
        dispatch!(self, m => m.follow_speed(speed, gap, leader_speed, leader_decel, dt))
    }

    fn stop_speed(&self, speed: f64, gap: f64, dt: f64) -> f64 {
        dispatch!(self, m => m.stop_speed(speed, gap, dt))
    }

    fn dawdle(&self, speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64 {
        dispatch!(self, m => m.dawdle(speed, rng, dt))
    }

    fn finalize_speed(&self, speed: f64, safe_speed: f64, max_speed: f64, rng: &mut dyn RngCore, dt: f64) -> f64 {
        dispatch!(self, m => m.finalize_speed(speed, safe_speed, max_speed, rng, dt))
    }
}

impl CarFollowModel {
    /// Whether the parameters describe a drivable vehicle.
    pub(crate) fn is_valid(&self) -> bool {
        let positive = self.accel() > 0.0 && self.decel() > 0.0 && self.tau() >= 0.0;
        let sigma = match self {
            Self::Krauss(m) => m.sigma,
            Self::KraussOrig1(m) => m.sigma,
            Self::Idm(_) => 0.0,
        };
        positive && (0.0..=1.0).contains(&sigma)
    }
}
