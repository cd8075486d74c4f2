use super::cfmodel::{safe_speed, CarFollowing};
use rand::RngCore;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The intelligent driver model.
///
/// The IDM acceleration is always capped by the Krauss safe speed,
/// so the model never drives faster than it could stop.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Idm {
    /// The vehicle's maximum acceleration in m/s<sup>2</sup>.
    pub accel: f64,
    /// The comfortable deceleration in m/s<sup>2</sup>.
    pub decel: f64,
    /// The desired time gap to the vehicle ahead in s.
    pub tau: f64,
    /// The acceleration exponent.
    pub delta: f64,
}

impl Default for Idm {
    fn default() -> Self {
        Self {
            accel: 2.6,
            decel: 4.5,
            tau: 1.0,
            delta: 4.0,
        }
    }
}

impl Idm {
    /// Computes an acceleration using the intelligent driver model.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the vehicle ahead in metres.
    /// * `my_vel` - The velocity of the simulated vehicle (m/s).
    /// * `their_vel` - The vehicle ahead's velocity (m/s).
    fn idm(&self, net_dist: f64, my_vel: f64, their_vel: f64) -> f64 {
        if net_dist <= 0.0 {
            return -10. * self.accel;
        }
        let appr = my_vel - their_vel;
        let factor = 1. / (2. * (self.accel * self.decel).sqrt());
        let ss = (my_vel * self.tau) + (my_vel * appr * factor);
        let term = ss.max(0.0) / net_dist;
        self.accel * (1. - (term * term))
    }

    /// Calculates the acceleration needed to approach the speed limit.
    fn free_road(&self, vel: f64, speed_limit: f64) -> f64 {
        if speed_limit <= 0.0 {
            return -self.decel;
        }
        self.accel * (1. - (vel / speed_limit).powf(self.delta))
    }
}

impl CarFollowing for Idm {
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
        if gap <= 0.0 {
            return 0.0;
        }
        let v = (speed + self.idm(gap, speed, leader_speed) * dt).max(0.0);
        v.min(safe_speed(self.decel, self.tau, gap, leader_speed, leader_decel, dt))
    }

    fn stop_speed(&self, speed: f64, gap: f64, dt: f64) -> f64 {
        self.follow_speed(speed, gap, 0.0, self.decel, dt)
    }

    fn dawdle(&self, speed: f64, _rng: &mut dyn RngCore, _dt: f64) -> f64 {
        speed
    }

    fn finalize_speed(&self, speed: f64, safe_speed: f64, max_speed: f64, _rng: &mut dyn RngCore, dt: f64) -> f64 {
        let v_min = self.speed_after_max_decel(speed, dt);
        let free = speed + self.free_road(speed, max_speed) * dt;
        free.min(safe_speed)
            .min(max_speed)
            .min(self.max_next_speed(speed, dt))
            .max(v_min)
    }
}
