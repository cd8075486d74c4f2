use super::cfmodel::{CarFollowModel, CarFollowing};
use crate::error::LoadError;
use rand::Rng;
use rand_distr::StandardNormal;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The ID of the vehicle type used when a vehicle names none.
pub const DEFAULT_VTYPE_ID: &str = "DEFAULT_VEHTYPE";

/// The physical and behavioural parameters shared by a class of vehicles.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VehicleType {
    /// The type ID.
    #[cfg_attr(feature = "serde", serde(rename = "id"))]
    pub name: String,
    /// The vehicle length in m.
    pub length: f64,
    /// The gap kept to the leader when standing, in m.
    pub min_gap: f64,
    /// The maximum speed in m/s.
    pub max_speed: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// The mean factor applied to lane speed limits.
    pub speed_factor: f64,
    /// The deviation of the speed factor between vehicles.
    pub speed_dev: f64,
    /// The car-following model and its parameters.
    #[cfg_attr(feature = "serde", serde(rename = "car_following"))]
    pub cf_model: CarFollowModel,
}

impl Default for VehicleType {
    fn default() -> Self {
        Self::new(DEFAULT_VTYPE_ID)
    }
}

impl VehicleType {
    /// Creates a passenger car type with default parameters.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            length: 5.0,
            min_gap: 2.5,
            max_speed: 70.0,
            width: 1.8,
            speed_factor: 1.0,
            speed_dev: 0.0,
            cf_model: CarFollowModel::default(),
        }
    }

    /// Checks that the parameters describe a drivable vehicle.
    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |param| LoadError::InvalidType {
            vtype: self.name.clone(),
            param,
        };
        if !(self.length > 0.0) {
            return Err(invalid("length"));
        }
        if !(self.min_gap >= 0.0) {
            return Err(invalid("min_gap"));
        }
        if !(self.max_speed > 0.0) {
            return Err(invalid("max_speed"));
        }
        if !(self.speed_factor > 0.0) || !(self.speed_dev >= 0.0) {
            return Err(invalid("speed_factor"));
        }
        if !self.cf_model.is_valid() {
            return Err(invalid("car_following"));
        }
        Ok(())
    }

    /// Draws the speed factor of an individual vehicle.
    pub(crate) fn draw_speed_factor(&self, rng: &mut impl Rng) -> f64 {
        if self.speed_dev <= 0.0 {
            return self.speed_factor;
        }
        let sample: f64 = rng.sample(StandardNormal);
        let factor = (sample.clamp(-2.0, 2.0) * self.speed_dev + 1.0) * self.speed_factor;
        factor.max(0.2 * self.speed_factor)
    }

    /// The maximum deceleration of the car-following model.
    pub fn decel(&self) -> f64 {
        self.cf_model.decel()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn speed_factor_bounds() {
        let vtype = VehicleType {
            speed_dev: 0.8,
            ..VehicleType::new("t")
        };
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let f = vtype.draw_speed_factor(&mut rng);
            assert!(f >= 0.2);
            assert!(f <= 2.6 + 1e-9);
        }
        assert_eq!(VehicleType::new("t").draw_speed_factor(&mut rng), 1.0);
    }

    #[test]
    fn speed_deviation_capped_both_ways() {
        let vtype = VehicleType {
            speed_dev: 0.1,
            ..VehicleType::new("t")
        };
        let mut rng = StdRng::seed_from_u64(7);
        let factors: Vec<f64> = (0..2000).map(|_| vtype.draw_speed_factor(&mut rng)).collect();
        assert!(factors.iter().all(|f| (0.8 - 1e-9..=1.2 + 1e-9).contains(f)));
        // both tails reach the cap
        assert!(factors.iter().any(|f| (f - 0.8).abs() < 1e-9));
        assert!(factors.iter().any(|f| (f - 1.2).abs() < 1e-9));
    }

    #[test]
    fn validation() {
        assert!(VehicleType::new("t").validate().is_ok());
        let bad = VehicleType {
            length: 0.0,
            ..VehicleType::new("t")
        };
        assert!(matches!(bad.validate(), Err(LoadError::InvalidType { param: "length", .. })));
    }
}
