use std::f64::consts::PI;
use approx::assert_relative_eq;
use optical_pumping::{
    laser::{ Laser, PI_LIGHT, SIGMA_MINUS, SIGMA_PLUS },
    units::{ EPSILON_0, PLANCK_H, SPEED_OF_LIGHT },
};

const NU: f64 = 389.286e12;
const TAU: f64 = 1e-8;

#[test]
fn circular_laser_end_to_end() {
    let laser = Laser::new(NU, 1.0, 0.0, 0.0, 1.0, TAU).unwrap();
    let i_sat = PI * PLANCK_H * NU.powi(3) / (3.0 * SPEED_OF_LIGHT.powi(2) * TAU);
    assert_relative_eq!(laser.saturation_intensity(), i_sat, max_relative = 1e-9);
    assert!(laser.field()[SIGMA_PLUS] > 0.0);
    assert_eq!(laser.field()[SIGMA_MINUS], 0.0);
    assert_eq!(laser.field()[PI_LIGHT], 0.0);
    assert_relative_eq!(laser.intensity()[SIGMA_PLUS], 1.0, max_relative = 1e-12);
    assert_relative_eq!(
        laser.stokes()[0], 2.0 / (EPSILON_0 * SPEED_OF_LIGHT), max_relative = 1e-12);
    assert_eq!(laser.stokes()[3], laser.stokes()[0]);
}

#[test]
fn switch_off_keeps_lifetime_term() {
    let mut laser = Laser::new(NU, 1.0, 0.0, 0.0, 1.0, TAU).unwrap();
    let i_sat = laser.saturation_intensity();
    laser.switch_off(TAU).unwrap();
    assert_eq!(laser.saturation_intensity(), i_sat);
    assert_eq!(laser.power(), 0.0);
    assert_eq!(laser.stokes(), [0.0; 4]);
    assert_eq!(laser.field(), [0.0; 3]);
    assert_eq!(laser.intensity(), [0.0; 3]);
    assert_eq!(laser.nu(), NU);
}

#[test]
fn derived_quantities_follow_power_and_polarization() {
    let laser = Laser::new(NU, 4.0, 0.0, 0.0, -0.5, TAU).unwrap();
    let [i_minus, i_pi, i_plus] = laser.intensity();
    assert_relative_eq!(i_minus, 3.0, max_relative = 1e-12);
    assert_eq!(i_pi, 0.0);
    assert_relative_eq!(i_plus, 1.0, max_relative = 1e-12);
    assert_relative_eq!(i_minus + i_plus, laser.power(), max_relative = 1e-12);
    assert_relative_eq!(
        laser.stokes()[3] / laser.stokes()[0], -0.5, max_relative = 1e-12);
    assert_relative_eq!(
        laser.saturation(SIGMA_MINUS),
        3.0 / laser.saturation_intensity(),
        max_relative = 1e-12,
    );
}
