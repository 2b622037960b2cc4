#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Rate-equation simulation of optical pumping in alkali atoms.

pub mod utils;
pub mod units;
pub mod spin;
pub mod atom;
pub mod laser;
pub mod density;
pub mod eigenbasis;
pub mod integrate;
pub mod pumping;
pub mod config;
pub mod simulation;
