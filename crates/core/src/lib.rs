#![deny(warnings)]

pub mod capture;
pub mod clock;
pub mod config;
pub mod decode;
pub mod replay;
pub mod report;
pub mod schedule;
pub mod spectrum;
pub mod tone;
pub mod util;
