#![allow(dead_code)]

pub mod columns;
pub mod schedule;
pub mod stats;
pub mod world;
