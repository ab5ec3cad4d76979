#![allow(dead_code)]

use bevy_ecs::prelude::World;
use cohort_sim::observe::column_values;
use cohort_sim::population::ColumnValues;

pub fn categories(world: &World, column: &str) -> Vec<String> {
    match column_values(world, column).expect("column") {
        ColumnValues::Category(v) => v,
        other => panic!("{column} is not a category column: {other:?}"),
    }
}

pub fn floats(world: &World, column: &str) -> Vec<f64> {
    match column_values(world, column).expect("column") {
        ColumnValues::Float(v) => v,
        other => panic!("{column} is not a float column: {other:?}"),
    }
}

pub fn times(world: &World, column: &str) -> Vec<Option<f64>> {
    match column_values(world, column).expect("column") {
        ColumnValues::Time(v) => v,
        other => panic!("{column} is not a time column: {other:?}"),
    }
}
