//! # Demo Pipeline
//!
//! The sample pipeline the worker executes: a three-step increment chain
//! mounted as a single step of the outer run, followed by a combining step.
//! With input `{"x": 5}` the run yields `{"x1": 6, "x2": 7, "x3": 13, "x4": 78}`
//! alongside the original keys.

use std::sync::Arc;

use conveyor_core::{ConfigError, Context, Pipeline, Step, WorkerConfig};
use serde_json::json;

/// Build the demo pipeline from worker configuration.
pub fn build_pipeline(config: &WorkerConfig) -> Result<Pipeline, ConfigError> {
    let mut chain = Pipeline::new();
    chain.set_steps(vec![
        Step::from_fn("first_increment", "v1.0", |data| {
            let x: i64 = data.require("x")?;
            let mut out = Context::new();
            out.insert("x1", json!(x + 1));
            Ok(out)
        }),
        Step::from_fn("second_increment", "v1.0", |data| {
            let x1: i64 = data.require("x1")?;
            let mut out = Context::new();
            out.insert("x2", json!(x1 + 1));
            Ok(out)
        }),
        Step::from_fn("sum_increments", "v1.0", |data| {
            let x1: i64 = data.require("x1")?;
            let x2: i64 = data.require("x2")?;
            let mut out = Context::new();
            out.insert("x3", json!(x1 + x2));
            Ok(out)
        }),
    ])?;

    let mut pipeline = Pipeline::from_config(config)?;
    pipeline.set_steps(vec![
        Step::from_handler("chained_increments", "v1.0", Arc::new(chain)),
        Step::from_fn("combine_products", "v1.0", |data| {
            let x1: i64 = data.require("x1")?;
            let x3: i64 = data.require("x3")?;
            let mut out = Context::new();
            out.insert("x4", json!(x1 * x3));
            Ok(out)
        }),
    ])?;
    Ok(pipeline)
}
