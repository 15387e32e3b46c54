//! Charting seam
//!
//! Rendering lives outside this crate. Anything that can draw an `(x, y)`
//! series under a label implements [`ChartRenderer`].

use serde::Serialize;

/// One labelled series ready for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries<X> {
    pub label: String,
    pub x: Vec<X>,
    pub y: Vec<f64>,
}

/// Renders one series per call.
pub trait ChartRenderer<X> {
    type Error;

    fn render(&mut self, x: &[X], y: &[f64], label: &str) -> Result<(), Self::Error>;
}
