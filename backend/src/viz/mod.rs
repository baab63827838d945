mod plots;

pub use plots::{PlotError, PlotStore, RequestPlots};
