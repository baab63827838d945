mod model;

pub use model::{ClassifierModel, ModelError};
