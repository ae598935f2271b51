pub mod batch;
pub mod channels;
pub mod dataset;
pub mod density;
pub mod detectors;
pub mod engine;
pub mod io;
pub mod metrics;
pub mod models;
pub mod params;
pub mod plot;

pub use batch::*;
pub use channels::*;
pub use dataset::*;
pub use density::*;
pub use engine::*;
pub use metrics::*;
pub use models::*;
pub use params::*;
pub use plot::*;
