pub mod flat_map_signal;
pub mod into_stream;
pub mod window_by;

pub use flat_map_signal::FlatMapSignal;
pub use into_stream::IntoStream;
pub use window_by::{WindowBoundary, WindowBy, WindowConfig};
