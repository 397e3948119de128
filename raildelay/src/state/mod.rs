mod engine;
mod stop_state;
#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{DaySnapshot, EngineConfig, TripStateEngine};
pub use stop_state::StopState;
