pub mod cache;
pub mod evaluator;
pub mod fleet;
pub mod locations;

pub use cache::{AvailabilityCache, AvailabilityCacheKey};
pub use evaluator::{available_slots_for_date, evaluate, EvaluationContext};
pub use fleet::FleetQueryService;
pub use locations::{LocationGroup, LocationGroupResolver};
