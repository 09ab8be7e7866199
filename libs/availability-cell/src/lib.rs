pub mod models;
pub mod services;

// Re-export the engine surface for external use
pub use models::{
    AvailabilityDecision, AvailableTherapist, BookingSearchParams, Location, Therapist,
    TherapyService, UnavailableReason,
};
pub use services::cache::{AvailabilityCache, AvailabilityCacheKey};
pub use services::evaluator::{available_slots_for_date, evaluate, EvaluationContext};
pub use services::fleet::FleetQueryService;
pub use services::locations::{LocationGroup, LocationGroupResolver};
