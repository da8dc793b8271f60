mod happiness;
mod pricing;
mod production;
mod science;
mod transportation;
mod unlockables;

pub use happiness::HappinessSystem;
pub use pricing::PricingSystem;
pub use production::ProductionSystem;
pub use science::ScienceSystem;
pub use transportation::TransportationSystem;
pub use unlockables::UnlockablesSystem;
