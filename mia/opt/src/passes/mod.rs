//! Passes for the pipeline synthesis core
mod control_logic;
mod dummy_mia;
mod hazard_analysis;
mod ipg_creation;
mod ipg_lower;
mod ipg_merge;
mod ipg_naming;
mod mapping_creation;
mod mapping_inline;
mod mapping_optimize;
mod stage_ordering;

pub use control_logic::ControlLogic;
pub use dummy_mia::DummyMia;
pub use hazard_analysis::HazardAnalysisPass;
pub use ipg_creation::IpgCreation;
pub use ipg_lower::IpgLower;
pub use ipg_merge::IpgMerge;
pub use ipg_naming::IpgNaming;
pub use mapping_creation::MappingCreation;
pub use mapping_inline::MappingInline;
pub use mapping_optimize::MappingOptimize;
pub use stage_ordering::StageOrdering;
