//! Defines the default passes available to [PassManager].
use crate::pass_manager::PassResult;
use crate::passes::{
    ControlLogic, DummyMia, HazardAnalysisPass, IpgCreation, IpgLower,
    IpgMerge, IpgNaming, MappingCreation, MappingInline, MappingOptimize,
    StageOrdering,
};
use crate::traversal::Named;
use crate::{pass_manager::PassManager, register_alias};

impl PassManager {
    pub fn default_passes() -> PassResult<Self> {
        // Construct the pass manager and register all passes.
        let mut pm = PassManager::default();

        // Structure of the processor
        pm.register_pass::<DummyMia>()?;
        pm.register_pass::<StageOrdering>()?;

        // Instruction progress graph and its mapping onto the stages
        pm.register_pass::<IpgCreation>()?;
        pm.register_pass::<MappingCreation>()?;
        pm.register_pass::<IpgMerge>()?;
        pm.register_pass::<MappingOptimize>()?;
        pm.register_pass::<IpgLower>()?;
        pm.register_pass::<IpgNaming>()?;

        // Synthesis
        pm.register_pass::<HazardAnalysisPass>()?;
        pm.register_pass::<MappingInline>()?;
        pm.register_pass::<ControlLogic>()?;

        register_alias!(pm, "front", [DummyMia, StageOrdering, IpgCreation]);
        register_alias!(
            pm,
            "map",
            [MappingCreation, IpgMerge, MappingOptimize, IpgLower, IpgNaming]
        );
        register_alias!(
            pm,
            "synth",
            [HazardAnalysisPass, MappingInline, ControlLogic]
        );
        register_alias!(pm, "all", ["front", "map", "synth"]);

        Ok(pm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_runs_every_pass_in_order() {
        let pm = PassManager::default_passes().unwrap();
        let plan = pm.plan(&["all".to_string()], &[], &[]).unwrap();
        assert_eq!(
            plan,
            vec![
                "dummy-mia",
                "stage-ordering",
                "ipg-creation",
                "mapping-creation",
                "ipg-merge",
                "mapping-optimize",
                "ipg-lower",
                "ipg-naming",
                "hazard-analysis",
                "mapping-inline",
                "control-logic",
            ]
        );
    }

    #[test]
    fn exclusions_and_insertions() {
        let pm = PassManager::default_passes().unwrap();
        let plan = pm
            .plan(
                &["all".to_string()],
                &["ipg-merge".to_string()],
                &["ipg-naming:ipg-lower".to_string()],
            )
            .unwrap();
        assert!(!plan.contains(&"ipg-merge".to_string()));
        let pos = |p: &str| plan.iter().position(|q| q == p).unwrap();
        assert_eq!(pos("ipg-lower"), pos("ipg-naming") + 1);
    }

    #[test]
    fn unknown_passes_are_rejected() {
        let pm = PassManager::default_passes().unwrap();
        assert!(pm.plan(&["no-such-pass".to_string()], &[], &[]).is_err());
    }

    #[test]
    fn help_lists_options() {
        let pm = PassManager::default_passes().unwrap();
        let help = pm.complete_help();
        assert!(help.contains("- mapping-optimize:"));
        assert!(help.contains("max-rounds"));
        assert!(help.contains("- all: dummy-mia, stage-ordering"));
        assert!(pm.specific_help("synth").unwrap().contains("- control-logic"));
    }
}
