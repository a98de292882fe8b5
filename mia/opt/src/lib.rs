//! # Pipeline synthesis passes
//!
//! Turns an instruction set and a microarchitecture description into a
//! pipelined processor. The passes build an instruction progress graph
//! shared by all instructions, map its nodes onto the pipeline stages,
//! optimize the mapping, analyze the hazards of every resource and finally
//! inline the mapped behavior into the stages and synthesize the control
//! unit.
//!
//! ```rust,ignore
//! use mia_ir as ir;
//! use mia_opt::pass_manager::PassManager;
//!
//! let pm = PassManager::default_passes()?;
//! let mut ctx = ir::Context::new(isa, None);
//! pm.execute_plan(&mut ctx, &["all".to_string()], &[], &[], false)?;
//! ir::Printer::write_context(&ctx, &mut std::io::stdout())?;
//! ```
pub mod analysis;
pub mod default_passes;
pub mod pass_manager;
pub mod passes;
pub mod traversal;
