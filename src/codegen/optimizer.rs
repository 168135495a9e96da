//! Standard optimization pipeline, run between verification and object
//! emission.

use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::TargetMachine;

/// Run the default O2 module pipeline.
pub fn optimize(module: &Module, machine: &TargetMachine) -> anyhow::Result<()> {
    module
        .run_passes("default<O2>", machine, PassBuilderOptions::create())
        .map_err(|e| anyhow::anyhow!("optimization pipeline failed: {e}"))
}
