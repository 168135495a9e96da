//! Native object emission through the host target machine.

use std::path::Path;

use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::OptimizationLevel;

/// Configure a target machine for the host.
pub fn host_target_machine() -> anyhow::Result<TargetMachine> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("could not initialize native target: {e}"))?;

    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple)
        .map_err(|e| anyhow::anyhow!("could not resolve target triple: {e}"))?;
    let cpu = TargetMachine::get_host_cpu_name().to_string();
    let features = TargetMachine::get_host_cpu_features().to_string();

    target
        .create_target_machine(
            &triple,
            &cpu,
            &features,
            OptimizationLevel::Default,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| anyhow::anyhow!("unable to create target machine"))
}

/// Write the module as a relocatable object file.
pub fn emit(module: &Module, machine: &TargetMachine, destination: &Path) -> anyhow::Result<()> {
    machine
        .write_to_file(module, FileType::Object, destination)
        .map_err(|e| anyhow::anyhow!("could not write object file: {e}"))
}
