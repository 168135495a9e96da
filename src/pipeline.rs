//! The compilation pipeline: scan → parse → global check → local check →
//! code generation → optimization → emission, with an optional link step.
//!
//! Stages run strictly in order; any stage that leaves errors in the sink
//! aborts the pipeline with exit code 1.

use std::mem;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use inkwell::context::Context;
use log::{debug, info};

use crate::checker::{Environment, GlobalChecker, LocalChecker};
use crate::codegen::{emitter, optimizer, CodeGenerator};
use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::source::SourceRegistry;

#[derive(Debug, Default)]
pub struct CompileOptions {
    /// Target name; defaults to `out` when linking, `out.o` otherwise.
    pub target: Option<String>,
    pub run_linker: bool,
    /// Write the textual IR here before emission.
    pub dump_ir: Option<PathBuf>,
}

pub struct Compiler {
    options: CompileOptions,
    registry: SourceRegistry,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            registry: SourceRegistry::new(),
        }
    }

    pub fn add_file(&mut self, path: &Path) -> anyhow::Result<()> {
        self.registry.add_path(path)?;
        Ok(())
    }

    pub fn add_source(&mut self, name: &str, text: &str) {
        self.registry.add_source(name, text);
    }

    /// Run the whole pipeline. Returns the process exit code.
    pub fn compile(&mut self) -> i32 {
        let registry = Rc::new(mem::take(&mut self.registry));
        let mut sink = DiagnosticSink::new(registry.clone());

        debug!("scanning {} file(s)", registry.len());
        let mut scanner = Scanner::new(&mut sink);
        for id in registry.file_ids() {
            let text = registry.file(id).text.clone();
            scanner.scan_file(id, &text);
        }
        let tokens = scanner.into_tokens();
        if sink.error_count() > 0 {
            return Self::abort();
        }

        debug!("parsing {} token(s)", tokens.len());
        let parser = Parser::new(tokens, &mut sink);
        let (mut ast, statements) = parser.parse();
        if sink.error_count() > 0 {
            return Self::abort();
        }

        debug!("checking global declarations");
        let mut env = Environment::new();
        GlobalChecker::new(&mut env, &ast, &mut sink).check(&statements);
        if sink.error_count() > 0 {
            return Self::abort();
        }

        debug!("checking function bodies");
        LocalChecker::new(&mut env, &mut ast, &mut sink).check(&statements);
        if sink.error_count() > 0 {
            return Self::abort();
        }

        debug!("generating code");
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, &mut env, &ast, &mut sink);
        let generated = generator.generate(&statements);
        let module = generator.module;
        if generated {
            // The dump is written before verification so the IR can be
            // inspected even when it does not verify.
            if let Some(path) = &self.options.dump_ir {
                if let Err(e) = module.print_to_file(path) {
                    sink.error_global(ErrorCode::Io, format!("Could not dump IR to file: {e}"));
                }
            }
        }
        if !generated || sink.error_count() > 0 {
            return Self::abort();
        }
        if module.verify().is_err() {
            sink.error_global(
                ErrorCode::UnverifiedModule,
                "The generated module could not be verified.",
            );
            return Self::abort();
        }

        let target = self.options.target.clone().unwrap_or_else(|| {
            if self.options.run_linker {
                "out".to_string()
            } else {
                "out.o".to_string()
            }
        });
        let object_path = if self.options.run_linker {
            format!("{target}.o")
        } else {
            target.clone()
        };

        debug!("optimizing and emitting '{object_path}'");
        let machine = match emitter::host_target_machine() {
            Ok(machine) => machine,
            Err(e) => {
                sink.error_global(ErrorCode::EmitFailed, e.to_string());
                return Self::abort();
            }
        };
        if let Err(e) = optimizer::optimize(&module, &machine) {
            sink.error_global(ErrorCode::EmitFailed, e.to_string());
            return Self::abort();
        }
        if let Err(e) = emitter::emit(&module, &machine, Path::new(&object_path)) {
            sink.error_global(ErrorCode::EmitFailed, e.to_string());
            return Self::abort();
        }

        if self.options.run_linker {
            if let Some(code) = self.link(&target, &object_path) {
                return code;
            }
        }
        info!("wrote '{target}'");
        0
    }

    /// Invoke the platform linker and remove the intermediate object on
    /// success.
    fn link(&self, target: &str, object_path: &str) -> Option<i32> {
        let mut command = Command::new("clang");
        if cfg!(windows) {
            command.args(["-o", target, object_path]);
        } else {
            command.args(["-lc", "-lm", "-o", target, object_path]);
        }

        match command.status() {
            Ok(status) if status.success() => {
                let _ = std::fs::remove_file(object_path);
                None
            }
            Ok(status) => {
                eprintln!("Linking failed with exit code {}", status.code().unwrap_or(-1));
                Some(1)
            }
            Err(e) => {
                eprintln!("Could not invoke linker: {e}");
                Some(1)
            }
        }
    }

    fn abort() -> i32 {
        eprintln!("Compiled with errors. Exiting...");
        1
    }
}
