use crate::Ident;
use crate::ast::decl::Program;
use crate::error::Error;
use crate::eval::Evaluator;
use crate::eval::runtime_value::Value;

/// The embedding surface of the runtime.
///
/// An engine owns one evaluator and the source text used for
/// diagnostics. Programs run to completion; `Print` and `PrintLn`
/// land in an output buffer the host drains between runs.
#[derive(Debug, Default)]
pub struct Engine {
    evaluator: Evaluator,
    source_code: String,
}

impl Engine {
    /// Source text attached to errors of subsequent runs. The engine
    /// never parses it, diagnostics only resolve positions against it.
    pub fn set_source(&mut self, source_code: impl Into<String>) {
        self.source_code = source_code.into();
    }

    pub fn set_max_call_stack_depth(&mut self, depth: u32) {
        self.evaluator.options.max_call_stack_depth = depth;
    }

    /// Runs a program. The result is the value of `exit(value)` in
    /// the main block, otherwise the value of its last top-level
    /// expression statement, `nil` when there is neither.
    pub fn run(&mut self, program: &Program) -> Result<Value, Box<Error>> {
        self.evaluator
            .eval_program(program)
            .map_err(|err| Box::new(Error::from_runtime(err, self.source_code.clone())))
    }

    /// Seeds a global binding before a run.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.evaluator
            .env()
            .borrow_mut()
            .define(Ident::new(name), value);
    }

    pub fn output(&self) -> &str {
        self.evaluator.output()
    }

    pub fn take_output(&mut self) -> String {
        self.evaluator.take_output()
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
