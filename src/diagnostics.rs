//! Numeric error codes and the diagnostic sink shared by every stage.
//!
//! Codes are grouped by the stage that produces them (2000 lexer, 3000
//! parser, 4000 type definition, 5000 type check, 6000 code generation,
//! 8000 post-processing, 9000 internal malfunction). The sink accumulates
//! diagnostics in source order and can be muted for tests.

use std::fmt::Display;
use std::rc::Rc;

use colored::Colorize;

use crate::source::{Location, SourceRegistry};

/// Stage-grouped diagnostic codes. The discriminant is the user-visible
/// numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Default = 0,

    Config = 1000,

    // Scanner
    Scanner = 2000,
    UnexpectedChar,
    NoLfAfterBackslash,
    UnclosedComment,
    ClosingUnopenedComment,
    UnclosedChar,
    EmptyChar,
    IllegalEscSeq,
    UnclosedString,
    UnclosedMultiLineString,
    MultipleDecimalPoints,
    NonDecimalFloat,
    NoDigitsInExponent,
    IntTooLarge,
    FloatTooLarge,
    NonDigitInNumber,

    // Parser
    Parser = 3000,
    MissingStmtEnd,
    NotAnExpression,
    UnmatchedParenInArgs,
    UnmatchedParenInGrouping,
    UnmatchedParenInTuple,
    UnmatchedLeftSquare,
    InvalidAssignment,
    TooManyArgs,
    UnnamedVar,
    NotAnIdentifier,
    InvalidTypeAnnotation,
    UnnamedFun,
    NoLparenInFunDecl,
    UnmatchedParenInParams,
    NoLbraceInFunDecl,
    UnmatchedBraceInFunDecl,
    ParamWithoutDeclarer,
    UnnamedStruct,
    NoLbraceInStructDecl,
    UnmatchedBraceInStructDecl,
    UnnamedNamespace,
    NoLbraceInNamespaceDecl,
    UnmatchedBraceInNamespaceDecl,
    UnmatchedBraceInBlock,
    NoInKeywordInFor,
    NoRangeInFor,
    InvalidObjectField,
    UnmatchedBraceInObject,
    InvalidArraySize,

    // Type definition
    TypeDef = 4000,
    SymbolAlreadyDeclared,
    StructAlreadyDeclared,
    NamespaceInStruct,
    NamespaceInLocalScope,
    StructInLocalScope,
    ExternInLocalScope,
    ExitedRootScope,
    UnknownType,
    GlobalExpression,
    GlobalBlock,
    GlobalConditional,
    GlobalLoop,
    GlobalReturn,
    GlobalBreak,
    GlobalContinue,
    InvalidMainSignature,

    // Type checking
    TypeCheck = 5000,
    UndeclaredSymbol,
    IncompatibleTypes,
    UninitializedConst,
    AutoWithoutInitializer,
    SizedArrayWithoutInitializer,
    ArraySizeUnknown,
    AssignToNonLvalue,
    AssignToConst,
    AddressOfNonLvalue,
    CallOnNonFun,
    InvalidArity,
    DereferenceNonPointer,
    AccessOnNonStruct,
    InvalidStructMember,
    NoLiteralIndexOnTuple,
    TupleIndexOutOfRange,
    IndeterminateArrayType,
    InconsistentArrayTypes,
    MissingFieldInObj,
    InvalidCast,
    ConditionalWithoutBool,
    InconsistentReturnTypes,
    ReturnIncompatible,
    NoReturnInNonVoidFun,
    DuplicateParamName,
    BreakOutsideLoop,
    ContinueOutsideLoop,

    // Code generation
    CodeGen = 6000,
    NotAConstant,
    UnverifiedModule,
    Io,

    // Post-processing
    PostProcessing = 8000,
    EmitFailed,

    // Compiler malfunction
    Malfunction = 9000,
    Unreachable,
    Impossible,
    Unimplemented,
    Conversion,
    Unknown,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub location: Option<Location>,
    pub message: String,
}

/// Accumulates diagnostics across the whole compilation.
///
/// Diagnostics are printed to stderr as they arrive unless the sink is
/// muted; the recorded list is kept either way so tests can assert on the
/// ordered code sequence.
pub struct DiagnosticSink {
    registry: Rc<SourceRegistry>,
    diagnostics: Vec<Diagnostic>,
    muted: bool,
}

impl DiagnosticSink {
    pub fn new(registry: Rc<SourceRegistry>) -> Self {
        Self {
            registry,
            diagnostics: Vec::new(),
            muted: false,
        }
    }

    /// A sink that records but never prints. Used by tests.
    pub fn muted(registry: Rc<SourceRegistry>) -> Self {
        Self {
            registry,
            diagnostics: Vec::new(),
            muted: true,
        }
    }

    pub fn error(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) {
        self.push(Severity::Error, code, Some(location), message.into());
    }

    /// An error that has no sensible source position (I/O, module level).
    pub fn error_global(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.push(Severity::Error, code, None, message.into());
    }

    pub fn warning(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) {
        self.push(Severity::Warning, code, Some(location), message.into());
    }

    /// Attach a note to the diagnostic stream, e.g. "previous declaration
    /// was here". Notes do not count as errors.
    pub fn note(&mut self, location: Location, message: impl Into<String>) {
        self.push(Severity::Note, ErrorCode::Default, Some(location), message.into());
    }

    fn push(&mut self, severity: Severity, code: ErrorCode, location: Option<Location>, message: String) {
        let diagnostic = Diagnostic {
            severity,
            code,
            location,
            message,
        };
        if !self.muted {
            eprint!("{}", render(&diagnostic, &self.registry));
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// The ordered list of error codes recorded so far (errors only).
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.code)
            .collect()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Renders a diagnostic in the terminal format:
///
/// ```text
/// test.fl:1:5
/// Error: 5002 Incompatible types.
/// 1 | var x: i32 = true
///          ^~~
/// ```
fn render(diagnostic: &Diagnostic, registry: &SourceRegistry) -> String {
    let header = match diagnostic.severity {
        Severity::Error => "Error: ".red().to_string(),
        Severity::Warning => "Warning: ".yellow().to_string(),
        Severity::Note => "Note: ".cyan().to_string(),
    };

    let Some(location) = diagnostic.location else {
        return format!("{header}{} {}\n", diagnostic.code, diagnostic.message);
    };

    let file = registry.file(location.file);
    let line = location.source_line(registry);
    let caret_pad = " ".repeat(location.column + format!("{} | ", location.line).len());
    let squiggles = "~".repeat(location.length.saturating_sub(1));
    let code = match diagnostic.severity {
        Severity::Note => String::new(),
        _ => format!("{} ", diagnostic.code),
    };
    format!(
        "{}:{}:{}\n{header}{code}{}\n{} | {line}\n{caret_pad}{}\n",
        file.name,
        location.line,
        location.column,
        diagnostic.message,
        location.line,
        format!("^{squiggles}").red(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> DiagnosticSink {
        let mut registry = SourceRegistry::new();
        registry.add_source("t.fl", "var x = 1\n");
        DiagnosticSink::muted(Rc::new(registry))
    }

    #[test]
    fn test_error_codes_are_grouped() {
        assert_eq!(ErrorCode::Scanner.code(), 2000);
        assert_eq!(ErrorCode::UnexpectedChar.code(), 2001);
        assert_eq!(ErrorCode::Parser.code(), 3000);
        assert_eq!(ErrorCode::TypeDef.code(), 4000);
        assert_eq!(ErrorCode::TypeCheck.code(), 5000);
        assert_eq!(ErrorCode::CodeGen.code(), 6000);
        assert_eq!(ErrorCode::Malfunction.code(), 9000);
    }

    #[test]
    fn test_sink_counts_only_errors() {
        let mut sink = sink();
        let loc = Location::new(crate::source::FileId(0), 1, 0, 3, 0);
        sink.error(loc, ErrorCode::UnexpectedChar, "bad char");
        sink.warning(loc, ErrorCode::BreakOutsideLoop, "stray break");
        sink.note(loc, "previous declaration was here");
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.error_codes(), vec![ErrorCode::UnexpectedChar]);
        assert_eq!(sink.diagnostics().len(), 3);
    }
}
