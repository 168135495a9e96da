//! Parse-time type syntax.
//!
//! Annotations record the type exactly as written; they are resolved into
//! semantic types by the environment during checking. The string form is
//! the canonical print used in diagnostics.

use std::fmt::Display;

use crate::source::Location;

/// One `Name` or `Name<Args>` step of a segmented annotation. The path
/// `std::Vector<i32>::Iterator` has the segments `std`, `Vector<i32>` and
/// `Iterator`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSegment {
    pub name: String,
    pub type_args: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// A (possibly qualified) named type: `i32`, `A::B::Point<i32>`.
    Segmented(Vec<ClassSegment>),
    /// `T*`. Pointers have no written mutability; the flag defaults to
    /// mutable and the semantic declarer is refined during checking.
    Pointer { inner: Box<Annotation>, mutable: bool },
    /// `T[3]`, `T[*]` or `T[]`; `size` is `None` when the length is
    /// inferred from an initializer.
    Array { inner: Box<Annotation>, size: Option<i64> },
    /// `(A, B)`.
    Tuple(Vec<Annotation>),
    /// `fun(A, var B) => R`, optionally variadic: `fun(A, ...) => R`.
    Function {
        params: Vec<(bool, Annotation)>,
        ret: Box<Annotation>,
        ret_mutable: bool,
        variadic: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub location: Location,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, location: Location) -> Self {
        Self { kind, location }
    }

    /// A synthesized single-segment annotation, used for the implicit
    /// `auto` and `void` types the parser injects.
    pub fn simple(name: impl Into<String>, location: Location) -> Self {
        Self::new(
            AnnotationKind::Segmented(vec![ClassSegment {
                name: name.into(),
                type_args: Vec::new(),
            }]),
            location,
        )
    }

    /// True for the placeholder the parser injects when a declaration has
    /// no written type.
    pub fn is_auto(&self) -> bool {
        matches!(
            &self.kind,
            AnnotationKind::Segmented(segments)
                if segments.len() == 1 && segments[0].name == "auto" && segments[0].type_args.is_empty()
        )
    }
}

impl Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            AnnotationKind::Segmented(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        write!(f, "::")?;
                    }
                    write!(f, "{}", segment.name)?;
                    if !segment.type_args.is_empty() {
                        write!(f, "<")?;
                        for (j, arg) in segment.type_args.iter().enumerate() {
                            if j > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{arg}")?;
                        }
                        write!(f, ">")?;
                    }
                }
                Ok(())
            }
            AnnotationKind::Pointer { inner, .. } => write!(f, "{inner}*"),
            AnnotationKind::Array { inner, size } => match size {
                Some(size) => write!(f, "{inner}[{size}]"),
                None => write!(f, "{inner}[]"),
            },
            AnnotationKind::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
            AnnotationKind::Function {
                params,
                ret,
                ret_mutable,
                variadic,
            } => {
                write!(f, "fun(")?;
                for (i, (mutable, param)) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *mutable {
                        write!(f, "var ")?;
                    }
                    write!(f, "{param}")?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") => ")?;
                if *ret_mutable {
                    write!(f, "var ")?;
                }
                write!(f, "{ret}")
            }
        }
    }
}
