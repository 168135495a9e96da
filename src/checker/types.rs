//! Resolved semantic types.
//!
//! Unlike annotations, types point into the namespace tree: a struct type
//! carries the [`NodeId`] of its scope, which makes the tree the single
//! source of truth. The canonical string form doubles as the equality and
//! compatibility key: `::i32`, `::i32*`, `::i32[]`, `(::i32, ::bool, )`,
//! `fun(::i32, ) => ::i32`.

use std::fmt::Display;
use std::mem;

use crate::checker::node::NodeId;
use crate::parser::ast::Declarer;

/// Names of the built-in struct scopes installed under the root. A struct
/// type outside this set is user-defined and therefore an aggregate.
pub const PRIMITIVE_NAMES: &[&str] = &[
    "i8", "i16", "i32", "i64", "f32", "f64", "bool", "char", "void",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A primitive or user-defined struct; `name` is the scope's unique
    /// name (`::i32`, `::Point`, ...).
    Struct { scope: NodeId, name: String },
    Function {
        params: Vec<(Declarer, Type)>,
        return_declarer: Declarer,
        return_type: Box<Type>,
        variadic: bool,
    },
    /// `size` is -1 until the element count is known.
    Array { inner: Box<Type>, size: i64 },
    Pointer { declarer: Declarer, inner: Box<Type> },
    Tuple(Vec<Type>),
    /// Placeholder for types still subject to inference.
    Blank,
}

impl Type {
    pub fn is_blank(&self) -> bool {
        matches!(self, Type::Blank)
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self.to_string().as_str(),
            "::i8" | "::i16" | "::i32" | "::i64" | "::char"
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.to_string().as_str(), "::f32" | "::f64")
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    pub fn is_bool(&self) -> bool {
        self.to_string() == "::bool"
    }

    pub fn is_void(&self) -> bool {
        self.to_string() == "::void"
    }

    /// Aggregates are stored behind a pointer in code generation: arrays,
    /// tuples and non-primitive structs.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Type::Array { .. } | Type::Tuple(_) => true,
            Type::Struct { name, .. } => {
                let bare = name.strip_prefix("::").unwrap_or(name);
                !PRIMITIVE_NAMES.contains(&bare)
            }
            _ => false,
        }
    }

    /// Compatibility with in-place inference.
    ///
    /// Same-kind types are compatible iff their canonical strings match
    /// (with blank pointer and array element types unified first, which is
    /// how `nil` and `[]` pick up their types). When exactly one side is
    /// blank it is overwritten with the other and the check succeeds —
    /// except that an array with a blank element type cannot resolve a
    /// blank: an empty array literal has no inferable element type.
    pub fn are_compatible(a: &mut Type, b: &mut Type) -> bool {
        if mem::discriminant(a) == mem::discriminant(b) {
            match (&mut *a, &mut *b) {
                (
                    Type::Pointer { inner: inner_a, .. },
                    Type::Pointer { inner: inner_b, .. },
                ) => {
                    if inner_a.is_blank() && !inner_b.is_blank() {
                        **inner_a = (**inner_b).clone();
                    } else if inner_b.is_blank() && !inner_a.is_blank() {
                        **inner_b = (**inner_a).clone();
                    }
                }
                (
                    Type::Array { inner: inner_a, size: size_a },
                    Type::Array { inner: inner_b, size: size_b },
                ) => {
                    if inner_a.is_blank() && !inner_b.is_blank() {
                        **inner_a = (**inner_b).clone();
                        if *size_a <= 0 && *size_b >= 0 {
                            *size_a = *size_b;
                        }
                    } else if inner_b.is_blank() && !inner_a.is_blank() {
                        **inner_b = (**inner_a).clone();
                        if *size_b <= 0 && *size_a >= 0 {
                            *size_b = *size_a;
                        }
                    }
                }
                _ => {}
            }
            return a.to_string() == b.to_string();
        }
        if a.is_blank() {
            if matches!(b, Type::Array { inner, .. } if inner.is_blank()) {
                return false;
            }
            *a = b.clone();
            return true;
        }
        if b.is_blank() {
            if matches!(a, Type::Array { inner, .. } if inner.is_blank()) {
                return false;
            }
            *b = a.clone();
            return true;
        }
        false
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Struct { name, .. } => write!(f, "{name}"),
            Type::Function {
                params,
                return_declarer,
                return_type,
                variadic,
            } => {
                write!(f, "fun(")?;
                for (declarer, param) in params {
                    if declarer.is_mutable() {
                        write!(f, "var ")?;
                    }
                    write!(f, "{param}, ")?;
                }
                if *variadic {
                    write!(f, "..., ")?;
                }
                write!(f, ") => ")?;
                if return_declarer.is_mutable() {
                    write!(f, "var ")?;
                }
                write!(f, "{return_type}")
            }
            Type::Array { inner, .. } => write!(f, "{inner}[]"),
            Type::Pointer { inner, .. } => write!(f, "{inner}*"),
            Type::Tuple(elements) => {
                write!(f, "(")?;
                for element in elements {
                    write!(f, "{element}, ")?;
                }
                write!(f, ")")
            }
            Type::Blank => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Type {
        Type::Struct {
            scope: NodeId(0),
            name: format!("::{name}"),
        }
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(named("i32").to_string(), "::i32");
        let ptr = Type::Pointer {
            declarer: Declarer::Var,
            inner: Box::new(named("i32")),
        };
        assert_eq!(ptr.to_string(), "::i32*");
        let arr = Type::Array {
            inner: Box::new(named("i32")),
            size: 4,
        };
        assert_eq!(arr.to_string(), "::i32[]");
        let tuple = Type::Tuple(vec![named("i32"), named("bool")]);
        assert_eq!(tuple.to_string(), "(::i32, ::bool, )");
        let fun = Type::Function {
            params: vec![(Declarer::Const, named("i32"))],
            return_declarer: Declarer::Const,
            return_type: Box::new(named("i32")),
            variadic: false,
        };
        assert_eq!(fun.to_string(), "fun(::i32, ) => ::i32");
    }

    #[test]
    fn test_equal_strings_are_compatible() {
        let mut a = named("i32");
        let mut b = named("i32");
        assert!(Type::are_compatible(&mut a, &mut b));

        let mut a = named("i32");
        let mut b = named("bool");
        assert!(!Type::are_compatible(&mut a, &mut b));
    }

    #[test]
    fn test_blank_unifies_in_place() {
        let mut a = Type::Blank;
        let mut b = named("f64");
        assert!(Type::are_compatible(&mut a, &mut b));
        assert_eq!(a.to_string(), "::f64");
    }

    #[test]
    fn test_blank_array_inner_does_not_unify_with_blank() {
        let mut a = Type::Blank;
        let mut b = Type::Array {
            inner: Box::new(Type::Blank),
            size: 0,
        };
        assert!(!Type::are_compatible(&mut a, &mut b));
    }

    #[test]
    fn test_nil_pointer_unification() {
        let mut nil = Type::Pointer {
            declarer: Declarer::Var,
            inner: Box::new(Type::Blank),
        };
        let mut ptr = Type::Pointer {
            declarer: Declarer::Var,
            inner: Box::new(named("i32")),
        };
        assert!(Type::are_compatible(&mut nil, &mut ptr));
        assert_eq!(nil.to_string(), "::i32*");
    }

    #[test]
    fn test_empty_array_into_typed_array() {
        let mut declared = Type::Array {
            inner: Box::new(named("i32")),
            size: -1,
        };
        let mut literal = Type::Array {
            inner: Box::new(Type::Blank),
            size: 0,
        };
        assert!(Type::are_compatible(&mut declared, &mut literal));
        assert_eq!(literal.to_string(), "::i32[]");
    }

    #[test]
    fn test_numeric_classification() {
        assert!(named("i8").is_int());
        assert!(named("char").is_int());
        assert!(named("f32").is_float());
        assert!(!named("bool").is_numeric());
        assert!(named("i64").is_numeric());
    }

    #[test]
    fn test_aggregate_detection() {
        assert!(!named("i32").is_aggregate());
        assert!(named("Point").is_aggregate());
        assert!(Type::Tuple(vec![]).is_aggregate());
        assert!(Type::Array {
            inner: Box::new(named("i32")),
            size: 1
        }
        .is_aggregate());
    }
}
