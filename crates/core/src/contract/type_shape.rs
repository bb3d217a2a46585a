//! Type shapes
//!
//! A `TypeShape` describes a type the way the composition engine sees it:
//! a named type with zero or more type arguments, or a type-parameter slot
//! belonging to an open generic part.
//!
//! ## Examples
//!
//! | Text | Shape |
//! |------|-------|
//! | `User` | `Named { "User", [] }` |
//! | `Useful<i32>` | `Named { "Useful", [Named { "i32", [] }] }` |
//! | `Useful<!0>` | `Named { "Useful", [Param(0)] }` (open) |
//!
//! Parameter slots are written `!N` (zero-based), so they can never collide
//! with a real type name.
//!
//! ## Closing
//!
//! An open shape is closed by substituting every `Param(i)` with the i-th
//! type argument. Matching an open export against a closed import is done by
//! [`TypeShape::unify`], which infers the argument for every slot it meets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Shape of a type declared, exported or imported by a part
///
/// ## Invariants
///
/// - Equality is structural
/// - A shape is open iff it contains at least one `Param` slot
/// - The arity of a named shape is the length of its argument list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeShape {
    /// A named type, generic when `args` is non-empty
    Named {
        /// Generic definition name (`Useful` for `Useful<i32>`)
        name: String,
        /// Type arguments, in declaration order
        args: Vec<TypeShape>,
    },

    /// Free type parameter of the enclosing open generic part
    Param(usize),
}

impl TypeShape {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Non-generic named type
    pub fn named(name: impl Into<String>) -> Self {
        TypeShape::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Generic type with the given arguments (open or closed)
    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeShape>) -> Self {
        TypeShape::Named {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Open generic definition `name<!0, .., !arity-1>`
    pub fn open(name: impl Into<String>, arity: usize) -> Self {
        Self::generic(name, (0..arity).map(TypeShape::Param))
    }

    /// Type parameter slot
    pub const fn param(index: usize) -> Self {
        TypeShape::Param(index)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Generic definition name, `None` for a parameter slot
    #[inline]
    pub fn definition_name(&self) -> Option<&str> {
        match self {
            TypeShape::Named { name, .. } => Some(name),
            TypeShape::Param(_) => None,
        }
    }

    /// Type arguments (empty for non-generic types and slots)
    #[inline]
    pub fn args(&self) -> &[TypeShape] {
        match self {
            TypeShape::Named { args, .. } => args,
            TypeShape::Param(_) => &[],
        }
    }

    /// Number of type arguments of the generic definition
    #[inline]
    pub fn arity(&self) -> usize {
        self.args().len()
    }

    /// Whether any parameter slot appears in this shape
    pub fn is_open(&self) -> bool {
        match self {
            TypeShape::Param(_) => true,
            TypeShape::Named { args, .. } => args.iter().any(TypeShape::is_open),
        }
    }

    /// Highest parameter slot index referenced, if any
    pub fn max_param(&self) -> Option<usize> {
        match self {
            TypeShape::Param(i) => Some(*i),
            TypeShape::Named { args, .. } => args.iter().filter_map(TypeShape::max_param).max(),
        }
    }

    /// Number of free parameters implied by the referenced slots
    pub fn param_count(&self) -> usize {
        self.max_param().map_or(0, |max| max + 1)
    }

    /// Collect every slot index referenced by this shape
    pub fn collect_params(&self, into: &mut Vec<usize>) {
        match self {
            TypeShape::Param(i) => {
                if !into.contains(i) {
                    into.push(*i);
                }
            }
            TypeShape::Named { args, .. } => {
                for arg in args {
                    arg.collect_params(into);
                }
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Substitute parameter slots with concrete arguments
    ///
    /// Slots without a corresponding argument are left untouched; callers
    /// check arity before closing.
    pub fn substitute(&self, args: &[TypeShape]) -> TypeShape {
        match self {
            TypeShape::Param(i) => args.get(*i).cloned().unwrap_or(TypeShape::Param(*i)),
            TypeShape::Named { name, args: inner } => TypeShape::Named {
                name: name.clone(),
                args: inner.iter().map(|a| a.substitute(args)).collect(),
            },
        }
    }

    /// Structurally match this (possibly open) shape against a closed one
    ///
    /// Every slot met along the way is bound in `bindings`. Returns `false`
    /// when the shapes differ, when generic arities differ, when the target is
    /// itself open, or when one slot would need two different arguments.
    pub fn unify(&self, target: &TypeShape, bindings: &mut Bindings) -> bool {
        match (self, target) {
            (TypeShape::Param(i), _) => !target.is_open() && bindings.bind(*i, target),
            (
                TypeShape::Named { name, args },
                TypeShape::Named {
                    name: target_name,
                    args: target_args,
                },
            ) => {
                name == target_name
                    && args.len() == target_args.len()
                    && args
                        .iter()
                        .zip(target_args)
                        .all(|(arg, target_arg)| arg.unify(target_arg, bindings))
            }
            (TypeShape::Named { .. }, TypeShape::Param(_)) => false,
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Param(i) => write!(f, "!{}", i),
            TypeShape::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// Type arguments inferred while unifying an open shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    slots: Vec<Option<TypeShape>>,
}

impl Bindings {
    /// Empty bindings sized for `arity` slots
    pub fn with_arity(arity: usize) -> Self {
        Bindings {
            slots: vec![None; arity],
        }
    }

    /// Bind slot `index`, returning `false` on a conflicting binding
    pub fn bind(&mut self, index: usize, shape: &TypeShape) -> bool {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        match &self.slots[index] {
            Some(existing) => existing == shape,
            None => {
                self.slots[index] = Some(shape.clone());
                true
            }
        }
    }

    /// Argument bound to slot `index`
    pub fn get(&self, index: usize) -> Option<&TypeShape> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Number of slots tracked
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is tracked
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Indexes of slots that are still unbound
    pub fn unbound(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Argument tuple, if every slot is bound
    pub fn into_args(self) -> Option<Vec<TypeShape>> {
        self.slots.into_iter().collect()
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Error when parsing a textual type shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeParseError {
    /// Input was empty or whitespace
    #[error("type shape cannot be empty")]
    Empty,

    /// Unexpected character
    #[error("unexpected character '{char}' at position {position}")]
    UnexpectedChar {
        /// The offending character
        char: char,
        /// Byte offset in the input
        position: usize,
    },

    /// Input ended inside a type argument list
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// `!` not followed by a slot index
    #[error("invalid parameter slot at position {position}")]
    InvalidParam {
        /// Byte offset of the `!`
        position: usize,
    },
}

impl FromStr for TypeShape {
    type Err = ShapeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ShapeParseError::Empty);
        }
        let mut parser = ShapeParser { input: s, pos: 0 };
        let shape = parser.shape()?;
        parser.skip_ws();
        match parser.peek() {
            None => Ok(shape),
            Some(c) => Err(ShapeParseError::UnexpectedChar {
                char: c,
                position: parser.pos,
            }),
        }
    }
}

struct ShapeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl ShapeParser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn is_name_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '.' || c == ':' || c == '[' || c == ']'
    }

    fn shape(&mut self) -> Result<TypeShape, ShapeParseError> {
        self.skip_ws();
        match self.peek() {
            None => Err(ShapeParseError::UnexpectedEnd),
            Some('!') => {
                let start = self.pos;
                self.bump();
                let digits_start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
                self.input[digits_start..self.pos]
                    .parse::<usize>()
                    .map(TypeShape::Param)
                    .map_err(|_| ShapeParseError::InvalidParam { position: start })
            }
            Some(c) if Self::is_name_char(c) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if Self::is_name_char(c)) {
                    self.bump();
                }
                let name = self.input[start..self.pos].to_string();
                self.skip_ws();
                let mut args = Vec::new();
                if self.peek() == Some('<') {
                    self.bump();
                    loop {
                        args.push(self.shape()?);
                        self.skip_ws();
                        match self.peek() {
                            Some(',') => self.bump(),
                            Some('>') => {
                                self.bump();
                                break;
                            }
                            Some(c) => {
                                return Err(ShapeParseError::UnexpectedChar {
                                    char: c,
                                    position: self.pos,
                                })
                            }
                            None => return Err(ShapeParseError::UnexpectedEnd),
                        }
                    }
                }
                Ok(TypeShape::Named { name, args })
            }
            Some(c) => Err(ShapeParseError::UnexpectedChar {
                char: c,
                position: self.pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shape(s: &str) -> TypeShape {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(shape("User"), TypeShape::named("User"));
        assert_eq!(
            shape("Useful<i32>"),
            TypeShape::generic("Useful", [TypeShape::named("i32")])
        );
        assert_eq!(shape("Useful<!0>"), TypeShape::open("Useful", 1));
        assert_eq!(
            shape(" Map< String , List<!1> > ").to_string(),
            "Map<String, List<!1>>"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<TypeShape>(), Err(ShapeParseError::Empty));
        assert_eq!(
            "Useful<i32".parse::<TypeShape>(),
            Err(ShapeParseError::UnexpectedEnd)
        );
        assert!(matches!(
            "Useful<!x>".parse::<TypeShape>(),
            Err(ShapeParseError::InvalidParam { position: 7 })
        ));
        assert!(matches!(
            "A B".parse::<TypeShape>(),
            Err(ShapeParseError::UnexpectedChar { char: 'B', .. })
        ));
    }

    #[test]
    fn test_open_and_arity() {
        let open = shape("Pair<!0, List<!1>>");
        assert!(open.is_open());
        assert_eq!(open.arity(), 2);
        assert_eq!(open.param_count(), 2);
        assert_eq!(open.definition_name(), Some("Pair"));

        let closed = shape("Pair<i32, List<u8>>");
        assert!(!closed.is_open());
        assert_eq!(closed.param_count(), 0);
    }

    #[test]
    fn test_unify_binds_slots() {
        let open = shape("Pair<!0, List<!1>>");
        let target = shape("Pair<i32, List<String>>");
        let mut bindings = Bindings::with_arity(2);
        assert!(open.unify(&target, &mut bindings));
        assert_eq!(
            bindings.into_args(),
            Some(vec![shape("i32"), shape("String")])
        );
    }

    #[test]
    fn test_unify_rejects_arity_and_conflicts() {
        let mut bindings = Bindings::with_arity(1);
        assert!(!shape("Useful<!0>").unify(&shape("Useful<i32, u8>"), &mut bindings));

        let mut bindings = Bindings::with_arity(1);
        assert!(!shape("Pair<!0, !0>").unify(&shape("Pair<i32, u8>"), &mut bindings));

        let mut bindings = Bindings::with_arity(1);
        assert!(!shape("Useful<!0>").unify(&shape("Other<i32>"), &mut bindings));

        let mut bindings = Bindings::with_arity(1);
        assert!(!shape("Useful<!0>").unify(&shape("Useful<!0>"), &mut bindings));
    }

    #[test]
    fn test_substitute_closes_shape() {
        let open = shape("Map<!0, List<!1>>");
        let closed = open.substitute(&[shape("String"), shape("i32")]);
        assert_eq!(closed, shape("Map<String, List<i32>>"));
        assert!(!closed.is_open());
    }

    #[test]
    fn test_unbound_slots_reported() {
        let mut bindings = Bindings::with_arity(2);
        assert!(shape("Useful<!0>").unify(&shape("Useful<i32>"), &mut bindings));
        assert_eq!(bindings.unbound(), vec![1]);
        assert_eq!(bindings.into_args(), None);
    }

    fn closed_shape() -> impl Strategy<Value = TypeShape> {
        let leaf = "[A-Z][a-z]{0,5}".prop_map(TypeShape::named);
        leaf.prop_recursive(3, 12, 3, |inner| {
            ("[A-Z][a-z]{0,5}", prop::collection::vec(inner, 1..3))
                .prop_map(|(name, args)| TypeShape::generic(name, args))
        })
    }

    proptest! {
        #[test]
        fn prop_unify_recovers_substituted_args(a in closed_shape(), b in closed_shape()) {
            let open = shape("Pair<!0, List<!1>>");
            let args = vec![a, b];
            let closed = open.substitute(&args);
            prop_assert!(!closed.is_open());

            let mut bindings = Bindings::with_arity(2);
            prop_assert!(open.unify(&closed, &mut bindings));
            prop_assert_eq!(bindings.into_args(), Some(args));
        }
    }
}
