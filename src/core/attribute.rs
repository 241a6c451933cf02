/*!

  The attribute universe shared by every IR in the crate.

  Attributes are algebraic and recursive: plain integers and strings,
  symbol references, containers, and named parameterised constructors
  (`builtin.integer_type`, `pdl.value`, ...). The SMT encoding mirrors
  this union exactly, so the set of variants here is closed on purpose.

*/

use std::fmt;

/// A reference to a symbol, possibly nested (`@builtin::@vector`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolRef {
    pub root: String,
    pub nested: Vec<String>,
}

impl SymbolRef {
    pub fn flat(root: &str) -> SymbolRef {
        SymbolRef {
            root: root.to_string(),
            nested: Vec::new(),
        }
    }

    pub fn nested(root: &str, leaf: &str) -> SymbolRef {
        SymbolRef {
            root: root.to_string(),
            nested: vec![leaf.to_string()],
        }
    }

    /// The dotted name the reference points at (`builtin.vector`).
    pub fn dotted(&self) -> String {
        let mut s = self.root.clone();
        for part in &self.nested {
            s.push('.');
            s.push_str(part);
        }
        s
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.root)?;
        for part in &self.nested {
            write!(f, "::@{}", part)?;
        }
        Ok(())
    }
}

/// The closed union of attribute values.
///
/// Structural equality and a stable ordering are derived; both are relied
/// on by the simplifier (CSE, dedup) and the SMT encoder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Unit,
    Int(i64),
    String(String),
    SymbolRef(SymbolRef),
    Array(Vec<Attribute>),
    Dict(Vec<(String, Attribute)>),
    /// Dense `array<i32: ...>` payloads, used for operand segment sizes.
    DenseI32(Vec<i32>),
    /// A typed integer, printed `5 : i32`.
    IntegerAttr(Box<Attribute>, Box<Attribute>),
    /// A named parameterised constructor, e.g. `builtin.integer_type`.
    /// Types are attributes with this variant; a parameterless constructor
    /// doubles as a plain type reference (`!pdl.value`).
    Parametric(String, Vec<Attribute>),
}

pub const INTEGER_TYPE: &str = "builtin.integer_type";
pub const SIGNEDNESS: &str = "builtin.signedness";
pub const INTEGER_ATTR: &str = "builtin.integer_attr";
pub const INDEX_TYPE: &str = "builtin.index";

impl Attribute {
    pub fn string(s: &str) -> Attribute {
        Attribute::String(s.to_string())
    }

    pub fn signedness(kind: &str) -> Attribute {
        Attribute::Parametric(SIGNEDNESS.to_string(), vec![Attribute::string(kind)])
    }

    /// A signless `iN` type.
    pub fn integer_type(width: i64) -> Attribute {
        Attribute::Parametric(
            INTEGER_TYPE.to_string(),
            vec![Attribute::Int(width), Attribute::signedness("signless")],
        )
    }

    pub fn index_type() -> Attribute {
        Attribute::Parametric(INDEX_TYPE.to_string(), vec![])
    }

    pub fn integer_attr(value: i64, ty: Attribute) -> Attribute {
        Attribute::IntegerAttr(Box::new(Attribute::Int(value)), Box::new(ty))
    }

    /// A parameterless named type such as `!pdl.value`.
    pub fn named_type(name: &str) -> Attribute {
        Attribute::Parametric(name.to_string(), vec![])
    }

    /// The constructor head of a parametric attribute, if any.
    pub fn head(&self) -> Option<&str> {
        match self {
            Attribute::Parametric(name, _) => Some(name),
            Attribute::IntegerAttr(..) => Some(INTEGER_ATTR),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attribute::Int(v) => Some(*v),
            Attribute::IntegerAttr(v, _) => v.as_int(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol_ref(&self) -> Option<&SymbolRef> {
        match self {
            Attribute::SymbolRef(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_dense_i32(&self) -> Option<&[i32]> {
        match self {
            Attribute::DenseI32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Attribute]> {
        match self {
            Attribute::Array(v) => Some(v),
            _ => None,
        }
    }
}

/// PDL handle types.
pub fn pdl_operation_type() -> Attribute {
    Attribute::named_type("pdl.operation")
}

pub fn pdl_value_type() -> Attribute {
    Attribute::named_type("pdl.value")
}

pub fn pdl_type_type() -> Attribute {
    Attribute::named_type("pdl.type")
}

pub fn pdl_attribute_type() -> Attribute {
    Attribute::named_type("pdl.attribute")
}

/// The IRDL constraint-value type.
pub fn irdl_attribute_type() -> Attribute {
    Attribute::named_type("irdl.attribute")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_type_shape() {
        let i32t = Attribute::integer_type(32);
        assert_eq!(i32t.head(), Some(INTEGER_TYPE));
        match &i32t {
            Attribute::Parametric(_, params) => {
                assert_eq!(params[0], Attribute::Int(32));
            }
            _ => panic!("expected parametric"),
        }
    }

    #[test]
    fn ordering_is_stable() {
        let a = Attribute::Int(1);
        let b = Attribute::Int(2);
        assert!(a < b);
        assert_eq!(a, a.clone());
    }
}
