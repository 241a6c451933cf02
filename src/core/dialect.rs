/*!

  Dialect registration.

  A dialect contributes opcodes and capability flags. The analyzer never
  hard-codes dialect semantics; it only queries traits through the registry,
  so a new dialect participates by registering its operations here.

*/

use std::collections::HashMap;

/// Capability flags attached to a registered opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpTraits(u32);

impl OpTraits {
    pub const TERMINATOR: OpTraits = OpTraits(1);

    pub const fn empty() -> OpTraits {
        OpTraits(0)
    }

    pub const fn contains(self, other: OpTraits) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: OpTraits) -> OpTraits {
        OpTraits(self.0 | other.0)
    }
}

#[derive(Clone, Debug)]
pub struct OpSpec {
    pub name: String,
    pub traits: OpTraits,
}

#[derive(Clone, Debug, Default)]
pub struct Dialect {
    pub name: String,
    pub ops: Vec<OpSpec>,
}

impl Dialect {
    pub fn new(name: &str) -> Dialect {
        Dialect {
            name: name.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, name: &str, traits: OpTraits) -> Dialect {
        self.ops.push(OpSpec {
            name: format!("{}.{}", self.name, name),
            traits,
        });
        self
    }
}

/// The open registry keyed by full operation name.
#[derive(Clone, Debug, Default)]
pub struct DialectRegistry {
    specs: HashMap<String, OpSpec>,
}

impl DialectRegistry {
    pub fn new() -> DialectRegistry {
        DialectRegistry::default()
    }

    pub fn register(&mut self, dialect: Dialect) {
        for spec in dialect.ops {
            self.specs.insert(spec.name.clone(), spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&OpSpec> {
        self.specs.get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Whether `name` is known to carry the terminator trait.
    pub fn is_terminator(&self, name: &str) -> bool {
        self.get(name)
            .map(|s| s.traits.contains(OpTraits::TERMINATOR))
            .unwrap_or(false)
    }
}

/// Build the registry containing every dialect this crate understands.
pub fn default_registry() -> DialectRegistry {
    let mut registry = DialectRegistry::new();
    registry.register(
        Dialect::new("builtin")
            .op("module", OpTraits::empty())
            .op("unrealized_conversion_cast", OpTraits::empty()),
    );
    registry.register(
        Dialect::new("pdl")
            .op("pattern", OpTraits::empty())
            .op("operation", OpTraits::empty())
            .op("operand", OpTraits::empty())
            .op("result", OpTraits::empty())
            .op("type", OpTraits::empty())
            .op("attribute", OpTraits::empty())
            .op("replace", OpTraits::empty())
            .op("erase", OpTraits::empty())
            .op("rewrite", OpTraits::TERMINATOR)
            .op("apply_native_constraint", OpTraits::empty())
            .op("apply_native_rewrite", OpTraits::empty()),
    );
    registry.register(
        Dialect::new("irdl")
            .op("dialect", OpTraits::empty())
            .op("type", OpTraits::empty())
            .op("attribute", OpTraits::empty())
            .op("parameters", OpTraits::TERMINATOR)
            .op("operation", OpTraits::empty())
            .op("operands", OpTraits::empty())
            .op("results", OpTraits::empty())
            .op("any", OpTraits::empty())
            .op("any_of", OpTraits::empty())
            .op("all_of", OpTraits::empty())
            .op("is", OpTraits::empty())
            .op("base", OpTraits::empty())
            .op("parametric", OpTraits::empty()),
    );
    registry.register(
        Dialect::new("irdl_ext")
            .op("check_subset", OpTraits::empty())
            .op("yield", OpTraits::TERMINATOR)
            .op("eq", OpTraits::empty())
            .op("match", OpTraits::empty()),
    );
    registry.register(
        Dialect::new("pdltest")
            .op("matchop", OpTraits::empty())
            .op("rewriteop", OpTraits::empty())
            .op("terminator", OpTraits::TERMINATOR),
    );
    registry.register(
        Dialect::new("test")
            .op("entry", OpTraits::TERMINATOR)
            .op("branch", OpTraits::TERMINATOR)
            .op("use_op", OpTraits::empty())
            .op("op", OpTraits::empty())
            .op("op1", OpTraits::empty())
            .op("op2", OpTraits::empty())
            .op("op3", OpTraits::empty()),
    );
    registry.register(Dialect::new("func").op("return", OpTraits::TERMINATOR));
    registry
}

lazy_static! {
    /// Registry shared by the binaries and tests.
    pub static ref DEFAULT_REGISTRY: DialectRegistry = default_registry();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_traits() {
        let registry = default_registry();
        assert!(registry.is_terminator("pdltest.terminator"));
        assert!(registry.is_terminator("func.return"));
        assert!(!registry.is_terminator("pdltest.matchop"));
        assert!(!registry.is_terminator("does.not_exist"));
    }
}
