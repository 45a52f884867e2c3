//! Typed expression-tree nodes the hasher recurses over.
//!
//! Stands in for the original's arbitrary PostgreSQL `Node` tree: a
//! tagged variant over the node kinds the predictor actually needs to
//! distinguish, with constants and source-location metadata omitted from
//! the type entirely rather than stripped from a rendered string
//! (`remove_consts`/`remove_locations` in `hash.c`).

use super::{hash_bytes, Hash32};

/// A node in a canonicalized expression tree.
///
/// `Constant` carries no payload: two constants of the same type hash
/// identically regardless of value, which is the entire point of
/// constant-insensitive hashing. A real planner's constant
/// node would carry a type oid here if cross-type collisions mattered;
/// type-awareness is left to the embedding host.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column, identified by a caller-assigned stable id
    /// (e.g. `(relid, attnum)` flattened by the embedding host).
    Var(u64),
    /// A literal value. Its content is irrelevant to the hash.
    Constant,
    /// Reference to an external parameter (`$1`-style placeholder).
    Param(u32),
    /// A unary operator applied to one sub-expression.
    UnaryOp {
        /// Operator identifier (caller-assigned opcode).
        op: u32,
        /// Operand.
        arg: Box<Expr>,
    },
    /// A binary operator applied to two sub-expressions.
    BinaryOp {
        /// Operator identifier.
        op: u32,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A function or operator call with an arbitrary argument count.
    Call {
        /// Function identifier.
        func: u32,
        /// Arguments, in original order.
        args: Vec<Expr>,
    },
    /// An equivalence-class placeholder substituted in for an argument
    /// that belongs to a multi-member equivalence class. Carries the
    /// class's `ec_hash` so the substitution is itself constant-insensitive.
    EquivalenceClassRef(Hash32),
    /// Stand-in for a subplan or initplan reference. The original
    /// replaces these with a zero sentinel node so their internal
    /// structure contributes nothing to the hash.
    SubplanSentinel,
}

impl Expr {
    /// Renders a canonical byte string for this node and hashes it.
    ///
    /// Mirrors `get_node_hash`: constants and locations are already
    /// absent from the type, so no string surgery is needed.
    #[must_use]
    pub fn node_hash(&self) -> Hash32 {
        let mut bytes = Vec::new();
        self.canonical_bytes(&mut bytes);
        hash_bytes(&bytes)
    }

    /// Appends this node's canonical byte representation to `out`.
    ///
    /// Each variant starts with a fixed discriminant byte so that, e.g.,
    /// `UnaryOp(op=5)` and `Param(5)` never collide despite sharing a
    /// numeric payload.
    fn canonical_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Expr::Var(id) => {
                out.push(0);
                out.extend_from_slice(&id.to_le_bytes());
            }
            Expr::Constant => {
                out.push(1);
            }
            Expr::Param(id) => {
                out.push(2);
                out.extend_from_slice(&id.to_le_bytes());
            }
            Expr::UnaryOp { op, arg } => {
                out.push(3);
                out.extend_from_slice(&op.to_le_bytes());
                arg.canonical_bytes(out);
            }
            Expr::BinaryOp { op, left, right } => {
                out.push(4);
                out.extend_from_slice(&op.to_le_bytes());
                left.canonical_bytes(out);
                right.canonical_bytes(out);
            }
            Expr::Call { func, args } => {
                out.push(5);
                out.extend_from_slice(&func.to_le_bytes());
                out.extend_from_slice(&(args.len() as u32).to_le_bytes());
                for a in args {
                    a.canonical_bytes(out);
                }
            }
            Expr::EquivalenceClassRef(ec_hash) => {
                out.push(6);
                out.extend_from_slice(&ec_hash.to_le_bytes());
            }
            Expr::SubplanSentinel => {
                out.push(7);
            }
        }
    }

    /// Returns true if this subtree contains a constant anywhere, used by
    /// [`super::fss::clause_hash`] to decide whether an equality clause
    /// still carries constants after equivalence-class substitution
    /// (`has_consts` in the original).
    #[must_use]
    pub fn contains_constant(&self) -> bool {
        match self {
            Expr::Constant => true,
            Expr::UnaryOp { arg, .. } => arg.contains_constant(),
            Expr::BinaryOp { left, right, .. } => {
                left.contains_constant() || right.contains_constant()
            }
            Expr::Call { args, .. } => args.iter().any(Expr::contains_constant),
            Expr::Var(_)
            | Expr::Param(_)
            | Expr::EquivalenceClassRef(_)
            | Expr::SubplanSentinel => false,
        }
    }
}
