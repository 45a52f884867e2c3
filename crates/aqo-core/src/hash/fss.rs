//! Feature sub-space hashing: `get_fss_for_object`, `get_clause_hash`, and
//! `get_grouped_exprs_hash` from `hash.c`, ported to operate over the
//! typed [`Expr`] tree instead of a PostgreSQL node list.

use std::collections::HashMap;

use super::{hash_int_array, hash_unordered_int_array, Expr, Hash32};
use crate::numeric::{apply_permutation, argsort};

/// A relation's identity for hashing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationSignature {
    /// A permanent table, signed by a hash of its fully-qualified name.
    /// The caller is responsible for resolving table rewrites so a
    /// rewritten table keeps the same signature.
    Permanent(Hash32),
    /// A temporary table, signed by a hash of its tuple descriptor
    /// (column names and types).
    Temporary(Hash32),
    /// A relation with no oid (e.g. a subquery result). Contributes a
    /// fixed sentinel regardless of shape.
    NoOid,
}

const NO_OID_SENTINEL: Hash32 = -1;

impl RelationSignature {
    fn signature_hash(self) -> Hash32 {
        match self {
            RelationSignature::Permanent(h) | RelationSignature::Temporary(h) => h,
            RelationSignature::NoOid => NO_OID_SENTINEL,
        }
    }
}

/// Hashes a list of relation signatures order-insensitively
/// (`get_relations_hash`).
#[must_use]
pub fn relations_hash(signatures: &[RelationSignature]) -> Hash32 {
    let values: Vec<Hash32> = signatures.iter().map(RelationSignature::signature_hash).collect();
    hash_unordered_int_array(&values)
}

/// A planner-supplied equivalence class: the node hashes of every
/// argument the planner has determined to be mutually equal. Equivalence
/// itself is an external input; the hasher only needs a
/// stable numbering, computed here as the order-independent hash of the
/// member node hashes (`ec_hash`).
#[derive(Debug, Clone, Default)]
pub struct EquivalenceClass {
    /// `expr_hash(arg)` for every member argument of the class.
    pub member_arg_hashes: Vec<Hash32>,
}

impl EquivalenceClass {
    /// Creates a class from member argument hashes.
    #[must_use]
    pub fn new(member_arg_hashes: Vec<Hash32>) -> Self {
        Self { member_arg_hashes }
    }

    fn ec_hash(&self) -> Hash32 {
        hash_unordered_int_array(&self.member_arg_hashes)
    }
}

/// Builds the `arg_hash -> ec_hash` substitution map used by
/// [`clause_hash`], covering only classes with at least two members
/// (an argument in a singleton class has nothing to be equivalent to).
fn build_eclass_map(classes: &[EquivalenceClass]) -> HashMap<Hash32, Hash32> {
    let mut map = HashMap::new();
    for class in classes {
        if class.member_arg_hashes.len() >= 2 {
            let ec_hash = class.ec_hash();
            for &member in &class.member_arg_hashes {
                map.insert(member, ec_hash);
            }
        }
    }
    map
}

/// Computes the hash of a clause, constant-insensitively and
/// argument-order-insensitively for equality clauses (`get_clause_hash`).
///
/// `is_eq_clause` mirrors `AQOClause.is_eq_clause`: whether the planner
/// identified this clause as a two-argument equality predicate eligible
/// for the `a = b` / `b = a` collapse.
#[must_use]
pub fn clause_hash(
    clause: &Expr,
    is_eq_clause: bool,
    eclass_map: &HashMap<Hash32, Hash32>,
) -> Hash32 {
    let Expr::BinaryOp { op, left, right } = clause else {
        return clause.node_hash();
    };

    let substitute = |arg: &Expr| -> Expr {
        match eclass_map.get(&arg.node_hash()) {
            Some(&ec_hash) => Expr::EquivalenceClassRef(ec_hash),
            None => arg.clone(),
        }
    };

    let sub_left = substitute(left);
    let sub_right = substitute(right);

    if !is_eq_clause || sub_left.contains_constant() || sub_right.contains_constant() {
        let substituted = Expr::BinaryOp {
            op: *op,
            left: Box::new(sub_left),
            right: Box::new(sub_right),
        };
        substituted.node_hash()
    } else {
        // Equality clause, fully resolved via equivalence classes: hash
        // only the first argument, collapsing `a = b` and `b = a`.
        sub_left.node_hash()
    }
}

/// Combines a child sub-space's `fss` with the sorted hashes of a set of
/// grouping expressions (`get_grouped_exprs_hash`), used when an
/// aggregation node's sub-space is derived from its input's.
#[must_use]
pub fn grouping_hash(child_fss: Hash32, group_exprs: &[Expr]) -> Hash32 {
    let mut hashes: Vec<Hash32> = group_exprs.iter().map(Expr::node_hash).collect();
    hashes.sort_unstable();
    let exprs_hash = hash_int_array(&hashes);
    hash_int_array(&[child_fss, exprs_hash])
}

/// One clause and its externally-supplied selectivity, the unit of input
/// to [`fss_for_object`].
#[derive(Debug, Clone)]
pub struct ClauseInput<'a> {
    /// The clause expression.
    pub expr: &'a Expr,
    /// Whether the planner identified this as a two-argument equality
    /// predicate.
    pub is_eq_clause: bool,
    /// The clause's selectivity, in `(0, 1]`, from the planner's
    /// selectivity callback.
    pub selectivity: f64,
}

/// The computed feature sub-space identity and feature vector for one
/// plan node (`get_fss_for_object`).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSubspace {
    /// The node's `fss` identifier.
    pub fss: Hash32,
    /// The log-selectivity feature vector, permuted and symmetry-reduced,
    /// each entry clamped to `[log_sel_floor, 0]`. Its length is `cols`
    /// for the corresponding learning-matrix entry.
    pub features: Vec<f64>,
}

/// Computes the feature sub-space and feature vector for a plan node.
///
/// Ports `get_fss_for_object`: sorts clauses by hash, carries the
/// selectivity vector along under the same permutation, then collapses
/// runs of identical clause hashes (dropping constant-free duplicates
/// implied by an equivalence class, except when exactly one
/// constant-free clause remains in a run: in that corner case nothing
/// in the run is dropped, matching the original's `k + 1 == m - i` guard
/// literally).
#[must_use]
pub fn fss_for_object(
    relation_signatures: &[RelationSignature],
    clauses: &[ClauseInput<'_>],
    equivalence_classes: &[EquivalenceClass],
    log_sel_floor: f64,
) -> FeatureSubspace {
    let n = clauses.len();
    let eclass_map = build_eclass_map(equivalence_classes);

    let mut clause_hashes = Vec::with_capacity(n);
    let mut clause_has_consts = Vec::with_capacity(n);
    let mut raw_features = Vec::with_capacity(n);
    for c in clauses {
        clause_hashes.push(clause_hash(c.expr, c.is_eq_clause, &eclass_map));
        clause_has_consts.push(c.expr.contains_constant());
        let mut log_sel = c.selectivity.ln();
        if !log_sel.is_finite() || log_sel < log_sel_floor {
            log_sel = log_sel_floor;
        }
        raw_features.push(log_sel);
    }

    // Sort clauses by hash; carry has-const flags and features along.
    let perm = argsort(&clause_hashes);
    let sorted_hashes = apply_permutation(&clause_hashes, &perm);
    let sorted_has_consts = apply_permutation(&clause_has_consts, &perm);
    let sorted_features = apply_permutation(&raw_features, &perm);

    // Symmetry reduction: within each run of identical clause hashes,
    // drop constant-free clauses implied by an equivalence class (unless
    // exactly one constant-free clause remains), then sort the run's
    // retained features ascending.
    let mut out_hashes: Vec<Hash32> = Vec::with_capacity(n);
    let mut out_features: Vec<f64> = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && sorted_hashes[j] == sorted_hashes[i] {
            j += 1;
        }
        let run_len = j - i;
        let has_const_count = (i..j).filter(|&k| sorted_has_consts[k]).count();
        let mut run_features: Vec<f64> = Vec::new();
        for k in i..j {
            let keep = sorted_has_consts[k] || has_const_count + 1 == run_len;
            if keep {
                run_features.push(sorted_features[k]);
            }
        }
        run_features.sort_by(|a, b| a.partial_cmp(b).expect("selectivity features are finite"));
        out_hashes.extend(std::iter::repeat(sorted_hashes[i]).take(run_features.len()));
        out_features.extend(run_features);
        i = j;
    }

    let clauses_hash = hash_int_array(&out_hashes);

    let mut eclass_hashes: Vec<Hash32> =
        equivalence_classes.iter().map(EquivalenceClass::ec_hash).collect();
    eclass_hashes.sort_unstable();
    let eclasses_hash = hash_int_array(&eclass_hashes);

    let rel_hash = relations_hash(relation_signatures);

    let fss = hash_int_array(&[clauses_hash, eclasses_hash, rel_hash]);

    FeatureSubspace {
        fss,
        features: out_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq_clause(op: u32, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn constant_insensitive_fss_is_stable() {
        let c1 = eq_clause(1, Expr::Var(10), Expr::Constant);
        let c2 = eq_clause(1, Expr::Var(10), Expr::Constant);
        let clauses1 = vec![ClauseInput {
            expr: &c1,
            is_eq_clause: true,
            selectivity: 0.2,
        }];
        let clauses2 = vec![ClauseInput {
            expr: &c2,
            is_eq_clause: true,
            selectivity: 0.9,
        }];
        let rels = [RelationSignature::Permanent(42)];
        let fss1 = fss_for_object(&rels, &clauses1, &[], -30.0);
        let fss2 = fss_for_object(&rels, &clauses2, &[], -30.0);
        assert_eq!(fss1.fss, fss2.fss);
    }

    #[test]
    fn join_clause_symmetric_under_argument_swap() {
        // t.a = u.b and u.b = t.a must hash identically once both sides
        // are recognized as members of the same equivalence class.
        let left_hash = Expr::Var(1).node_hash();
        let right_hash = Expr::Var(2).node_hash();
        let classes = vec![EquivalenceClass::new(vec![left_hash, right_hash])];

        let c1 = eq_clause(5, Expr::Var(1), Expr::Var(2));
        let c2 = eq_clause(5, Expr::Var(2), Expr::Var(1));
        let map = build_eclass_map(&classes);
        assert_eq!(
            clause_hash(&c1, true, &map),
            clause_hash(&c2, true, &map)
        );
    }

    #[test]
    fn relation_order_does_not_affect_fss() {
        let c = eq_clause(1, Expr::Var(1), Expr::Constant);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: true,
            selectivity: 0.5,
        }];
        let a = [
            RelationSignature::Permanent(1),
            RelationSignature::Permanent(2),
        ];
        let b = [
            RelationSignature::Permanent(2),
            RelationSignature::Permanent(1),
        ];
        let fss_a = fss_for_object(&a, &clauses, &[], -30.0);
        let fss_b = fss_for_object(&b, &clauses, &[], -30.0);
        assert_eq!(fss_a.fss, fss_b.fss);
    }

    #[test]
    fn features_are_clamped_to_floor() {
        let c = eq_clause(1, Expr::Var(1), Expr::Constant);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: true,
            selectivity: 1e-100,
        }];
        let rels = [RelationSignature::Permanent(1)];
        let result = fss_for_object(&rels, &clauses, &[], -30.0);
        assert_eq!(result.features, vec![-30.0]);
    }

    #[test]
    fn grouping_hash_is_permutation_invariant_over_exprs() {
        let a = Expr::Var(1);
        let b = Expr::Var(2);
        let h1 = grouping_hash(7, &[a.clone(), b.clone()]);
        let h2 = grouping_hash(7, &[b, a]);
        assert_eq!(h1, h2);
    }
}
