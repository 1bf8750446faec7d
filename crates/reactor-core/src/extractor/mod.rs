//! Static dependency extraction: derive `(reads, writes)` name sets from a
//! cell's source without executing it.
//!
//! Python sources are parsed to an AST and walked scope-aware; SQL sources
//! are scanned for `{identifier}` placeholders. Neither half ever raises —
//! a malformed fragment degrades to an empty `(reads, writes)` pair so the
//! graph sees it as a trivially independent node.

mod python;
mod sql;

use std::collections::BTreeSet;

use crate::cell::CellKind;

/// Re-exported so the SQL executor can re-scan placeholders in source
/// order for positional parameter binding; [`extract`] only exposes the
/// deduplicated, sorted name set needed for graph edges.
pub(crate) use sql::placeholder_re;

/// A name set, kept sorted for deterministic notifications and tests.
pub type NameSet = BTreeSet<String>;

/// Extract `(reads, writes)` from `source` according to `kind`.
///
/// Never fails: a parse error yields `(∅, ∅)`.
pub fn extract(source: &str, kind: CellKind) -> (NameSet, NameSet) {
    match kind {
        CellKind::Python => python::extract_python(source),
        CellKind::Sql => (sql::extract_placeholders(source), NameSet::new()),
    }
}
