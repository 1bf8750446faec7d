//! Scope-aware extraction of module-level reads/writes from Python source.
//!
//! Writes are collected from a single pass over the module body that stops
//! at the boundary of any nested `def`/`async def`/`class`/lambda — those
//! introduce their own scope and their internals are not module bindings.
//!
//! Reads are collected from a full-tree walk that *does* descend into nested
//! scopes (a read inside a function body still counts, per the spec), but
//! each scope shadows the names it binds locally so that parameters, loop
//! variables of nested functions, and comprehension targets don't leak out
//! as module-level reads.

use std::collections::HashSet;

use rustpython_ast::{self as ast, Expr, ExprContext, Stmt};
use rustpython_parser::Parse;

use super::NameSet;

pub fn extract_python(source: &str) -> (NameSet, NameSet) {
    let body = match ast::Suite::parse(source, "<cell>") {
        Ok(body) => body,
        Err(_) => return (NameSet::new(), NameSet::new()),
    };

    let mut writes = HashSet::new();
    collect_block_bindings(&body, &mut writes);

    let mut reads = HashSet::new();
    let mut scopes: Vec<HashSet<String>> = Vec::new();
    for stmt in &body {
        collect_reads_stmt(stmt, &mut scopes, &mut reads);
    }

    let reads: NameSet = reads.difference(&writes).cloned().collect();
    let writes: NameSet = writes.into_iter().collect();
    (reads, writes)
}

/// Collect every name bound directly within `stmts`, recursing through
/// control-flow constructs (`if`/`for`/`while`/`with`/`try`) but *not* into
/// nested `def`/`async def`/`class`/lambda bodies, whose own bindings belong
/// to their own scope.
fn collect_block_bindings(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        collect_stmt_bindings(stmt, out);
    }
}

fn collect_stmt_bindings(stmt: &Stmt, out: &mut HashSet<String>) {
    match stmt {
        Stmt::Assign(s) => {
            for t in &s.targets {
                bind_target(t, out);
            }
        }
        Stmt::AugAssign(s) => {
            bind_target(&s.target, out);
        }
        Stmt::AnnAssign(s) => {
            if s.value.is_some() {
                bind_target(&s.target, out);
            }
        }
        Stmt::For(s) => {
            bind_target(&s.target, out);
            collect_block_bindings(&s.body, out);
            collect_block_bindings(&s.orelse, out);
        }
        Stmt::AsyncFor(s) => {
            bind_target(&s.target, out);
            collect_block_bindings(&s.body, out);
            collect_block_bindings(&s.orelse, out);
        }
        Stmt::While(s) => {
            collect_block_bindings(&s.body, out);
            collect_block_bindings(&s.orelse, out);
        }
        Stmt::If(s) => {
            collect_block_bindings(&s.body, out);
            collect_block_bindings(&s.orelse, out);
        }
        Stmt::With(s) => {
            for item in &s.items {
                if let Some(v) = &item.optional_vars {
                    bind_target(v, out);
                }
            }
            collect_block_bindings(&s.body, out);
        }
        Stmt::AsyncWith(s) => {
            for item in &s.items {
                if let Some(v) = &item.optional_vars {
                    bind_target(v, out);
                }
            }
            collect_block_bindings(&s.body, out);
        }
        Stmt::Try(s) => {
            collect_block_bindings(&s.body, out);
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(name) = &h.name {
                    out.insert(name.to_string());
                }
                collect_block_bindings(&h.body, out);
            }
            collect_block_bindings(&s.orelse, out);
            collect_block_bindings(&s.finalbody, out);
        }
        Stmt::TryStar(s) => {
            collect_block_bindings(&s.body, out);
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(name) = &h.name {
                    out.insert(name.to_string());
                }
                collect_block_bindings(&h.body, out);
            }
            collect_block_bindings(&s.orelse, out);
            collect_block_bindings(&s.finalbody, out);
        }
        Stmt::Import(s) => {
            for alias in &s.names {
                bind_import_alias(alias, out);
            }
        }
        Stmt::ImportFrom(s) => {
            for alias in &s.names {
                // `from m import *` is untrackable: contributes no write.
                if alias.name.as_str() == "*" {
                    continue;
                }
                bind_import_alias(alias, out);
            }
        }
        Stmt::FunctionDef(s) => {
            out.insert(s.name.to_string());
        }
        Stmt::AsyncFunctionDef(s) => {
            out.insert(s.name.to_string());
        }
        Stmt::ClassDef(s) => {
            out.insert(s.name.to_string());
        }
        Stmt::Global(_) | Stmt::Nonlocal(_) => {}
        _ => {}
    }
}

fn bind_import_alias(alias: &ast::Alias, out: &mut HashSet<String>) {
    if let Some(asname) = &alias.asname {
        out.insert(asname.to_string());
    } else {
        // `import a.b.c` binds the first dotted component, `a`.
        let first = alias.name.as_str().split('.').next().unwrap_or("");
        if !first.is_empty() {
            out.insert(first.to_string());
        }
    }
}

/// Record every name an assignment-like target binds (recursing through
/// tuple/list/starred destructuring); attribute and subscript targets don't
/// bind a new name, so they're skipped.
fn bind_target(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Name(n) => {
            out.insert(n.id.to_string());
        }
        Expr::Tuple(t) => {
            for e in &t.elts {
                bind_target(e, out);
            }
        }
        Expr::List(l) => {
            for e in &l.elts {
                bind_target(e, out);
            }
        }
        Expr::Starred(s) => bind_target(&s.value, out),
        _ => {}
    }
}

/// Record the names a comprehension/lambda/for-target binds, for use as a
/// scope's locally-bound set (same rules as `bind_target`).
fn bind_target_into(expr: &Expr, out: &mut HashSet<String>) {
    bind_target(expr, out)
}

fn is_shadowed(name: &str, scopes: &[HashSet<String>]) -> bool {
    scopes.iter().any(|s| s.contains(name))
}

fn collect_reads_stmt(stmt: &Stmt, scopes: &mut Vec<HashSet<String>>, reads: &mut HashSet<String>) {
    match stmt {
        Stmt::Assign(s) => {
            for t in &s.targets {
                collect_reads_in_target(t, scopes, reads);
            }
            collect_reads_expr(&s.value, scopes, reads);
        }
        Stmt::AugAssign(s) => {
            // `x op= v` reads the current value of x as well as writing it.
            collect_reads_expr(&s.target, scopes, reads);
            collect_reads_expr(&s.value, scopes, reads);
        }
        Stmt::AnnAssign(s) => {
            collect_reads_in_target(&s.target, scopes, reads);
            collect_reads_expr(&s.annotation, scopes, reads);
            if let Some(v) = &s.value {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Stmt::For(s) => {
            collect_reads_expr(&s.iter, scopes, reads);
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::AsyncFor(s) => {
            collect_reads_expr(&s.iter, scopes, reads);
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::While(s) => {
            collect_reads_expr(&s.test, scopes, reads);
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::If(s) => {
            collect_reads_expr(&s.test, scopes, reads);
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::With(s) => {
            for item in &s.items {
                collect_reads_expr(&item.context_expr, scopes, reads);
            }
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::AsyncWith(s) => {
            for item in &s.items {
                collect_reads_expr(&item.context_expr, scopes, reads);
            }
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::Try(s) => {
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(ty) = &h.type_ {
                    collect_reads_expr(ty, scopes, reads);
                }
                for b in &h.body {
                    collect_reads_stmt(b, scopes, reads);
                }
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.finalbody {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::TryStar(s) => {
            for b in &s.body {
                collect_reads_stmt(b, scopes, reads);
            }
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(ty) = &h.type_ {
                    collect_reads_expr(ty, scopes, reads);
                }
                for b in &h.body {
                    collect_reads_stmt(b, scopes, reads);
                }
            }
            for b in &s.orelse {
                collect_reads_stmt(b, scopes, reads);
            }
            for b in &s.finalbody {
                collect_reads_stmt(b, scopes, reads);
            }
        }
        Stmt::Return(s) => {
            if let Some(v) = &s.value {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Stmt::Expr(s) => collect_reads_expr(&s.value, scopes, reads),
        Stmt::Assert(s) => {
            collect_reads_expr(&s.test, scopes, reads);
            if let Some(m) = &s.msg {
                collect_reads_expr(m, scopes, reads);
            }
        }
        Stmt::Raise(s) => {
            if let Some(e) = &s.exc {
                collect_reads_expr(e, scopes, reads);
            }
            if let Some(c) = &s.cause {
                collect_reads_expr(c, scopes, reads);
            }
        }
        Stmt::Delete(s) => {
            for t in &s.targets {
                collect_reads_in_target(t, scopes, reads);
            }
        }
        Stmt::FunctionDef(s) => {
            collect_decorators_and_defaults(&s.decorator_list, &s.args, scopes, reads);
            let params = param_names(&s.args);
            push_function_scope(params, &s.body, scopes, reads);
        }
        Stmt::AsyncFunctionDef(s) => {
            collect_decorators_and_defaults(&s.decorator_list, &s.args, scopes, reads);
            let params = param_names(&s.args);
            push_function_scope(params, &s.body, scopes, reads);
        }
        Stmt::ClassDef(s) => {
            for d in &s.decorator_list {
                collect_reads_expr(d, scopes, reads);
            }
            for b in &s.bases {
                collect_reads_expr(b, scopes, reads);
            }
            for kw in &s.keywords {
                collect_reads_expr(&kw.value, scopes, reads);
            }
            push_function_scope(Vec::new(), &s.body, scopes, reads);
        }
        Stmt::Import(_) | Stmt::ImportFrom(_) => {}
        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        _ => {}
    }
}

fn collect_decorators_and_defaults(
    decorators: &[Expr],
    args: &ast::Arguments,
    scopes: &mut Vec<HashSet<String>>,
    reads: &mut HashSet<String>,
) {
    for d in decorators {
        collect_reads_expr(d, scopes, reads);
    }
    for a in args.posonlyargs.iter().chain(args.args.iter()) {
        if let Some(default) = &a.default {
            collect_reads_expr(default, scopes, reads);
        }
    }
    for a in &args.kwonlyargs {
        if let Some(default) = &a.default {
            collect_reads_expr(default, scopes, reads);
        }
    }
}

fn param_names(args: &ast::Arguments) -> Vec<String> {
    let mut names = Vec::new();
    for a in &args.posonlyargs {
        names.push(a.def.arg.to_string());
    }
    for a in &args.args {
        names.push(a.def.arg.to_string());
    }
    if let Some(v) = &args.vararg {
        names.push(v.arg.to_string());
    }
    for a in &args.kwonlyargs {
        names.push(a.def.arg.to_string());
    }
    if let Some(k) = &args.kwarg {
        names.push(k.arg.to_string());
    }
    names
}

/// Push a new scope for a `def`/`class` body, compute what it binds locally
/// (without descending into further-nested defs/classes), walk it for reads,
/// then pop.
fn push_function_scope(
    params: Vec<String>,
    body: &[Stmt],
    scopes: &mut Vec<HashSet<String>>,
    reads: &mut HashSet<String>,
) {
    let mut local: HashSet<String> = params.into_iter().collect();
    collect_block_bindings(body, &mut local);
    scopes.push(local);
    for stmt in body {
        collect_reads_stmt(stmt, scopes, reads);
    }
    scopes.pop();
}

fn collect_reads_in_target(expr: &Expr, scopes: &mut Vec<HashSet<String>>, reads: &mut HashSet<String>) {
    match expr {
        Expr::Name(_) => {}
        Expr::Attribute(a) => collect_reads_expr(&a.value, scopes, reads),
        Expr::Subscript(s) => {
            collect_reads_expr(&s.value, scopes, reads);
            collect_reads_expr(&s.slice, scopes, reads);
        }
        Expr::Tuple(t) => {
            for e in &t.elts {
                collect_reads_in_target(e, scopes, reads);
            }
        }
        Expr::List(l) => {
            for e in &l.elts {
                collect_reads_in_target(e, scopes, reads);
            }
        }
        Expr::Starred(s) => collect_reads_in_target(&s.value, scopes, reads),
        _ => {}
    }
}

fn collect_reads_expr(expr: &Expr, scopes: &mut Vec<HashSet<String>>, reads: &mut HashSet<String>) {
    match expr {
        Expr::Name(n) => {
            if n.ctx == ExprContext::Load && !is_shadowed(n.id.as_str(), scopes) {
                reads.insert(n.id.to_string());
            }
        }
        Expr::BoolOp(e) => {
            for v in &e.values {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Expr::NamedExpr(e) => {
            collect_reads_expr(&e.value, scopes, reads);
            if let Some(top) = scopes.last_mut() {
                bind_target_into(&e.target, top);
            }
        }
        Expr::BinOp(e) => {
            collect_reads_expr(&e.left, scopes, reads);
            collect_reads_expr(&e.right, scopes, reads);
        }
        Expr::UnaryOp(e) => collect_reads_expr(&e.operand, scopes, reads),
        Expr::Lambda(e) => {
            let params = param_names(&e.args);
            let mut local: HashSet<String> = params.into_iter().collect();
            scopes.push(std::mem::take(&mut local));
            collect_reads_expr(&e.body, scopes, reads);
            scopes.pop();
        }
        Expr::IfExp(e) => {
            collect_reads_expr(&e.test, scopes, reads);
            collect_reads_expr(&e.body, scopes, reads);
            collect_reads_expr(&e.orelse, scopes, reads);
        }
        Expr::Dict(e) => {
            for k in e.keys.iter().flatten() {
                collect_reads_expr(k, scopes, reads);
            }
            for v in &e.values {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Expr::Set(e) => {
            for el in &e.elts {
                collect_reads_expr(el, scopes, reads);
            }
        }
        Expr::ListComp(e) => {
            collect_comprehension(&e.generators, &[&e.elt], scopes, reads);
        }
        Expr::SetComp(e) => {
            collect_comprehension(&e.generators, &[&e.elt], scopes, reads);
        }
        Expr::GeneratorExp(e) => {
            collect_comprehension(&e.generators, &[&e.elt], scopes, reads);
        }
        Expr::DictComp(e) => {
            collect_comprehension(&e.generators, &[&e.key, &e.value], scopes, reads);
        }
        Expr::Await(e) => collect_reads_expr(&e.value, scopes, reads),
        Expr::Yield(e) => {
            if let Some(v) = &e.value {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Expr::YieldFrom(e) => collect_reads_expr(&e.value, scopes, reads),
        Expr::Compare(e) => {
            collect_reads_expr(&e.left, scopes, reads);
            for c in &e.comparators {
                collect_reads_expr(c, scopes, reads);
            }
        }
        Expr::Call(e) => {
            collect_reads_expr(&e.func, scopes, reads);
            for a in &e.args {
                collect_reads_expr(a, scopes, reads);
            }
            for kw in &e.keywords {
                collect_reads_expr(&kw.value, scopes, reads);
            }
        }
        Expr::FormattedValue(e) => collect_reads_expr(&e.value, scopes, reads),
        Expr::JoinedStr(e) => {
            for v in &e.values {
                collect_reads_expr(v, scopes, reads);
            }
        }
        Expr::Constant(_) => {}
        Expr::Attribute(e) => collect_reads_expr(&e.value, scopes, reads),
        Expr::Subscript(e) => {
            collect_reads_expr(&e.value, scopes, reads);
            collect_reads_expr(&e.slice, scopes, reads);
        }
        Expr::Starred(e) => collect_reads_expr(&e.value, scopes, reads),
        Expr::List(e) => {
            for el in &e.elts {
                collect_reads_expr(el, scopes, reads);
            }
        }
        Expr::Tuple(e) => {
            for el in &e.elts {
                collect_reads_expr(el, scopes, reads);
            }
        }
        Expr::Slice(e) => {
            if let Some(l) = &e.lower {
                collect_reads_expr(l, scopes, reads);
            }
            if let Some(u) = &e.upper {
                collect_reads_expr(u, scopes, reads);
            }
            if let Some(s) = &e.step {
                collect_reads_expr(s, scopes, reads);
            }
        }
        _ => {}
    }
}

/// Comprehensions get their own scope: the outermost `for`'s iterable is
/// evaluated in the *enclosing* scope, everything else (targets, further
/// iterables, `if` guards, the element expression(s)) in the comprehension's
/// own scope.
fn collect_comprehension(
    generators: &[ast::Comprehension],
    extra_exprs: &[&Expr],
    scopes: &mut Vec<HashSet<String>>,
    reads: &mut HashSet<String>,
) {
    if let Some(first) = generators.first() {
        collect_reads_expr(&first.iter, scopes, reads);
    }
    let mut local = HashSet::new();
    for gen in generators {
        bind_target_into(&gen.target, &mut local);
    }
    scopes.push(local);
    for (i, gen) in generators.iter().enumerate() {
        if i > 0 {
            collect_reads_expr(&gen.iter, scopes, reads);
        }
        for cond in &gen.ifs {
            collect_reads_expr(cond, scopes, reads);
        }
    }
    for e in extra_exprs {
        collect_reads_expr(e, scopes, reads);
    }
    scopes.pop();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rw(source: &str) -> (Vec<String>, Vec<String>) {
        let (r, w) = extract_python(source);
        (r.into_iter().collect(), w.into_iter().collect())
    }

    #[test]
    fn simple_assignment() {
        let (reads, writes) = rw("x = 10");
        assert!(reads.is_empty());
        assert_eq!(writes, vec!["x"]);
    }

    #[test]
    fn reads_and_writes() {
        let (reads, writes) = rw("y = x * 2");
        assert_eq!(reads, vec!["x"]);
        assert_eq!(writes, vec!["y"]);
    }

    #[test]
    fn self_sufficient_name_not_in_reads() {
        let (reads, writes) = rw("x = x + 1");
        assert!(reads.is_empty());
        assert_eq!(writes, vec!["x"]);
    }

    #[test]
    fn augmented_assignment_reads_and_writes() {
        let (reads, writes) = rw("total += 1");
        assert!(reads.is_empty(), "self-write excluded from reads");
        assert_eq!(writes, vec!["total"]);
    }

    #[test]
    fn augmented_assignment_distinct_names() {
        let (reads, writes) = rw("total += delta");
        assert_eq!(reads, vec!["delta"]);
        assert_eq!(writes, vec!["total"]);
    }

    #[test]
    fn for_loop_target_is_written() {
        let (reads, writes) = rw("for i in items:\n    total = total + i");
        assert_eq!(reads, vec!["items"]);
        assert_eq!(writes, vec!["i", "total"]);
    }

    #[test]
    fn function_params_do_not_leak() {
        let (reads, writes) = rw("def f(a, b):\n    return a + b + c\n");
        assert_eq!(reads, vec!["c"]);
        assert_eq!(writes, vec!["f"]);
    }

    #[test]
    fn function_local_assignment_does_not_leak() {
        let (reads, _writes) = rw("def f():\n    local = 1\n    return local\n\nz = local\n");
        // `local` inside f is function-scoped; the module-level read of
        // `local` in `z = local` still counts.
        assert!(reads.contains("local"));
    }

    #[test]
    fn import_binds_alias() {
        let (reads, writes) = rw("import numpy as np");
        assert!(reads.is_empty());
        assert_eq!(writes, vec!["np"]);
    }

    #[test]
    fn from_import_binds_name() {
        let (_, writes) = rw("from collections import OrderedDict as OD");
        assert_eq!(writes, vec!["OD"]);
    }

    #[test]
    fn wildcard_import_does_not_error_and_writes_nothing() {
        let (reads, writes) = rw("from os import *");
        assert!(reads.is_empty());
        assert!(writes.is_empty());
    }

    #[test]
    fn with_statement_binds_as_target() {
        let (_, writes) = rw("with open('f') as fh:\n    pass\n");
        assert_eq!(writes, vec!["fh"]);
    }

    #[test]
    fn comprehension_target_does_not_leak() {
        let (reads, writes) = rw("result = [x * 2 for x in values]");
        assert_eq!(reads, vec!["values"]);
        assert_eq!(writes, vec!["result"]);
    }

    #[test]
    fn malformed_source_yields_empty_sets() {
        let (reads, writes) = rw("def f(:\n");
        assert!(reads.is_empty());
        assert!(writes.is_empty());
    }

    #[test]
    fn class_def_binds_name_only() {
        let (reads, writes) = rw("class Foo:\n    def method(self):\n        return bar\n");
        assert_eq!(reads, vec!["bar"]);
        assert_eq!(writes, vec!["Foo"]);
    }
}
