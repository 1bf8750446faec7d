//! Python cell execution: split statements from a trailing expression,
//! redirect stdout/stderr to per-cell buffers for the duration of the run,
//! and execute against the shared namespace.

use rustpython_ast::{self as ast, Ranged};
use rustpython_parser::Parse;
use rustpython_vm::compiler::Mode;
use rustpython_vm::scope::Scope;
use rustpython_vm::{PyObjectRef, PyResult, VirtualMachine};

/// The result of running one Python cell: captured stdout/stderr (always
/// present, even on failure — statements before the raising one may have
/// already printed something) plus either the trailing expression's value
/// (`None` if there wasn't one, or if it evaluated to `None`) or a formatted
/// traceback.
pub struct PythonOutcome {
    pub stdout: String,
    pub stderr: String,
    pub result: Result<Option<PyObjectRef>, String>,
}

pub fn run_python(vm: &VirtualMachine, scope: &Scope, source: &str) -> PythonOutcome {
    let (stmts_src, trailing_src) = split_trailing_expression(source);

    let redirect = match StdRedirect::install(vm) {
        Ok(r) => r,
        Err(exc) => {
            return PythonOutcome {
                stdout: String::new(),
                stderr: String::new(),
                result: Err(exception_text(vm, &exc)),
            };
        }
    };

    let result = run_statements_then_expr(vm, scope, &stmts_src, trailing_src.as_deref());
    let (stdout, stderr) = redirect.take(vm);
    drop(redirect);

    let result = result.map_err(|exc| exception_text(vm, &exc));
    PythonOutcome {
        stdout,
        stderr,
        result,
    }
}

fn run_statements_then_expr(
    vm: &VirtualMachine,
    scope: &Scope,
    stmts_src: &str,
    trailing_src: Option<&str>,
) -> PyResult<Option<PyObjectRef>> {
    if !stmts_src.trim().is_empty() {
        let code = vm
            .compile(stmts_src, Mode::Exec, "<cell>".to_owned())
            .map_err(|err| vm.new_syntax_error(&err, Some(stmts_src)))?;
        vm.run_code_obj(code, scope.clone())?;
    }

    match trailing_src {
        Some(expr_src) => {
            let code = vm
                .compile(expr_src, Mode::Eval, "<cell>".to_owned())
                .map_err(|err| vm.new_syntax_error(&err, Some(expr_src)))?;
            Ok(Some(vm.run_code_obj(code, scope.clone())?))
        }
        None => Ok(None),
    }
}

/// If the last top-level statement is a bare expression, split the source
/// at its start offset so it can be compiled separately in `Mode::Eval`
/// (§4.3.4 step 1). Malformed source is passed through unsplit; the
/// subsequent `vm.compile` call will surface the same syntax error the
/// extractor silently swallowed.
fn split_trailing_expression(source: &str) -> (String, Option<String>) {
    let body = match ast::Suite::parse(source, "<cell>") {
        Ok(body) => body,
        Err(_) => return (source.to_string(), None),
    };

    match body.split_last() {
        Some((last, _rest)) if matches!(last, ast::Stmt::Expr(_)) => {
            let start = u32::from(last.range().start()) as usize;
            (source[..start].to_string(), Some(source[start..].to_string()))
        }
        _ => (source.to_string(), None),
    }
}

fn exception_text(vm: &VirtualMachine, exc: &rustpython_vm::builtins::PyBaseExceptionRef) -> String {
    let mut buf: Vec<u8> = Vec::new();
    if rustpython_vm::exceptions::write_exception(&mut buf, vm, exc).is_err() {
        return "<error formatting traceback>".to_string();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Scoped redirection of `sys.stdout`/`sys.stderr` to in-memory buffers,
/// guaranteed to restore the previous streams on every exit path —
/// including when the cell raises or this is dropped during an unwind.
struct StdRedirect<'vm> {
    vm: &'vm VirtualMachine,
    sys_module: PyObjectRef,
    old_stdout: PyObjectRef,
    old_stderr: PyObjectRef,
    new_stdout: PyObjectRef,
    new_stderr: PyObjectRef,
}

impl<'vm> StdRedirect<'vm> {
    fn install(vm: &'vm VirtualMachine) -> PyResult<Self> {
        let sys_module = vm.import("sys", 0)?;
        let io_module = vm.import("io", 0)?;
        let new_stdout = vm.call_method(&io_module, "StringIO", ())?;
        let new_stderr = vm.call_method(&io_module, "StringIO", ())?;
        let old_stdout = sys_module.get_attr("stdout", vm)?;
        let old_stderr = sys_module.get_attr("stderr", vm)?;

        sys_module.set_attr("stdout", new_stdout.clone(), vm)?;
        sys_module.set_attr("stderr", new_stderr.clone(), vm)?;

        Ok(Self {
            vm,
            sys_module,
            old_stdout,
            old_stderr,
            new_stdout,
            new_stderr,
        })
    }

    /// Read back whatever was captured. The previous streams are restored
    /// by `Drop` regardless of when (or whether) this is called.
    fn take(&self, vm: &VirtualMachine) -> (String, String) {
        let stdout = read_string_io(vm, &self.new_stdout).unwrap_or_default();
        let stderr = read_string_io(vm, &self.new_stderr).unwrap_or_default();
        (stdout, stderr)
    }
}

impl Drop for StdRedirect<'_> {
    fn drop(&mut self) {
        let _ = self.sys_module.set_attr("stdout", self.old_stdout.clone(), self.vm);
        let _ = self.sys_module.set_attr("stderr", self.old_stderr.clone(), self.vm);
    }
}

fn read_string_io(vm: &VirtualMachine, buf: &PyObjectRef) -> Option<String> {
    let value = vm.call_method(buf, "getvalue", ()).ok()?;
    value.str(vm).ok().map(|s| s.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_expression() {
        let (stmts, expr) = split_trailing_expression("x = 1\nx + 1");
        assert_eq!(stmts, "x = 1\n");
        assert_eq!(expr.as_deref(), Some("x + 1"));
    }

    #[test]
    fn no_trailing_expression_for_statement_only_source() {
        let (stmts, expr) = split_trailing_expression("x = 1\ny = 2");
        assert_eq!(stmts, "x = 1\ny = 2");
        assert!(expr.is_none());
    }

    #[test]
    fn empty_source_has_no_statements_or_expression() {
        let (stmts, expr) = split_trailing_expression("");
        assert_eq!(stmts, "");
        assert!(expr.is_none());
    }

    #[test]
    fn malformed_source_is_passed_through_unsplit() {
        let (stmts, expr) = split_trailing_expression("def f(:\n");
        assert_eq!(stmts, "def f(:\n");
        assert!(expr.is_none());
    }
}
