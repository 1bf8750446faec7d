//! Rich-object-to-MIME-bundle conversion (§4.3.4). Duck-typed and ordered:
//! the first matching kind wins. Because plotly figures and altair charts
//! both commonly expose a JSON-ish export method, and altair charts and
//! pandas frames both commonly expose `to_dict`, attribute presence alone
//! is ambiguous — each branch below also checks `type(obj).__module__` so
//! a plotly `Figure` is never mistaken for an altair `Chart` or vice versa.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustpython_vm::{PyObjectRef, VirtualMachine};
use serde_json::json;

use super::pyconv::{has_attr, has_callable_attr, json_dumps, module_name};

pub struct MimeBundle {
    pub mime_type: &'static str,
    pub data: String,
}

impl MimeBundle {
    fn new(mime_type: &'static str, data: String) -> Self {
        Self { mime_type, data }
    }
}

/// Convert a namespace value into a MIME bundle, trying each known kind in
/// priority order before falling back to `str(value)`. Never fails: a
/// library's branch that can't produce output (missing method, conversion
/// error) is simply skipped rather than surfaced as a cell error, per
/// "missing optional visualization library" in the failure-mode table.
pub fn to_mime_bundle(vm: &VirtualMachine, obj: &PyObjectRef) -> MimeBundle {
    if let Some(bundle) = try_matplotlib(vm, obj) {
        return bundle;
    }
    if let Some(bundle) = try_plotly(vm, obj) {
        return bundle;
    }
    if let Some(bundle) = try_altair(vm, obj) {
        return bundle;
    }
    if let Some(bundle) = try_pandas(vm, obj) {
        return bundle;
    }
    fallback_text(vm, obj)
}

/// A matplotlib `Figure` (or an `Axes`, via its `.figure`): has `savefig`
/// and lives under the `matplotlib` package. Rendered to PNG through an
/// in-memory buffer, then the figure is closed so repeated cell runs don't
/// accumulate open figures.
fn try_matplotlib(vm: &VirtualMachine, obj: &PyObjectRef) -> Option<MimeBundle> {
    if !module_name(vm, obj).starts_with("matplotlib") {
        return None;
    }
    if !has_callable_attr(vm, obj, "savefig") {
        return None;
    }

    let io_module = vm.import("io", 0).ok()?;
    let buf = vm.call_method(&io_module, "BytesIO", ()).ok()?;

    // `format` is keyword-only on `Figure.savefig`; going through a scratch
    // scope and a real `exec` sidesteps needing to hand-build a kwargs call.
    let scope = vm.new_scope_with_builtins();
    scope.globals.set_item("__reactor_fig", obj.clone(), vm).ok()?;
    scope.globals.set_item("__reactor_buf", buf.clone(), vm).ok()?;
    let code = vm
        .compile(
            "__reactor_fig.savefig(__reactor_buf, format='png')",
            rustpython_vm::compiler::Mode::Exec,
            "<savefig>".to_owned(),
        )
        .ok()?;
    vm.run_code_obj(code, scope).ok()?;

    let raw = vm.call_method(&buf, "getvalue", ()).ok()?;
    let bytes = raw.payload::<rustpython_vm::builtins::PyBytes>()?;

    if let Ok(pyplot) = vm.import("matplotlib.pyplot", 0) {
        let _ = vm.call_method(&pyplot, "close", (obj.clone(),));
    }

    Some(MimeBundle::new(
        "image/png",
        BASE64.encode(bytes.as_bytes()),
    ))
}

/// A plotly `Figure`: exposes `to_json` and lives under `plotly`. Checked
/// before altair since both can expose JSON-ish export methods.
fn try_plotly(vm: &VirtualMachine, obj: &PyObjectRef) -> Option<MimeBundle> {
    if !module_name(vm, obj).starts_with("plotly") {
        return None;
    }
    if !has_callable_attr(vm, obj, "to_json") {
        return None;
    }
    let json = vm.call_method(obj, "to_json", ()).ok()?;
    let text = json.str(vm).ok()?.as_str().to_string();
    Some(MimeBundle::new("application/vnd.plotly.v1+json", text))
}

/// An altair `Chart`: exposes `to_dict` and lives under `altair`. Checked
/// before pandas since both can expose `to_dict`.
fn try_altair(vm: &VirtualMachine, obj: &PyObjectRef) -> Option<MimeBundle> {
    if !module_name(vm, obj).starts_with("altair") {
        return None;
    }
    if !has_callable_attr(vm, obj, "to_dict") {
        return None;
    }
    let dict = vm.call_method(obj, "to_dict", ()).ok()?;
    let text = json_dumps(vm, &dict)?;
    Some(MimeBundle::new("application/vnd.vegalite.v6+json", text))
}

/// A pandas `DataFrame`: exposes `columns` and `values` and lives under
/// `pandas`. Converted to the same `{type:"table", columns, rows}` envelope
/// SQL results use, rather than pandas' own `to_json` orientation, so
/// clients render both the same way.
fn try_pandas(vm: &VirtualMachine, obj: &PyObjectRef) -> Option<MimeBundle> {
    if !module_name(vm, obj).starts_with("pandas") {
        return None;
    }
    if !has_attr(vm, obj, "columns") || !has_attr(vm, obj, "values") {
        return None;
    }

    let columns_obj = obj.get_attr("columns", vm).ok()?;
    let columns_list = vm.call_method(&columns_obj, "tolist", ()).ok()?;
    let columns = super::pyconv::to_json(vm, &columns_list)?;

    let values_obj = obj.get_attr("values", vm).ok()?;
    let rows_list = vm.call_method(&values_obj, "tolist", ()).ok()?;
    let rows = super::pyconv::to_json(vm, &rows_list)?;

    let envelope = json!({ "type": "table", "columns": columns, "rows": rows });
    Some(MimeBundle::new(
        "application/json",
        serde_json::to_string(&envelope).ok()?,
    ))
}

fn fallback_text(vm: &VirtualMachine, obj: &PyObjectRef) -> MimeBundle {
    let text = obj
        .str(vm)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| "<unprintable value>".to_string());
    MimeBundle::new("text/plain", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::interpreter;

    #[test]
    fn plain_string_falls_back_to_text_plain() {
        interpreter().enter(|vm| {
            let obj = vm.ctx.new_str("hello").into();
            let bundle = to_mime_bundle(vm, &obj);
            assert_eq!(bundle.mime_type, "text/plain");
            assert_eq!(bundle.data, "hello");
        });
    }

    #[test]
    fn plain_int_falls_back_to_text_plain() {
        interpreter().enter(|vm| {
            let obj = vm.ctx.new_int(42).into();
            let bundle = to_mime_bundle(vm, &obj);
            assert_eq!(bundle.mime_type, "text/plain");
            assert_eq!(bundle.data, "42");
        });
    }

    /// Builds a bare object shaped like a matplotlib `Figure` (right
    /// `__module__`, a `savefig(buf, format=...)` that writes real PNG
    /// bytes) without depending on matplotlib actually being importable,
    /// and exercises the `image/png` branch of `to_mime_bundle` end to end.
    #[test]
    fn matplotlib_like_figure_becomes_image_png() {
        interpreter().enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            let code = vm
                .compile(
                    "class Figure:\n    __module__ = 'matplotlib.figure'\n    def savefig(self, buf, format=None):\n        buf.write(b'\\x89PNG\\r\\n\\x1a\\n')\n__reactor_obj = Figure()\n",
                    rustpython_vm::compiler::Mode::Exec,
                    "<test>".to_owned(),
                )
                .unwrap();
            vm.run_code_obj(code, scope.clone()).unwrap();
            let obj = scope.globals.get_item("__reactor_obj", vm).unwrap();

            let bundle = to_mime_bundle(vm, &obj);
            assert_eq!(bundle.mime_type, "image/png");
            let decoded = BASE64.decode(&bundle.data).unwrap();
            assert_eq!(decoded, b"\x89PNG\r\n\x1a\n");
        });
    }
}
