//! The persistent user namespace: a single mapping from name to value
//! representing module-level globals, alive for the lifetime of the kernel
//! process. SQL cells never write into it; they only read from it for
//! template substitution.

use rustpython_vm::scope::Scope;
use rustpython_vm::{PyObjectRef, VirtualMachine};

pub struct Namespace {
    scope: Scope,
}

impl Namespace {
    pub fn new(vm: &VirtualMachine) -> Self {
        Self {
            scope: vm.new_scope_with_builtins(),
        }
    }

    /// Clone of the scope handle used to exec/eval cell code against these
    /// globals. Cheap: `Scope` wraps reference-counted dictionaries.
    pub fn scope(&self) -> Scope {
        self.scope.clone()
    }

    pub fn get(&self, vm: &VirtualMachine, name: &str) -> Option<PyObjectRef> {
        self.scope.globals.get_item(name, vm).ok()
    }

    /// Remove a name from the namespace, e.g. when the cell that produced
    /// it is deleted, so dependents genuinely see a `NameError` on their
    /// next run rather than a stale value.
    pub fn delete(&self, vm: &VirtualMachine, name: &str) {
        let _ = self.scope.globals.del_item(name, vm);
    }
}
