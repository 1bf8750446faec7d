//! The stale-tracking execution runtime (§4.3): owns the dependency graph,
//! the cell registry, the `has_run` set, the user namespace, and the SQL
//! backend. A thin process entry point drives [`Kernel::run_loop`] over a
//! pair of stdio pipes; everything else in this module is pure enough to
//! exercise directly in tests without any IPC framing at all.

mod executor;
mod mime;
mod namespace;
mod pyconv;
mod sql;

use std::collections::HashSet;
use std::io::{Read, Write};

use rustc_hash::FxHashMap;
use rustpython_vm::VirtualMachine;

use crate::cell::{CellId, CellKind};
use crate::error::{Error, Result};
use crate::extractor::{self, NameSet};
use crate::graph::DependencyGraph;
use crate::ipc::{Notification, Output, Status, read_message, write_message};

use namespace::Namespace;
use sql::SqlEngine;

/// Build an [`rustpython_vm::Interpreter`] with the native stdlib modules
/// (`io`, `json`, `sys`, ...) registered, the way the kernel process and
/// its tests both need `io.StringIO`/`io.BytesIO` and `json.dumps` to be
/// real importable modules rather than just the interpreter core.
pub fn interpreter() -> rustpython_vm::Interpreter {
    rustpython_vm::Interpreter::with_init(Default::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
    })
}

pub struct Kernel<'vm> {
    vm: &'vm VirtualMachine,
    graph: DependencyGraph,
    sources: FxHashMap<CellId, String>,
    kinds: FxHashMap<CellId, CellKind>,
    has_run: HashSet<CellId>,
    namespace: Namespace,
    sql: SqlEngine,
}

impl<'vm> Kernel<'vm> {
    pub fn new(vm: &'vm VirtualMachine) -> Self {
        Self {
            vm,
            graph: DependencyGraph::new(),
            sources: FxHashMap::default(),
            kinds: FxHashMap::default(),
            has_run: HashSet::new(),
            namespace: Namespace::new(vm),
            sql: SqlEngine::new(),
        }
    }

    /// Dispatch one request, streaming every notification it produces to
    /// `emit` as it's produced rather than buffering them.
    pub fn handle(&mut self, request: crate::ipc::KernelRequest, emit: &mut impl FnMut(Notification)) {
        use crate::ipc::KernelRequest;
        match request {
            KernelRequest::RegisterCell { id, code, kind } => self.register_cell(id, code, kind, emit),
            KernelRequest::CreateCell { id, kind } => self.register_cell(id, String::new(), kind, emit),
            KernelRequest::DeleteCell { id } => self.delete_cell(id, emit),
            KernelRequest::Execute { id } => self.execute(id, emit),
            KernelRequest::SetDbConfig { connection_string } => self.set_db_config(connection_string, emit),
            KernelRequest::Shutdown => {}
        }
    }

    /// Blocking request/notification loop for the kernel process: read one
    /// framed [`KernelRequest`] at a time from `reader`, dispatch it, and
    /// write every resulting [`Notification`] to `writer` as it's produced.
    /// Returns once `Shutdown` is received or the pipe closes.
    pub fn run_loop<R: Read, W: Write>(&mut self, mut reader: R, mut writer: W) -> Result<()> {
        tracing::info!("kernel request loop starting");
        loop {
            let request = match read_message(&mut reader) {
                Ok(request) => request,
                Err(Error::Io(_)) => break,
                Err(err) => return Err(err),
            };
            let is_shutdown = matches!(request, crate::ipc::KernelRequest::Shutdown);
            self.handle(request, &mut |note| {
                let _ = write_message(&mut writer, &note);
            });
            if is_shutdown {
                break;
            }
        }
        tracing::info!("kernel request loop exiting");
        Ok(())
    }

    fn register_cell(
        &mut self,
        id: CellId,
        code: String,
        kind: CellKind,
        emit: &mut impl FnMut(Notification),
    ) {
        let (reads, writes) = extractor::extract(&code, kind);
        match self.graph.update_cell(&id, reads.clone(), writes.clone()) {
            Ok(()) => {
                for descendant in self.graph.descendants(&id) {
                    self.has_run.remove(&descendant);
                }
                self.has_run.remove(&id);
                self.sources.insert(id.clone(), code);
                self.kinds.insert(id.clone(), kind);

                emit(Notification::new(id.clone(), Output::metadata(&reads, &writes)));
                emit(Notification::new(id, Output::status(Status::Idle)));
            }
            Err(Error::CycleDetected(u, v)) => {
                tracing::warn!("cycle rejected registering {id}: {u} -> {v} would close a cycle");
                emit(Notification::new(
                    id.clone(),
                    Output::error("CycleDetected", format!("adding {u} -> {v} would close a cycle")),
                ));
                emit(Notification::terminal(id, Output::status(Status::Blocked)));
            }
            Err(_) => unreachable!("update_cell only ever fails with CycleDetected"),
        }
    }

    fn delete_cell(&mut self, id: CellId, emit: &mut impl FnMut(Notification)) {
        let affected = self.graph.descendants(&id);
        let owned_names: Vec<String> = self
            .graph
            .writes_of(&id)
            .map(|writes| {
                writes
                    .iter()
                    .filter(|name| self.graph.writer_of(name) == Some(&id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.graph.remove_cell(&id);
        self.sources.remove(&id);
        self.kinds.remove(&id);
        self.has_run.remove(&id);
        for name in &owned_names {
            self.namespace.delete(self.vm, name);
        }

        emit(Notification::new(id, Output::status(Status::Success)));

        for descendant in self.graph.topological_subset(&affected) {
            self.has_run.remove(&descendant);
            self.run_cell(&descendant, emit);
        }
    }

    fn execute(&mut self, id: CellId, emit: &mut impl FnMut(Notification)) {
        if !self.graph.contains(&id) {
            tracing::warn!("execute requested for unregistered cell {id}");
            emit(Notification::terminal(
                id.clone(),
                Output::error("CellNotRegistered", format!("cell not registered: {id}")),
            ));
            return;
        }

        let stale_ancestors: HashSet<CellId> = self
            .graph
            .ancestors(&id)
            .into_iter()
            .filter(|a| !self.has_run.contains(a))
            .collect();
        let mut subset = stale_ancestors;
        subset.insert(id.clone());
        subset.extend(self.graph.descendants(&id));

        for cell_id in self.graph.topological_subset(&subset) {
            self.run_cell(&cell_id, emit);
        }
    }

    fn set_db_config(&mut self, connection_string: String, emit: &mut impl FnMut(Notification)) {
        match self.sql.configure(&connection_string) {
            Ok(()) => emit(Notification::terminal(
                CellId::system(),
                Output::status(Status::DbConfigured),
            )),
            Err(err) => emit(Notification::terminal(
                CellId::system(),
                Output::error("SqlError", err.to_string()),
            )),
        }
    }

    /// Run a single already-registered cell and stream `running ->
    /// (stdout|stderr|output)* -> success|error (-> error)? -> metadata`
    /// (§4.3.2). Unknown cell ids (only reachable if the registry and graph
    /// have drifted) surface as a `CellNotRegistered` error rather than a
    /// panic.
    fn run_cell(&mut self, id: &CellId, emit: &mut impl FnMut(Notification)) {
        emit(Notification::new(id.clone(), Output::status(Status::Running)));

        let kind = self.kinds.get(id).copied();
        let source = self.sources.get(id).cloned();

        let success = match (kind, source) {
            (Some(kind), Some(source)) => match kind {
                CellKind::Python => self.run_python_cell(id, &source, emit),
                CellKind::Sql => self.run_sql_cell(id, &source, emit),
            },
            _ => {
                emit(Notification::new(
                    id.clone(),
                    Output::error("CellNotRegistered", format!("cell not registered: {id}")),
                ));
                false
            }
        };

        emit(Notification::new(
            id.clone(),
            Output::status(if success { Status::Success } else { Status::Error }),
        ));
        if success {
            self.has_run.insert(id.clone());
        } else {
            tracing::debug!("cell {id} failed; has_run left unset for retry on next cascade");
        }

        let empty = NameSet::new();
        let reads = self.graph.reads_of(id).unwrap_or(&empty);
        let writes = self.graph.writes_of(id).unwrap_or(&empty);
        emit(Notification::new(id.clone(), Output::metadata(reads, writes)));
    }

    fn run_python_cell(&mut self, id: &CellId, source: &str, emit: &mut impl FnMut(Notification)) -> bool {
        let scope = self.namespace.scope();
        let outcome = executor::run_python(self.vm, &scope, source);

        if !outcome.stdout.is_empty() {
            emit(Notification::new(id.clone(), Output::stdout(outcome.stdout)));
        }
        if !outcome.stderr.is_empty() {
            emit(Notification::new(id.clone(), Output::stderr(outcome.stderr)));
        }

        match outcome.result {
            Ok(Some(value)) => {
                let bundle = mime::to_mime_bundle(self.vm, &value);
                emit(Notification::new(id.clone(), Output::result(bundle.mime_type, bundle.data)));
                true
            }
            Ok(None) => true,
            Err(traceback) => {
                emit(Notification::new(id.clone(), Output::error("PythonException", traceback)));
                false
            }
        }
    }

    fn run_sql_cell(&mut self, id: &CellId, source: &str, emit: &mut impl FnMut(Notification)) -> bool {
        let vm = self.vm;
        let namespace = &self.namespace;
        let lookup = |name: &str| namespace.get(vm, name).and_then(|obj| pyconv::to_json(vm, &obj));

        match self.sql.execute(source, lookup) {
            Ok(table) => {
                emit(Notification::new(
                    id.clone(),
                    Output::result("application/json", table.to_string()),
                ));
                true
            }
            Err(err) => {
                emit(Notification::new(id.clone(), Output::error(sql_error_type(&err), err.to_string())));
                false
            }
        }
    }
}

fn sql_error_type(err: &Error) -> &'static str {
    match err {
        Error::MissingTemplateVariable(_) => "MissingTemplateVariable",
        Error::NoDatabaseConfigured => "NoDatabaseConfigured",
        Error::Sql(_) => "SqlError",
        _ => "Error",
    }
}
