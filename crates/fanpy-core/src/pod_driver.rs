//! Per-pod output orchestration.
//!
//! One `.py` file per non-synthetic type under `<outDir>/fan/<pod>/`, a
//! per-pod `__init__.py` implementing the lazy-loader pattern, and a root
//! `fan/__init__.py` so namespace imports (`from fan import <pod>`) resolve.
//! When a hand-written native file exists for a type, its body is
//! authoritative and only the reflection-registration block is appended.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use fanpy_ast::{Pod, TypeDef};

use crate::error::{ErrorKind, TranspileError, TranspileResult};
use crate::type_gen::TypePrinter;

/// Options consumed by the transpiler: the output root, the pods to emit,
/// and each pod's hand-written natives directory if it has one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranspileOptions {
    pub out_dir: PathBuf,
    /// pod name -> directory of hand-written `.py` files.
    #[serde(default)]
    pub natives: IndexMap<String, PathBuf>,
}

pub struct PodDriver<'a> {
    opts: &'a TranspileOptions,
}

impl<'a> PodDriver<'a> {
    pub fn new(opts: &'a TranspileOptions) -> Self {
        Self { opts }
    }

    /// Emit the whole pod. Fails fast: any type that cannot be emitted or
    /// written aborts the pod.
    pub fn emit_pod(&self, pod: &Pod) -> TranspileResult<()> {
        let fan_dir = self.opts.out_dir.join("fan");
        let pod_dir = fan_dir.join(&pod.name);
        fs::create_dir_all(&pod_dir)
            .map_err(|e| TranspileError::from(e).in_type(&pod.name, "<outDir>"))?;
        write_if_changed(&fan_dir.join("__init__.py"), ROOT_LOADER)
            .map_err(|e| TranspileError::from(e).in_type(&pod.name, "__init__"))?;

        let mut table: IndexMap<String, String> = IndexMap::new();
        for def in &pod.types {
            if def.is_synthetic() {
                continue;
            }
            tracing::debug!(pod = %pod.name, ty = %def.name, "emitting type");
            let source = self
                .type_source(pod, def)
                .map_err(|e| e.in_type(&pod.name, &def.name))?;
            let path = pod_dir.join(format!("{}.py", def.name));
            fs::write(&path, source)
                .map_err(|e| TranspileError::from(e).in_type(&pod.name, &def.name))?;
            table.insert(def.name.clone(), format!("fan.{}.{}", pod.name, def.name));
        }

        let init = pod_init_source(&table);
        fs::write(pod_dir.join("__init__.py"), init)
            .map_err(|e| TranspileError::from(e).in_type(&pod.name, "__init__"))?;
        tracing::info!(pod = %pod.name, types = table.len(), "pod emitted");
        Ok(())
    }

    /// The source text for one type: either the full generated file, or a
    /// hand-written native body with the reflection block appended.
    pub fn type_source(&self, pod: &Pod, def: &TypeDef) -> TranspileResult<String> {
        let printer = TypePrinter::new(pod, def);
        if let Some(native) = self.native_path(pod, def) {
            tracing::debug!(pod = %pod.name, ty = %def.name, path = %native.display(), "merging native file");
            let body = fs::read_to_string(&native).map_err(|e| {
                TranspileError::new(ErrorKind::Io(format!(
                    "reading native file {}",
                    native.display()
                )))
                .with_source(e)
            })?;
            let mut out = body;
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
            out.push_str(&printer.reflection_block_standalone()?);
            Ok(out)
        } else {
            printer.print()
        }
    }

    fn native_path(&self, pod: &Pod, def: &TypeDef) -> Option<PathBuf> {
        let dir = self.opts.natives.get(&pod.name)?;
        let path = dir.join(format!("{}.py", def.name));
        path.is_file().then_some(path)
    }
}

/// The root namespace loader; written once, identical for every pod.
const ROOT_LOADER: &str = "\
def __getattr__(name):
    import importlib
    _mod_ = importlib.import_module('fan.' + name)
    globals()[name] = _mod_
    return _mod_
";

/// The per-pod lazy loader: a declared-name table and a module-level
/// `__getattr__` that imports on first access, loop-guarded by `_loading`.
fn pod_init_source(table: &IndexMap<String, String>) -> String {
    let mut out = String::from("_types = {\n");
    for (name, module) in table {
        out.push_str(&format!("    '{}': '{}',\n", name, module));
    }
    out.push_str("}\n");
    out.push_str(
        "_loading = set()

def __getattr__(name):
    if name in _types and name not in _loading:
        _loading.add(name)
        try:
            _mod_ = __import__(_types[name], fromlist=[name])
            _val_ = getattr(_mod_, name)
            globals()[name] = _val_
            return _val_
        finally:
            _loading.discard(name)
    raise AttributeError(name)
",
    );
    out
}

/// Avoid touching shared files when the content is already current.
fn write_if_changed(path: &Path, content: &str) -> std::io::Result<()> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            return Ok(());
        }
    }
    fs::write(path, content)
}
