//! # Fanpy Core - Lowering Engine
//!
//! Core lowering engine for converting analyzed Fantom pod ASTs into
//! idiomatic Python 3.12+ source trees.
//!
//! ## Overview
//!
//! This crate consumes the typed node model from [`fanpy_ast`] and produces
//! one Python file per type plus per-pod lazy-loader modules, preserving the
//! Fantom semantics Python lacks natively: truncated integer arithmetic,
//! identity comparison, safe navigation, closures with immutability
//! snapshots, primitive dispatch, reflection metadata, and cyclic module
//! references.
//!
//! ## Architecture
//!
//! The pipeline is three printers over shared state, leaves first:
//!
//! 1. **Names and operators** ([`name_map`], [`op_map`]) - identifier and
//!    operator-token rewriting
//! 2. **Imports** ([`imports`]) - direct, namespace, or dynamic import form
//!    per referenced type
//! 3. **Expressions** ([`expr_gen`]) - one rewrite rule per expression kind
//! 4. **Statements** ([`stmt_gen`]) - control flow and multi-statement
//!    closure extraction
//! 5. **Types** ([`type_gen`]) - class skeleton, accessors, factories,
//!    reflection registration
//! 6. **Pods** ([`pod_driver`]) - output tree, native merge, lazy loaders
//!
//! ## Example
//!
//! ```rust
//! use fanpy_ast::{flags, Pod, TypeDef, TypeRef};
//! use fanpy_core::Transpiler;
//!
//! let ty = TypeDef {
//!     qname: "demo::Greeter".into(),
//!     pod: "demo".into(),
//!     name: "Greeter".into(),
//!     base: Some(TypeRef::obj()),
//!     mixins: vec![],
//!     flags: flags::PUBLIC,
//!     facets: vec![],
//!     fields: vec![],
//!     methods: vec![],
//!     enum_defs: vec![],
//! };
//! let pod = Pod {
//!     name: "demo".into(),
//!     version: "1.0".into(),
//!     depends_on: vec!["sys".into()],
//!     types: vec![ty],
//! };
//!
//! let source = Transpiler::default().transpile_type(&pod, &pod.types[0]).unwrap();
//! assert!(source.contains("class Greeter(Obj):"));
//! ```

pub mod error;
pub mod expr_gen;
pub mod imports;
pub mod name_map;
pub mod op_map;
pub mod pod_driver;
pub mod pystr;
pub mod state;
pub mod stmt_gen;
pub mod type_gen;

use fanpy_ast::{Pod, TypeDef};

pub use error::{ErrorKind, TranspileError, TranspileResult};
pub use pod_driver::{PodDriver, TranspileOptions};
pub use type_gen::TypePrinter;

/// Facade over the printer pipeline.
#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    opts: TranspileOptions,
}

impl Transpiler {
    pub fn new(opts: TranspileOptions) -> Self {
        Self { opts }
    }

    /// Lower one type to Python source without touching the filesystem.
    pub fn transpile_type(&self, pod: &Pod, def: &TypeDef) -> TranspileResult<String> {
        TypePrinter::new(pod, def)
            .print()
            .map_err(|e| e.in_type(&pod.name, &def.name))
    }

    /// Emit a whole pod into the configured output directory.
    pub fn emit_pod(&self, pod: &Pod) -> TranspileResult<()> {
        PodDriver::new(&self.opts).emit_pod(pod)
    }
}
