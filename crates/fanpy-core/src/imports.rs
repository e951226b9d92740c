//! Import form selection for generated files.
//!
//! Given the pod being emitted and a referenced type, the resolver picks one
//! of the forms below and records whatever top-of-file import the form
//! requires. Reference strings are returned for expression position; the
//! recorded sets are rendered into the file header once the class body is
//! complete.
//!
//! | condition | form |
//! |---|---|
//! | root `Obj`/`ObjUtil`, the base class, a mixin | direct `from fan.<pod>.<Name> import <Name>` |
//! | exception type in a catch clause | direct import (the class must be in local scope) |
//! | sys type from a non-sys pod | `sys.<Name>` after one `from fan import sys` |
//! | same-pod type | per-use `__import__('fan.<pod>.<Name>', fromlist=['<Name>']).<Name>` |
//! | other pod | `<pod>.<Name>` after `from fan import <pod>` |
//!
//! The `__import__` form breaks module-initialization cycles at the cost of
//! a per-call lookup the runtime caches.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use fanpy_ast::TypeRef;

use crate::error::TranspileResult;

#[derive(Debug)]
pub struct ImportResolver {
    current_pod: String,
    /// The type being emitted; self-references stay bare.
    current_type: String,
    /// qnames of the current type's base and mixins.
    supertypes: BTreeSet<String>,
    /// pod -> type names imported directly at top of file.
    direct: BTreeMap<String, BTreeSet<String>>,
    /// pods referenced through the `fan` namespace.
    namespace_pods: BTreeSet<String>,
    uses_sys_namespace: bool,
}

impl ImportResolver {
    pub fn new(current_pod: impl Into<String>, current_type: impl Into<String>) -> Self {
        let mut resolver = Self {
            current_pod: current_pod.into(),
            current_type: current_type.into(),
            supertypes: BTreeSet::new(),
            direct: BTreeMap::new(),
            namespace_pods: BTreeSet::new(),
            uses_sys_namespace: false,
        };
        // Every generated file references Obj and ObjUtil.
        resolver.add_direct("sys", "Obj");
        resolver.add_direct("sys", "ObjUtil");
        resolver
    }

    fn add_direct(&mut self, pod: &str, name: &str) {
        self.direct
            .entry(pod.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Register the base class or a mixin; these are always direct imports.
    pub fn add_supertype(&mut self, t: &TypeRef) {
        self.supertypes.insert(t.qname());
        let pod = sanitize_pod(&t.pod);
        self.add_direct(&pod, &t.name);
    }

    /// Force a direct import (catch clauses need the class in local scope).
    pub fn direct_ref(&mut self, t: &TypeRef) -> String {
        let pod = sanitize_pod(&t.pod);
        self.add_direct(&pod, &t.name);
        t.name.clone()
    }

    /// Reference a type in expression position.
    pub fn py_ref(&mut self, t: &TypeRef) -> String {
        let pod = sanitize_pod(&t.pod);
        if (pod == "sys" && matches!(t.name.as_str(), "Obj" | "ObjUtil"))
            || self.supertypes.contains(&t.qname())
        {
            return self.direct_ref(t);
        }
        if pod == self.current_pod && t.name == self.current_type {
            // the class is defined in this very module
            return t.name.clone();
        }
        if pod == "sys" && self.current_pod != "sys" {
            self.uses_sys_namespace = true;
            return format!("sys.{}", t.name);
        }
        if pod == self.current_pod || is_java_ffi(&t.pod) {
            // Cycle-safe dynamic form; also used for Java-FFI pods so the
            // deterministic failure happens at the use site, not at import.
            return format!(
                "__import__('fan.{}.{}', fromlist=['{}']).{}",
                pod, t.name, t.name, t.name
            );
        }
        self.namespace_pods.insert(pod.clone());
        format!("{}.{}", pod, t.name)
    }

    /// Reference one of the hand-written runtime classes the emitter itself
    /// dispatches through (`Int`, `Str`, `Func`, `Type`, ...). Inside the
    /// sys pod these are direct imports; elsewhere they ride the `sys`
    /// namespace like any other sys type.
    pub fn runtime_ref(&mut self, name: &str) -> String {
        if matches!(name, "Obj" | "ObjUtil") || self.current_pod == "sys" {
            self.add_direct("sys", name);
            return name.to_string();
        }
        self.uses_sys_namespace = true;
        format!("sys.{}", name)
    }

    /// Render the header regions: path setup, typing imports, the sys
    /// namespace import, direct imports, then pod namespace imports.
    pub fn render_header(&self) -> TranspileResult<String> {
        let mut out = String::new();
        writeln!(out, "import sys as sys_module")?;
        writeln!(out, "sys_module.path.insert(0, '.')")?;
        writeln!(
            out,
            "from typing import Optional, Callable, List as TypingList, Dict as TypingDict"
        )?;
        if self.uses_sys_namespace {
            writeln!(out, "from fan import sys")?;
        }
        for (pod, names) in &self.direct {
            for name in names {
                writeln!(out, "from fan.{}.{} import {}", pod, name, name)?;
            }
        }
        for pod in &self.namespace_pods {
            if pod != "sys" {
                writeln!(out, "from fan import {}", pod)?;
            }
        }
        Ok(out)
    }
}

/// Java-FFI pods (`[java]java.util`) render as the dotted pod name; the
/// result always parses and any runtime lookup of it fails deterministically.
fn sanitize_pod(pod: &str) -> String {
    pod.strip_prefix("[java]").unwrap_or(pod).to_string()
}

fn is_java_ffi(pod: &str) -> bool {
    pod.starts_with("[java]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obj_and_objutil_are_always_direct() {
        let mut r = ImportResolver::new("acme", "Widget");
        assert_eq!(r.py_ref(&TypeRef::sys("Obj")), "Obj");
        assert_eq!(r.py_ref(&TypeRef::sys("ObjUtil")), "ObjUtil");
        let header = r.render_header().unwrap();
        assert!(header.contains("from fan.sys.Obj import Obj"));
        assert!(header.contains("from fan.sys.ObjUtil import ObjUtil"));
    }

    #[test]
    fn sys_types_ride_the_namespace_from_other_pods() {
        let mut r = ImportResolver::new("acme", "Widget");
        assert_eq!(r.py_ref(&TypeRef::sys("Str")), "sys.Str");
        let header = r.render_header().unwrap();
        assert!(header.contains("from fan import sys"));
        assert!(!header.contains("from fan.sys.Str"));
    }

    #[test]
    fn same_pod_references_use_dynamic_import() {
        let mut r = ImportResolver::new("acme", "Widget");
        let form = r.py_ref(&TypeRef::new("acme", "Gadget"));
        assert_eq!(
            form,
            "__import__('fan.acme.Gadget', fromlist=['Gadget']).Gadget"
        );
        // No top-of-file import for the dynamic form.
        assert!(!r.render_header().unwrap().contains("Gadget"));
    }

    #[test]
    fn self_references_stay_bare() {
        let mut r = ImportResolver::new("acme", "Widget");
        assert_eq!(r.py_ref(&TypeRef::new("acme", "Widget")), "Widget");
        assert!(!r.render_header().unwrap().contains("Widget"));
    }

    #[test]
    fn cross_pod_references_use_the_pod_namespace() {
        let mut r = ImportResolver::new("acme", "Widget");
        assert_eq!(r.py_ref(&TypeRef::new("util", "Logger")), "util.Logger");
        assert!(r.render_header().unwrap().contains("from fan import util"));
    }

    #[test]
    fn supertypes_are_direct_even_within_the_pod() {
        let mut r = ImportResolver::new("acme", "Widget");
        let base = TypeRef::new("acme", "Base");
        r.add_supertype(&base);
        assert_eq!(r.py_ref(&base), "Base");
        assert!(r
            .render_header()
            .unwrap()
            .contains("from fan.acme.Base import Base"));
    }

    #[test]
    fn catch_types_force_direct_imports() {
        let mut r = ImportResolver::new("acme", "Widget");
        assert_eq!(r.direct_ref(&TypeRef::sys("Err")), "Err");
        assert!(r
            .render_header()
            .unwrap()
            .contains("from fan.sys.Err import Err"));
    }

    #[test]
    fn runtime_refs_are_direct_inside_sys() {
        let mut r = ImportResolver::new("sys", "Widget");
        assert_eq!(r.runtime_ref("Int"), "Int");
        assert!(r
            .render_header()
            .unwrap()
            .contains("from fan.sys.Int import Int"));

        let mut r2 = ImportResolver::new("acme", "Widget");
        assert_eq!(r2.runtime_ref("Int"), "sys.Int");
    }

    #[test]
    fn java_ffi_pods_are_sanitized_and_deferred() {
        let mut r = ImportResolver::new("acme", "Widget");
        let t = TypeRef::new("[java]java.util", "Date");
        assert_eq!(
            r.py_ref(&t),
            "__import__('fan.java.util.Date', fromlist=['Date']).Date"
        );
        // no top-of-file import may reference the Java pod
        assert!(!r.render_header().unwrap().contains("java"));
    }

    #[test]
    fn header_is_deterministically_ordered() {
        let mut r = ImportResolver::new("acme", "Widget");
        r.py_ref(&TypeRef::new("zeta", "Z"));
        r.py_ref(&TypeRef::new("alpha", "A"));
        let header = r.render_header().unwrap();
        let alpha = header.find("from fan import alpha").unwrap();
        let zeta = header.find("from fan import zeta").unwrap();
        assert!(alpha < zeta);
    }
}
