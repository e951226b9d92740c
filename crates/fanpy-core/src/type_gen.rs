//! Per-type file emission.
//!
//! One Python file per Fantom type, with fixed regions: path setup, typing
//! imports, the sys namespace import, direct imports (base, mixins, Obj,
//! ObjUtil, catch-clause exceptions), pod namespace imports, the class body,
//! and finally the reflection registration block. The header is rendered
//! last because the class body emission is what discovers the imports.

use std::fmt::Write;

use fanpy_ast::{
    Expr, ExprKind, Facet, FieldDef, FieldExpr, FieldRef, MethodDef, ParamDef, Pod, Stmt, TypeDef,
    TypeRef,
};

use crate::error::TranspileResult;
use crate::expr_gen::ExprPrinter;
use crate::imports::ImportResolver;
use crate::name_map::map_name;
use crate::pystr;
use crate::state::PrinterState;
use crate::stmt_gen::emit_method_body;

pub struct TypePrinter<'a> {
    pod: &'a Pod,
    def: &'a TypeDef,
}

impl<'a> TypePrinter<'a> {
    pub fn new(pod: &'a Pod, def: &'a TypeDef) -> Self {
        Self { pod, def }
    }

    /// Emit the complete Python source for this type.
    pub fn print(&self) -> TranspileResult<String> {
        let mut state = PrinterState::new(&self.def.pod, &self.def.name);
        let base = self.def.base.clone().unwrap_or_else(TypeRef::obj);

        let mut imports = ImportResolver::new(&self.def.pod, &self.def.name);
        imports.add_supertype(&base);
        for mixin in &self.def.mixins {
            imports.add_supertype(mixin);
        }

        let mut members: Vec<String> = Vec::new();
        if let Some(decls) = self.class_level_decls()? {
            members.push(decls);
        }
        members.push(self.emit_init(&mut state, &mut imports, &base)?);
        for method in &self.def.methods {
            if method.is_synthetic() || method.body.is_none() {
                continue;
            }
            if method.is_ctor {
                if self.def.is_enum() {
                    continue;
                }
                members.push(self.emit_ctor(&mut state, &mut imports, method)?);
            } else {
                members.push(self.emit_method(&mut state, &mut imports, method)?);
            }
        }
        for field in &self.def.fields {
            if let Some(accessor) = self.emit_accessor(field)? {
                members.push(accessor);
            }
        }
        if self.def.is_enum() {
            members.push(self.emit_enum_support(&mut imports)?);
        }
        if self.has_static_init() {
            members.push(self.emit_static_init(&mut state, &mut imports)?);
        }

        let reflection = self.reflection_block(&mut imports, false)?;

        let mut out = imports.render_header()?;
        out.push('\n');
        let bases = self.class_bases(&mut imports, &base);
        writeln!(out, "class {}({}):", self.def.name, bases)?;
        out.push('\n');
        out.push_str(&members.join("\n"));
        out.push('\n');
        out.push_str(&reflection);
        Ok(out)
    }

    /// The registration block with its own imports, appended to hand-written
    /// native files by the pod driver.
    pub fn reflection_block_standalone(&self) -> TranspileResult<String> {
        let mut imports = ImportResolver::new(&self.def.pod, &self.def.name);
        self.reflection_block(&mut imports, true)
    }

    fn class_bases(&self, imports: &mut ImportResolver, base: &TypeRef) -> String {
        let mut bases = imports.py_ref(base);
        for mixin in &self.def.mixins {
            let m = imports.py_ref(mixin);
            bases.push_str(", ");
            bases.push_str(&m);
        }
        bases
    }

    fn self_type_ref(&self) -> TypeRef {
        TypeRef::new(&*self.def.pod, &*self.def.name)
    }

    fn static_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.def
            .fields
            .iter()
            .filter(|f| f.is_static() && !f.is_synthetic())
    }

    fn instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.def.fields.iter().filter(|f| !f.is_static())
    }

    fn has_static_init(&self) -> bool {
        self.static_fields().any(|f| f.init.is_some())
    }

    /// Class-level declarations: static field storage plus the lazy-init
    /// guards, all initialized to None/False.
    fn class_level_decls(&self) -> TranspileResult<Option<String>> {
        let mut out = String::new();
        for field in self.static_fields() {
            writeln!(out, "    _{} = None", map_name(&field.name))?;
        }
        if self.def.is_enum() {
            writeln!(out, "    _vals = None")?;
        }
        if self.has_static_init() {
            writeln!(out, "    _static_inited = False")?;
            writeln!(out, "    _static_init_in_progress = False")?;
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    /// `__init__` seeds every instance field from its declared initializer;
    /// generated code never calls it directly, only the factories do.
    fn emit_init(
        &self,
        state: &mut PrinterState,
        imports: &mut ImportResolver,
        base: &TypeRef,
    ) -> TranspileResult<String> {
        state.enter_method("__init__", false);
        let mut out = String::new();
        writeln!(out, "    def __init__(self):")?;
        let base_ref = imports.py_ref(base);
        writeln!(out, "        {}.__init__(self)", base_ref)?;

        let parent = self.self_type_ref();
        let assigns: Vec<Stmt> = self
            .instance_fields()
            .map(|field| field_store(&parent, field, field.init.clone()))
            .collect();
        if assigns.is_empty() {
            writeln!(out, "        pass")?;
        } else {
            out.push_str(&emit_method_body(state, imports, &assigns, 2)?);
        }
        Ok(out)
    }

    /// Constructors surface as class-level factories; the body runs in an
    /// instance-level `_name` method after `__init__` has seeded fields.
    fn emit_ctor(
        &self,
        state: &mut PrinterState,
        imports: &mut ImportResolver,
        method: &MethodDef,
    ) -> TranspileResult<String> {
        state.enter_method(&method.name, false);
        let factory = map_name(&method.name);
        let params = self.param_list(state, imports, &method.params)?;
        let forward = method
            .params
            .iter()
            .map(|p| map_name(&p.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        writeln!(out, "    @staticmethod")?;
        writeln!(out, "    def {}({}):", factory, params)?;
        writeln!(out, "        _obj_ = {}()", self.def.name)?;
        if forward.is_empty() {
            writeln!(out, "        _obj_._{}()", factory)?;
        } else {
            writeln!(out, "        _obj_._{}({})", factory, forward)?;
        }
        writeln!(out, "        return _obj_")?;
        out.push('\n');

        if params.is_empty() {
            writeln!(out, "    def _{}(self):", factory)?;
        } else {
            writeln!(out, "    def _{}(self, {}):", factory, params)?;
        }
        let body = method.body.as_deref().unwrap_or_default();
        out.push_str(&emit_method_body(state, imports, body, 2)?);
        Ok(out)
    }

    fn emit_method(
        &self,
        state: &mut PrinterState,
        imports: &mut ImportResolver,
        method: &MethodDef,
    ) -> TranspileResult<String> {
        let name = map_name(&method.name);
        state.enter_method(&method.name, method.is_static());
        let params = self.param_list(state, imports, &method.params)?;

        let mut out = String::new();
        if method.is_static() {
            writeln!(out, "    @staticmethod")?;
            writeln!(out, "    def {}({}):", name, params)?;
        } else if params.is_empty() {
            writeln!(out, "    def {}(self):", name)?;
        } else {
            writeln!(out, "    def {}(self, {}):", name, params)?;
        }
        let body = method.body.as_deref().unwrap_or_default();
        out.push_str(&emit_method_body(state, imports, body, 2)?);
        Ok(out)
    }

    fn param_list(
        &self,
        state: &mut PrinterState,
        imports: &mut ImportResolver,
        params: &[ParamDef],
    ) -> TranspileResult<String> {
        let mut parts = Vec::with_capacity(params.len());
        for p in params {
            let name = map_name(&p.name);
            if p.has_default {
                let value = match &p.default {
                    Some(e) => ExprPrinter::new(state, imports).print(e)?,
                    None => "None".to_string(),
                };
                parts.push(format!("{}={}", name, value));
            } else {
                parts.push(name);
            }
        }
        Ok(parts.join(", "))
    }

    /// One callable per field: get+set (`_val_=None`), get-only, or nothing
    /// for fully private storage.
    fn emit_accessor(&self, field: &FieldDef) -> TranspileResult<Option<String>> {
        if field.is_synthetic() || field.is_private() {
            return Ok(None);
        }
        let name = map_name(&field.name);
        let cls = &self.def.name;
        let read_only = field.is_const() || field.setter_private;
        let mut out = String::new();
        if field.is_static() {
            let init_call = if self.has_static_init() {
                format!("        {}._static_init()\n", cls)
            } else {
                String::new()
            };
            writeln!(out, "    @staticmethod")?;
            if read_only {
                writeln!(out, "    def {}():", name)?;
                out.push_str(&init_call);
                writeln!(out, "        return {}._{}", cls, name)?;
            } else {
                writeln!(out, "    def {}(_val_=None):", name)?;
                out.push_str(&init_call);
                writeln!(out, "        if _val_ is None:")?;
                writeln!(out, "            return {}._{}", cls, name)?;
                writeln!(out, "        {}._{} = _val_", cls, name)?;
            }
        } else if read_only {
            writeln!(out, "    def {}(self):", name)?;
            writeln!(out, "        return self._{}", name)?;
        } else {
            writeln!(out, "    def {}(self, _val_=None):", name)?;
            writeln!(out, "        if _val_ is None:")?;
            writeln!(out, "            return self._{}", name)?;
            writeln!(out, "        self._{} = _val_", name)?;
        }
        Ok(Some(out))
    }

    /// Lazy static initialization behind a re-entry guard; accessors call it
    /// before touching storage.
    fn emit_static_init(
        &self,
        state: &mut PrinterState,
        imports: &mut ImportResolver,
    ) -> TranspileResult<String> {
        let cls = &self.def.name;
        let mut out = String::new();
        writeln!(out, "    @staticmethod")?;
        writeln!(out, "    def _static_init():")?;
        writeln!(
            out,
            "        if {}._static_inited or {}._static_init_in_progress:",
            cls, cls
        )?;
        writeln!(out, "            return")?;
        writeln!(out, "        {}._static_init_in_progress = True", cls)?;
        writeln!(out, "        try:")?;

        state.enter_method("_static_init", true);
        let parent = self.self_type_ref();
        let assigns: Vec<Stmt> = self
            .static_fields()
            .filter(|f| f.init.is_some())
            .map(|field| field_store(&parent, field, field.init.clone()))
            .collect();
        out.push_str(&emit_method_body(state, imports, &assigns, 3)?);

        writeln!(out, "        finally:")?;
        writeln!(out, "            {}._static_init_in_progress = False", cls)?;
        writeln!(out, "            {}._static_inited = True", cls)?;
        Ok(out)
    }

    /// Enum support: the lazy `_vals` list of instances built through
    /// `object.__new__`, one accessor per constant, and ordinal/name.
    fn emit_enum_support(&self, imports: &mut ImportResolver) -> TranspileResult<String> {
        let cls = &self.def.name;
        let list_cls = imports.runtime_ref("List");
        let names = self
            .def
            .enum_defs
            .iter()
            .map(|e| format!("'{}'", e.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        writeln!(out, "    @staticmethod")?;
        writeln!(out, "    def vals():")?;
        writeln!(out, "        if {}._vals is None:", cls)?;
        writeln!(out, "            _items_ = []")?;
        writeln!(out, "            for _i_, _n_ in enumerate([{}]):", names)?;
        writeln!(out, "                _obj_ = object.__new__({})", cls)?;
        writeln!(out, "                _obj_._ordinal = _i_")?;
        writeln!(out, "                _obj_._name = _n_")?;
        writeln!(out, "                _items_.append(_obj_)")?;
        writeln!(
            out,
            "            {}._vals = {}.from_literal(_items_, '{}')",
            cls, list_cls, self.def.qname
        )?;
        writeln!(out, "        return {}._vals", cls)?;
        out.push('\n');
        for e in &self.def.enum_defs {
            writeln!(out, "    @staticmethod")?;
            writeln!(out, "    def {}():", map_name(&e.name))?;
            writeln!(out, "        return {}.vals().get({})", cls, e.ordinal)?;
            out.push('\n');
        }
        writeln!(out, "    def ordinal(self):")?;
        writeln!(out, "        return self._ordinal")?;
        out.push('\n');
        writeln!(out, "    def name(self):")?;
        writeln!(out, "        return self._name")?;
        Ok(out)
    }

    /// Reflection registration: every type reference is a literal string,
    /// never an evaluated object.
    fn reflection_block(
        &self,
        imports: &mut ImportResolver,
        standalone: bool,
    ) -> TranspileResult<String> {
        let (type_cls, param_cls) = if standalone {
            ("Type".to_string(), "Param".to_string())
        } else {
            (imports.runtime_ref("Type"), imports.runtime_ref("Param"))
        };

        let mut out = String::new();
        if standalone {
            writeln!(out, "from fan.sys.Type import Type")?;
            writeln!(out, "from fan.sys.Param import Param")?;
        }
        writeln!(out, "_t = {}.find('{}')", type_cls, self.def.qname)?;
        for field in &self.def.fields {
            if field.is_synthetic() {
                continue;
            }
            writeln!(
                out,
                "_t.af_('{}', {}, '{}', {})",
                field.name,
                field.flags,
                field.ty.sig(),
                facets_dict(&field.facets)
            )?;
        }
        for method in &self.def.methods {
            if method.is_synthetic() {
                continue;
            }
            let params = method
                .params
                .iter()
                .map(|p| {
                    format!(
                        "{}('{}', '{}', {})",
                        param_cls,
                        p.name,
                        p.ty.sig(),
                        if p.has_default { "True" } else { "False" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                out,
                "_t.am_('{}', {}, '{}', [{}], {})",
                method.name,
                method.flags,
                method.returns.sig(),
                params,
                facets_dict(&method.facets)
            )?;
        }
        Ok(out)
    }
}

/// Synthetic raw-storage assignment used for `__init__` and static init.
fn field_store(parent: &TypeRef, field: &FieldDef, init: Option<Expr>) -> Stmt {
    let mut field_ref = FieldRef::new(parent.clone(), field.name.clone());
    field_ref.flags = field.flags;
    let target = if field.is_static() {
        None
    } else {
        Some(Box::new(Expr::new(parent.clone(), ExprKind::ThisExpr)))
    };
    Stmt::Expr {
        expr: Expr::new(
            field.ty.clone(),
            ExprKind::Assign {
                lhs: Box::new(Expr::new(
                    field.ty.clone(),
                    ExprKind::Field(FieldExpr {
                        field: field_ref,
                        target,
                        safe: false,
                        raw: true,
                    }),
                )),
                rhs: Box::new(init.unwrap_or_else(Expr::null)),
            },
        ),
    }
}

fn facets_dict(facets: &[Facet]) -> String {
    if facets.is_empty() {
        return "{}".to_string();
    }
    let entries = facets
        .iter()
        .map(|f| {
            format!(
                "'{}': {}",
                f.qname,
                pystr::quote(f.value.as_deref().unwrap_or(""))
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", entries)
}
