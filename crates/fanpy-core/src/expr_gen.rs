//! Expression lowering: one rewrite rule per expression kind.
//!
//! Rules return Python fragments as strings; composite forms parenthesize
//! themselves so fragments compose without precedence surprises. Fantom
//! semantics that Python lacks natively (truncated integer division,
//! identity comparison, safe navigation, primitive dispatch) route through
//! the runtime helpers on `ObjUtil` and the hand-written sys classes.
//!
//! Sub-expressions are always printed in AST field order, even when the
//! emitted text interleaves them differently; the statement printer's
//! closure pre-pass walks in the same order and the two cursors must agree.

use std::fmt::Write;
use std::sync::OnceLock;

use fnv::FnvHashSet;

use fanpy_ast::{
    CallExpr, ClosureExpr, Expr, ExprKind, FieldExpr, ShortcutExpr, ShortcutOp, Stmt,
};

use crate::error::{ErrorKind, TranspileError, TranspileResult};
use crate::imports::ImportResolver;
use crate::name_map::map_name;
use crate::op_map::{binary_op, unary_op};
use crate::pystr;
use crate::state::{ClosureKind, PrinterState};
use crate::stmt_gen::{block_mentions_this, is_multi_stmt};

/// Compiler-injected const-field validators; dropped because the target
/// runtime does not enforce const.
pub(crate) fn is_ctor_validator(name: &str) -> bool {
    matches!(name, "checkInCtor" | "enterCtor" | "exitCtor") || name.starts_with("checkFields$")
}

/// The shape the front-end gives closure-variable wrapper construction:
/// `this.make(x)` on the enclosing type with a single non-closure argument.
pub(crate) fn is_cvar_construction(c: &CallExpr, state: &PrinterState) -> bool {
    c.method.is_ctor
        && c.method.name == "make"
        && c.method.parent.name == state.current_type
        && c.args.len() == 1
        && !matches!(c.args[0].kind, ExprKind::Closure(_))
        && matches!(c.target.as_deref().map(|t| &t.kind), Some(ExprKind::ThisExpr))
}

/// Obj-level identity/hash/type methods plus Num and Decimal conversions
/// that must dispatch through `ObjUtil` because the runtime value may be a
/// bare Python primitive.
fn is_objutil_method(qname: &str) -> bool {
    static TABLE: OnceLock<FnvHashSet<&'static str>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        [
            "sys::Obj.equals",
            "sys::Obj.compare",
            "sys::Obj.hash",
            "sys::Obj.typeof",
            "sys::Obj.toStr",
            "sys::Obj.with",
            "sys::Obj.isImmutable",
            "sys::Obj.toImmutable",
            "sys::Obj.trap",
            "sys::Map.equals",
            "sys::Map.hash",
            "sys::Map.typeof",
            "sys::Map.isImmutable",
            "sys::Map.toImmutable",
            "sys::Num.toInt",
            "sys::Num.toFloat",
            "sys::Num.toDecimal",
            "sys::Decimal.toInt",
            "sys::Decimal.toFloat",
        ]
        .into_iter()
        .collect()
    });
    table.contains(qname)
}

pub struct ExprPrinter<'a> {
    pub state: &'a mut PrinterState,
    pub imports: &'a mut ImportResolver,
}

impl<'a> ExprPrinter<'a> {
    pub fn new(state: &'a mut PrinterState, imports: &'a mut ImportResolver) -> Self {
        Self { state, imports }
    }

    pub fn print(&mut self, e: &Expr) -> TranspileResult<String> {
        match &e.kind {
            ExprKind::NullLit => Ok("None".into()),
            ExprKind::BoolLit { val } => Ok(if *val { "True" } else { "False" }.into()),
            ExprKind::IntLit { val } => Ok(val.to_string()),
            ExprKind::FloatLit { val } => Ok(float_literal(*val)),
            ExprKind::StrLit { val } => Ok(pystr::quote(val)),
            ExprKind::DecimalLit { val } => {
                let cls = self.imports.runtime_ref("Decimal");
                Ok(format!("{}.from_str({})", cls, pystr::quote(val)))
            }
            ExprKind::DurationLit { ticks } => {
                let cls = self.imports.runtime_ref("Duration");
                Ok(format!("{}.from_ticks({})", cls, ticks))
            }
            ExprKind::UriLit { val } => {
                let cls = self.imports.runtime_ref("Uri");
                Ok(format!("{}.from_str({})", cls, pystr::quote(val)))
            }
            ExprKind::ListLit { of, elems } => {
                let cls = self.imports.runtime_ref("List");
                let items = self.print_args(elems)?;
                Ok(format!("{}.from_literal([{}], '{}')", cls, items, of.sig()))
            }
            ExprKind::MapLit {
                key_type,
                val_type,
                entries,
            } => {
                let cls = self.imports.runtime_ref("Map");
                let mut keys = String::new();
                let mut vals = String::new();
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        keys.push_str(", ");
                        vals.push_str(", ");
                    }
                    let k = self.print(&entry.key)?;
                    let v = self.print(&entry.val)?;
                    keys.push_str(&k);
                    vals.push_str(&v);
                }
                Ok(format!(
                    "{}.from_literal([{}], [{}], '{}', '{}')",
                    cls,
                    keys,
                    vals,
                    key_type.sig(),
                    val_type.sig()
                ))
            }
            ExprKind::RangeLit {
                start,
                end,
                exclusive,
            } => {
                let a = self.print(start)?;
                let b = self.print(end)?;
                let cls = self.imports.runtime_ref("Range");
                let excl = if *exclusive { "True" } else { "False" };
                Ok(format!("{}.make({}, {}, {})", cls, a, b, excl))
            }
            ExprKind::LocalVar { name } => Ok(self.local_name(name)),
            ExprKind::ThisExpr | ExprKind::SuperExpr => Ok(self.state.this_ref().to_string()),
            ExprKind::ItExpr => Ok("it".into()),
            ExprKind::ThrowExpr { err } => {
                let e = self.print(err)?;
                Ok(format!("ObjUtil.throw_({})", e))
            }
            ExprKind::Call(c) => self.print_call(c),
            ExprKind::Construction(c) => {
                let cls = self.imports.py_ref(&c.method.parent);
                let factory = map_name(&c.method.name);
                let args = self.print_args(&c.args)?;
                Ok(format!("{}.{}({})", cls, factory, args))
            }
            ExprKind::Field(f) => self.print_field(f),
            ExprKind::Assign { lhs, rhs } => self.print_assign(lhs, rhs, true),
            ExprKind::Same { lhs, rhs } => {
                let a = self.print(lhs)?;
                let b = self.print(rhs)?;
                Ok(format!("ObjUtil.same({}, {})", a, b))
            }
            ExprKind::NotSame { lhs, rhs } => {
                let a = self.print(lhs)?;
                let b = self.print(rhs)?;
                Ok(format!("(not ObjUtil.same({}, {}))", a, b))
            }
            ExprKind::BoolNot { operand } => {
                let x = self.print(operand)?;
                Ok(format!("(not {})", x))
            }
            ExprKind::BoolOr { operands } => self.print_bool_chain(operands, " or "),
            ExprKind::BoolAnd { operands } => self.print_bool_chain(operands, " and "),
            ExprKind::CmpNull { operand } => {
                let x = self.print(operand)?;
                Ok(format!("({} is None)", x))
            }
            ExprKind::CmpNotNull { operand } => {
                let x = self.print(operand)?;
                Ok(format!("({} is not None)", x))
            }
            ExprKind::IsExpr { target, check } => {
                let t = self.print(target)?;
                Ok(format!("ObjUtil.is_({}, '{}')", t, check.sig()))
            }
            ExprKind::IsnotExpr { target, check } => {
                let t = self.print(target)?;
                Ok(format!("(not ObjUtil.is_({}, '{}'))", t, check.sig()))
            }
            ExprKind::AsExpr { target, check } => {
                let t = self.print(target)?;
                Ok(format!("ObjUtil.as_({}, '{}')", t, check.sig()))
            }
            ExprKind::Coerce { target, to } => {
                let t = self.print(target)?;
                Ok(format!("ObjUtil.coerce({}, '{}')", t, to.sig()))
            }
            ExprKind::Ternary {
                cond,
                if_true,
                if_false,
            } => {
                let c = self.print(cond)?;
                let t = self.print(if_true)?;
                let f = self.print(if_false)?;
                Ok(format!("({} if {} else {})", t, c, f))
            }
            ExprKind::Elvis { lhs, rhs } => {
                let l = self.print(lhs)?;
                let r = self.print(rhs)?;
                Ok(format!(
                    "((lambda _v: _v if _v is not None else {})({}))",
                    r, l
                ))
            }
            ExprKind::Shortcut(s) => self.print_shortcut(s),
            ExprKind::Closure(c) => self.print_closure(c),
            ExprKind::StaticTarget { ty } => Ok(self.imports.py_ref(ty)),
            ExprKind::TypeLiteral { ty } => {
                let cls = self.imports.runtime_ref("Type");
                Ok(format!("{}.find('{}')", cls, ty.sig()))
            }
            ExprKind::SlotLiteral {
                parent,
                name,
                is_field,
            } => {
                let cls = self.imports.runtime_ref(if *is_field { "Field" } else { "Method" });
                let mut owner = parent.clone();
                owner.nullable = false;
                Ok(format!("{}.find('{}.{}')", cls, owner.sig(), name))
            }
            ExprKind::Unsupported { repr } => {
                tracing::warn!(kind = %repr, "unsupported expression kind, emitting None placeholder");
                Ok("None".into())
            }
        }
    }

    pub fn print_args(&mut self, args: &[Expr]) -> TranspileResult<String> {
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let a = self.print(arg)?;
            out.push_str(&a);
        }
        Ok(out)
    }

    fn print_bool_chain(&mut self, operands: &[Expr], sep: &str) -> TranspileResult<String> {
        let mut parts = Vec::with_capacity(operands.len());
        for op in operands {
            parts.push(self.print(op)?);
        }
        Ok(format!("({})", parts.join(sep)))
    }

    /// Local identifier resolution: captured-variable wrappers win inside a
    /// closure, and synthetic `name$N` capture encodings collapse to their
    /// base name (Python's enclosing-scope capture takes over).
    fn local_name(&self, name: &str) -> String {
        if !self.state.closure_ctx.is_empty() {
            if let Some(wrapper) = self.state.param_wrappers.get(name) {
                return wrapper.clone();
            }
        }
        map_name(strip_capture_suffix(name))
    }

    // ---- calls ---------------------------------------------------------

    fn print_call(&mut self, c: &CallExpr) -> TranspileResult<String> {
        let m = &c.method;
        if is_ctor_validator(&m.name) {
            return Ok("None".into());
        }

        if c.safe {
            let target = c.target.as_ref().ok_or_else(|| {
                TranspileError::new(ErrorKind::InvariantViolation(
                    "safe-navigation call without a target".into(),
                ))
            })?;
            let t = self.print(target)?;
            let body = self.print_call_with(c, Some("_safe_".to_string()))?;
            return Ok(format!(
                "((lambda _safe_: None if _safe_ is None else {})({}))",
                body, t
            ));
        }

        // super dispatch: base implementation with an explicit receiver
        if let Some(target) = &c.target {
            if matches!(target.kind, ExprKind::SuperExpr) {
                let cls = self.imports.py_ref(&m.parent);
                let this = self.state.this_ref();
                let args = self.print_args(&c.args)?;
                return Ok(if args.is_empty() {
                    format!("{}.{}({})", cls, map_name(&m.name), this)
                } else {
                    format!("{}.{}({}, {})", cls, map_name(&m.name), this, args)
                });
            }
        }

        // closure-variable wrapper construction
        if is_cvar_construction(c, self.state) {
            let arg = self.print(&c.args[0])?;
            return Ok(format!("ObjUtil.cvar({})", arg));
        }

        let target = match &c.target {
            None => None,
            // Static dispatch never evaluates the class-reference target.
            Some(t) if matches!(t.kind, ExprKind::StaticTarget { .. }) => None,
            Some(t) => Some(self.print(t)?),
        };
        self.print_call_with(c, target)
    }

    fn print_call_with(&mut self, c: &CallExpr, target: Option<String>) -> TranspileResult<String> {
        let m = &c.method;
        let name = map_name(&m.name);

        if c.dynamic {
            let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
            let args = if c.args.is_empty() {
                "None".to_string()
            } else {
                format!("[{}]", self.print_args(&c.args)?)
            };
            return Ok(format!("ObjUtil.trap({}, '{}', {})", t, m.name, args));
        }

        if m.parent.is_sys("Func") && m.name == "call" {
            let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
            let args = self.print_args(&c.args)?;
            return Ok(format!("{}({})", t, args));
        }
        if m.parent.is_sys("Func") && m.name == "callList" {
            let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
            let list = self.print(&c.args[0])?;
            return Ok(format!("{}(*{})", t, list));
        }

        if is_objutil_method(&m.qname()) {
            let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
            let args = self.print_args(&c.args)?;
            return Ok(if args.is_empty() {
                format!("ObjUtil.{}({})", name, t)
            } else {
                format!("ObjUtil.{}({}, {})", name, t, args)
            });
        }

        // instance methods on value primitives dispatch through the class
        if m.parent.is_primitive() && !m.is_static() && !m.is_ctor && target.is_some() {
            let t = target.unwrap_or_default();
            let cls = self.imports.runtime_ref(&m.parent.name);
            let args = self.print_args(&c.args)?;
            return Ok(if args.is_empty() {
                format!("{}.{}({})", cls, name, t)
            } else {
                format!("{}.{}({}, {})", cls, name, t, args)
            });
        }

        // private instance methods dispatch statically
        if m.is_private() && !m.is_static() && !m.is_ctor {
            let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
            let args = self.print_args(&c.args)?;
            return Ok(if args.is_empty() {
                format!("{}.{}({})", self.state.current_type, name, t)
            } else {
                format!("{}.{}({}, {})", self.state.current_type, name, t, args)
            });
        }

        if m.is_static() || m.is_ctor {
            let cls = self.imports.py_ref(&m.parent);
            let args = self.print_args(&c.args)?;
            return Ok(format!("{}.{}({})", cls, name, args));
        }

        let args = self.print_args(&c.args)?;
        match target {
            Some(t) => Ok(format!("{}.{}({})", t, name, args)),
            None if self.state.in_static => {
                Ok(format!("{}.{}({})", self.state.current_type, name, args))
            }
            None => Ok(format!("{}.{}({})", self.state.this_ref(), name, args)),
        }
    }

    // ---- field access --------------------------------------------------

    fn print_field(&mut self, f: &FieldExpr) -> TranspileResult<String> {
        if f.safe {
            let target = f.target.as_ref().ok_or_else(|| {
                TranspileError::new(ErrorKind::InvariantViolation(
                    "safe-navigation field access without a target".into(),
                ))
            })?;
            let t = self.print(target)?;
            let body = self.print_field_with(f, Some("_safe_".to_string()));
            return Ok(format!(
                "((lambda _safe_: None if _safe_ is None else {})({}))",
                body, t
            ));
        }
        let target = match &f.target {
            None => None,
            Some(t) if matches!(t.kind, ExprKind::StaticTarget { .. }) => None,
            Some(t) => Some(self.print(t)?),
        };
        Ok(self.print_field_with(f, target))
    }

    fn print_field_with(&mut self, f: &FieldExpr, target: Option<String>) -> String {
        let fr = &f.field;
        let name = map_name(&fr.name);
        if fr.is_static() {
            let cls = self.imports.py_ref(&fr.parent);
            return if f.raw {
                format!("{}._{}", cls, name)
            } else {
                format!("{}.{}()", cls, name)
            };
        }
        let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
        if f.raw {
            format!("{}._{}", t, name)
        } else if fr.parent.is_hand_written_sys() {
            // hand-written runtime types expose @property fields
            format!("{}.{}", t, name)
        } else {
            format!("{}.{}()", t, name)
        }
    }

    // ---- assignment ----------------------------------------------------

    /// `as_value` marks assignments whose result feeds an enclosing
    /// expression; field stores then route through `setattr_return` so the
    /// right-hand side is evaluated exactly once.
    pub fn print_assign(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        as_value: bool,
    ) -> TranspileResult<String> {
        match &lhs.kind {
            ExprKind::LocalVar { name } => {
                let n = self.local_name(name);
                let r = self.print(rhs)?;
                Ok(format!("({} := {})", n, r))
            }
            ExprKind::Field(f) => {
                let fr = f.field.clone();
                let name = map_name(&fr.name);
                let target = match &f.target {
                    None => None,
                    Some(t) if matches!(t.kind, ExprKind::StaticTarget { .. }) => None,
                    Some(t) => Some(self.print(t)?),
                };
                let r = self.print(rhs)?;
                if as_value {
                    let attr = if f.raw { format!("_{}", name) } else { name };
                    let t = match target {
                        Some(t) => t,
                        None if fr.is_static() => self.imports.py_ref(&fr.parent),
                        None => self.state.this_ref().to_string(),
                    };
                    return Ok(format!("ObjUtil.setattr_return({}, '{}', {})", t, attr, r));
                }
                if fr.is_static() {
                    let cls = self.imports.py_ref(&fr.parent);
                    return Ok(if f.raw {
                        format!("{}._{} = {}", cls, name, r)
                    } else {
                        format!("{}.{}({})", cls, name, r)
                    });
                }
                let t = target.unwrap_or_else(|| self.state.this_ref().to_string());
                if f.raw {
                    Ok(format!("{}._{} = {}", t, name, r))
                } else if fr.parent.is_hand_written_sys() {
                    Ok(format!("{}.{} = {}", t, name, r))
                } else {
                    Ok(format!("{}.{}({})", t, name, r))
                }
            }
            ExprKind::Shortcut(s) if s.op == ShortcutOp::Get => {
                let coll = self.print(&s.target)?;
                let index = self.print(&s.args[0])?;
                let r = self.print(rhs)?;
                Ok(format!("{}[{}] = {}", coll, index, r))
            }
            _ => {
                tracing::warn!("unsupported assignment target, emitting None placeholder");
                Ok("None".into())
            }
        }
    }

    // ---- shortcuts -----------------------------------------------------

    fn print_shortcut(&mut self, s: &ShortcutExpr) -> TranspileResult<String> {
        use ShortcutOp::{
            Cmp, Decrement, Div, Eq, Ge, Get, Gt, Increment, Le, Lt, Minus, Mod, Mult, Ne, Negate,
            Plus, Set,
        };

        if s.is_assign && !matches!(s.op, Increment | Decrement) {
            return self.print_compound_assign(s);
        }

        match s.op {
            Increment | Decrement => self.print_incdec(s),
            Get => self.print_index_get(s),
            Set => {
                let coll = self.print(&s.target)?;
                let index = self.print(&s.args[0])?;
                let val = self.print(&s.args[1])?;
                Ok(format!("{}[{}] = {}", coll, index, val))
            }
            Negate => {
                let t = self.print(&s.target)?;
                let tok = unary_op(&s.method.qname()).unwrap_or("-");
                Ok(format!("({}{})", tok, t))
            }
            Eq | Ne => {
                let a = self.print(&s.target)?;
                let b = self.print(&s.args[0])?;
                let tok = if s.op == Eq { "==" } else { "!=" };
                Ok(format!("({} {} {})", a, tok, b))
            }
            Cmp => {
                let a = self.print(&s.target)?;
                let b = self.print(&s.args[0])?;
                Ok(format!("ObjUtil.compare({}, {})", a, b))
            }
            Lt | Le | Gt | Ge => {
                let a = self.print(&s.target)?;
                let b = self.print(&s.args[0])?;
                if s.method.parent.is_primitive() {
                    let tok = match s.op {
                        Lt => "<",
                        Le => "<=",
                        Gt => ">",
                        _ => ">=",
                    };
                    Ok(format!("({} {} {})", a, tok, b))
                } else {
                    // ordering on arbitrary objects goes through <=> helpers
                    let helper = match s.op {
                        Lt => "compare_lt",
                        Le => "compare_le",
                        Gt => "compare_gt",
                        _ => "compare_ge",
                    };
                    Ok(format!("ObjUtil.{}({}, {})", helper, a, b))
                }
            }
            Plus | Minus | Mult | Div | Mod => self.print_arith(s),
        }
    }

    fn print_arith(&mut self, s: &ShortcutExpr) -> TranspileResult<String> {
        let a = self.print(&s.target)?;
        let b = self.print(&s.args[0])?;
        Ok(self.arith_fragment(s, &a, &b))
    }

    /// Compose an arithmetic fragment from already-printed operands; shared
    /// with compound assignment, which must not re-print its operands.
    fn arith_fragment(&mut self, s: &ShortcutExpr, a: &str, b: &str) -> String {
        let qname = s.method.qname();

        // one Str operand forces the implicit toStr coercion
        if s.op == ShortcutOp::Plus {
            let lhs_str = s.target.ctype.is_sys("Str");
            let rhs_str = s.args.first().is_some_and(|arg| arg.ctype.is_sys("Str"));
            if lhs_str != rhs_str {
                let cls = self.imports.runtime_ref("Str");
                return format!("{}.plus({}, {})", cls, a, b);
            }
        }

        if let Some(tok) = binary_op(&qname) {
            return format!("({} {} {})", a, tok, b);
        }

        // Fantom truncates toward zero; Python floors
        if s.method.parent.is_sys("Int") && s.op == ShortcutOp::Div {
            return format!("ObjUtil.div({}, {})", a, b);
        }
        if s.method.parent.is_sys("Int") && s.op == ShortcutOp::Mod {
            return format!("ObjUtil.mod({}, {})", a, b);
        }

        // anything else degrades to an ordinary method call
        if s.method.parent.is_primitive() {
            let cls = self.imports.runtime_ref(&s.method.parent.name);
            format!("{}.{}({}, {})", cls, map_name(&s.method.name), a, b)
        } else {
            format!("{}.{}({})", a, map_name(&s.method.name), b)
        }
    }

    fn print_compound_assign(&mut self, s: &ShortcutExpr) -> TranspileResult<String> {
        match &s.target.kind {
            ExprKind::LocalVar { name } => {
                let n = self.local_name(name);
                let b = self.print(&s.args[0])?;
                let applied = self.arith_fragment(s, &n, &b);
                Ok(format!("({} := {})", n, applied))
            }
            ExprKind::Field(f) => {
                // raw-storage expansion; the target renders once and the
                // fragment is reused on both sides
                let fr = &f.field;
                let name = map_name(&fr.name);
                let place = if fr.is_static() {
                    let cls = self.imports.py_ref(&fr.parent);
                    format!("{}._{}", cls, name)
                } else {
                    let t = match &f.target {
                        None => self.state.this_ref().to_string(),
                        Some(t) => self.print(t)?,
                    };
                    format!("{}._{}", t, name)
                };
                let b = self.print(&s.args[0])?;
                let applied = self.arith_fragment(s, &place, &b);
                Ok(format!("{} = {}", place, applied))
            }
            ExprKind::Shortcut(g) if g.op == ShortcutOp::Get => {
                let coll = self.print(&g.target)?;
                let index = self.print(&g.args[0])?;
                let place = format!("{}[{}]", coll, index);
                let b = self.print(&s.args[0])?;
                let applied = self.arith_fragment(s, &place, &b);
                Ok(format!("{} = {}", place, applied))
            }
            _ => {
                tracing::warn!("unsupported compound-assignment target, emitting None placeholder");
                Ok("None".into())
            }
        }
    }

    fn print_incdec(&mut self, s: &ShortcutExpr) -> TranspileResult<String> {
        let inc = s.op == ShortcutOp::Increment;
        let sign = if inc { "+" } else { "-" };
        match &s.target.kind {
            ExprKind::LocalVar { name } => {
                let n = self.local_name(name);
                if s.is_postfix {
                    Ok(format!(
                        "((_old_{n} := {n}, {n} := {n} {sign} 1, _old_{n})[2])",
                        n = n,
                        sign = sign
                    ))
                } else {
                    Ok(format!("({n} := {n} {sign} 1)", n = n, sign = sign))
                }
            }
            ExprKind::Field(f) => {
                let fr = &f.field;
                let name = map_name(&fr.name);
                let attr = if f.raw { format!("_{}", name) } else { name };
                let t = if fr.is_static() {
                    self.imports.py_ref(&fr.parent)
                } else {
                    match &f.target {
                        None => self.state.this_ref().to_string(),
                        Some(t) => self.print(t)?,
                    }
                };
                let helper = incdec_helper(inc, s.is_postfix, "field");
                Ok(format!("ObjUtil.{}({}, '{}')", helper, t, attr))
            }
            ExprKind::Shortcut(g) if g.op == ShortcutOp::Get => {
                let coll = self.print(&g.target)?;
                let index = self.print(&g.args[0])?;
                let helper = incdec_helper(inc, s.is_postfix, "index");
                Ok(format!("ObjUtil.{}({}, {})", helper, coll, index))
            }
            _ => {
                tracing::warn!("unsupported increment target, emitting None placeholder");
                Ok("None".into())
            }
        }
    }

    fn print_index_get(&mut self, s: &ShortcutExpr) -> TranspileResult<String> {
        let t = self.print(&s.target)?;
        let i = self.print(&s.args[0])?;
        let target_is_str = s.target.ctype.is_sys("Str");
        let index_is_range = s.args[0].ctype.is_sys("Range");
        if target_is_str && index_is_range {
            let cls = self.imports.runtime_ref("Str");
            Ok(format!("{}.get_range({}, {})", cls, t, i))
        } else if target_is_str {
            let cls = self.imports.runtime_ref("Str");
            Ok(format!("{}.get({}, {})", cls, t, i))
        } else if index_is_range {
            let cls = self.imports.runtime_ref("List");
            Ok(format!("{}.get_range({}, {})", cls, t, i))
        } else {
            Ok(format!("{}[{}]", t, i))
        }
    }

    // ---- closures ------------------------------------------------------

    fn print_closure(&mut self, c: &ClosureExpr) -> TranspileResult<String> {
        if is_multi_stmt(c) {
            // pre-registered by the statement printer's scan; the def was
            // already emitted before this statement
            let scope = self.state.scope_mut().ok_or_else(|| {
                TranspileError::new(ErrorKind::InvariantViolation(
                    "multi-statement closure outside a method scope".into(),
                ))
            })?;
            let reg = scope.registered.get(scope.cursor).ok_or_else(|| {
                TranspileError::new(ErrorKind::InvariantViolation(
                    "closure referenced without being registered".into(),
                ))
            })?;
            let id = reg.id;
            scope.cursor += 1;
            return Ok(format!("_closure_{}", id));
        }

        let spec = self.closure_spec(c)?;
        let params = closure_params(c);
        let outer = if block_mentions_this(&c.body) {
            format!(", _outer={}", self.state.this_ref())
        } else {
            String::new()
        };
        self.state.closure_ctx.push(ClosureKind::Inline);
        let body = self.reduce_closure_body(&c.body);
        self.state.closure_ctx.pop();
        let body = body?;
        let func = self.imports.runtime_ref("Func");
        Ok(format!(
            "{}.make_closure({},(lambda {}{}: {}))",
            func, spec, params, outer, body
        ))
    }

    /// The spec dict handed to `Func.make_closure`, all type references as
    /// signature strings.
    pub fn closure_spec(&mut self, c: &ClosureExpr) -> TranspileResult<String> {
        let returns = match &c.signature.func_return {
            Some(r) => r.sig(),
            None => {
                tracing::debug!(
                    method = %self.state.current_method,
                    "closure signature missing return type, falling back to sys::Obj?"
                );
                "sys::Obj?".to_string()
            }
        };
        let mut params = String::new();
        for (i, p) in c.params.iter().take(closure_arity(c)).enumerate() {
            if i > 0 {
                params.push(',');
            }
            write!(
                params,
                "{{\"name\":\"{}\",\"type\":\"{}\"}}",
                p.name,
                p.ty.sig()
            )?;
        }
        Ok(format!(
            "{{\"returns\":\"{}\",\"immutable\":\"{}\",\"params\":[{}]}}",
            returns,
            c.immutability.as_str(),
            params
        ))
    }

    /// Single-expression closure bodies reduce to one Python expression.
    fn reduce_closure_body(&mut self, body: &[Stmt]) -> TranspileResult<String> {
        let real: Vec<&Stmt> = body
            .iter()
            .filter(|s| !matches!(s, Stmt::Nop | Stmt::Return { expr: None }))
            .collect();
        match real.as_slice() {
            [] => Ok("None".into()),
            [Stmt::Return { expr: Some(e) }] => self.print(e),
            [Stmt::Expr { expr }] => self.print(expr),
            [Stmt::Throw { err }] => {
                let e = self.print(err)?;
                Ok(format!("ObjUtil.throw_({})", e))
            }
            [Stmt::Unsupported { repr }] => {
                tracing::warn!(kind = %repr, "unsupported closure body, emitting None placeholder");
                Ok("None".into())
            }
            _ => Err(TranspileError::new(ErrorKind::InvariantViolation(
                "statement-bodied closure was not extracted".into(),
            ))),
        }
    }
}

fn incdec_helper(inc: bool, postfix: bool, place: &str) -> String {
    let base = if inc { "inc" } else { "dec" };
    if postfix {
        format!("{}_{}_post", base, place)
    } else {
        format!("{}_{}", base, place)
    }
}

/// Declared parameters beyond the signature's count are dropped.
pub fn closure_arity(c: &ClosureExpr) -> usize {
    let sig = &c.signature;
    if sig.func_return.is_some() || !sig.func_params.is_empty() {
        c.params.len().min(sig.func_params.len())
    } else {
        c.params.len()
    }
}

/// Lambda/def parameter list; a zero-arity closure still takes `_=None`.
pub fn closure_params(c: &ClosureExpr) -> String {
    let n = closure_arity(c);
    if n == 0 {
        return "_=None".into();
    }
    c.params
        .iter()
        .take(n)
        .map(|p| format!("{}=None", map_name(&p.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn strip_capture_suffix(name: &str) -> &str {
    if let Some((base, suffix)) = name.rsplit_once('$') {
        if !base.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return base;
        }
    }
    name
}

fn float_literal(val: f64) -> String {
    if val.is_nan() {
        "float(\"nan\")".into()
    } else if val.is_infinite() {
        if val > 0.0 {
            "float(\"inf\")".into()
        } else {
            "float(\"-inf\")".into()
        }
    } else {
        format!("{:?}", val)
    }
}
