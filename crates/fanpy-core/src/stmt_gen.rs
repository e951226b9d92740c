//! Statement lowering and multi-statement closure extraction.
//!
//! Every method body gets a pre-pass scan that registers each
//! multi-statement closure at its nesting level, keyed by the index of the
//! top-level statement that first mentions it. Emission then writes each
//! pending `def _closure_N` immediately before that statement; the
//! expression printer resolves the use site to the bare name by consuming
//! the registration cursor in the same encounter order.

use fanpy_ast::{Catch, ClosureExpr, Expr, ExprKind, ShortcutOp, Stmt};

use crate::error::TranspileResult;
use crate::expr_gen::{closure_params, is_ctor_validator, ExprPrinter};
use crate::imports::ImportResolver;
use crate::name_map::map_name;
use crate::state::{ClosureKind, ClosureScope, PrinterState, RegisteredClosure};

/// Lower a method body block at the given indent depth.
pub fn emit_method_body(
    state: &mut PrinterState,
    imports: &mut ImportResolver,
    block: &[Stmt],
    indent: usize,
) -> TranspileResult<String> {
    StmtPrinter::new(state, imports, indent).body(block)
}

pub struct StmtPrinter<'a> {
    state: &'a mut PrinterState,
    imports: &'a mut ImportResolver,
    out: String,
    indent: usize,
}

impl<'a> StmtPrinter<'a> {
    pub fn new(
        state: &'a mut PrinterState,
        imports: &'a mut ImportResolver,
        indent: usize,
    ) -> Self {
        Self {
            state,
            imports,
            out: String::new(),
            indent,
        }
    }

    /// Emit a scope-level block: pre-pass scan, pending-closure emission,
    /// then the statements themselves.
    pub fn body(mut self, block: &[Stmt]) -> TranspileResult<String> {
        let registered = scan_block(block, self.state);
        self.state.closure_scopes.push(ClosureScope::new(registered));
        let before = self.out.len();
        let result = self.emit_scope_stmts(block);
        self.state.closure_scopes.pop();
        result?;
        if self.out.len() == before {
            self.line("pass");
        }
        Ok(self.out)
    }

    fn emit_scope_stmts(&mut self, block: &[Stmt]) -> TranspileResult<()> {
        for (i, stmt) in block.iter().enumerate() {
            self.emit_pending_closures(i)?;
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    fn emit_pending_closures(&mut self, stmt_idx: usize) -> TranspileResult<()> {
        loop {
            let next = {
                let Some(scope) = self.state.closure_scopes.last_mut() else {
                    return Ok(());
                };
                let Some(reg) = scope.registered.get(scope.next_def) else {
                    return Ok(());
                };
                if reg.first_use != stmt_idx {
                    return Ok(());
                }
                let reg = reg.clone();
                scope.next_def += 1;
                reg
            };
            self.emit_closure_def(next.id, &next.node)?;
        }
    }

    /// One `def _closure_N(...)` plus its `Func.make_closure` wrapping.
    fn emit_closure_def(&mut self, id: usize, c: &ClosureExpr) -> TranspileResult<()> {
        let params = closure_params(c);
        let self_part = if block_mentions_this(&c.body) && !self.state.in_static {
            format!(", _self={}", self.state.this_ref())
        } else {
            String::new()
        };
        self.line(&format!("def _closure_{}({}{}):", id, params, self_part));

        self.state.closure_ctx.push(ClosureKind::Extracted);
        let registered = scan_block(&c.body, self.state);
        self.state.closure_scopes.push(ClosureScope::new(registered));
        self.indent += 1;
        let before = self.out.len();
        let result = self.emit_scope_stmts(&c.body);
        self.indent -= 1;
        self.state.closure_scopes.pop();
        self.state.closure_ctx.pop();
        result?;
        if self.out.len() == before {
            self.indent += 1;
            self.line("pass");
            self.indent -= 1;
        }

        let spec = self.expr_printer().closure_spec(c)?;
        let func = self.imports.runtime_ref("Func");
        self.line(&format!(
            "_closure_{} = {}.make_closure({}, _closure_{})",
            id, func, spec, id
        ));
        Ok(())
    }

    fn expr_printer(&mut self) -> ExprPrinter<'_> {
        ExprPrinter::new(self.state, self.imports)
    }

    fn print_expr(&mut self, e: &Expr) -> TranspileResult<String> {
        self.expr_printer().print(e)
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> TranspileResult<()> {
        match stmt {
            Stmt::Nop => Ok(()),
            Stmt::Expr { expr } => {
                let text = match &expr.kind {
                    ExprKind::Assign { lhs, rhs } => {
                        self.expr_printer().print_assign(lhs, rhs, false)?
                    }
                    _ => self.print_expr(expr)?,
                };
                self.line(&text);
                Ok(())
            }
            Stmt::LocalDef { name, init, .. } => self.emit_local_def(name, init.as_ref()),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let c = self.print_expr(cond)?;
                self.line(&format!("if {}:", c));
                self.emit_nested(then_block)?;
                if let Some(els) = else_block {
                    self.line("else:");
                    self.emit_nested(els)?;
                }
                Ok(())
            }
            Stmt::Return { expr: None } => {
                self.line("return");
                Ok(())
            }
            Stmt::Return { expr: Some(e) } => self.emit_return(e),
            Stmt::Throw { err } => {
                let e = self.print_expr(err)?;
                self.line(&format!("raise {}", e));
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.emit_for(init.as_deref(), cond.as_ref(), update.as_ref(), body),
            Stmt::While { cond, body } => {
                let c = self.print_expr(cond)?;
                self.line(&format!("while {}:", c));
                self.state.loop_updates.push(None);
                let result = self.emit_nested(body);
                self.state.loop_updates.pop();
                result
            }
            Stmt::Break => {
                self.line("break");
                Ok(())
            }
            Stmt::Continue => {
                // a for-loop's update runs before re-testing the condition
                if let Some(Some(update)) = self.state.loop_updates.last().cloned() {
                    self.line(&update);
                }
                self.line("continue");
                Ok(())
            }
            Stmt::Try {
                body,
                catches,
                finally_block,
            } => self.emit_try(body, catches, finally_block.as_deref()),
            Stmt::Switch {
                cond,
                cases,
                default_block,
            } => self.emit_switch(cond, cases, default_block.as_deref()),
            Stmt::Unsupported { repr } => {
                tracing::warn!(kind = %repr, "unsupported statement kind, emitting TODO marker");
                self.line(&format!("# TODO: {}", repr));
                Ok(())
            }
        }
    }

    fn emit_local_def(&mut self, name: &str, init: Option<&Expr>) -> TranspileResult<()> {
        if self.state.suppressed_catch_vars.iter().any(|v| v.as_str() == name) {
            // Python binds the variable through `except ... as`
            return Ok(());
        }
        if let Some(e) = init {
            // self-referential captured-variable defs collapse to Python's
            // enclosing-scope capture
            if name.contains('$') {
                if let ExprKind::LocalVar { name: other } = &e.kind {
                    if other.as_str() == name {
                        return Ok(());
                    }
                }
            }
            // closure-variable wrapper: record the local -> wrapper mapping
            if let ExprKind::Call(call) = &e.kind {
                if crate::expr_gen::is_cvar_construction(call, self.state) {
                    if let ExprKind::LocalVar { name: orig } = &call.args[0].kind {
                        let wrapper = local_def_name(name);
                        self.state
                            .param_wrappers
                            .insert(orig.clone(), wrapper);
                    }
                }
            }
        }
        let value = match init {
            Some(e) => self.print_expr(e)?,
            None => "None".to_string(),
        };
        let target = local_def_name(name);
        self.line(&format!("{} = {}", target, value));
        Ok(())
    }

    fn emit_return(&mut self, e: &Expr) -> TranspileResult<()> {
        match &e.kind {
            // evaluate the right-hand side once, then return the target
            ExprKind::Assign { lhs, rhs } => {
                let assign = self.expr_printer().print_assign(lhs, rhs, false)?;
                self.line(&assign);
                let read = self.print_expr(lhs)?;
                self.line(&format!("return {}", read));
                Ok(())
            }
            ExprKind::Shortcut(s)
                if s.is_assign
                    && !matches!(s.op, ShortcutOp::Increment | ShortcutOp::Decrement) =>
            {
                let assign = self.print_expr(e)?;
                self.line(&assign);
                let read = self.print_expr(&s.target)?;
                self.line(&format!("return {}", read));
                Ok(())
            }
            _ => {
                let value = self.print_expr(e)?;
                self.line(&format!("return {}", value));
                Ok(())
            }
        }
    }

    fn emit_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &[Stmt],
    ) -> TranspileResult<()> {
        if let Some(i) = init {
            self.emit_stmt(i)?;
        }
        let cond_text = match cond {
            Some(c) => self.print_expr(c)?,
            None => "True".to_string(),
        };
        // rendered once; continue lowering replays the same text
        let update_text = match update {
            Some(u) => Some(self.print_expr(u)?),
            None => None,
        };
        self.line(&format!("while {}:", cond_text));
        self.state.loop_updates.push(update_text.clone());
        self.indent += 1;
        let before = self.out.len();
        let result = (|| -> TranspileResult<()> {
            for s in body {
                self.emit_stmt(s)?;
            }
            Ok(())
        })();
        if result.is_ok() {
            if let Some(u) = &update_text {
                self.line(u);
            }
            if self.out.len() == before {
                self.line("pass");
            }
        }
        self.indent -= 1;
        self.state.loop_updates.pop();
        result
    }

    fn emit_try(
        &mut self,
        body: &[Stmt],
        catches: &[Catch],
        finally_block: Option<&[Stmt]>,
    ) -> TranspileResult<()> {
        self.line("try:");
        self.emit_nested(body)?;
        for catch in catches {
            match (&catch.err_type, &catch.var) {
                (Some(t), Some(var)) => {
                    let name = self.imports.direct_ref(t);
                    self.line(&format!("except {} as {}:", name, map_name(var)));
                }
                (Some(t), None) => {
                    let name = self.imports.direct_ref(t);
                    self.line(&format!("except {}:", name));
                }
                (None, Some(var)) => {
                    self.line(&format!("except BaseException as {}:", map_name(var)));
                }
                (None, None) => self.line("except:"),
            }
            if let Some(var) = &catch.var {
                self.state.suppressed_catch_vars.push(var.clone());
            }
            let result = self.emit_nested(&catch.body);
            if catch.var.is_some() {
                self.state.suppressed_catch_vars.pop();
            }
            result?;
        }
        if let Some(fin) = finally_block {
            self.line("finally:");
            self.emit_nested(fin)?;
        } else if catches.is_empty() {
            // a bare try is not valid Python
            self.line("finally:");
            self.indent += 1;
            self.line("pass");
            self.indent -= 1;
        }
        Ok(())
    }

    fn emit_switch(
        &mut self,
        cond: &Expr,
        cases: &[fanpy_ast::Case],
        default_block: Option<&[Stmt]>,
    ) -> TranspileResult<()> {
        // cache the condition so it evaluates exactly once
        let var = self.state.next_switch_var();
        let c = self.print_expr(cond)?;
        self.line(&format!("{} = {}", var, c));
        for (i, case) in cases.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "elif" };
            let mut tests = Vec::with_capacity(case.matches.len());
            for m in &case.matches {
                let text = self.print_expr(m)?;
                tests.push(format!("({} == {})", var, text));
            }
            self.line(&format!("{} {}:", keyword, tests.join(" or ")));
            self.emit_nested(&case.body)?;
        }
        if let Some(default) = default_block {
            if cases.is_empty() {
                for s in default {
                    self.emit_stmt(s)?;
                }
            } else {
                self.line("else:");
                self.emit_nested(default)?;
            }
        }
        Ok(())
    }

    /// Emit a nested block one level deeper; empty blocks become `pass`.
    fn emit_nested(&mut self, block: &[Stmt]) -> TranspileResult<()> {
        self.indent += 1;
        let before = self.out.len();
        let result = (|| -> TranspileResult<()> {
            for s in block {
                self.emit_stmt(s)?;
            }
            Ok(())
        })();
        if result.is_ok() && self.out.len() == before {
            self.line("pass");
        }
        self.indent -= 1;
        result
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

/// LocalDef targets use the same capture-suffix collapse as variable reads.
fn local_def_name(name: &str) -> String {
    map_name(crate::expr_gen::strip_capture_suffix(name))
}

/// A closure needs extraction to a `def` when its body cannot live in a
/// lambda: local declarations, statement-level assignments, control flow,
/// or more than one real statement once nops and empty returns are
/// stripped.
pub fn is_multi_stmt(c: &ClosureExpr) -> bool {
    let mut real = 0usize;
    for s in &c.body {
        match s {
            Stmt::Nop | Stmt::Return { expr: None } => {}
            Stmt::LocalDef { .. } => return true,
            Stmt::If { .. }
            | Stmt::Switch { .. }
            | Stmt::For { .. }
            | Stmt::While { .. }
            | Stmt::Try { .. } => return true,
            Stmt::Expr { expr } if is_mutating_stmt_expr(expr) => return true,
            _ => real += 1,
        }
    }
    real > 1
}

fn is_mutating_stmt_expr(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Assign { .. } => true,
        ExprKind::Shortcut(s) => {
            s.is_assign
                || matches!(
                    s.op,
                    ShortcutOp::Increment | ShortcutOp::Decrement | ShortcutOp::Set
                )
        }
        _ => false,
    }
}

// ---- closure pre-pass scan --------------------------------------------

/// Register every multi-statement closure reachable from this block without
/// crossing into another multi-statement closure's body (those register at
/// their own level when their def is emitted).
pub(crate) fn scan_block(block: &[Stmt], state: &mut PrinterState) -> Vec<RegisteredClosure> {
    let mut regs = Vec::new();
    for (i, stmt) in block.iter().enumerate() {
        scan_stmt(stmt, i, state, &mut regs);
    }
    regs
}

fn scan_stmt(stmt: &Stmt, first_use: usize, state: &mut PrinterState, regs: &mut Vec<RegisteredClosure>) {
    match stmt {
        Stmt::Nop | Stmt::Break | Stmt::Continue | Stmt::Unsupported { .. } => {}
        Stmt::Expr { expr } | Stmt::Throw { err: expr } => scan_expr(expr, first_use, state, regs),
        Stmt::LocalDef { init, .. } => {
            if let Some(e) = init {
                scan_expr(e, first_use, state, regs);
            }
        }
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => {
            scan_expr(cond, first_use, state, regs);
            for s in then_block {
                scan_stmt(s, first_use, state, regs);
            }
            if let Some(els) = else_block {
                for s in els {
                    scan_stmt(s, first_use, state, regs);
                }
            }
        }
        Stmt::Return { expr } => {
            if let Some(e) = expr {
                scan_expr(e, first_use, state, regs);
            }
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            if let Some(i) = init {
                scan_stmt(i, first_use, state, regs);
            }
            if let Some(c) = cond {
                scan_expr(c, first_use, state, regs);
            }
            if let Some(u) = update {
                scan_expr(u, first_use, state, regs);
            }
            for s in body {
                scan_stmt(s, first_use, state, regs);
            }
        }
        Stmt::While { cond, body } => {
            scan_expr(cond, first_use, state, regs);
            for s in body {
                scan_stmt(s, first_use, state, regs);
            }
        }
        Stmt::Try {
            body,
            catches,
            finally_block,
        } => {
            for s in body {
                scan_stmt(s, first_use, state, regs);
            }
            for catch in catches {
                for s in &catch.body {
                    scan_stmt(s, first_use, state, regs);
                }
            }
            if let Some(fin) = finally_block {
                for s in fin {
                    scan_stmt(s, first_use, state, regs);
                }
            }
        }
        Stmt::Switch {
            cond,
            cases,
            default_block,
        } => {
            scan_expr(cond, first_use, state, regs);
            for case in cases {
                for m in &case.matches {
                    scan_expr(m, first_use, state, regs);
                }
                for s in &case.body {
                    scan_stmt(s, first_use, state, regs);
                }
            }
            if let Some(default) = default_block {
                for s in default {
                    scan_stmt(s, first_use, state, regs);
                }
            }
        }
    }
}

/// Children are visited in AST field order, mirroring the expression
/// printer exactly so use-site cursors line up with the registrations.
fn scan_expr(e: &Expr, first_use: usize, state: &mut PrinterState, regs: &mut Vec<RegisteredClosure>) {
    match &e.kind {
        ExprKind::Closure(c) => {
            if is_multi_stmt(c) {
                regs.push(RegisteredClosure {
                    id: state.next_closure_id(),
                    first_use,
                    node: c.clone(),
                });
            } else {
                for s in &c.body {
                    scan_stmt(s, first_use, state, regs);
                }
            }
        }
        ExprKind::ListLit { elems, .. } => {
            for x in elems {
                scan_expr(x, first_use, state, regs);
            }
        }
        ExprKind::MapLit { entries, .. } => {
            for entry in entries {
                scan_expr(&entry.key, first_use, state, regs);
                scan_expr(&entry.val, first_use, state, regs);
            }
        }
        ExprKind::RangeLit { start, end, .. } => {
            scan_expr(start, first_use, state, regs);
            scan_expr(end, first_use, state, regs);
        }
        ExprKind::ThrowExpr { err } => scan_expr(err, first_use, state, regs),
        ExprKind::Call(c) | ExprKind::Construction(c) => {
            // dropped validator calls never print their operands
            if is_ctor_validator(&c.method.name) {
                return;
            }
            if let Some(t) = &c.target {
                scan_expr(t, first_use, state, regs);
            }
            for a in &c.args {
                scan_expr(a, first_use, state, regs);
            }
        }
        ExprKind::Field(f) => {
            if let Some(t) = &f.target {
                scan_expr(t, first_use, state, regs);
            }
        }
        ExprKind::Assign { lhs, rhs }
        | ExprKind::Same { lhs, rhs }
        | ExprKind::NotSame { lhs, rhs }
        | ExprKind::Elvis { lhs, rhs } => {
            scan_expr(lhs, first_use, state, regs);
            scan_expr(rhs, first_use, state, regs);
        }
        ExprKind::BoolNot { operand }
        | ExprKind::CmpNull { operand }
        | ExprKind::CmpNotNull { operand } => scan_expr(operand, first_use, state, regs),
        ExprKind::BoolOr { operands } | ExprKind::BoolAnd { operands } => {
            for x in operands {
                scan_expr(x, first_use, state, regs);
            }
        }
        ExprKind::IsExpr { target, .. }
        | ExprKind::IsnotExpr { target, .. }
        | ExprKind::AsExpr { target, .. }
        | ExprKind::Coerce { target, .. } => scan_expr(target, first_use, state, regs),
        ExprKind::Ternary {
            cond,
            if_true,
            if_false,
        } => {
            scan_expr(cond, first_use, state, regs);
            scan_expr(if_true, first_use, state, regs);
            scan_expr(if_false, first_use, state, regs);
        }
        ExprKind::Shortcut(s) => {
            scan_expr(&s.target, first_use, state, regs);
            for a in &s.args {
                scan_expr(a, first_use, state, regs);
            }
        }
        ExprKind::NullLit
        | ExprKind::BoolLit { .. }
        | ExprKind::IntLit { .. }
        | ExprKind::FloatLit { .. }
        | ExprKind::StrLit { .. }
        | ExprKind::DecimalLit { .. }
        | ExprKind::DurationLit { .. }
        | ExprKind::UriLit { .. }
        | ExprKind::LocalVar { .. }
        | ExprKind::ThisExpr
        | ExprKind::SuperExpr
        | ExprKind::ItExpr
        | ExprKind::StaticTarget { .. }
        | ExprKind::TypeLiteral { .. }
        | ExprKind::SlotLiteral { .. }
        | ExprKind::Unsupported { .. } => {}
    }
}

// ---- this-reference analysis ------------------------------------------

/// Whether any statement in the block references the receiver, explicitly
/// or through an implicit-this call or field access. Descends into nested
/// closures: their `_outer`/`_self` defaults chain off the enclosing one.
pub fn block_mentions_this(block: &[Stmt]) -> bool {
    block.iter().any(stmt_mentions_this)
}

fn stmt_mentions_this(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Nop | Stmt::Break | Stmt::Continue | Stmt::Unsupported { .. } => false,
        Stmt::Expr { expr } | Stmt::Throw { err: expr } => expr_mentions_this(expr),
        Stmt::LocalDef { init, .. } => init.as_ref().is_some_and(expr_mentions_this),
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => {
            expr_mentions_this(cond)
                || block_mentions_this(then_block)
                || else_block.as_deref().is_some_and(block_mentions_this)
        }
        Stmt::Return { expr } => expr.as_ref().is_some_and(expr_mentions_this),
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            init.as_deref().is_some_and(stmt_mentions_this)
                || cond.as_ref().is_some_and(expr_mentions_this)
                || update.as_ref().is_some_and(expr_mentions_this)
                || block_mentions_this(body)
        }
        Stmt::While { cond, body } => expr_mentions_this(cond) || block_mentions_this(body),
        Stmt::Try {
            body,
            catches,
            finally_block,
        } => {
            block_mentions_this(body)
                || catches.iter().any(|c| block_mentions_this(&c.body))
                || finally_block.as_deref().is_some_and(block_mentions_this)
        }
        Stmt::Switch {
            cond,
            cases,
            default_block,
        } => {
            expr_mentions_this(cond)
                || cases.iter().any(|c| {
                    c.matches.iter().any(expr_mentions_this) || block_mentions_this(&c.body)
                })
                || default_block.as_deref().is_some_and(block_mentions_this)
        }
    }
}

fn expr_mentions_this(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::ThisExpr | ExprKind::SuperExpr => true,
        ExprKind::Call(c) | ExprKind::Construction(c) => {
            let implicit = c.target.is_none()
                && !c.method.is_static()
                && !c.method.is_ctor
                && !is_ctor_validator(&c.method.name);
            implicit
                || c.target.as_deref().is_some_and(expr_mentions_this)
                || c.args.iter().any(expr_mentions_this)
        }
        ExprKind::Field(f) => {
            (f.target.is_none() && !f.field.is_static())
                || f.target.as_deref().is_some_and(expr_mentions_this)
        }
        ExprKind::Closure(c) => block_mentions_this(&c.body),
        ExprKind::ListLit { elems, .. } => elems.iter().any(expr_mentions_this),
        ExprKind::MapLit { entries, .. } => entries
            .iter()
            .any(|entry| expr_mentions_this(&entry.key) || expr_mentions_this(&entry.val)),
        ExprKind::RangeLit { start, end, .. } => {
            expr_mentions_this(start) || expr_mentions_this(end)
        }
        ExprKind::ThrowExpr { err } => expr_mentions_this(err),
        ExprKind::Assign { lhs, rhs }
        | ExprKind::Same { lhs, rhs }
        | ExprKind::NotSame { lhs, rhs }
        | ExprKind::Elvis { lhs, rhs } => expr_mentions_this(lhs) || expr_mentions_this(rhs),
        ExprKind::BoolNot { operand }
        | ExprKind::CmpNull { operand }
        | ExprKind::CmpNotNull { operand } => expr_mentions_this(operand),
        ExprKind::BoolOr { operands } | ExprKind::BoolAnd { operands } => {
            operands.iter().any(expr_mentions_this)
        }
        ExprKind::IsExpr { target, .. }
        | ExprKind::IsnotExpr { target, .. }
        | ExprKind::AsExpr { target, .. }
        | ExprKind::Coerce { target, .. } => expr_mentions_this(target),
        ExprKind::Ternary {
            cond,
            if_true,
            if_false,
        } => {
            expr_mentions_this(cond)
                || expr_mentions_this(if_true)
                || expr_mentions_this(if_false)
        }
        ExprKind::Shortcut(s) => {
            expr_mentions_this(&s.target) || s.args.iter().any(expr_mentions_this)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanpy_ast::{
        CallExpr, ClosureExpr, Expr, ExprKind, Immutability, MethodRef, ParamDef, ShortcutExpr,
        TypeRef,
    };
    use smallvec::smallvec;

    fn lower(pod: &str, block: &[Stmt]) -> String {
        let mut state = PrinterState::new(pod, "Widget");
        state.enter_method("test", false);
        let mut imports = ImportResolver::new(pod, "Widget");
        emit_method_body(&mut state, &mut imports, block, 0).unwrap()
    }

    fn int_local(name: &str) -> Expr {
        Expr::local(TypeRef::sys("Int"), name)
    }

    fn int_binary(op: ShortcutOp, method: &str, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            TypeRef::sys("Int"),
            ExprKind::Shortcut(ShortcutExpr {
                op,
                method: MethodRef::new(TypeRef::sys("Int"), method),
                target: Box::new(lhs),
                args: vec![rhs],
                is_assign: false,
                is_postfix: false,
            }),
        )
    }

    fn incr(name: &str, postfix: bool) -> Expr {
        Expr::new(
            TypeRef::sys("Int"),
            ExprKind::Shortcut(ShortcutExpr {
                op: ShortcutOp::Increment,
                method: MethodRef::new(TypeRef::sys("Int"), "increment"),
                target: Box::new(int_local(name)),
                args: vec![],
                is_assign: true,
                is_postfix: postfix,
            }),
        )
    }

    #[test]
    fn empty_body_is_pass() {
        assert_eq!(lower("sys", &[]), "pass\n");
        assert_eq!(lower("sys", &[Stmt::Nop]), "pass\n");
    }

    #[test]
    fn for_loop_lowers_to_while_with_update_before_continue() {
        let body = vec![Stmt::If {
            cond: Expr::local(TypeRef::sys("Bool"), "p"),
            then_block: vec![Stmt::Continue],
            else_block: None,
        }];
        let stmt = Stmt::For {
            init: Some(Box::new(Stmt::LocalDef {
                name: "i".into(),
                ty: TypeRef::sys("Int"),
                init: Some(Expr::int_lit(0)),
            })),
            cond: Some(int_binary(
                ShortcutOp::Lt,
                "compare",
                int_local("i"),
                Expr::int_lit(3),
            )),
            update: Some(incr("i", false)),
            body,
        };
        let out = lower("sys", &[stmt]);
        let expected = "\
i = 0
while (i < 3):
    if p:
        (i := i + 1)
        continue
    (i := i + 1)
";
        assert_eq!(out, expected);
    }

    #[test]
    fn continue_in_plain_while_stays_bare() {
        let stmt = Stmt::While {
            cond: Expr::local(TypeRef::sys("Bool"), "p"),
            body: vec![Stmt::Continue],
        };
        let out = lower("sys", &[stmt]);
        assert_eq!(out, "while p:\n    continue\n");
    }

    #[test]
    fn switch_caches_condition_exactly_once() {
        let stmt = Stmt::Switch {
            cond: incr("i", true),
            cases: vec![fanpy_ast::Case {
                matches: vec![Expr::int_lit(1)],
                body: vec![Stmt::Expr {
                    expr: Expr::new(
                        TypeRef::sys("Int"),
                        ExprKind::Assign {
                            lhs: Box::new(int_local("a")),
                            rhs: Box::new(Expr::int_lit(10)),
                        },
                    ),
                }],
            }],
            default_block: Some(vec![Stmt::Expr {
                expr: Expr::new(
                    TypeRef::sys("Int"),
                    ExprKind::Assign {
                        lhs: Box::new(int_local("a")),
                        rhs: Box::new(Expr::int_lit(0)),
                    },
                ),
            }]),
        };
        let out = lower("sys", &[stmt]);
        let expected = "\
_switch_0 = ((_old_i := i, i := i + 1, _old_i)[2])
if (_switch_0 == 1):
    (a := 10)
else:
    (a := 0)
";
        assert_eq!(out, expected);
    }

    #[test]
    fn multi_match_cases_chain_with_or() {
        let stmt = Stmt::Switch {
            cond: int_local("x"),
            cases: vec![fanpy_ast::Case {
                matches: vec![Expr::int_lit(1), Expr::int_lit(2)],
                body: vec![Stmt::Return { expr: None }],
            }],
            default_block: None,
        };
        let out = lower("sys", &[stmt]);
        assert!(out.contains("if (_switch_0 == 1) or (_switch_0 == 2):"));
    }

    #[test]
    fn try_catch_suppresses_catch_var_localdef() {
        let err = TypeRef::sys("Err");
        let stmt = Stmt::Try {
            body: vec![Stmt::Return { expr: None }],
            catches: vec![Catch {
                err_type: Some(err),
                var: Some("e".into()),
                body: vec![
                    Stmt::LocalDef {
                        name: "e".into(),
                        ty: TypeRef::sys("Err"),
                        init: None,
                    },
                    Stmt::Throw {
                        err: Expr::local(TypeRef::sys("Err"), "e"),
                    },
                ],
            }],
            finally_block: Some(vec![Stmt::Nop]),
        };
        let out = lower("acme", &[stmt]);
        let expected = "\
try:
    return
except Err as e:
    raise e
finally:
    pass
";
        assert_eq!(out, expected);
    }

    #[test]
    fn return_of_assignment_avoids_reevaluating_rhs() {
        let stmt = Stmt::Return {
            expr: Some(Expr::new(
                TypeRef::sys("Int"),
                ExprKind::Assign {
                    lhs: Box::new(int_local("x")),
                    rhs: Box::new(Expr::int_lit(7)),
                },
            )),
        };
        let out = lower("sys", &[stmt]);
        assert_eq!(out, "(x := 7)\nreturn x\n");
    }

    #[test]
    fn multi_statement_closure_is_extracted_before_first_use() {
        let closure = ClosureExpr {
            signature: TypeRef::func(vec![TypeRef::sys("Int")], TypeRef::void()),
            params: smallvec![ParamDef::new("n", TypeRef::sys("Int"))],
            body: vec![
                Stmt::LocalDef {
                    name: "m".into(),
                    ty: TypeRef::sys("Int"),
                    init: Some(int_binary(
                        ShortcutOp::Plus,
                        "plus",
                        int_local("n"),
                        Expr::int_lit(1),
                    )),
                },
                Stmt::Return {
                    expr: Some(int_local("m")),
                },
            ],
            captured_fields: vec![],
            immutability: Immutability::Always,
        };
        let each = Expr::new(
            TypeRef::void(),
            ExprKind::Call(CallExpr {
                method: MethodRef::new(TypeRef::sys("List"), "each"),
                target: Some(Box::new(Expr::local(
                    TypeRef::list_of(TypeRef::sys("Int")),
                    "xs",
                ))),
                args: vec![Expr::new(
                    TypeRef::func(vec![TypeRef::sys("Int")], TypeRef::void()),
                    ExprKind::Closure(closure),
                )],
                safe: false,
                dynamic: false,
            }),
        );
        let out = lower("sys", &[Stmt::Expr { expr: each }]);
        let expected = "\
def _closure_0(n=None):
    m = (n + 1)
    return m
_closure_0 = Func.make_closure({\"returns\":\"sys::Void\",\"immutable\":\"always\",\"params\":[{\"name\":\"n\",\"type\":\"sys::Int\"}]}, _closure_0)
xs.each(_closure_0)
";
        assert_eq!(out, expected);
    }

    #[test]
    fn extracted_closure_referencing_this_binds_self_param() {
        let closure = ClosureExpr {
            signature: TypeRef::func(vec![], TypeRef::void()),
            params: smallvec![],
            body: vec![
                Stmt::LocalDef {
                    name: "t".into(),
                    ty: TypeRef::new("acme", "Widget"),
                    init: Some(Expr::new(TypeRef::new("acme", "Widget"), ExprKind::ThisExpr)),
                },
                Stmt::Return { expr: None },
            ],
            captured_fields: vec![],
            immutability: Immutability::Never,
        };
        let use_site = Stmt::Expr {
            expr: Expr::new(
                TypeRef::void(),
                ExprKind::Call(CallExpr {
                    method: MethodRef::new(TypeRef::new("acme", "Runner"), "run"),
                    target: Some(Box::new(Expr::local(TypeRef::new("acme", "Runner"), "r"))),
                    args: vec![Expr::new(
                        TypeRef::func(vec![], TypeRef::void()),
                        ExprKind::Closure(closure),
                    )],
                    safe: false,
                    dynamic: false,
                }),
            ),
        };
        let out = lower("acme", &[use_site]);
        assert!(out.contains("def _closure_0(_=None, _self=self):"), "got:\n{}", out);
        assert!(out.contains("t = _self\n"));
        assert!(out.contains("\"immutable\":\"never\""));
    }

    #[test]
    fn cvar_wrapper_localdef_records_mapping() {
        let mut make = MethodRef::new(TypeRef::new("acme", "Widget"), "make");
        make.is_ctor = true;
        let wrapper_def = Stmt::LocalDef {
            name: "nWrap".into(),
            ty: TypeRef::new("acme", "Widget"),
            init: Some(Expr::new(
                TypeRef::new("acme", "Widget"),
                ExprKind::Call(CallExpr {
                    method: make,
                    target: Some(Box::new(Expr::new(
                        TypeRef::new("acme", "Widget"),
                        ExprKind::ThisExpr,
                    ))),
                    args: vec![int_local("n")],
                    safe: false,
                    dynamic: false,
                }),
            )),
        };
        // closure body reads `n`, which must resolve to the wrapper
        let closure = ClosureExpr {
            signature: TypeRef::func(vec![], TypeRef::sys("Int")),
            params: smallvec![],
            body: vec![Stmt::Return {
                expr: Some(int_local("n")),
            }],
            captured_fields: vec!["n".into()],
            immutability: Immutability::Maybe,
        };
        let use_site = Stmt::Expr {
            expr: Expr::new(
                TypeRef::void(),
                ExprKind::Call(CallExpr {
                    method: MethodRef::new(TypeRef::new("acme", "Runner"), "run"),
                    target: Some(Box::new(Expr::local(TypeRef::new("acme", "Runner"), "r"))),
                    args: vec![Expr::new(
                        TypeRef::func(vec![], TypeRef::sys("Int")),
                        ExprKind::Closure(closure),
                    )],
                    safe: false,
                    dynamic: false,
                }),
            ),
        };
        let out = lower("acme", &[wrapper_def, use_site]);
        assert!(out.contains("n_wrap = ObjUtil.cvar(n)"), "got:\n{}", out);
        assert!(out.contains("lambda _=None: n_wrap"), "got:\n{}", out);
    }

    #[test]
    fn self_referential_capture_defs_are_dropped() {
        let stmt = Stmt::LocalDef {
            name: "x$0".into(),
            ty: TypeRef::sys("Int"),
            init: Some(Expr::local(TypeRef::sys("Int"), "x$0")),
        };
        assert_eq!(lower("sys", &[stmt]), "pass\n");
    }

    #[test]
    fn unsupported_statement_emits_todo_marker() {
        let out = lower(
            "sys",
            &[Stmt::Unsupported {
                repr: "asyncBlock".into(),
            }],
        );
        assert_eq!(out, "# TODO: asyncBlock\n");
    }

    #[test]
    fn throw_lowers_to_raise() {
        let stmt = Stmt::Throw {
            err: Expr::local(TypeRef::sys("Err"), "e"),
        };
        assert_eq!(lower("sys", &[stmt]), "raise e\n");
    }
}
