//! Maps Fantom operator method qnames to Python operator tokens.
//!
//! Integer division and modulo are deliberately absent: Python floor-divides
//! where Fantom truncates toward zero, so those route through the runtime
//! helpers (`ObjUtil.div`, `ObjUtil.mod`) instead of a token.

use fnv::FnvHashMap;
use std::sync::OnceLock;

fn unary_table() -> &'static FnvHashMap<&'static str, &'static str> {
    static TABLE: OnceLock<FnvHashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = FnvHashMap::default();
        m.insert("sys::Bool.not", "not ");
        m.insert("sys::Int.negate", "-");
        m.insert("sys::Float.negate", "-");
        m.insert("sys::Decimal.negate", "-");
        m
    })
}

fn binary_table() -> &'static FnvHashMap<&'static str, &'static str> {
    static TABLE: OnceLock<FnvHashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = FnvHashMap::default();
        // Int: no div, no mod (truncated semantics live in the runtime)
        m.insert("sys::Int.plus", "+");
        m.insert("sys::Int.minus", "-");
        m.insert("sys::Int.mult", "*");
        m.insert("sys::Int.plusFloat", "+");
        m.insert("sys::Int.minusFloat", "-");
        m.insert("sys::Int.multFloat", "*");
        m.insert("sys::Int.divFloat", "/");
        // Float
        m.insert("sys::Float.plus", "+");
        m.insert("sys::Float.minus", "-");
        m.insert("sys::Float.mult", "*");
        m.insert("sys::Float.div", "/");
        m.insert("sys::Float.plusInt", "+");
        m.insert("sys::Float.minusInt", "-");
        m.insert("sys::Float.multInt", "*");
        m.insert("sys::Float.divInt", "/");
        // Decimal
        m.insert("sys::Decimal.plus", "+");
        m.insert("sys::Decimal.minus", "-");
        m.insert("sys::Decimal.mult", "*");
        m.insert("sys::Decimal.div", "/");
        // Str.plus has a coercion exception handled at the call site
        m.insert("sys::Str.plus", "+");
        m
    })
}

/// Python token for a unary operator method, `"not "` / `"-"`.
pub fn unary_op(qname: &str) -> Option<&'static str> {
    unary_table().get(qname).copied()
}

/// Python token for a binary operator method.
pub fn binary_op(qname: &str) -> Option<&'static str> {
    binary_table().get(qname).copied()
}
