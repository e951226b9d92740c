//! # Fanpy AST - Typed Node Model
//!
//! The node model consumed by the fanpy transpiler. An upstream front-end
//! performs parsing and semantic analysis of Fantom pods and hands the
//! resulting tree over, either in-process or serialized as JSON (every node
//! derives `Serialize`/`Deserialize`).
//!
//! Nodes are read-only to the transpiler: expressions carry their resolved
//! static type (`Expr::ctype`), calls and field accesses carry resolved slot
//! references, and closures carry their derived immutability case directly.
//! There are no back-pointers; where a consumer needs the enclosing type it
//! is passed down explicitly.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Symbol = String;

/// Slot and type flag bits, carried verbatim from the front-end into the
/// reflection registration output.
pub mod flags {
    pub const ABSTRACT: u32 = 0x0000_0001;
    pub const CONST: u32 = 0x0000_0002;
    pub const CTOR: u32 = 0x0000_0004;
    pub const ENUM: u32 = 0x0000_0008;
    pub const FACET: u32 = 0x0000_0010;
    pub const FINAL: u32 = 0x0000_0020;
    pub const GETTER: u32 = 0x0000_0040;
    pub const INTERNAL: u32 = 0x0000_0080;
    pub const MIXIN: u32 = 0x0000_0100;
    pub const NATIVE: u32 = 0x0000_0200;
    pub const OVERRIDE: u32 = 0x0000_0400;
    pub const PRIVATE: u32 = 0x0000_0800;
    pub const PROTECTED: u32 = 0x0000_1000;
    pub const PUBLIC: u32 = 0x0000_2000;
    pub const SETTER: u32 = 0x0000_4000;
    pub const STATIC: u32 = 0x0000_8000;
    pub const STORAGE: u32 = 0x0001_0000;
    pub const SYNTHETIC: u32 = 0x0002_0000;
    pub const VIRTUAL: u32 = 0x0004_0000;
}

/// A compilation unit: one pod produces one output subtree under `fan/<pod>/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub name: Symbol,
    pub version: String,
    #[serde(default)]
    pub depends_on: Vec<Symbol>,
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub qname: Symbol,
    pub pod: Symbol,
    pub name: Symbol,
    pub base: Option<TypeRef>,
    #[serde(default)]
    pub mixins: Vec<TypeRef>,
    pub flags: u32,
    #[serde(default)]
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    /// Enum constants in ordinal order; empty for non-enum types.
    #[serde(default)]
    pub enum_defs: Vec<EnumDef>,
}

impl TypeDef {
    pub fn is_abstract(&self) -> bool {
        self.flags & flags::ABSTRACT != 0
    }
    pub fn is_enum(&self) -> bool {
        self.flags & flags::ENUM != 0
    }
    pub fn is_mixin(&self) -> bool {
        self.flags & flags::MIXIN != 0
    }
    pub fn is_synthetic(&self) -> bool {
        self.flags & flags::SYNTHETIC != 0
    }
    pub fn is_native(&self) -> bool {
        self.flags & flags::NATIVE != 0
    }
}

/// A facet applied to a type or slot, already encoded by the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub qname: Symbol,
    #[serde(default)]
    pub value: Option<String>,
}

/// One enum constant of an enum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: Symbol,
    pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: Symbol,
    pub ty: TypeRef,
    pub flags: u32,
    #[serde(default)]
    pub init: Option<Expr>,
    #[serde(default)]
    pub has_explicit_setter: bool,
    /// Visibility of the setter when it is narrower than the field itself.
    #[serde(default)]
    pub setter_private: bool,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

impl FieldDef {
    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }
    pub fn is_const(&self) -> bool {
        self.flags & flags::CONST != 0
    }
    pub fn is_private(&self) -> bool {
        self.flags & flags::PRIVATE != 0
    }
    pub fn is_synthetic(&self) -> bool {
        self.flags & flags::SYNTHETIC != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: Symbol,
    pub params: SmallVec<[ParamDef; 4]>,
    pub returns: TypeRef,
    pub flags: u32,
    #[serde(default)]
    pub is_ctor: bool,
    /// `None` for abstract and native methods.
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }
    pub fn is_private(&self) -> bool {
        self.flags & flags::PRIVATE != 0
    }
    pub fn is_synthetic(&self) -> bool {
        self.flags & flags::SYNTHETIC != 0
    }
    pub fn is_abstract(&self) -> bool {
        self.flags & flags::ABSTRACT != 0
    }
    pub fn is_native(&self) -> bool {
        self.flags & flags::NATIVE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: Symbol,
    pub ty: TypeRef,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default)]
    pub default: Option<Box<Expr>>,
}

impl ParamDef {
    pub fn new(name: impl Into<Symbol>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: false,
            default: None,
        }
    }
}

/// A resolved type reference. Parameterized types carry enough metadata for
/// `sys::List` to expose its element type and `sys::Func` its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub pod: Symbol,
    pub name: Symbol,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub is_generic: bool,
    #[serde(default)]
    pub is_parameterized: bool,
    /// List element type.
    #[serde(default)]
    pub elem: Option<Box<TypeRef>>,
    /// Map key/value types.
    #[serde(default)]
    pub key: Option<Box<TypeRef>>,
    #[serde(default)]
    pub val: Option<Box<TypeRef>>,
    /// Func parameter/return types.
    #[serde(default)]
    pub func_params: Vec<TypeRef>,
    #[serde(default)]
    pub func_return: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn new(pod: impl Into<Symbol>, name: impl Into<Symbol>) -> Self {
        Self {
            pod: pod.into(),
            name: name.into(),
            nullable: false,
            is_generic: false,
            is_parameterized: false,
            elem: None,
            key: None,
            val: None,
            func_params: Vec::new(),
            func_return: None,
        }
    }

    pub fn sys(name: impl Into<Symbol>) -> Self {
        Self::new("sys", name)
    }

    pub fn obj() -> Self {
        Self::sys("Obj")
    }

    pub fn void() -> Self {
        Self::sys("Void")
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn list_of(elem: TypeRef) -> Self {
        let mut t = Self::sys("List");
        t.is_parameterized = true;
        t.elem = Some(Box::new(elem));
        t
    }

    pub fn map_of(key: TypeRef, val: TypeRef) -> Self {
        let mut t = Self::sys("Map");
        t.is_parameterized = true;
        t.key = Some(Box::new(key));
        t.val = Some(Box::new(val));
        t
    }

    pub fn func(params: Vec<TypeRef>, returns: TypeRef) -> Self {
        let mut t = Self::sys("Func");
        t.is_parameterized = true;
        t.func_params = params;
        t.func_return = Some(Box::new(returns));
        t
    }

    pub fn qname(&self) -> String {
        format!("{}::{}", self.pod, self.name)
    }

    /// Stable signature string (`sys::Int`, `foo::Bar?`).
    ///
    /// Java-FFI pods (`[java]java.util`) are sanitized to a plain dotted pod
    /// name so the signature always parses; runtime lookup of the sanitized
    /// qname fails deterministically.
    pub fn sig(&self) -> String {
        let pod = self.pod.strip_prefix("[java]").unwrap_or(&self.pod);
        let suffix = if self.nullable { "?" } else { "" };
        format!("{}::{}{}", pod, self.name, suffix)
    }

    pub fn is(&self, pod: &str, name: &str) -> bool {
        self.pod == pod && self.name == name
    }

    pub fn is_sys(&self, name: &str) -> bool {
        self.is("sys", name)
    }

    /// The value primitives that have no instance methods in Python.
    pub fn is_primitive(&self) -> bool {
        self.pod == "sys"
            && matches!(
                self.name.as_str(),
                "Bool" | "Int" | "Float" | "Str" | "Decimal"
            )
    }

    /// The hand-written runtime types whose fields are Python `@property`
    /// objects rather than method-style accessors.
    pub fn is_hand_written_sys(&self) -> bool {
        self.pod == "sys"
            && matches!(self.name.as_str(), "Map" | "List" | "Type" | "StrBuf")
    }
}

/// A resolved reference to a method slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRef {
    pub parent: TypeRef,
    pub name: Symbol,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub is_ctor: bool,
}

impl MethodRef {
    pub fn new(parent: TypeRef, name: impl Into<Symbol>) -> Self {
        Self {
            parent,
            name: name.into(),
            flags: flags::PUBLIC,
            is_ctor: false,
        }
    }

    pub fn qname(&self) -> String {
        format!("{}.{}", self.parent.qname(), self.name)
    }

    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }
    pub fn is_private(&self) -> bool {
        self.flags & flags::PRIVATE != 0
    }
}

/// A resolved reference to a field slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub parent: TypeRef,
    pub name: Symbol,
    #[serde(default)]
    pub flags: u32,
}

impl FieldRef {
    pub fn new(parent: TypeRef, name: impl Into<Symbol>) -> Self {
        Self {
            parent,
            name: name.into(),
            flags: flags::PUBLIC,
        }
    }

    pub fn qname(&self) -> String {
        format!("{}.{}", self.parent.qname(), self.name)
    }

    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }
}

/// A typed expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub ctype: TypeRef,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(ctype: TypeRef, kind: ExprKind) -> Self {
        Self { ctype, kind }
    }

    pub fn null() -> Self {
        Self::new(TypeRef::obj().nullable(), ExprKind::NullLit)
    }

    pub fn bool_lit(val: bool) -> Self {
        Self::new(TypeRef::sys("Bool"), ExprKind::BoolLit { val })
    }

    pub fn int_lit(val: i64) -> Self {
        Self::new(TypeRef::sys("Int"), ExprKind::IntLit { val })
    }

    pub fn float_lit(val: f64) -> Self {
        Self::new(TypeRef::sys("Float"), ExprKind::FloatLit { val })
    }

    pub fn str_lit(val: impl Into<String>) -> Self {
        Self::new(TypeRef::sys("Str"), ExprKind::StrLit { val: val.into() })
    }

    pub fn local(ctype: TypeRef, name: impl Into<Symbol>) -> Self {
        Self::new(ctype, ExprKind::LocalVar { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub val: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExprKind {
    NullLit,
    BoolLit {
        val: bool,
    },
    IntLit {
        val: i64,
    },
    FloatLit {
        val: f64,
    },
    StrLit {
        val: String,
    },
    DecimalLit {
        val: String,
    },
    DurationLit {
        ticks: i64,
    },
    UriLit {
        val: String,
    },
    ListLit {
        of: TypeRef,
        elems: Vec<Expr>,
    },
    MapLit {
        key_type: TypeRef,
        val_type: TypeRef,
        entries: Vec<MapEntry>,
    },
    RangeLit {
        start: Box<Expr>,
        end: Box<Expr>,
        exclusive: bool,
    },
    LocalVar {
        name: Symbol,
    },
    ThisExpr,
    SuperExpr,
    ItExpr,
    ThrowExpr {
        err: Box<Expr>,
    },
    Call(CallExpr),
    Construction(CallExpr),
    Field(FieldExpr),
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Same {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    NotSame {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    BoolNot {
        operand: Box<Expr>,
    },
    BoolOr {
        operands: Vec<Expr>,
    },
    BoolAnd {
        operands: Vec<Expr>,
    },
    CmpNull {
        operand: Box<Expr>,
    },
    CmpNotNull {
        operand: Box<Expr>,
    },
    IsExpr {
        target: Box<Expr>,
        check: TypeRef,
    },
    IsnotExpr {
        target: Box<Expr>,
        check: TypeRef,
    },
    AsExpr {
        target: Box<Expr>,
        check: TypeRef,
    },
    Coerce {
        target: Box<Expr>,
        to: TypeRef,
    },
    Ternary {
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Elvis {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Shortcut(ShortcutExpr),
    Closure(ClosureExpr),
    StaticTarget {
        ty: TypeRef,
    },
    TypeLiteral {
        ty: TypeRef,
    },
    SlotLiteral {
        parent: TypeRef,
        name: Symbol,
        is_field: bool,
    },
    /// Forward-compatibility escape hatch; lowers to a textual marker.
    Unsupported {
        repr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub method: MethodRef,
    #[serde(default)]
    pub target: Option<Box<Expr>>,
    #[serde(default)]
    pub args: Vec<Expr>,
    /// Safe-navigation call (`target?.m(args)`).
    #[serde(default)]
    pub safe: bool,
    /// Dynamic call (`target->name(args)`).
    #[serde(default)]
    pub dynamic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExpr {
    pub field: FieldRef,
    #[serde(default)]
    pub target: Option<Box<Expr>>,
    /// Safe-navigation access (`target?.field`).
    #[serde(default)]
    pub safe: bool,
    /// Raw-storage access (`&field`), bypassing the accessor.
    #[serde(default)]
    pub raw: bool,
}

/// An operator shortcut: a resolved method call written with operator syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortcutExpr {
    pub op: ShortcutOp,
    pub method: MethodRef,
    pub target: Box<Expr>,
    #[serde(default)]
    pub args: Vec<Expr>,
    /// Compound-assignment form (`x op= v`).
    #[serde(default)]
    pub is_assign: bool,
    /// Postfix increment/decrement (`x++` rather than `++x`).
    #[serde(default)]
    pub is_postfix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShortcutOp {
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Negate,
    Increment,
    Decrement,
    Eq,
    Ne,
    Cmp,
    Lt,
    Le,
    Gt,
    Ge,
    Get,
    Set,
}

/// Whether a closure's captured state is immutable. Derived by the
/// front-end and carried on the node; unknown cases arrive as `Maybe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Immutability {
    Always,
    Maybe,
    Never,
}

impl Immutability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Maybe => "maybe",
            Self::Never => "never",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureExpr {
    /// The `sys::Func` signature the closure is used at.
    pub signature: TypeRef,
    pub params: SmallVec<[ParamDef; 4]>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub captured_fields: Vec<Symbol>,
    pub immutability: Immutability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Stmt {
    Nop,
    Expr {
        expr: Expr,
    },
    LocalDef {
        name: Symbol,
        ty: TypeRef,
        #[serde(default)]
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        #[serde(default)]
        else_block: Option<Vec<Stmt>>,
    },
    Return {
        #[serde(default)]
        expr: Option<Expr>,
    },
    Throw {
        err: Expr,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Option<Expr>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        catches: Vec<Catch>,
        #[serde(default)]
        finally_block: Option<Vec<Stmt>>,
    },
    Switch {
        cond: Expr,
        cases: Vec<Case>,
        #[serde(default)]
        default_block: Option<Vec<Stmt>>,
    },
    /// Forward-compatibility escape hatch; lowers to a `# TODO` marker.
    Unsupported {
        repr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catch {
    /// `None` for an untyped catch-all clause.
    #[serde(default)]
    pub err_type: Option<TypeRef>,
    #[serde(default)]
    pub var: Option<Symbol>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub matches: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn sample_type() -> TypeDef {
        TypeDef {
            qname: "acme::Counter".into(),
            pod: "acme".into(),
            name: "Counter".into(),
            base: Some(TypeRef::obj()),
            mixins: vec![],
            flags: flags::PUBLIC,
            facets: vec![],
            fields: vec![FieldDef {
                name: "count".into(),
                ty: TypeRef::sys("Int"),
                flags: flags::PUBLIC,
                init: Some(Expr::int_lit(0)),
                has_explicit_setter: false,
                setter_private: false,
                facets: vec![],
            }],
            methods: vec![MethodDef {
                name: "increment".into(),
                params: smallvec![],
                returns: TypeRef::void(),
                flags: flags::PUBLIC,
                is_ctor: false,
                body: Some(vec![Stmt::Return { expr: None }]),
                facets: vec![],
            }],
            enum_defs: vec![],
        }
    }

    #[test]
    fn type_flags_decode() {
        let mut t = sample_type();
        t.flags = flags::ENUM | flags::PUBLIC;
        assert!(t.is_enum());
        assert!(!t.is_mixin());
        assert!(!t.is_synthetic());
    }

    #[test]
    fn signatures_render_nullability() {
        assert_eq!(TypeRef::sys("Int").sig(), "sys::Int");
        assert_eq!(TypeRef::new("acme", "Widget").nullable().sig(), "acme::Widget?");
    }

    #[test]
    fn java_ffi_signatures_are_sanitized() {
        let t = TypeRef::new("[java]java.util", "Date").nullable();
        assert_eq!(t.sig(), "java.util::Date?");
    }

    #[test]
    fn parameterized_list_exposes_element_type() {
        let t = TypeRef::list_of(TypeRef::sys("Str"));
        assert!(t.is_parameterized);
        assert_eq!(t.elem.as_ref().map(|e| e.sig()), Some("sys::Str".to_string()));
    }

    #[test]
    fn expr_kind_json_round_trip() {
        let expr = Expr::new(
            TypeRef::sys("Int"),
            ExprKind::Shortcut(ShortcutExpr {
                op: ShortcutOp::Plus,
                method: MethodRef::new(TypeRef::sys("Int"), "plus"),
                target: Box::new(Expr::int_lit(1)),
                args: vec![Expr::int_lit(2)],
                is_assign: false,
                is_postfix: false,
            }),
        );
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn stmt_json_uses_kind_tags() {
        let stmt = Stmt::Return {
            expr: Some(Expr::bool_lit(true)),
        };
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["kind"], "return");
        assert_eq!(json["expr"]["kind"]["kind"], "boolLit");
    }

    #[test]
    fn pod_round_trips_through_json() {
        let pod = Pod {
            name: "acme".into(),
            version: "1.0.0".into(),
            depends_on: vec!["sys".into()],
            types: vec![sample_type()],
        };
        let json = serde_json::to_string_pretty(&pod).unwrap();
        let back: Pod = serde_json::from_str(&json).unwrap();
        assert_eq!(pod, back);
    }

    #[test]
    fn immutability_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Immutability::Always).unwrap(),
            serde_json::json!("always")
        );
        assert_eq!(Immutability::Maybe.as_str(), "maybe");
    }
}
