//! Expression nodes

use super::*;

#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    /// `[1, , ...xs]`
    Array(ArrayExpression),
    /// `{a: 1, 'b': 2, 3: 3, [k]: 4}`
    Object(ObjectExpression),
    Function(Box<Function>),
    This(Span),
    Member(Box<MemberExpression>),
    Call(Box<CallExpression>),
    Unary(Box<UnaryExpression>),
    Update(Box<UpdateExpression>),
    Binary(Box<BinaryExpression>),
    /// `&&` and `||`, kept apart from `Binary` because they short-circuit
    Logical(Box<LogicalExpression>),
    Assignment(Box<AssignmentExpression>),
    Conditional(Box<ConditionalExpression>),
    Sequence(Box<SequenceExpression>),
    /// Valid only as a call argument or an array literal element
    Spread(Box<SpreadElement>),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier(id) => id.span,
            Expression::Literal(lit) => lit.span,
            Expression::Array(a) => a.span,
            Expression::Object(o) => o.span,
            Expression::Function(f) => f.span,
            Expression::This(span) => *span,
            Expression::Member(m) => m.span,
            Expression::Call(c) => c.span,
            Expression::Unary(u) => u.span,
            Expression::Update(u) => u.span,
            Expression::Binary(b) => b.span,
            Expression::Logical(l) => l.span,
            Expression::Assignment(a) => a.span,
            Expression::Conditional(c) => c.span,
            Expression::Sequence(s) => s.span,
            Expression::Spread(s) => s.span,
        }
    }

    /// Names and member accesses; everything else is rejected by the parser
    pub fn is_valid_assignment_target(&self) -> bool {
        matches!(self, Expression::Identifier(_) | Expression::Member(_))
    }

    /// Short source-like rendering for error messages (`o.p is not iterable`)
    /// and call site labels (`add(...rest)`)
    pub fn describe(&self) -> String {
        match self {
            Expression::Identifier(id) => id.name.clone(),
            Expression::This(_) => "this".to_string(),
            Expression::Literal(lit) => lit.raw.clone(),
            Expression::Member(m) => match &m.property {
                MemberProperty::Identifier(id) => format!("{}.{}", m.object.describe(), id.name),
                MemberProperty::Expression(e) => {
                    format!("{}[{}]", m.object.describe(), e.describe())
                }
            },
            Expression::Call(c) => format!("{}(...)", c.callee.describe()),
            Expression::Array(_) => "[...]".to_string(),
            Expression::Object(_) => "{...}".to_string(),
            Expression::Function(_) => "function".to_string(),
            _ => "expression".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Literal {
    pub value: LiteralValue,
    /// Source text, reused by `Expression::describe`
    pub raw: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub struct ArrayExpression {
    /// `None` marks an elision, which leaves a hole
    pub elements: Vec<Option<Expression>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ObjectExpression {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub key: PropertyName,
    pub value: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum PropertyName {
    /// Identifier, string and number keys, already converted to a string
    Static(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct MemberExpression {
    pub object: Expression,
    pub property: MemberProperty,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    /// `obj.prop`
    Identifier(Identifier),
    /// `obj[expr]`
    Expression(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct CallExpression {
    pub callee: Expression,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

impl CallExpression {
    pub fn has_spread(&self) -> bool {
        self.arguments
            .iter()
            .any(|arg| matches!(arg, Expression::Spread(_)))
    }

    /// The spread operand when the call has exactly the form `f(...x)`.
    /// Only these calls get an optimizable call site.
    pub fn sole_spread(&self) -> Option<&Expression> {
        match self.arguments.as_slice() {
            [Expression::Spread(spread)] => Some(&spread.argument),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    Typeof,
    Void,
    Delete,
}

/// `++x`, `x--` and friends on a name or member
#[derive(Debug, Clone)]
pub struct UpdateExpression {
    pub operator: UpdateOperator,
    pub argument: Expression,
    pub prefix: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub struct LogicalExpression {
    pub operator: LogicalOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignmentOperator {
    /// The operator a compound assignment applies, `None` for plain `=`
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubAssign => Some(BinaryOperator::Sub),
            AssignmentOperator::MulAssign => Some(BinaryOperator::Mul),
            AssignmentOperator::DivAssign => Some(BinaryOperator::Div),
            AssignmentOperator::ModAssign => Some(BinaryOperator::Mod),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalExpression {
    pub test: Expression,
    pub consequent: Expression,
    pub alternate: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SequenceExpression {
    pub expressions: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SpreadElement {
    pub argument: Expression,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn call(source: &str) -> CallExpression {
        match parse_expression(source).unwrap() {
            Expression::Call(call) => *call,
            other => panic!("not a call: {:?}", other),
        }
    }

    #[test]
    fn test_sole_spread_shape() {
        assert!(call("f(...xs)").sole_spread().is_some());
        assert!(call("f(a, ...xs)").sole_spread().is_none());
        assert!(call("f(...a, ...b)").sole_spread().is_none());
        assert!(call("f(a, ...xs)").has_spread());
        assert!(!call("f(a, b)").has_spread());
    }

    #[test]
    fn test_describe() {
        let c = call("o.m(...a.b['c'])");
        assert_eq!(c.callee.describe(), "o.m");
        assert_eq!(c.sole_spread().unwrap().describe(), "a.b['c']");
        assert_eq!(call("g()(...this)").callee.describe(), "g(...)");
    }
}
