//! Derived-quantity expression trees: a prefix arithmetic mini-language
//! over named parameters, parsed into an arena and evaluated against a
//! parameter list.
//!
//! Nodes live in an [`ExprArena`] and are addressed by [`ExprHandle`] rather
//! than `Rc`/`Box` pointers: the trees are strictly hierarchical (§9 of the
//! design notes), so an arena avoids both reference counting and recursive
//! drop on deeply nested trees.

use crate::error::Error;

/// Maximum parse/evaluation recursion depth. Parsing enforces this; a
/// successfully parsed tree cannot exceed this height, so evaluation is
/// bounded for free.
pub const MAX_EXPR_DEPTH: u32 = 256;

/// Index into an [`ExprArena`].
pub type ExprHandle = usize;

/// Unary functions recognised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Func1 {
    Abs,
    Sqr,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Sinh,
    Cos,
    Cosh,
    Tan,
    Tanh,
}

impl Func1 {
    fn from_name(name: &str) -> Option<Self> {
        use Func1::*;
        Some(match name {
            "abs" => Abs,
            "sqr" => Sqr,
            "sqrt" => Sqrt,
            "exp" => Exp,
            "ln" => Ln,
            "sin" => Sin,
            "sinh" => Sinh,
            "cos" => Cos,
            "cosh" => Cosh,
            "tan" => Tan,
            "tanh" => Tanh,
            _ => return None,
        })
    }

    fn apply(self, x: f64) -> f64 {
        use Func1::*;
        match self {
            Abs => x.abs(),
            Sqr => x * x,
            Sqrt => x.sqrt(),
            Exp => x.exp(),
            Ln => x.ln(),
            Sin => x.sin(),
            Sinh => x.sinh(),
            Cos => x.cos(),
            Cosh => x.cosh(),
            Tan => x.tan(),
            Tanh => x.tanh(),
        }
    }
}

/// Binary functions recognised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Func2 {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Func2 {
    fn from_name(name: &str) -> Option<Self> {
        use Func2::*;
        Some(match name {
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "pow" => Pow,
            _ => return None,
        })
    }

    /// Division by a magnitude below this threshold returns 0.0 to keep
    /// evaluation total.
    const DIV_EPSILON: f64 = 1e-20;

    fn apply(self, a: f64, b: f64) -> f64 {
        use Func2::*;
        match self {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => {
                if b.abs() < Self::DIV_EPSILON {
                    0.0
                } else {
                    a / b
                }
            }
            Pow => a.powf(b),
        }
    }
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprNode {
    ConstFloat(f64),
    ConstInt(i64),
    /// Reference to a parameter by its internal name.
    Param(String),
    Call1(Func1, ExprHandle),
    Call2(Func2, ExprHandle, ExprHandle),
}

/// Arena of expression nodes, addressed by integer handle.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena { nodes: Vec::new() }
    }

    fn push(&mut self, node: ExprNode) -> ExprHandle {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, handle: ExprHandle) -> &ExprNode {
        &self.nodes[handle]
    }

    /// Append a constant-int leaf directly, bypassing the parser. Used for
    /// literal register-value bindings, which carry a raw integer rather
    /// than an expression string.
    pub fn push_const_int(&mut self, value: i64) -> ExprHandle {
        self.push(ExprNode::ConstInt(value))
    }

    /// Parse a prefix-notation expression string, appending nodes to this
    /// arena, and return the handle of its root.
    ///
    /// Whitespace separates tokens; parentheses are optional decoration and
    /// are skipped rather than enforced. The original source's end-of-string
    /// check mistakenly compared a character against the literal `'0'`
    /// instead of testing for end-of-string (§9.2); this parser treats
    /// running out of tokens as end-of-string directly, which is the fix.
    pub fn parse(&mut self, expr: &str) -> Result<ExprHandle, Error> {
        let tokens: Vec<&str> = expr
            .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .filter(|s| !s.is_empty())
            .collect();
        let mut pos = 0usize;
        let handle = self.parse_expr(&tokens, &mut pos, 0)?;
        Ok(handle)
    }

    fn next_token<'a>(tokens: &[&'a str], pos: &mut usize) -> Result<&'a str, Error> {
        let tok = tokens
            .get(*pos)
            .ok_or_else(|| Error::ExprParse("unexpected end of expression".into()))?;
        *pos += 1;
        Ok(tok)
    }

    fn parse_expr(
        &mut self,
        tokens: &[&str],
        pos: &mut usize,
        depth: u32,
    ) -> Result<ExprHandle, Error> {
        if depth > MAX_EXPR_DEPTH {
            return Err(Error::ExprParse("recursion limit exceeded".into()));
        }
        let tok = Self::next_token(tokens, pos)?;

        if let Some(f1) = Func1::from_name(tok) {
            let arg = self.parse_expr(tokens, pos, depth + 1)?;
            return Ok(self.push(ExprNode::Call1(f1, arg)));
        }
        if let Some(f2) = Func2::from_name(tok) {
            let a = self.parse_expr(tokens, pos, depth + 1)?;
            let b = self.parse_expr(tokens, pos, depth + 1)?;
            return Ok(self.push(ExprNode::Call2(f2, a, b)));
        }
        if let Ok(i) = tok.parse::<i64>() {
            return Ok(self.push(ExprNode::ConstInt(i)));
        }
        if let Ok(f) = tok.parse::<f64>() {
            return Ok(self.push(ExprNode::ConstFloat(f)));
        }
        if is_identifier(tok) {
            return Ok(self.push(ExprNode::Param(tok.to_string())));
        }
        Err(Error::ExprParse(format!("unrecognised token '{tok}'")))
    }

    /// Evaluate the subtree rooted at `handle` against a parameter list.
    /// An unbound parameter name evaluates to `0.0` (documented, not an
    /// error); division by a magnitude below `1e-20` returns `0.0`.
    pub fn eval(&self, handle: ExprHandle, params: &crate::effect::ParameterList) -> f64 {
        match self.node(handle) {
            ExprNode::ConstFloat(f) => *f,
            ExprNode::ConstInt(i) => *i as f64,
            ExprNode::Param(name) => params.value_of(name).unwrap_or(0.0),
            ExprNode::Call1(f, a) => f.apply(self.eval(*a, params)),
            ExprNode::Call2(f, a, b) => f.apply(self.eval(*a, params), self.eval(*b, params)),
        }
    }
}

fn is_identifier(tok: &str) -> bool {
    let mut chars = tok.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{Parameter, ParameterList};

    #[test]
    fn parses_simple_sum() {
        let mut arena = ExprArena::new();
        let h = arena.parse("+ 1 2").unwrap();
        let params = ParameterList::new();
        assert_eq!(arena.eval(h, &params), 3.0);
    }

    #[test]
    fn parses_nested_prefix() {
        let mut arena = ExprArena::new();
        let h = arena.parse("* (- 1 cos x) y").unwrap();
        let mut params = ParameterList::new();
        params.push(Parameter::new("X", "x", 0.0, -1.0, 1.0));
        params.push(Parameter::new("Y", "y", 2.0, -10.0, 10.0));
        // cos(0) = 1, so (1 - 1) * 2 = 0
        assert_eq!(arena.eval(h, &params), 0.0);
    }

    #[test]
    fn unbound_param_is_zero() {
        let mut arena = ExprArena::new();
        let h = arena.parse("sin unbound").unwrap();
        let params = ParameterList::new();
        assert_eq!(arena.eval(h, &params), 0.0);
    }

    #[test]
    fn div_by_near_zero_is_zero() {
        let mut arena = ExprArena::new();
        let h = arena.parse("/ 1 0").unwrap();
        let params = ParameterList::new();
        assert_eq!(arena.eval(h, &params), 0.0);
    }

    #[test]
    fn gain_db_expression() {
        let mut arena = ExprArena::new();
        let h = arena.parse("pow 10 (/ gain_db 20)").unwrap();
        let mut params = ParameterList::new();
        params.push(Parameter::new("Gain (dB)", "gain_db", -6.0, -60.0, 0.0));
        let v = arena.eval(h, &params);
        assert!((v - 0.5011872336).abs() < 1e-4);
    }

    #[test]
    fn malformed_expression_errors() {
        let mut arena = ExprArena::new();
        assert!(arena.parse("+ 1").is_err());
        assert!(arena.parse("bogus# token").is_err());
    }
}
