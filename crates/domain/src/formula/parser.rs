//! Lexer, recursive-descent parser and evaluator for arithmetic expressions.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := NUMBER | DICE | PLACEHOLDER | IDENT '(' args ')' | '(' expr ')'
//! args    := expr (',' expr)*
//! ```

use super::EvaluationError;
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Dice { count: u32, sides: u32 },
    Placeholder(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Dice { count, sides } => format!("{count}d{sides}"),
            Token::Placeholder(name) => format!("@{name}"),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Min,
    Max,
    Floor,
    Ceil,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "floor" => Some(Self::Floor),
            "ceil" => Some(Self::Ceil),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Abs => "abs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Dice { count: u32, sides: u32 },
    Placeholder(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call { function: Function, args: Vec<Expr> },
}

// =============================================================================
// Lexer
// =============================================================================

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Reads a placeholder name starting at `start` (just after the `@`).
///
/// Returns the name and the index of the first character not consumed.
/// A `-` belongs to the name only when a letter follows it, so `@level-1`
/// reads as `level` followed by a subtraction.
fn read_placeholder_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() {
        let c = chars[end];
        if is_name_char(c) {
            end += 1;
        } else if c == '-' && chars.get(end + 1).is_some_and(|n| n.is_ascii_alphabetic()) {
            end += 1;
        } else {
            break;
        }
    }
    // A trailing dot is punctuation, not part of the name.
    while end > start && chars[end - 1] == '.' {
        end -= 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Every placeholder name referenced in `text`, in order of appearance.
///
/// Works on raw text, so it also finds placeholders in strings that are not
/// valid expressions.
pub(crate) fn scan_placeholders(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut names = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' {
            let (name, next) = read_placeholder_name(&chars, i + 1);
            if !name.is_empty() {
                names.push(name);
            }
            i = next.max(i + 1);
        } else {
            i += 1;
        }
    }
    names
}

/// Replaces known placeholders in `text` with their numeric values.
///
/// Used for textual switch comparisons. Unknown placeholders are left as
/// written.
pub(crate) fn substitute_text(text: &str, substitutions: &SubstitutionTable) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' {
            let (name, next) = read_placeholder_name(&chars, i + 1);
            match substitutions.get(&name) {
                Some(value) if !name.is_empty() => out.push_str(&format_number(value)),
                _ => out.extend(&chars[i..next.max(i + 1)]),
            }
            i = next.max(i + 1);
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out.trim().to_string()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn read_digits(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    i
}

fn parse_u32(text: &str) -> Result<u32, EvaluationError> {
    text.parse()
        .map_err(|_| EvaluationError::InvalidNumber(text.to_string()))
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, EvaluationError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => {
                tokens.push((Token::Plus, start));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Minus, start));
                i += 1;
            }
            '*' => {
                tokens.push((Token::Star, start));
                i += 1;
            }
            '/' => {
                tokens.push((Token::Slash, start));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, start));
                i += 1;
            }
            '@' => {
                let (name, next) = read_placeholder_name(&chars, i + 1);
                if name.is_empty() {
                    return Err(EvaluationError::UnexpectedCharacter {
                        character: '@',
                        position: start,
                    });
                }
                tokens.push((Token::Placeholder(name), start));
                i = next;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let int_end = read_digits(&chars, i);
                // NdM
                if int_end < chars.len()
                    && matches!(chars[int_end], 'd' | 'D')
                    && chars.get(int_end + 1).is_some_and(|n| n.is_ascii_digit())
                {
                    let count = parse_u32(&chars[i..int_end].iter().collect::<String>())?;
                    let sides_end = read_digits(&chars, int_end + 1);
                    let sides =
                        parse_u32(&chars[int_end + 1..sides_end].iter().collect::<String>())?;
                    tokens.push((Token::Dice { count, sides }, start));
                    i = sides_end;
                    continue;
                }
                let mut end = int_end;
                if end < chars.len() && chars[end] == '.' {
                    end = read_digits(&chars, end + 1);
                }
                let text: String = chars[i..end].iter().collect();
                let value: f64 = text
                    .parse()
                    .map_err(|_| EvaluationError::InvalidNumber(text.clone()))?;
                tokens.push((Token::Number(value), start));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                // dM is shorthand for 1dM
                let is_bare_die = word.len() > 1
                    && word.starts_with(['d', 'D'])
                    && word[1..].chars().all(|d| d.is_ascii_digit());
                if is_bare_die {
                    tokens.push((
                        Token::Dice {
                            count: 1,
                            sides: parse_u32(&word[1..])?,
                        },
                        start,
                    ));
                } else {
                    tokens.push((Token::Ident(word), start));
                }
                i = end;
            }
            other => {
                return Err(EvaluationError::UnexpectedCharacter {
                    character: other,
                    position: start,
                })
            }
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

/// Deepest nesting of parentheses, calls and signs the parser accepts.
pub(crate) const MAX_DEPTH: usize = 64;
/// Longest token stream the parser accepts.
pub(crate) const MAX_TOKENS: usize = 4096;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Runs `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvaluationError>,
    ) -> Result<T, EvaluationError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvaluationError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvaluationError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, position)) => Err(EvaluationError::UnexpectedToken {
                token: token.describe(),
                position,
            }),
            None => Err(EvaluationError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<Expr, EvaluationError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, EvaluationError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let inner = self.nested(Self::unary)?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        let (token, position) = self.next().ok_or(EvaluationError::UnexpectedEnd)?;
        match token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Dice { count, sides } => Ok(Expr::Dice { count, sides }),
            Token::Placeholder(name) => Ok(Expr::Placeholder(name)),
            Token::LParen => {
                let inner = self.nested(Self::expr)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                let function = Function::from_name(&name)
                    .ok_or_else(|| EvaluationError::UnknownFunction(name.clone()))?;
                self.expect(Token::LParen)?;
                let args = self.nested(|parser| {
                    let mut args = vec![parser.expr()?];
                    while parser.peek() == Some(&Token::Comma) {
                        parser.pos += 1;
                        args.push(parser.expr()?);
                    }
                    Ok(args)
                })?;
                self.expect(Token::RParen)?;
                check_arity(function, args.len())?;
                Ok(Expr::Call { function, args })
            }
            other => Err(EvaluationError::UnexpectedToken {
                token: other.describe(),
                position,
            }),
        }
    }
}

fn check_arity(function: Function, found: usize) -> Result<(), EvaluationError> {
    let ok = match function {
        Function::Min | Function::Max => found >= 1,
        Function::Floor | Function::Ceil | Function::Abs => found == 1,
    };
    if ok {
        Ok(())
    } else {
        Err(EvaluationError::Arity {
            function: function.name().to_string(),
            found,
        })
    }
}

/// Parses `input` into an expression tree.
pub(crate) fn parse(input: &str) -> Result<Expr, EvaluationError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvaluationError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(EvaluationError::TooLong(MAX_TOKENS));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.next() {
        None => Ok(expr),
        Some((token, position)) => Err(EvaluationError::UnexpectedToken {
            token: token.describe(),
            position,
        }),
    }
}

// =============================================================================
// Evaluation
// =============================================================================

impl Expr {
    pub(crate) fn eval(
        &self,
        substitutions: &SubstitutionTable,
        warnings: &mut Vec<Warning>,
    ) -> Result<f64, EvaluationError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Dice { count, sides } => {
                Ok(f64::from(*count) * (f64::from(*sides) + 1.0) / 2.0)
            }
            Expr::Placeholder(name) => match substitutions.get(name) {
                Some(value) => Ok(value),
                None => {
                    warnings.push(
                        Warning::new(
                            WarningKind::UnknownPlaceholder,
                            format!("Unknown placeholder @{name}, using 0"),
                        )
                        .with_context("placeholder", name),
                    );
                    Ok(0.0)
                }
            },
            Expr::Neg(inner) => Ok(-inner.eval(substitutions, warnings)?),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(substitutions, warnings)?;
                let rhs = rhs.eval(substitutions, warnings)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(EvaluationError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                }
            }
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(substitutions, warnings))
                    .collect::<Result<Vec<_>, _>>()?;
                let first = values.first().copied().unwrap_or(0.0);
                Ok(match function {
                    Function::Min => values.iter().copied().fold(first, f64::min),
                    Function::Max => values.iter().copied().fold(first, f64::max),
                    Function::Floor => first.floor(),
                    Function::Ceil => first.ceil(),
                    Function::Abs => first.abs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> f64 {
        let mut warnings = Vec::new();
        parse(input)
            .unwrap()
            .eval(&SubstitutionTable::new(), &mut warnings)
            .unwrap()
    }

    #[test]
    fn respects_precedence_and_parentheses() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("-2 * -3"), 6.0);
        assert_eq!(eval("7 / 2"), 3.5);
    }

    #[test]
    fn dice_evaluate_to_expectation() {
        assert_eq!(eval("1d8"), 4.5);
        assert_eq!(eval("2d6 + 1"), 8.0);
        assert_eq!(eval("d20"), 10.5);
    }

    #[test]
    fn functions_are_case_insensitive() {
        assert_eq!(eval("floor(7 / 2)"), 3.0);
        assert_eq!(eval("CEIL(7 / 2)"), 4.0);
        assert_eq!(eval("max(1, 5, 3)"), 5.0);
        assert_eq!(eval("min(4, 2)"), 2.0);
        assert_eq!(eval("abs(-3)"), 3.0);
    }

    #[test]
    fn placeholder_hyphen_only_joins_letters() {
        assert_eq!(scan_placeholders("@level-1"), vec!["level".to_string()]);
        assert_eq!(
            scan_placeholders("@skills.sleight-of-hand.total"),
            vec!["skills.sleight-of-hand.total".to_string()]
        );
        assert_eq!(scan_placeholders("(@bab.total.)"), vec!["bab.total".to_string()]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse(""), Err(EvaluationError::Empty));
        assert_eq!(parse("1 +"), Err(EvaluationError::UnexpectedEnd));
        assert!(matches!(parse("1 $ 2"), Err(EvaluationError::UnexpectedCharacter { character: '$', .. })));
        assert!(matches!(parse("sqrt(4)"), Err(EvaluationError::UnknownFunction(_))));
        assert!(matches!(parse("floor(1, 2)"), Err(EvaluationError::Arity { .. })));
        assert!(matches!(parse("(1 2)"), Err(EvaluationError::UnexpectedToken { .. })));
    }

    #[test]
    fn nesting_and_length_are_bounded() {
        let shallow = format!("{}1{}", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
        assert_eq!(eval(&shallow), 1.0);
        assert_eq!(eval("floor(max(1, (2 + 3)))"), 5.0);

        let parens = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(parse(&parens), Err(EvaluationError::TooDeep(MAX_DEPTH)));
        let signs = format!("{}1", "-".repeat(500));
        assert_eq!(parse(&signs), Err(EvaluationError::TooDeep(MAX_DEPTH)));
        let calls = format!("{}1{}", "abs(".repeat(500), ")".repeat(500));
        assert_eq!(parse(&calls), Err(EvaluationError::TooDeep(MAX_DEPTH)));

        let chain = vec!["1"; MAX_TOKENS].join("+");
        assert_eq!(parse(&chain), Err(EvaluationError::TooLong(MAX_TOKENS)));
    }

    #[test]
    fn substitute_text_replaces_known_placeholders() {
        let mut subs = SubstitutionTable::new();
        subs.insert("size.total", 0.0);
        assert_eq!(substitute_text(" @size.total ", &subs), "0");
        assert_eq!(substitute_text("@weapon.kind", &subs), "@weapon.kind");
    }
}
