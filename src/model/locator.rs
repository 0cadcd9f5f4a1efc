//! Path expressions for selecting elements.
//!
//! A small XPath subset evaluated against [`HtmlDocument`] relative to a
//! context element. Supported:
//!
//! - step separators `/` and `//`, leading `.`, `./`, `.//`, `//` and `..`
//! - axes `child::`, `descendant::`, `descendant-or-self::`, `self::`,
//!   `parent::`, `ancestor::`, `following-sibling::`, `preceding-sibling::`
//! - node tests by tag name or `*`
//! - predicates: `[n]`, `[last()]`, `@a`, `@a='v'`, `text()='v'`, `.='v'`,
//!   `contains(x, 'v')`, `starts-with(x, 'v')`, `not(...)`, `and`, `or`,
//!   and relative paths used as existence tests (`div[a[@name]]`)
//!
//! `text()` is the element's leading text; `.` is its full text content.
//! Results are deduplicated and returned in document order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ego_tree::NodeId;

use super::document::HtmlDocument;
use crate::error::{Error, Result};

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    expr: String,
    path: Path,
}

impl Locator {
    /// Compile a path expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let tokens = tokenize(expr).map_err(|m| Error::locator(expr, m))?;
        if tokens.is_empty() {
            return Err(Error::locator(expr, "empty expression"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let path = parser.path().map_err(|m| Error::locator(expr, m))?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::locator(
                expr,
                format!("unexpected {:?}", parser.tokens[parser.pos]),
            ));
        }
        Ok(Self {
            expr: expr.to_string(),
            path,
        })
    }

    /// The source expression.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Evaluate relative to `context`, returning matches in document order.
    pub fn select(&self, doc: &HtmlDocument, context: NodeId) -> Vec<NodeId> {
        eval_path(&self.path, doc, context)
    }

    /// First match in document order.
    pub fn first(&self, doc: &HtmlDocument, context: NodeId) -> Option<NodeId> {
        self.select(doc, context).into_iter().next()
    }

    /// Whether the expression selects anything from `context`.
    pub fn matches(&self, doc: &HtmlDocument, context: NodeId) -> bool {
        !self.select(doc, context).is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfNode,
    Parent,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfNode,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }

    /// Reverse axes list nodes nearest first.
    fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::PrecedingSibling
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Any,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Attr(String),
    Text,
    Content,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Position(usize),
    Last,
    Exists(Value),
    Equals(Value, String, bool),
    Contains(Value, String),
    StartsWith(Value, String),
    Path(Path),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    ColonColon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Star,
    Comma,
    Eq,
    NotEq,
    Name(String),
    Str(String),
    Num(usize),
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '[' | ']' | '(' | ')' | '@' | '*' | ',' | '=' => {
                tokens.push(match c {
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '@' => Token::At,
                    '*' => Token::Star,
                    ',' => Token::Comma,
                    _ => Token::Eq,
                });
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits
                    .parse()
                    .map_err(|_| format!("bad number {}", digits))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", token, self.peek()))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == word)
    }

    fn path(&mut self) -> ParseResult<Path> {
        let mut steps = Vec::new();
        let mut absolute = false;
        let mut axis = Axis::Child;

        match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                if self.eat(&Token::Slash) {
                    axis = Axis::Child;
                } else if self.eat(&Token::DoubleSlash) {
                    axis = Axis::Descendant;
                } else {
                    steps.push(Step {
                        axis: Axis::SelfNode,
                        test: NodeTest::Any,
                        predicates: Vec::new(),
                    });
                    return Ok(Path { absolute, steps });
                }
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                axis = Axis::Descendant;
            }
            Some(Token::Slash) => {
                self.pos += 1;
                absolute = true;
            }
            _ => {}
        }

        loop {
            steps.push(self.step(axis)?);
            if self.eat(&Token::Slash) {
                axis = Axis::Child;
            } else if self.eat(&Token::DoubleSlash) {
                axis = Axis::Descendant;
            } else {
                break;
            }
        }
        Ok(Path { absolute, steps })
    }

    fn step(&mut self, default_axis: Axis) -> ParseResult<Step> {
        let (axis, test) = match self.peek().cloned() {
            Some(Token::Dot) => {
                self.pos += 1;
                (Axis::SelfNode, NodeTest::Any)
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                (Axis::Parent, NodeTest::Any)
            }
            Some(Token::Star) => {
                self.pos += 1;
                (default_axis, NodeTest::Any)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if self.eat(&Token::ColonColon) {
                    let axis =
                        Axis::from_name(&name).ok_or_else(|| format!("unknown axis {}", name))?;
                    (axis, self.node_test()?)
                } else {
                    (default_axis, NodeTest::Tag(name.to_ascii_lowercase()))
                }
            }
            other => return Err(format!("expected node test, found {:?}", other)),
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> ParseResult<NodeTest> {
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Token::Name(name)) if name == "node" && self.peek_at(1) == Some(&Token::LParen) => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                Ok(NodeTest::Any)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                Ok(NodeTest::Tag(name.to_ascii_lowercase()))
            }
            other => Err(format!("expected node test, found {:?}", other)),
        }
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        while self.is_keyword("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.primary()?;
        while self.is_keyword("and") {
            self.pos += 1;
            let right = self.primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let func = |p: &Parser, name: &str| {
            matches!(p.peek(), Some(Token::Name(n)) if n == name)
                && p.peek_at(1) == Some(&Token::LParen)
        };

        if self.eat(&Token::LParen) {
            let inner = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        if let Some(Token::Num(n)) = self.peek().cloned() {
            self.pos += 1;
            if n == 0 {
                return Err("positions are 1-based".to_string());
            }
            return Ok(Expr::Position(n));
        }
        if func(self, "not") {
            self.pos += 2;
            let inner = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if func(self, "last") {
            self.pos += 2;
            self.expect(Token::RParen)?;
            return Ok(Expr::Last);
        }
        if func(self, "contains") || func(self, "starts-with") {
            let contains = self.is_keyword("contains");
            self.pos += 2;
            let value = self.value()?;
            self.expect(Token::Comma)?;
            let literal = self.literal()?;
            self.expect(Token::RParen)?;
            return Ok(if contains {
                Expr::Contains(value, literal)
            } else {
                Expr::StartsWith(value, literal)
            });
        }

        let is_value = match self.peek() {
            Some(Token::At) => true,
            Some(Token::Name(n)) if n == "text" => self.peek_at(1) == Some(&Token::LParen),
            Some(Token::Dot) => !matches!(
                self.peek_at(1),
                Some(Token::Slash) | Some(Token::DoubleSlash)
            ),
            _ => false,
        };
        if is_value {
            let value = self.value()?;
            if self.eat(&Token::Eq) {
                return Ok(Expr::Equals(value, self.literal()?, true));
            }
            if self.eat(&Token::NotEq) {
                return Ok(Expr::Equals(value, self.literal()?, false));
            }
            return Ok(Expr::Exists(value));
        }

        Ok(Expr::Path(self.path()?))
    }

    fn value(&mut self) -> ParseResult<Value> {
        match self.peek().cloned() {
            Some(Token::At) => {
                self.pos += 1;
                match self.peek().cloned() {
                    Some(Token::Name(name)) => {
                        self.pos += 1;
                        Ok(Value::Attr(name))
                    }
                    other => Err(format!("expected attribute name, found {:?}", other)),
                }
            }
            Some(Token::Name(n)) if n == "text" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                Ok(Value::Text)
            }
            Some(Token::Dot) => {
                self.pos += 1;
                Ok(Value::Content)
            }
            other => Err(format!("expected @attr, text() or '.', found {:?}", other)),
        }
    }

    fn literal(&mut self) -> ParseResult<String> {
        match self.peek().cloned() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(s)
            }
            other => Err(format!("expected string literal, found {:?}", other)),
        }
    }
}

fn eval_path(path: &Path, doc: &HtmlDocument, context: NodeId) -> Vec<NodeId> {
    let mut steps = path.steps.iter();
    let mut current = if path.absolute {
        let root = doc.root();
        let Some(first) = steps.next() else {
            return vec![root];
        };
        let candidates = match first.axis {
            Axis::Descendant | Axis::DescendantOrSelf => {
                let mut all = vec![root];
                all.extend(doc.descendants(root));
                all
            }
            _ => vec![root],
        };
        filter_step(first, doc, candidates)
    } else {
        vec![context]
    };

    for step in steps {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for &node in &current {
            for hit in eval_step(step, doc, node) {
                if seen.insert(hit) {
                    next.push(hit);
                }
            }
        }
        if current.len() > 1 && next.len() > 1 {
            sort_document_order(doc, &mut next);
        }
        current = next;
    }
    current
}

fn eval_step(step: &Step, doc: &HtmlDocument, node: NodeId) -> Vec<NodeId> {
    let candidates = match step.axis {
        Axis::Child => doc.children(node),
        Axis::Descendant => doc.descendants(node),
        Axis::DescendantOrSelf => {
            let mut all = vec![node];
            all.extend(doc.descendants(node));
            all
        }
        Axis::SelfNode => vec![node],
        Axis::Parent => doc.parent(node).into_iter().collect(),
        Axis::Ancestor => doc.ancestors(node),
        Axis::FollowingSibling => doc.following_siblings(node),
        Axis::PrecedingSibling => doc.preceding_siblings(node),
    };
    let mut hits = filter_step(step, doc, candidates);
    if step.axis.is_reverse() {
        hits.reverse();
    }
    hits
}

fn filter_step(step: &Step, doc: &HtmlDocument, candidates: Vec<NodeId>) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = candidates
        .into_iter()
        .filter(|&n| match &step.test {
            NodeTest::Any => true,
            NodeTest::Tag(tag) => doc[n].is(tag),
        })
        .collect();
    for predicate in &step.predicates {
        let size = nodes.len();
        nodes = nodes
            .into_iter()
            .enumerate()
            .filter(|&(i, n)| eval_expr(predicate, doc, n, i + 1, size))
            .map(|(_, n)| n)
            .collect();
    }
    nodes
}

fn eval_expr(expr: &Expr, doc: &HtmlDocument, node: NodeId, position: usize, size: usize) -> bool {
    match expr {
        Expr::Or(a, b) => {
            eval_expr(a, doc, node, position, size) || eval_expr(b, doc, node, position, size)
        }
        Expr::And(a, b) => {
            eval_expr(a, doc, node, position, size) && eval_expr(b, doc, node, position, size)
        }
        Expr::Not(inner) => !eval_expr(inner, doc, node, position, size),
        Expr::Position(n) => position == *n,
        Expr::Last => position == size,
        Expr::Exists(value) => match value {
            Value::Attr(name) => doc[node].has_attr(name),
            Value::Text => !doc[node].text_str().is_empty(),
            Value::Content => !doc.text_content(node).is_empty(),
        },
        Expr::Equals(value, literal, equal) => {
            let matched = value_of(value, doc, node).is_some_and(|v| v == *literal);
            matched == *equal
        }
        Expr::Contains(value, literal) => {
            value_of(value, doc, node).is_some_and(|v| v.contains(literal.as_str()))
        }
        Expr::StartsWith(value, literal) => {
            value_of(value, doc, node).is_some_and(|v| v.starts_with(literal.as_str()))
        }
        Expr::Path(path) => !eval_path(path, doc, node).is_empty(),
    }
}

fn value_of(value: &Value, doc: &HtmlDocument, node: NodeId) -> Option<String> {
    match value {
        Value::Attr(name) => doc[node].attr(name).map(str::to_string),
        Value::Text => Some(doc[node].text_str().to_string()),
        Value::Content => Some(doc.text_content(node)),
    }
}

fn sort_document_order(doc: &HtmlDocument, nodes: &mut [NodeId]) {
    let order: HashMap<NodeId, usize> = doc.order_index();
    nodes.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> HtmlDocument {
        HtmlDocument::parse(
            r#"<html><body>
            <div id="p1"><a name="1"></a><span class="s1" style="top:10px">Header</span></div>
            <div id="d1"><span class="s2">1.1 Intro</span><span class="s3">Body text</span></div>
            <div id="d2"><span class="s2">high confidence</span><sup>a</sup></div>
            </body></html>"#,
        )
        .unwrap()
    }

    fn ids(doc: &HtmlDocument, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .map(|&n| {
                doc[n]
                    .attr("id")
                    .map(str::to_string)
                    .unwrap_or_else(|| doc.text_content(n))
            })
            .collect()
    }

    #[test]
    fn test_descendant_and_child() {
        let doc = doc();
        let body = doc.body().unwrap();
        let spans = Locator::parse(".//span").unwrap().select(&doc, body);
        assert_eq!(spans.len(), 4);
        let divs = Locator::parse("./div").unwrap().select(&doc, body);
        assert_eq!(ids(&doc, &divs), vec!["p1", "d1", "d2"]);
    }

    #[test]
    fn test_nested_predicate_path() {
        let doc = doc();
        let markers = Locator::parse(".//div[a[@name]]")
            .unwrap()
            .select(&doc, doc.root());
        assert_eq!(ids(&doc, &markers), vec!["p1"]);
    }

    #[test]
    fn test_attribute_and_text_predicates() {
        let doc = doc();
        let root = doc.root();
        let hits = Locator::parse(".//span[@class='s2' and contains(text(), 'confidence')]")
            .unwrap()
            .select(&doc, root);
        assert_eq!(ids(&doc, &hits), vec!["high confidence"]);

        let hits = Locator::parse(".//span[starts-with(@style, 'top')]")
            .unwrap()
            .select(&doc, root);
        assert_eq!(hits.len(), 1);

        let hits = Locator::parse(".//span[not(@class='s2')]")
            .unwrap()
            .select(&doc, root);
        assert_eq!(ids(&doc, &hits), vec!["Header", "Body text"]);
    }

    #[test]
    fn test_positional_predicates() {
        let doc = doc();
        let body = doc.body().unwrap();
        let first = Locator::parse("./div[1]").unwrap().select(&doc, body);
        assert_eq!(ids(&doc, &first), vec!["p1"]);
        let last = Locator::parse("./div[last()]").unwrap().select(&doc, body);
        assert_eq!(ids(&doc, &last), vec!["d2"]);
        let first_spans = Locator::parse("./div/span[1]").unwrap().select(&doc, body);
        assert_eq!(first_spans.len(), 3);
    }

    #[test]
    fn test_sibling_and_parent_axes() {
        let doc = doc();
        let body = doc.body().unwrap();
        let sup = doc.find_first(body, "sup").unwrap();
        let prev = Locator::parse("preceding-sibling::span[1]")
            .unwrap()
            .select(&doc, sup);
        assert_eq!(ids(&doc, &prev), vec!["high confidence"]);

        let parent = Locator::parse("..").unwrap().select(&doc, sup);
        assert_eq!(ids(&doc, &parent), vec!["d2"]);

        let d1 = Locator::parse("./div[@id='d1']").unwrap().first(&doc, body).unwrap();
        let after = Locator::parse("following-sibling::div").unwrap().select(&doc, d1);
        assert_eq!(ids(&doc, &after), vec!["d2"]);
    }

    #[test]
    fn test_self_and_absolute() {
        let doc = doc();
        let body = doc.body().unwrap();
        let span = doc.find_first(body, "span").unwrap();
        assert!(Locator::parse("self::span").unwrap().matches(&doc, span));
        assert!(!Locator::parse("self::div").unwrap().matches(&doc, span));
        assert_eq!(Locator::parse(".").unwrap().select(&doc, span), vec![span]);
        assert_eq!(Locator::parse("/html/body").unwrap().select(&doc, span), vec![body]);
        assert_eq!(Locator::parse("//sup").unwrap().select(&doc, doc.root()).len(), 1);
    }

    #[test]
    fn test_results_in_document_order() {
        let doc = doc();
        let hits = Locator::parse(".//div/span").unwrap().select(&doc, doc.root());
        let order = doc.order_index();
        assert!(hits.windows(2).all(|w| order[&w[0]] < order[&w[1]]));
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in ["", ".//[", ".//span[@class='x'", "foo::span", ".//span[0]", "'open"] {
            let err = Locator::parse(expr).unwrap_err();
            assert!(matches!(err, Error::Locator { .. }), "{}", expr);
        }
    }
}
